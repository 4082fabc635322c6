pub mod controller;
pub mod decoder;
mod loop_worker;
pub mod overlay;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use image::RgbaImage;

pub use controller::{FrameScanner, ScannerOptions};
pub use decoder::{DecodedSymbol, Decoder, InversionAttempts, Point, RqrrDecoder};
pub use overlay::Overlay;

/// A successful read, reported once per decode before the scanner suspends.
#[derive(Debug, Clone)]
pub struct Detection {
    pub payload: String,
    pub corners: [Point; 4],
    pub detected_at: DateTime<Utc>,
    /// The frame as drawn, outline included.
    pub frame: Arc<RgbaImage>,
}
