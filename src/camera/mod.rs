//! Camera capability: acquiring a stream and pulling frames out of it.
//!
//! The scanner never talks to a device directly. It asks a [`Camera`] for a
//! [`FrameSource`] and owns that handle until teardown, at which point it
//! stops every track explicitly.

#[cfg(feature = "native-camera")]
pub mod native;
pub mod still;

use anyhow::Result;
use async_trait::async_trait;
use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::settings::ScannerSettings;

#[cfg(feature = "native-camera")]
pub use native::NativeCamera;
pub use still::StillImageCamera;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FacingMode {
    /// Rear camera.
    Environment,
    /// Front camera.
    User,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConstraints {
    pub width: u32,
    pub height: u32,
    pub facing_mode: FacingMode,
    pub audio: bool,
}

impl StreamConstraints {
    pub fn from_settings(settings: &ScannerSettings) -> Self {
        Self {
            width: settings.video.width,
            height: settings.video.height,
            facing_mode: settings.facing_mode,
            audio: false,
        }
    }
}

/// A live stream handed out by [`Camera::open_stream`].
pub trait FrameSource: Send {
    /// True once the source has a full frame buffered.
    fn has_enough_data(&self) -> bool;

    /// Native size of the frames this source produces.
    fn dimensions(&self) -> (u32, u32);

    /// Copies the current frame out of the stream. `None` when nothing is buffered yet
    /// or the tracks were stopped.
    fn current_frame(&mut self) -> Result<Option<RgbaImage>>;

    /// Stops all tracks. Must be idempotent; frames are never produced afterwards.
    fn stop_tracks(&mut self);

    fn is_live(&self) -> bool;

    /// Thread still releasing the device after [`stop_tracks`](Self::stop_tracks).
    /// Teardown joins it so the device is free before teardown returns.
    fn take_capture_thread(&mut self) -> Option<std::thread::JoinHandle<()>> {
        None
    }
}

#[async_trait]
pub trait Camera: Send + Sync {
    /// Requests a stream. Fails when permission is denied or no device matches.
    async fn open_stream(&self, constraints: &StreamConstraints) -> Result<Box<dyn FrameSource>>;
}
