use image::{GrayImage, RgbaImage};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

/// A decoded symbol: its text and the four corners of its outline, in drawing
/// order (top-left, top-right, bottom-right, bottom-left).
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSymbol {
    pub payload: String,
    pub corners: [Point; 4],
}

/// Whether to also look for light-on-dark symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InversionAttempts {
    DontInvert,
    AttemptBoth,
}

pub trait Decoder: Send + Sync {
    /// Looks for one symbol in `frame`. `None` means "no code this frame".
    fn decode(&self, frame: &RgbaImage) -> Option<DecodedSymbol>;
}

pub struct RqrrDecoder {
    inversion: InversionAttempts,
}

impl RqrrDecoder {
    pub fn new(inversion: InversionAttempts) -> Self {
        Self { inversion }
    }
}

impl Decoder for RqrrDecoder {
    fn decode(&self, frame: &RgbaImage) -> Option<DecodedSymbol> {
        let luma = image::imageops::grayscale(frame);
        if let Some(symbol) = decode_luma(&luma) {
            return Some(symbol);
        }
        match self.inversion {
            InversionAttempts::DontInvert => None,
            InversionAttempts::AttemptBoth => {
                let mut inverted = luma;
                image::imageops::invert(&mut inverted);
                decode_luma(&inverted)
            }
        }
    }
}

fn decode_luma(luma: &GrayImage) -> Option<DecodedSymbol> {
    let (width, height) = luma.dimensions();
    if width == 0 || height == 0 {
        return None;
    }

    let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
        width as usize,
        height as usize,
        |x, y| luma.get_pixel(x as u32, y as u32).0[0],
    );

    for grid in prepared.detect_grids() {
        match grid.decode() {
            Ok((_, payload)) if !payload.is_empty() => {
                let corners = grid.bounds.map(|p| Point {
                    x: p.x as f32,
                    y: p.y as f32,
                });
                return Some(DecodedSymbol { payload, corners });
            }
            Ok(_) => {}
            Err(err) => log::debug!("QR grid found but failed to decode: {err}"),
        }
    }
    None
}
