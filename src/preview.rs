use serde::{Deserialize, Serialize};

use crate::settings::VideoSize;

/// Share of the viewport width the preview takes up.
const PREVIEW_WIDTH_RATIO: f64 = 0.6;
/// Vertical space kept free below a half-height preview on short screens.
const SHORT_SCREEN_MARGIN: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Size of the on-screen preview box. The camera is shown in portrait, so the
/// native landscape width maps onto the preview height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewDimensions {
    pub width: u32,
    pub height: u32,
}

impl PreviewDimensions {
    /// Placeholder used before the viewport is known.
    pub fn unmeasured(video: VideoSize) -> Self {
        Self {
            width: video.height,
            height: video.width,
        }
    }

    pub fn compute(viewport: Viewport, video: VideoSize) -> Self {
        if video.width == 0 || video.height == 0 {
            return Self::unmeasured(video);
        }

        let portrait_ratio = f64::from(video.width) / f64::from(video.height);
        let mut width = (f64::from(viewport.width) * PREVIEW_WIDTH_RATIO).round();
        let mut height = (portrait_ratio * width).round();

        let max_height = f64::from(viewport.height) / 2.0 - SHORT_SCREEN_MARGIN;
        if height > max_height {
            height = max_height.max(0.0).round();
            width = (height / portrait_ratio).round();
        }

        Self {
            width: width as u32,
            height: height as u32,
        }
    }
}
