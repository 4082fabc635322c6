use std::fmt::Write as _;

use serde::Serialize;

use crate::preview::PreviewDimensions;

use super::state::{CameraStatus, Notice, ScanState, SessionState};

pub const SCAN_LABEL: &str = "Scan";
pub const SCANNING_LABEL: &str = "Scanning…";
pub const SAVING_MODE_LABEL: &str = "Camera off";
pub const HISTORY_TITLE: &str = "History";
pub const CLEAR_LABEL: &str = "Clear";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Button {
    pub label: String,
    pub disabled: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Switch {
    pub label: String,
    pub checked: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PreviewBox {
    pub dimensions: PreviewDimensions,
    /// An empty box is shown instead of the feed (saving mode, or no frame yet).
    pub placeholder: bool,
    pub camera: CameraStatus,
}

/// Everything a front end needs to draw the scanner page.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub preview: PreviewBox,
    pub saving_mode: Switch,
    pub scan_button: Button,
    pub scan_state: ScanState,
    pub history_title: String,
    pub clear_button: Button,
    pub history: Vec<String>,
    pub notice: Option<Notice>,
}

impl SessionView {
    pub fn from_state(state: &SessionState) -> Self {
        let placeholder = !matches!(state.camera, CameraStatus::Live);
        let scan_label = if state.scanning {
            SCANNING_LABEL
        } else {
            SCAN_LABEL
        };
        Self {
            preview: PreviewBox {
                dimensions: state.preview,
                placeholder,
                camera: state.camera.clone(),
            },
            saving_mode: Switch {
                label: SAVING_MODE_LABEL.into(),
                checked: state.saving_mode,
            },
            scan_button: Button {
                label: scan_label.into(),
                disabled: state.saving_mode,
            },
            scan_state: state.scan_state(),
            history_title: HISTORY_TITLE.into(),
            clear_button: Button {
                label: CLEAR_LABEL.into(),
                disabled: false,
            },
            history: state.history.clone(),
            notice: state.notice.clone(),
        }
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let camera = match &self.preview.camera {
            CameraStatus::Loading => "starting".to_string(),
            CameraStatus::Live => "live".to_string(),
            CameraStatus::Off => "off".to_string(),
            CameraStatus::Failed { reason } => format!("unavailable ({reason})"),
        };
        let _ = writeln!(
            out,
            "[ preview {}x{} | camera {} ]",
            self.preview.dimensions.width, self.preview.dimensions.height, camera
        );
        let _ = writeln!(
            out,
            "[{}] {}",
            if self.saving_mode.checked { "x" } else { " " },
            self.saving_mode.label
        );
        let _ = writeln!(
            out,
            "( {} ){}",
            self.scan_button.label,
            if self.scan_button.disabled {
                " disabled"
            } else {
                ""
            }
        );
        let _ = writeln!(out, "{}  [{}]", self.history_title, self.clear_button.label);
        if self.history.is_empty() {
            let _ = writeln!(out, "  (empty)");
        }
        for (i, code) in self.history.iter().enumerate() {
            let _ = writeln!(out, "  {:>2}. {}", i + 1, code);
        }
        if let Some(notice) = &self.notice {
            let _ = writeln!(out, "!! {}: {} (ok to dismiss)", notice.title, notice.message);
        }
        out
    }
}
