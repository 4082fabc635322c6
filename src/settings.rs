use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock, time::Duration};

use crate::camera::FacingMode;
use crate::scanner::InversionAttempts;

/// Native camera resolution requested from the device (landscape, as reported by drivers).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoSize {
    pub width: u32,
    pub height: u32,
}

impl Default for VideoSize {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerSettings {
    pub video: VideoSize,
    pub facing_mode: FacingMode,
    /// Device picked by the native backend, which has no notion of facing.
    pub device_index: u32,
    pub cooldown_ms: u64,
    pub frame_interval_ms: u64,
    pub line_color: String,
    pub line_width: u32,
    pub inversion: InversionAttempts,
    /// How long the still-image camera shows each file before moving on.
    pub still_frame_ms: u64,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            video: VideoSize::default(),
            facing_mode: FacingMode::Environment,
            device_index: 0,
            cooldown_ms: 1000,
            frame_interval_ms: 16,
            line_color: "#FF3B58".into(),
            line_width: 4,
            inversion: InversionAttempts::DontInvert,
            still_frame_ms: 1500,
        }
    }
}

impl ScannerSettings {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }

    pub fn still_frame_interval(&self) -> Duration {
        Duration::from_millis(self.still_frame_ms.max(1))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct UserSettings {
    #[serde(default)]
    scanner: ScannerSettings,
}

pub struct SettingsStore {
    path: Option<PathBuf>,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    /// Loads settings from `path`. A missing file or one that fails to parse yields defaults.
    pub fn new(path: Option<PathBuf>) -> Result<Self> {
        let data = match &path {
            Some(path) if path.exists() => {
                let contents = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read settings from {}", path.display()))?;
                serde_json::from_str(&contents).unwrap_or_else(|err| {
                    log::warn!(
                        "Ignoring malformed settings file {}: {}",
                        path.display(),
                        err
                    );
                    UserSettings::default()
                })
            }
            _ => UserSettings::default(),
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn scanner(&self) -> ScannerSettings {
        self.data
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .scanner
            .clone()
    }

    /// Writes the current settings back to the file they were loaded from, if any.
    pub fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let guard = self
            .data
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let serialized = serde_json::to_string_pretty(&*guard)?;
        fs::write(path, serialized)
            .with_context(|| format!("Failed to write settings to {}", path.display()))
    }
}
