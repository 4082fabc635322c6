use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::preview::PreviewDimensions;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ScanState {
    Idle,
    Scanning,
    Cooldown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CameraStatus {
    /// Stream requested, nothing drawn yet.
    Loading,
    Live,
    /// Saving mode: the stream is not requested at all.
    Off,
    Failed { reason: String },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum NoticeKind {
    Duplicate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub kind: NoticeKind,
    pub title: String,
    pub message: String,
}

impl Notice {
    pub fn duplicate() -> Self {
        Self {
            kind: NoticeKind::Duplicate,
            title: "Error".into(),
            message: "Already registered".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionOutcome {
    Added,
    Duplicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanningToggle {
    pub scanning: bool,
    pub cancelled_cooldown: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SavingModeToggle {
    pub saving_mode: bool,
    pub forced_scanning_off: bool,
    pub cancelled_cooldown: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub session_id: String,
    /// Distinct payloads, most recent first.
    pub history: Vec<String>,
    pub scanning: bool,
    pub saving_mode: bool,
    pub notice: Option<Notice>,
    pub camera: CameraStatus,
    pub preview: PreviewDimensions,
    /// Epoch of the pending cooldown. A timer whose epoch no longer matches was
    /// cancelled and must not touch anything.
    #[serde(skip)]
    pub cooldown_epoch: Option<u64>,
    #[serde(skip)]
    last_epoch: u64,
}

impl SessionState {
    pub fn new(session_id: String, preview: PreviewDimensions) -> Self {
        Self {
            session_id,
            history: Vec::new(),
            scanning: false,
            saving_mode: false,
            notice: None,
            camera: CameraStatus::Loading,
            preview,
            cooldown_epoch: None,
            last_epoch: 0,
        }
    }

    pub fn scan_state(&self) -> ScanState {
        if self.scanning {
            ScanState::Scanning
        } else if self.cooldown_epoch.is_some() {
            ScanState::Cooldown
        } else {
            ScanState::Idle
        }
    }

    /// Records a read: new payloads go to the front, repeats raise the duplicate
    /// notice. Either way scanning stops and a cooldown begins; its epoch is returned.
    pub fn record_detection(&mut self, payload: &str) -> (DetectionOutcome, u64) {
        self.scanning = false;
        let outcome = if self.history.iter().any(|seen| seen == payload) {
            self.notice = Some(Notice::duplicate());
            DetectionOutcome::Duplicate
        } else {
            self.history.insert(0, payload.to_string());
            DetectionOutcome::Added
        };
        (outcome, self.begin_cooldown())
    }

    fn begin_cooldown(&mut self) -> u64 {
        self.last_epoch += 1;
        self.cooldown_epoch = Some(self.last_epoch);
        self.last_epoch
    }

    /// Ends the cooldown if `epoch` is still the pending one.
    pub fn finish_cooldown(&mut self, epoch: u64) -> bool {
        if self.cooldown_epoch == Some(epoch) {
            self.cooldown_epoch = None;
            true
        } else {
            false
        }
    }

    pub fn cancel_cooldown(&mut self) -> bool {
        self.cooldown_epoch.take().is_some()
    }

    pub fn toggle_scanning(&mut self) -> Result<ScanningToggle> {
        if self.saving_mode {
            bail!("scanning is unavailable while saving mode is on");
        }
        let cancelled_cooldown = self.cancel_cooldown();
        self.scanning = !self.scanning;
        Ok(ScanningToggle {
            scanning: self.scanning,
            cancelled_cooldown,
        })
    }

    pub fn toggle_saving_mode(&mut self) -> SavingModeToggle {
        if self.saving_mode {
            self.saving_mode = false;
            self.camera = CameraStatus::Loading;
            return SavingModeToggle {
                saving_mode: false,
                forced_scanning_off: false,
                cancelled_cooldown: false,
            };
        }

        let forced_scanning_off = self.scanning;
        self.scanning = false;
        let cancelled_cooldown = self.cancel_cooldown();
        self.saving_mode = true;
        self.camera = CameraStatus::Off;
        SavingModeToggle {
            saving_mode: true,
            forced_scanning_off,
            cancelled_cooldown,
        }
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn acknowledge_notice(&mut self) -> bool {
        self.notice.take().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> SessionState {
        SessionState::new(
            "test".into(),
            PreviewDimensions {
                width: 240,
                height: 427,
            },
        )
    }

    #[test]
    fn new_payloads_go_to_the_front() {
        let mut s = state();
        s.record_detection("B");
        s.record_detection("A");
        s.record_detection("P");
        assert_eq!(s.history, vec!["P", "A", "B"]);
    }

    #[test]
    fn duplicates_raise_notice_and_leave_history_alone() {
        let mut s = state();
        let (first, _) = s.record_detection("CODE-A");
        assert_eq!(first, DetectionOutcome::Added);
        assert!(s.notice.is_none());
        assert!(!s.scanning);

        s.toggle_scanning().unwrap();
        let (second, _) = s.record_detection("CODE-A");
        assert_eq!(second, DetectionOutcome::Duplicate);
        assert_eq!(s.history, vec!["CODE-A"]);
        assert_eq!(s.notice, Some(Notice::duplicate()));
        assert!(!s.scanning);

        assert!(s.acknowledge_notice());
        assert!(!s.acknowledge_notice());
    }

    #[test]
    fn history_never_holds_duplicates() {
        let mut s = state();
        for payload in ["a", "b", "a", "c", "b", "b", "d", "a"] {
            s.record_detection(payload);
        }
        let mut sorted = s.history.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), s.history.len());
        assert_eq!(s.history, vec!["d", "c", "b", "a"]);
    }

    #[test]
    fn detection_enters_cooldown_and_expiry_returns_to_idle() {
        let mut s = state();
        s.toggle_scanning().unwrap();
        assert_eq!(s.scan_state(), ScanState::Scanning);

        let (_, epoch) = s.record_detection("X");
        assert_eq!(s.scan_state(), ScanState::Cooldown);
        assert!(s.finish_cooldown(epoch));
        assert_eq!(s.scan_state(), ScanState::Idle);
        assert!(!s.scanning);
    }

    #[test]
    fn stale_cooldown_epoch_is_ignored() {
        let mut s = state();
        let (_, first) = s.record_detection("X");
        let toggle = s.toggle_scanning().unwrap();
        assert!(toggle.cancelled_cooldown);
        assert!(toggle.scanning);

        assert!(!s.finish_cooldown(first));
        assert!(s.scanning);

        let (_, second) = s.record_detection("Y");
        assert!(!s.finish_cooldown(first));
        assert!(s.finish_cooldown(second));
    }

    #[test]
    fn saving_mode_forces_idle_and_blocks_scanning() {
        let mut s = state();
        s.toggle_scanning().unwrap();

        let toggle = s.toggle_saving_mode();
        assert!(toggle.saving_mode);
        assert!(toggle.forced_scanning_off);
        assert!(!s.scanning);
        assert_eq!(s.camera, CameraStatus::Off);
        assert!(s.toggle_scanning().is_err());
        assert!(!s.scanning);

        let toggle = s.toggle_saving_mode();
        assert!(!toggle.saving_mode);
        assert_eq!(s.camera, CameraStatus::Loading);
        assert!(!s.scanning);
    }

    #[test]
    fn saving_mode_cancels_pending_cooldown() {
        let mut s = state();
        let (_, epoch) = s.record_detection("X");
        let toggle = s.toggle_saving_mode();
        assert!(toggle.cancelled_cooldown);
        assert_eq!(s.scan_state(), ScanState::Idle);
        assert!(!s.finish_cooldown(epoch));
    }

    #[test]
    fn clear_history_always_empties() {
        let mut s = state();
        s.clear_history();
        assert!(s.history.is_empty());
        s.record_detection("a");
        s.record_detection("b");
        s.clear_history();
        assert!(s.history.is_empty());
    }
}
