use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::session::{CameraStatus, Notice, ScanState};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum SessionEvent {
    #[serde(rename_all = "camelCase")]
    ScanStateChanged { state: ScanState, scanning: bool },
    #[serde(rename_all = "camelCase")]
    HistoryChanged {
        history: Vec<String>,
        scroll_to_top: bool,
    },
    #[serde(rename_all = "camelCase")]
    DuplicateDetected {
        payload: String,
        notice: Notice,
        detected_at: DateTime<Utc>,
    },
    NoticeDismissed,
    #[serde(rename_all = "camelCase")]
    SavingModeChanged { saving_mode: bool },
    #[serde(rename_all = "camelCase")]
    CameraStatusChanged { status: CameraStatus },
}

/// Fan-out of session events to whichever front ends are listening.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: SessionEvent) {
        // No subscribers is fine; events are advisory.
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_camel_case_tags() {
        let json = serde_json::to_value(SessionEvent::HistoryChanged {
            history: vec!["CODE-A".into()],
            scroll_to_top: true,
        })
        .unwrap();
        assert_eq!(json["event"], "historyChanged");
        assert_eq!(json["scrollToTop"], true);
        assert_eq!(json["history"][0], "CODE-A");
    }

    #[test]
    fn emitting_without_listeners_is_not_an_error() {
        let bus = EventBus::new();
        bus.emit(SessionEvent::NoticeDismissed);

        let mut rx = bus.subscribe();
        bus.emit(SessionEvent::SavingModeChanged { saving_mode: true });
        assert_eq!(
            rx.try_recv().unwrap(),
            SessionEvent::SavingModeChanged { saving_mode: true }
        );
    }
}
