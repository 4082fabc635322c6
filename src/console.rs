//! Terminal rendering of the session: events on stdout, snapshots on disk.

use std::path::PathBuf;

use log::{info, warn};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::events::SessionEvent;
use crate::scanner::Detection;
use crate::session::{CameraStatus, SessionView};

pub(crate) fn print_view(view: &SessionView, json: bool) {
    if json {
        match serde_json::to_string(view) {
            Ok(line) => println!("{line}"),
            Err(err) => warn!("Failed to serialize view: {err}"),
        }
    } else {
        print!("{}", view.render_text());
    }
}

pub(crate) async fn print_events(mut events: broadcast::Receiver<SessionEvent>, json: bool) {
    loop {
        match events.recv().await {
            Ok(event) if json => match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(err) => warn!("Failed to serialize event: {err}"),
            },
            Ok(event) => println!("{}", describe(&event)),
            Err(RecvError::Lagged(skipped)) => warn!("Event printer fell behind; {skipped} events dropped"),
            Err(RecvError::Closed) => break,
        }
    }
}

fn describe(event: &SessionEvent) -> String {
    match event {
        SessionEvent::ScanStateChanged { state, .. } => format!("-- scan state: {state:?}"),
        SessionEvent::HistoryChanged { history, .. } if history.is_empty() => {
            "-- history cleared".to_string()
        }
        SessionEvent::HistoryChanged { history, .. } => {
            let mut lines = vec![format!("-- history ({}):", history.len())];
            lines.extend(
                history
                    .iter()
                    .enumerate()
                    .map(|(i, code)| format!("  {:>2}. {}", i + 1, code)),
            );
            lines.join("\n")
        }
        SessionEvent::DuplicateDetected { notice, .. } => {
            format!("!! {}: {} (ok to dismiss)", notice.title, notice.message)
        }
        SessionEvent::NoticeDismissed => "-- notice dismissed".to_string(),
        SessionEvent::SavingModeChanged { saving_mode } => {
            format!("-- camera off: {}", if *saving_mode { "yes" } else { "no" })
        }
        SessionEvent::CameraStatusChanged { status } => match status {
            CameraStatus::Loading => "-- camera starting".to_string(),
            CameraStatus::Live => "-- camera live".to_string(),
            CameraStatus::Off => "-- camera released".to_string(),
            CameraStatus::Failed { reason } => format!("!! camera unavailable: {reason}"),
        },
    }
}

pub(crate) async fn write_snapshots(mut detections: broadcast::Receiver<Detection>, dir: PathBuf) {
    if let Err(err) = tokio::fs::create_dir_all(&dir).await {
        warn!("Cannot create snapshot directory {}: {}", dir.display(), err);
        return;
    }

    loop {
        let detection = match detections.recv().await {
            Ok(detection) => detection,
            Err(RecvError::Lagged(skipped)) => {
                warn!("Snapshot writer fell behind; {skipped} frames dropped");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        let path = dir.join(format!(
            "scan-{}.png",
            detection.detected_at.format("%Y%m%d-%H%M%S%.3f")
        ));
        let frame = detection.frame;
        let target = path.clone();
        match tokio::task::spawn_blocking(move || frame.save(&target)).await {
            Ok(Ok(())) => info!("Snapshot saved to {}", path.display()),
            Ok(Err(err)) => warn!("Failed to save snapshot {}: {}", path.display(), err),
            Err(err) => warn!("Snapshot worker failed: {err}"),
        }
    }
}
