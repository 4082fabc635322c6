use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{error, info, warn};
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::camera::{Camera, StreamConstraints};
use crate::events::{EventBus, SessionEvent};
use crate::preview::{PreviewDimensions, Viewport};
use crate::scanner::{Decoder, Detection, FrameScanner, ScannerOptions};
use crate::settings::ScannerSettings;

use super::state::{CameraStatus, DetectionOutcome, SessionState};
use super::view::SessionView;

const DETECTION_FANOUT: usize = 16;

/// Owns the history, the scanning and saving-mode flags, and the cooldown timer,
/// and mounts or tears down the frame scanner as saving mode changes.
#[derive(Clone)]
pub struct SessionController {
    state: Arc<Mutex<SessionState>>,
    camera: Arc<dyn Camera>,
    decoder: Arc<dyn Decoder>,
    constraints: StreamConstraints,
    options: ScannerOptions,
    cooldown_delay: Duration,
    scanner: Arc<Mutex<Option<FrameScanner>>>,
    cooldown: Arc<Mutex<Option<JoinHandle<()>>>>,
    pump: Arc<Mutex<Option<(JoinHandle<()>, CancellationToken)>>>,
    /// Single source of truth for "detection enabled", read by the scanner every tick.
    enabled_tx: Arc<watch::Sender<bool>>,
    detections_tx: mpsc::UnboundedSender<Detection>,
    detections_rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<Detection>>>>,
    detections_out: broadcast::Sender<Detection>,
    events: EventBus,
}

impl SessionController {
    pub fn new(
        settings: &ScannerSettings,
        camera: Arc<dyn Camera>,
        decoder: Arc<dyn Decoder>,
        viewport: Option<Viewport>,
    ) -> Result<Self> {
        let preview = match viewport {
            Some(viewport) => PreviewDimensions::compute(viewport, settings.video),
            None => PreviewDimensions::unmeasured(settings.video),
        };
        let session_id = Uuid::new_v4().to_string();
        let (enabled_tx, _) = watch::channel(false);
        let (detections_tx, detections_rx) = mpsc::unbounded_channel();
        let (detections_out, _) = broadcast::channel(DETECTION_FANOUT);

        Ok(Self {
            state: Arc::new(Mutex::new(SessionState::new(session_id, preview))),
            camera,
            decoder,
            constraints: StreamConstraints::from_settings(settings),
            options: ScannerOptions::from_settings(settings)?,
            cooldown_delay: settings.cooldown(),
            scanner: Arc::new(Mutex::new(None)),
            cooldown: Arc::new(Mutex::new(None)),
            pump: Arc::new(Mutex::new(None)),
            enabled_tx: Arc::new(enabled_tx),
            detections_tx,
            detections_rx: Arc::new(Mutex::new(Some(detections_rx))),
            detections_out,
            events: EventBus::new(),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Detections as they are handled, annotated frame included.
    pub fn subscribe_detections(&self) -> broadcast::Receiver<Detection> {
        self.detections_out.subscribe()
    }

    pub fn detection_enabled(&self) -> watch::Receiver<bool> {
        self.enabled_tx.subscribe()
    }

    pub async fn snapshot(&self) -> SessionState {
        self.state.lock().await.clone()
    }

    pub async fn view(&self) -> SessionView {
        SessionView::from_state(&*self.state.lock().await)
    }

    /// Starts the detection pump and, unless saving mode is on, acquires the camera.
    /// A camera failure is returned and also recorded as the camera status.
    pub async fn start(&self) -> Result<()> {
        {
            let mut pump = self.pump.lock().await;
            if pump.is_none() {
                if let Some(rx) = self.detections_rx.lock().await.take() {
                    let token = CancellationToken::new();
                    let handle = tokio::spawn(detection_pump(self.clone(), rx, token.clone()));
                    *pump = Some((handle, token));
                }
            }
        }

        let (session_id, saving_mode) = {
            let state = self.state.lock().await;
            (state.session_id.clone(), state.saving_mode)
        };
        info!("Scan session {} starting", session_id);

        if saving_mode {
            return Ok(());
        }
        self.mount_scanner().await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.abort_cooldown_task().await;

        if let Some(scanner) = self.scanner.lock().await.take() {
            scanner.teardown().await?;
        }

        if let Some((handle, token)) = self.pump.lock().await.take() {
            token.cancel();
            handle.await.context("detection pump failed to join")?;
        }

        info!("Scan session {} ended", self.state.lock().await.session_id);
        Ok(())
    }

    pub async fn on_detected(&self, payload: String) -> DetectionOutcome {
        let (outcome, epoch, scan_state, history, notice) = {
            let mut state = self.state.lock().await;
            let (outcome, epoch) = state.record_detection(&payload);
            self.enabled_tx.send_replace(false);
            (
                outcome,
                epoch,
                state.scan_state(),
                state.history.clone(),
                state.notice.clone(),
            )
        };

        self.events.emit(SessionEvent::ScanStateChanged {
            state: scan_state,
            scanning: false,
        });

        match outcome {
            DetectionOutcome::Added => {
                info!("New code recorded ({} in history)", history.len());
                self.events.emit(SessionEvent::HistoryChanged {
                    history,
                    scroll_to_top: true,
                });
            }
            DetectionOutcome::Duplicate => {
                info!("Duplicate code detected; history unchanged");
                if let Some(notice) = notice {
                    self.events.emit(SessionEvent::DuplicateDetected {
                        payload,
                        notice,
                        detected_at: chrono::Utc::now(),
                    });
                }
            }
        }

        self.start_cooldown(epoch).await;
        outcome
    }

    /// Flips scanning. A pending cooldown is cancelled and the scanner resumed at once.
    pub async fn toggle_scanning(&self) -> Result<bool> {
        let (toggle, scan_state) = {
            let mut state = self.state.lock().await;
            let toggle = state.toggle_scanning()?;
            self.enabled_tx.send_replace(toggle.scanning);
            (toggle, state.scan_state())
        };

        if toggle.cancelled_cooldown {
            self.abort_cooldown_task().await;
            self.resume_scanner().await;
        }

        self.events.emit(SessionEvent::ScanStateChanged {
            state: scan_state,
            scanning: toggle.scanning,
        });
        Ok(toggle.scanning)
    }

    pub async fn toggle_saving_mode(&self) -> Result<bool> {
        let (toggle, scan_state) = {
            let mut state = self.state.lock().await;
            let toggle = state.toggle_saving_mode();
            if toggle.saving_mode {
                // Detection must be observably off before the camera goes away.
                self.enabled_tx.send_replace(false);
            }
            (toggle, state.scan_state())
        };

        if !toggle.saving_mode {
            info!("Saving mode off; reacquiring camera");
            self.events
                .emit(SessionEvent::SavingModeChanged { saving_mode: false });
            return self.mount_scanner().await.map(|_| false);
        }

        if toggle.forced_scanning_off || toggle.cancelled_cooldown {
            self.events.emit(SessionEvent::ScanStateChanged {
                state: scan_state,
                scanning: false,
            });
        }
        if toggle.cancelled_cooldown {
            self.abort_cooldown_task().await;
        }

        if let Some(scanner) = self.scanner.lock().await.take() {
            scanner.teardown().await?;
        }
        info!("Saving mode on; camera released");

        self.events
            .emit(SessionEvent::SavingModeChanged { saving_mode: true });
        self.events.emit(SessionEvent::CameraStatusChanged {
            status: CameraStatus::Off,
        });
        Ok(true)
    }

    pub async fn clear_history(&self) {
        self.state.lock().await.clear_history();
        self.events.emit(SessionEvent::HistoryChanged {
            history: Vec::new(),
            scroll_to_top: false,
        });
    }

    pub async fn acknowledge_notice(&self) -> bool {
        let dismissed = self.state.lock().await.acknowledge_notice();
        if dismissed {
            self.events.emit(SessionEvent::NoticeDismissed);
        }
        dismissed
    }

    async fn mount_scanner(&self) -> Result<()> {
        self.set_camera_status(CameraStatus::Loading).await;

        let opened = FrameScanner::open(
            self.camera.as_ref(),
            &self.constraints,
            Arc::clone(&self.decoder),
            self.options,
            self.enabled_tx.subscribe(),
            self.detections_tx.clone(),
        )
        .await;

        let scanner = match opened {
            Ok(scanner) => scanner,
            Err(err) => {
                error!("Camera unavailable: {err:#}");
                self.set_camera_status(CameraStatus::Failed {
                    reason: format!("{err:#}"),
                })
                .await;
                return Err(err);
            }
        };

        // Saving mode may have been switched on while the camera was being acquired.
        // Checked and inserted under the state lock.
        let previous = {
            let state = self.state.lock().await;
            if state.saving_mode {
                drop(state);
                warn!("Saving mode enabled during camera acquisition; releasing camera");
                return scanner.teardown().await;
            }
            self.watch_first_frame(&scanner);
            let previous = self.scanner.lock().await.replace(scanner);
            previous
        };
        if let Some(previous) = previous {
            previous.teardown().await?;
        }
        Ok(())
    }

    fn watch_first_frame(&self, scanner: &FrameScanner) {
        let mut frames = scanner.subscribe_frames();
        let controller = self.clone();
        tokio::spawn(async move {
            let drawn = frames.wait_for(|frame| frame.is_some()).await.is_ok();
            if drawn {
                let loading = controller.state.lock().await.camera == CameraStatus::Loading;
                if loading {
                    controller.set_camera_status(CameraStatus::Live).await;
                }
            }
        });
    }

    async fn set_camera_status(&self, status: CameraStatus) {
        self.state.lock().await.camera = status.clone();
        self.events
            .emit(SessionEvent::CameraStatusChanged { status });
    }

    async fn start_cooldown(&self, epoch: u64) {
        let mut slot = self.cooldown.lock().await;
        if let Some(handle) = slot.take() {
            handle.abort();
        }

        let controller = self.clone();
        let delay = self.cooldown_delay;
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            controller.finish_cooldown(epoch).await;
        }));
    }

    async fn finish_cooldown(&self, epoch: u64) {
        let scan_state = {
            let mut state = self.state.lock().await;
            if !state.finish_cooldown(epoch) {
                return;
            }
            state.scan_state()
        };

        // Resume decoding only; scanning stays off until the user turns it back on.
        self.resume_scanner().await;
        self.events.emit(SessionEvent::ScanStateChanged {
            state: scan_state,
            scanning: false,
        });
    }

    async fn abort_cooldown_task(&self) {
        if let Some(handle) = self.cooldown.lock().await.take() {
            handle.abort();
        }
    }

    async fn resume_scanner(&self) {
        if let Some(scanner) = self.scanner.lock().await.as_ref() {
            scanner.resume();
        }
    }
}

async fn detection_pump(
    controller: SessionController,
    mut detections: mpsc::UnboundedReceiver<Detection>,
    cancel_token: CancellationToken,
) {
    loop {
        tokio::select! {
            received = detections.recv() => {
                let Some(detection) = received else {
                    break;
                };
                controller.on_detected(detection.payload.clone()).await;
                let _ = controller.detections_out.send(detection);
            }
            _ = cancel_token.cancelled() => break,
        }
    }
}
