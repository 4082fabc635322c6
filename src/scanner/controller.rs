use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use image::RgbaImage;
use log::{info, warn};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::camera::{Camera, StreamConstraints};
use crate::settings::ScannerSettings;

use super::decoder::Decoder;
use super::loop_worker::{tick_loop, SharedSource, TickContext};
use super::overlay::Overlay;
use super::Detection;

#[derive(Debug, Clone, Copy)]
pub struct ScannerOptions {
    pub frame_interval: Duration,
    pub overlay: Overlay,
}

impl ScannerOptions {
    pub fn from_settings(settings: &ScannerSettings) -> Result<Self> {
        Ok(Self {
            frame_interval: settings.frame_interval(),
            overlay: Overlay::new(&settings.line_color, settings.line_width)
                .context("invalid outline color in settings")?,
        })
    }
}

/// Owns one camera stream and the tick loop reading from it.
pub struct FrameScanner {
    source: SharedSource,
    handle: Option<JoinHandle<()>>,
    cancel_token: CancellationToken,
    suspended: Arc<AtomicBool>,
    surface: watch::Receiver<Option<Arc<RgbaImage>>>,
}

impl FrameScanner {
    /// Acquires the camera and starts ticking. Acquisition failures are returned as-is;
    /// there is no retry.
    pub async fn open(
        camera: &dyn Camera,
        constraints: &StreamConstraints,
        decoder: Arc<dyn Decoder>,
        options: ScannerOptions,
        enabled: watch::Receiver<bool>,
        detections: mpsc::UnboundedSender<Detection>,
    ) -> Result<Self> {
        let source = camera
            .open_stream(constraints)
            .await
            .context("failed to open camera stream")?;

        let (width, height) = source.dimensions();
        info!("Camera stream acquired ({}x{})", width, height);

        let source: SharedSource = Arc::new(Mutex::new(source));
        let suspended = Arc::new(AtomicBool::new(false));
        let (surface_tx, surface_rx) = watch::channel(None);
        let cancel_token = CancellationToken::new();

        let ctx = TickContext {
            source: Arc::clone(&source),
            decoder,
            overlay: options.overlay,
            enabled,
            suspended: Arc::clone(&suspended),
            detections,
            surface: surface_tx,
        };
        let handle = tokio::spawn(tick_loop(ctx, options.frame_interval, cancel_token.clone()));

        Ok(Self {
            source,
            handle: Some(handle),
            cancel_token,
            suspended,
            surface: surface_rx,
        })
    }

    /// Lets decoding continue after a detection. Returns whether the scanner was suspended.
    pub fn resume(&self) -> bool {
        let was_suspended = self.suspended.swap(false, Ordering::AcqRel);
        if was_suspended {
            info!("Scanner resumed");
        }
        was_suspended
    }

    pub fn subscribe_frames(&self) -> watch::Receiver<Option<Arc<RgbaImage>>> {
        self.surface.clone()
    }

    /// Stops every track right away, then revokes the tick task and waits for it
    /// and for any capture thread still holding the device.
    pub async fn teardown(mut self) -> Result<()> {
        let capture_thread = self.release();
        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("scanner tick loop failed to join")?;
        }
        if let Some(thread) = capture_thread {
            tokio::task::spawn_blocking(move || thread.join())
                .await
                .context("camera release worker failed to join")?
                .map_err(|_| anyhow!("camera capture thread panicked"))?;
        }
        info!("Frame scanner torn down");
        Ok(())
    }

    fn release(&self) -> Option<std::thread::JoinHandle<()>> {
        let capture_thread = match self.source.lock() {
            Ok(mut source) => {
                source.stop_tracks();
                source.take_capture_thread()
            }
            Err(_) => {
                warn!("frame source lock poisoned; tracks may still be live");
                None
            }
        };
        self.cancel_token.cancel();
        capture_thread
    }
}

impl Drop for FrameScanner {
    fn drop(&mut self) {
        if !self.cancel_token.is_cancelled() && self.release().is_some() {
            warn!("Frame scanner dropped without teardown; camera released in the background");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{FacingMode, FrameSource};
    use crate::scanner::decoder::{DecodedSymbol, Point};
    use anyhow::bail;
    use async_trait::async_trait;
    use image::Rgba;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Probe {
        frames_served: AtomicUsize,
        stopped: AtomicBool,
    }

    struct ProbeSource(Arc<Probe>);

    impl FrameSource for ProbeSource {
        fn has_enough_data(&self) -> bool {
            !self.0.stopped.load(Ordering::SeqCst)
        }
        fn dimensions(&self) -> (u32, u32) {
            (8, 8)
        }
        fn current_frame(&mut self) -> Result<Option<RgbaImage>> {
            self.0.frames_served.fetch_add(1, Ordering::SeqCst);
            Ok(Some(RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 255]))))
        }
        fn stop_tracks(&mut self) {
            self.0.stopped.store(true, Ordering::SeqCst);
        }
        fn is_live(&self) -> bool {
            !self.0.stopped.load(Ordering::SeqCst)
        }
    }

    struct ProbeCamera(Arc<Probe>);

    #[async_trait]
    impl Camera for ProbeCamera {
        async fn open_stream(&self, _c: &StreamConstraints) -> Result<Box<dyn FrameSource>> {
            Ok(Box::new(ProbeSource(Arc::clone(&self.0))))
        }
    }

    /// Holds the device on a thread that only lets go some time after being told to stop.
    struct SlowReleaseSource {
        stop: Arc<AtomicBool>,
        thread: Option<std::thread::JoinHandle<()>>,
    }

    impl FrameSource for SlowReleaseSource {
        fn has_enough_data(&self) -> bool {
            false
        }
        fn dimensions(&self) -> (u32, u32) {
            (8, 8)
        }
        fn current_frame(&mut self) -> Result<Option<RgbaImage>> {
            Ok(None)
        }
        fn stop_tracks(&mut self) {
            self.stop.store(true, Ordering::SeqCst);
        }
        fn is_live(&self) -> bool {
            !self.stop.load(Ordering::SeqCst)
        }
        fn take_capture_thread(&mut self) -> Option<std::thread::JoinHandle<()>> {
            self.thread.take()
        }
    }

    struct SlowReleaseCamera {
        released: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Camera for SlowReleaseCamera {
        async fn open_stream(&self, _c: &StreamConstraints) -> Result<Box<dyn FrameSource>> {
            let stop = Arc::new(AtomicBool::new(false));
            let thread = std::thread::spawn({
                let stop = Arc::clone(&stop);
                let released = Arc::clone(&self.released);
                move || {
                    while !stop.load(Ordering::SeqCst) {
                        std::thread::sleep(Duration::from_millis(1));
                    }
                    std::thread::sleep(Duration::from_millis(50));
                    released.store(true, Ordering::SeqCst);
                }
            });
            Ok(Box::new(SlowReleaseSource {
                stop,
                thread: Some(thread),
            }))
        }
    }

    struct DeniedCamera;

    #[async_trait]
    impl Camera for DeniedCamera {
        async fn open_stream(&self, _c: &StreamConstraints) -> Result<Box<dyn FrameSource>> {
            bail!("permission denied")
        }
    }

    struct Finds;

    impl Decoder for Finds {
        fn decode(&self, _frame: &RgbaImage) -> Option<DecodedSymbol> {
            Some(DecodedSymbol {
                payload: "CODE-A".into(),
                corners: [Point { x: 0.0, y: 0.0 }; 4],
            })
        }
    }

    fn constraints() -> StreamConstraints {
        StreamConstraints {
            width: 8,
            height: 8,
            facing_mode: FacingMode::Environment,
            audio: false,
        }
    }

    fn options() -> ScannerOptions {
        ScannerOptions {
            frame_interval: Duration::from_millis(2),
            overlay: Overlay::new("#FF3B58", 1).unwrap(),
        }
    }

    #[tokio::test]
    async fn detects_suspends_and_resumes() {
        let probe = Arc::new(Probe::default());
        let (_enabled_tx, enabled_rx) = watch::channel(true);
        let (det_tx, mut det_rx) = mpsc::unbounded_channel();

        let scanner = FrameScanner::open(
            &ProbeCamera(Arc::clone(&probe)),
            &constraints(),
            Arc::new(Finds),
            options(),
            enabled_rx,
            det_tx,
        )
        .await
        .unwrap();

        let first = tokio::time::timeout(Duration::from_secs(2), det_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.payload, "CODE-A");
        assert!(scanner.subscribe_frames().borrow().is_some());

        // Frozen: no further detections while suspended.
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(det_rx.try_recv().is_err());

        assert!(scanner.resume());
        assert!(!scanner.resume());
        let second = tokio::time::timeout(Duration::from_secs(2), det_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.payload, "CODE-A");

        scanner.teardown().await.unwrap();
    }

    #[tokio::test]
    async fn teardown_stops_tracks_and_ticks() {
        let probe = Arc::new(Probe::default());
        let (_enabled_tx, enabled_rx) = watch::channel(false);
        let (det_tx, _det_rx) = mpsc::unbounded_channel();

        let scanner = FrameScanner::open(
            &ProbeCamera(Arc::clone(&probe)),
            &constraints(),
            Arc::new(Finds),
            options(),
            enabled_rx,
            det_tx,
        )
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        scanner.teardown().await.unwrap();
        assert!(probe.stopped.load(Ordering::SeqCst));

        let served = probe.frames_served.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(probe.frames_served.load(Ordering::SeqCst), served);
    }

    #[tokio::test]
    async fn teardown_waits_for_device_release() {
        let released = Arc::new(AtomicBool::new(false));
        let (_enabled_tx, enabled_rx) = watch::channel(false);
        let (det_tx, _det_rx) = mpsc::unbounded_channel();

        let scanner = FrameScanner::open(
            &SlowReleaseCamera {
                released: Arc::clone(&released),
            },
            &constraints(),
            Arc::new(Finds),
            options(),
            enabled_rx,
            det_tx,
        )
        .await
        .unwrap();
        assert!(!released.load(Ordering::SeqCst));

        scanner.teardown().await.unwrap();
        assert!(released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn camera_failure_propagates() {
        let (_enabled_tx, enabled_rx) = watch::channel(false);
        let (det_tx, _det_rx) = mpsc::unbounded_channel();

        let err = FrameScanner::open(
            &DeniedCamera,
            &constraints(),
            Arc::new(Finds),
            options(),
            enabled_rx,
            det_tx,
        )
        .await
        .err()
        .unwrap();
        assert!(format!("{err:#}").contains("permission denied"));
    }
}
