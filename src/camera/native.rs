//! Webcam capture through `nokhwa`.
//!
//! `nokhwa::Camera` is `!Send`, so it lives on a dedicated capture thread that
//! keeps the latest decoded frame in a shared slot. The scanner only ever sees
//! that slot through [`FrameSource`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use image::{DynamicImage, RgbImage, RgbaImage};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};
use tokio::sync::oneshot;

use super::{Camera, FrameSource, StreamConstraints};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Pause after a failed grab before trying again.
const GRAB_RETRY_DELAY: Duration = Duration::from_millis(50);

pub struct NativeCamera {
    device_index: u32,
}

impl NativeCamera {
    pub const fn new(device_index: u32) -> Self {
        Self { device_index }
    }
}

#[async_trait]
impl Camera for NativeCamera {
    async fn open_stream(&self, constraints: &StreamConstraints) -> Result<Box<dyn FrameSource>> {
        let device_index = self.device_index;
        let requested = (constraints.width, constraints.height);
        let latest = Arc::new(Mutex::new(None));
        let stop = Arc::new(AtomicBool::new(false));
        let (opened_tx, opened_rx) = oneshot::channel();

        let thread = std::thread::Builder::new()
            .name(format!("camera-{device_index}"))
            .spawn({
                let latest = Arc::clone(&latest);
                let stop = Arc::clone(&stop);
                move || capture_thread(device_index, requested, latest, stop, opened_tx)
            })
            .context("failed to spawn camera thread")?;

        let dimensions = opened_rx
            .await
            .map_err(|_| anyhow!("camera thread exited before opening device {device_index}"))??;

        Ok(Box::new(NativeSource {
            latest,
            stop,
            thread: Some(thread),
            dimensions,
        }))
    }
}

fn capture_thread(
    device_index: u32,
    requested: (u32, u32),
    latest: Arc<Mutex<Option<RgbaImage>>>,
    stop: Arc<AtomicBool>,
    opened_tx: oneshot::Sender<Result<(u32, u32)>>,
) {
    let format = RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
    let mut camera = match nokhwa::Camera::new(CameraIndex::Index(device_index), format)
        .and_then(|mut camera| camera.open_stream().map(|_| camera))
    {
        Ok(camera) => camera,
        Err(err) => {
            log_error!("Failed to open camera {}: {}", device_index, err);
            let _ = opened_tx.send(Err(anyhow!("failed to open camera {device_index}: {err}")));
            return;
        }
    };

    let resolution = camera.camera_format().resolution();
    let actual = (resolution.width_x, resolution.height_y);
    log_info!(
        "Camera {} streaming: requested {}x{}, actual {}x{}",
        device_index,
        requested.0,
        requested.1,
        actual.0,
        actual.1
    );
    if opened_tx.send(Ok(actual)).is_err() {
        let _ = camera.stop_stream();
        return;
    }

    while !stop.load(Ordering::Acquire) {
        let decoded = camera
            .frame()
            .and_then(|buffer| buffer.decode_image::<RgbFormat>());
        match decoded {
            Ok(rgb) => {
                let (width, height) = (rgb.width(), rgb.height());
                match RgbImage::from_raw(width, height, rgb.into_raw()) {
                    Some(frame) => {
                        let rgba = DynamicImage::ImageRgb8(frame).to_rgba8();
                        if let Ok(mut slot) = latest.lock() {
                            *slot = Some(rgba);
                        }
                    }
                    None => log_debug!("Dropping short camera buffer ({}x{})", width, height),
                }
            }
            Err(err) => {
                log_warn!("Failed to grab camera frame: {}", err);
                std::thread::sleep(GRAB_RETRY_DELAY);
            }
        }
    }

    if let Err(err) = camera.stop_stream() {
        log_warn!("Error stopping camera {}: {}", device_index, err);
    }
    log_info!("Camera {} stopped", device_index);
}

struct NativeSource {
    latest: Arc<Mutex<Option<RgbaImage>>>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    dimensions: (u32, u32),
}

impl FrameSource for NativeSource {
    fn has_enough_data(&self) -> bool {
        self.is_live()
            && self
                .latest
                .lock()
                .map(|slot| slot.is_some())
                .unwrap_or(false)
    }

    fn dimensions(&self) -> (u32, u32) {
        self.dimensions
    }

    fn current_frame(&mut self) -> Result<Option<RgbaImage>> {
        if !self.is_live() {
            return Ok(None);
        }
        let slot = self
            .latest
            .lock()
            .map_err(|_| anyhow!("camera frame slot poisoned"))?;
        Ok(slot.clone())
    }

    fn stop_tracks(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Ok(mut slot) = self.latest.lock() {
            *slot = None;
        }
    }

    fn is_live(&self) -> bool {
        !self.stop.load(Ordering::Acquire)
    }

    fn take_capture_thread(&mut self) -> Option<JoinHandle<()>> {
        self.thread.take()
    }
}

impl Drop for NativeSource {
    fn drop(&mut self) {
        self.stop_tracks();
        if self.thread.is_some() {
            log_debug!("Camera thread detached; it releases the device after its current grab");
        }
    }
}
