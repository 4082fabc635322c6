use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use image::RgbaImage;
use tokio::sync::{mpsc, watch};
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::camera::FrameSource;

use super::decoder::Decoder;
use super::overlay::Overlay;
use super::Detection;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

pub(crate) type SharedSource = Arc<Mutex<Box<dyn FrameSource>>>;

/// Everything a tick touches. The loop task owns it; the scanner handle keeps
/// clones of the shared pieces.
pub(crate) struct TickContext {
    pub source: SharedSource,
    pub decoder: Arc<dyn Decoder>,
    pub overlay: Overlay,
    pub enabled: watch::Receiver<bool>,
    pub suspended: Arc<AtomicBool>,
    pub detections: mpsc::UnboundedSender<Detection>,
    pub surface: watch::Sender<Option<Arc<RgbaImage>>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TickOutcome {
    Cancelled,
    /// Suspended after a detection; the surface keeps the annotated frame.
    Frozen,
    Waiting,
    Rendered,
    Detected(String),
}

pub(crate) async fn tick_loop(
    mut ctx: TickContext,
    frame_interval: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(frame_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match tick(&mut ctx, &cancel_token).await {
                    Ok(TickOutcome::Detected(payload)) => {
                        log_info!("QR code detected ({} bytes), scanner suspended", payload.len());
                    }
                    Ok(TickOutcome::Cancelled) => break,
                    Ok(_) => {}
                    Err(err) => log_warn!("scanner tick failed: {err:?}"),
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("scanner tick loop shutting down");
                break;
            }
        }
    }
}

pub(crate) async fn tick(ctx: &mut TickContext, cancel_token: &CancellationToken) -> Result<TickOutcome> {
    // A tick already queued when teardown ran must not touch the released source.
    if cancel_token.is_cancelled() {
        return Ok(TickOutcome::Cancelled);
    }
    if ctx.suspended.load(Ordering::Acquire) {
        return Ok(TickOutcome::Frozen);
    }

    let frame = {
        let mut source = ctx
            .source
            .lock()
            .map_err(|_| anyhow!("frame source lock poisoned"))?;
        if !source.has_enough_data() {
            return Ok(TickOutcome::Waiting);
        }
        source.current_frame()?
    };
    let Some(frame) = frame else {
        return Ok(TickOutcome::Waiting);
    };

    let detection_enabled = *ctx.enabled.borrow();
    if !detection_enabled {
        ctx.surface.send_replace(Some(Arc::new(frame)));
        return Ok(TickOutcome::Rendered);
    }

    let decoder = Arc::clone(&ctx.decoder);
    let overlay = ctx.overlay;
    let (frame, symbol) = tokio::task::spawn_blocking(move || {
        let mut frame = frame;
        let symbol = decoder.decode(&frame);
        if let Some(symbol) = &symbol {
            overlay.draw_quad(&mut frame, &symbol.corners);
        }
        (frame, symbol)
    })
    .await
    .context("decoder worker join failed")?;

    if cancel_token.is_cancelled() {
        log_debug!("dropping decode result that finished after teardown");
        return Ok(TickOutcome::Cancelled);
    }

    let frame = Arc::new(frame);
    ctx.surface.send_replace(Some(Arc::clone(&frame)));

    let Some(symbol) = symbol else {
        return Ok(TickOutcome::Rendered);
    };

    ctx.suspended.store(true, Ordering::Release);
    ctx.detections
        .send(Detection {
            payload: symbol.payload.clone(),
            corners: symbol.corners,
            detected_at: Utc::now(),
            frame,
        })
        .map_err(|_| anyhow!("detection receiver dropped"))?;

    Ok(TickOutcome::Detected(symbol.payload))
}
