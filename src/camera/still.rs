use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use image::RgbaImage;
use log::{info, warn};
use tokio::time::Instant;

use super::{Camera, FrameSource, StreamConstraints};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif", "webp"];

/// Camera that plays back image files as if they were a live feed, one file per
/// `frame_interval`, looping forever.
pub struct StillImageCamera {
    paths: Vec<PathBuf>,
    frame_interval: Duration,
}

impl StillImageCamera {
    /// `paths` may mix files and directories; directories contribute their image
    /// files in name order.
    pub fn new(paths: Vec<PathBuf>, frame_interval: Duration) -> Self {
        Self {
            paths,
            frame_interval,
        }
    }
}

#[async_trait]
impl Camera for StillImageCamera {
    async fn open_stream(&self, constraints: &StreamConstraints) -> Result<Box<dyn FrameSource>> {
        let paths = self.paths.clone();
        let frames = tokio::task::spawn_blocking(move || load_frames(&paths))
            .await
            .context("image loading worker join failed")??;

        if frames.is_empty() {
            bail!("no camera matched: no readable images in the configured paths");
        }

        info!(
            "Still-image camera opened with {} frame(s) (requested {}x{}, facing {:?})",
            frames.len(),
            constraints.width,
            constraints.height,
            constraints.facing_mode
        );

        Ok(Box::new(StillImageSource {
            frames,
            frame_interval: self.frame_interval,
            started_at: Instant::now(),
            live: true,
        }))
    }
}

fn load_frames(paths: &[PathBuf]) -> Result<Vec<RgbaImage>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            files.extend(image_files_in(path)?);
        } else {
            files.push(path.clone());
        }
    }

    let mut frames = Vec::with_capacity(files.len());
    for file in files {
        match image::open(&file) {
            Ok(img) => frames.push(img.to_rgba8()),
            Err(err) => warn!("Skipping unreadable image {}: {}", file.display(), err),
        }
    }
    Ok(frames)
}

fn image_files_in(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to list {}", dir.display()))?
    {
        let path = entry?.path();
        let is_image = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if path.is_file() && is_image {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

struct StillImageSource {
    frames: Vec<RgbaImage>,
    frame_interval: Duration,
    started_at: Instant,
    live: bool,
}

impl StillImageSource {
    fn current_index(&self) -> usize {
        let elapsed = self.started_at.elapsed().as_millis();
        let step = self.frame_interval.as_millis().max(1);
        ((elapsed / step) % self.frames.len() as u128) as usize
    }
}

impl FrameSource for StillImageSource {
    fn has_enough_data(&self) -> bool {
        self.live && !self.frames.is_empty()
    }

    fn dimensions(&self) -> (u32, u32) {
        self.frames
            .first()
            .map(|frame| frame.dimensions())
            .unwrap_or((0, 0))
    }

    fn current_frame(&mut self) -> Result<Option<RgbaImage>> {
        if !self.has_enough_data() {
            return Ok(None);
        }
        Ok(Some(self.frames[self.current_index()].clone()))
    }

    fn stop_tracks(&mut self) {
        if self.live {
            self.live = false;
            self.frames.clear();
            info!("Still-image camera tracks stopped");
        }
    }

    fn is_live(&self) -> bool {
        self.live
    }
}
