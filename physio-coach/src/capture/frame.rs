//! Camera frames and frame sources
//!
//! A [`CaptureFrame`] lives for one scheduler tick: it is captured,
//! compressed to JPEG and handed to the pose service, then dropped.

use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

/// Raw frame as acquired from the camera
#[derive(Debug, Clone)]
pub struct CaptureFrame {
    pub image: RgbImage,
    pub captured_at: DateTime<Utc>,
}

/// JPEG-compressed frame ready for upload
#[derive(Debug, Clone)]
pub struct CompressedFrame {
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub captured_at: DateTime<Utc>,
}

impl CaptureFrame {
    pub fn new(image: RgbImage) -> Self {
        Self {
            image,
            captured_at: Utc::now(),
        }
    }

    /// Encode as JPEG at `quality` (1-100)
    pub fn compress(self, quality: u8) -> Result<CompressedFrame> {
        let (width, height) = self.image.dimensions();
        let mut jpeg = Vec::new();

        JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100))
            .encode_image(&self.image)
            .map_err(|e| Error::Capture(format!("JPEG encoding failed: {}", e)))?;

        Ok(CompressedFrame {
            jpeg,
            width,
            height,
            captured_at: self.captured_at,
        })
    }
}

/// Something that produces camera frames on demand
#[async_trait]
pub trait FrameSource: Send + Sync {
    async fn capture(&self) -> Result<CaptureFrame>;
}

/// Replays the images of a directory in name order, looping
///
/// Stands in for a camera: useful for demos against a live backend and for
/// replaying recorded sessions.
pub struct DirectoryFrameSource {
    files: Vec<PathBuf>,
    next: AtomicUsize,
}

impl DirectoryFrameSource {
    /// Index the JPEG/PNG files in `dir`
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut files = Vec::new();

        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && is_image_file(&path) {
                files.push(path);
            }
        }

        if files.is_empty() {
            return Err(Error::Capture(format!(
                "No JPEG or PNG frames in {}",
                dir.display()
            )));
        }
        files.sort();

        info!(dir = %dir.display(), frames = files.len(), "Frame directory indexed");
        Ok(Self {
            files,
            next: AtomicUsize::new(0),
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[async_trait]
impl FrameSource for DirectoryFrameSource {
    async fn capture(&self) -> Result<CaptureFrame> {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.files.len();
        let path = self.files[index].clone();
        debug!(frame = %path.display(), "Reading frame");

        let image = tokio::task::spawn_blocking(move || {
            image::open(&path)
                .map(|img| img.to_rgb8())
                .map_err(|e| Error::Capture(format!("Failed to read {}: {}", path.display(), e)))
        })
        .await
        .map_err(|e| Error::Internal(format!("Frame read task failed: {}", e)))??;

        Ok(CaptureFrame::new(image))
    }
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            matches!(
                ext.to_ascii_lowercase().as_str(),
                "jpg" | "jpeg" | "png"
            )
        })
        .unwrap_or(false)
}
