use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use std::path::{Path, PathBuf};

use super::{FrameSource, SourceStats};
use crate::frame::{FrameTimestamp, PixelFormat, RawFrame};

/// A still image decoded once and handed out as a fresh `Rgb24` frame per call.
pub struct ImageFileSource {
    path: Option<PathBuf>,
    image: RgbImage,
    frame_count: u64,
}

impl ImageFileSource {
    /// Decode a local PNG or JPEG file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let image = image::open(path)
            .with_context(|| format!("failed to decode image {}", path.display()))?
            .into_rgb8();
        Self::build(Some(path.to_path_buf()), image)
    }

    /// Wrap an already decoded image.
    pub fn from_image(image: RgbImage) -> Result<Self> {
        Self::build(None, image)
    }

    fn build(path: Option<PathBuf>, image: RgbImage) -> Result<Self> {
        if image.width() == 0 || image.height() == 0 {
            return Err(anyhow!("image has zero dimensions"));
        }
        Ok(Self {
            path,
            image,
            frame_count: 0,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    fn describe(&self) -> String {
        match &self.path {
            Some(path) => format!("image {}", path.display()),
            None => "image (in memory)".to_string(),
        }
    }
}

impl FrameSource for ImageFileSource {
    fn connect(&mut self) -> Result<()> {
        let (width, height) = self.dimensions();
        log::info!("ImageFileSource: {} ({}x{} rgb24)", self.describe(), width, height);
        Ok(())
    }

    fn next_frame(&mut self, timestamp: FrameTimestamp) -> Result<RawFrame> {
        self.frame_count += 1;
        let (width, height) = self.dimensions();
        Ok(RawFrame::new(
            self.image.as_raw().clone(),
            width,
            height,
            PixelFormat::Rgb24,
            timestamp,
        ))
    }

    fn is_healthy(&self) -> bool {
        true
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            description: self.describe(),
        }
    }
}
