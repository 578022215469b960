//! Frame sources for the binaries.
//!
//! The library itself never captures: a host app pushes frames through
//! `Pipeline::submit`. The sources here stand in for the camera when running
//! `edged` on a workstation:
//! - `SyntheticSource`: a moving bar pattern in any `PixelFormat`
//! - `ImageFileSource`: a local still image, resubmitted every tick
//!
//! Sources only read local inputs and never retain frames after handoff.

mod image_file;
mod synthetic;

pub use image_file::ImageFileSource;
pub use synthetic::{SyntheticConfig, SyntheticSource};

use anyhow::{anyhow, Result};

use crate::frame::{FrameTimestamp, RawFrame};

/// Something that produces raw frames on demand.
pub trait FrameSource: Send {
    /// Prepare the source (open files, log the format).
    fn connect(&mut self) -> Result<()>;

    /// Produce the next frame, stamped with `timestamp`.
    fn next_frame(&mut self, timestamp: FrameTimestamp) -> Result<RawFrame>;

    fn is_healthy(&self) -> bool;

    fn stats(&self) -> SourceStats;
}

/// Statistics for a frame source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub description: String,
}

/// Open the source named by `input`: `stub://...` (or nothing) for the
/// synthetic pattern, otherwise a local image path.
pub fn open_source(input: Option<&str>, synthetic: SyntheticConfig) -> Result<Box<dyn FrameSource>> {
    match input {
        None => Ok(Box::new(SyntheticSource::new(synthetic)?)),
        Some(path) if path.starts_with("stub://") => Ok(Box::new(SyntheticSource::new(synthetic)?)),
        Some(path) => {
            if !is_local_file_path(path) {
                return Err(anyhow!(
                    "image input only supports local paths (no URL schemes): {}",
                    path
                ));
            }
            Ok(Box::new(ImageFileSource::open(path)?))
        }
    }
}

fn is_local_file_path(path: &str) -> bool {
    !path.trim().is_empty() && !path.contains("://")
}
