//! Edge Pipeline
//!
//! This crate implements the native frame-processing core of a live camera
//! edge-detection app.
//!
//! # Architecture
//!
//! Frames flow through five stages:
//!
//! 1. **Frame Source** (external): a capture callback calls `Pipeline::submit`.
//! 2. **Frame Queue**: a latest-wins single slot. A new frame replaces any
//!    pending, unclaimed frame. Capture never blocks on processing.
//! 3. **Format Converter**: extracts an 8-bit luma plane from planar or packed input.
//! 4. **Edge Detector**: gradient magnitude + threshold (or Canny hysteresis).
//! 5. **Result Publisher**: fire-and-forget delivery to display sinks.
//!
//! Stages 3-5 run on one dedicated processing lane, one frame at a time.
//! Published results therefore keep capture order.
//!
//! # Module Structure
//!
//! - `frame`: RawFrame, PixelFormat, FrameTimestamp
//! - `buffer`: IntensityBuffer, EdgeMap, FrameArena
//! - `queue`: FrameQueue
//! - `convert`: luma extraction
//! - `detect`: edge backends and registry
//! - `publish`, `viewer`: result delivery and the web viewer contract
//! - `pipeline`: the processing lane
//! - `ingest`, `config`: sources and settings used by the binaries

pub mod buffer;
pub mod config;
pub mod convert;
pub mod detect;
pub mod diagnostics;
pub mod frame;
pub mod ingest;
pub mod pipeline;
pub mod publish;
pub mod queue;
pub mod viewer;

pub use buffer::{EdgeMap, FrameArena, IntensityBuffer};
pub use config::PipelineConfig;
pub use convert::to_intensity;
pub use detect::{
    BackendRegistry, CannyBackend, DetectorParams, EdgeBackend, GradientKernel, Magnitude,
    SobelBackend,
};
pub use diagnostics::{Diagnostics, DiagnosticsSnapshot};
pub use frame::{FrameTimestamp, PixelFormat, RawFrame};
pub use ingest::{FrameSource, ImageFileSource, SyntheticConfig, SyntheticSource};
pub use pipeline::{FrameProcessor, FrameReport, FrameSubmitter, OutputMode, Pipeline};
pub use publish::{
    ChannelSink, Delivery, DisplaySink, OwnedResult, ProcessingResult, ResultPublisher,
};
pub use queue::{FrameQueue, SubmitOutcome};
pub use viewer::{ViewerFrame, ViewerSink};

// -------------------- Errors --------------------

/// Per-frame failure. The offending frame is dropped and the lane continues.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameError {
    /// Unrecognized pixel format, or buffer length inconsistent with the declared format.
    Format(String),
    /// Zero or mismatched dimensions.
    Dimension(String),
}

impl FrameError {
    /// Stable code for logs and counters.
    pub fn code(&self) -> &'static str {
        match self {
            FrameError::Format(_) => "FORMAT_ERROR",
            FrameError::Dimension(_) => "DIMENSION_ERROR",
        }
    }

    pub(crate) fn format(message: impl Into<String>) -> Self {
        FrameError::Format(message.into())
    }

    pub(crate) fn dimension(message: impl Into<String>) -> Self {
        FrameError::Dimension(message.into())
    }
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameError::Format(message) | FrameError::Dimension(message) => {
                write!(f, "{}: {}", self.code(), message)
            }
        }
    }
}
impl std::error::Error for FrameError {}

/// Returned by a blocked `FrameQueue::take` when the queue is closed.
///
/// This is the orderly shutdown path, not a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cancelled;

impl std::fmt::Display for Cancelled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "frame queue closed")
    }
}
impl std::error::Error for Cancelled {}
