//! The processing lane.
//!
//! `FrameProcessor` runs convert -> detect -> publish for one frame using the
//! arena buffers. `Pipeline` owns the frame queue and one dedicated thread that
//! loops `take -> process` until the queue is closed.
//!
//! A failing frame is counted and dropped. Only `shutdown` ends the lane.

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::buffer::FrameArena;
use crate::config::PipelineConfig;
use crate::convert::to_intensity;
use crate::detect::{BackendRegistry, EdgeBackend};
use crate::diagnostics::{Diagnostics, DiagnosticsSnapshot};
use crate::frame::{FrameTimestamp, PixelFormat, RawFrame};
use crate::publish::{DisplaySink, ProcessingResult, ResultPublisher};
use crate::queue::{FrameQueue, SubmitOutcome};
use crate::FrameError;

/// Default number of leading format failures that flag a misconfigured capture.
pub const DEFAULT_MISCONFIG_THRESHOLD: u64 = 30;

/// What the published buffer carries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Binary edge map from the detector.
    #[default]
    Edges,
    /// The luma plane, unprocessed.
    Passthrough,
}

impl FromStr for OutputMode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "edges" | "edge" => Ok(OutputMode::Edges),
            "passthrough" | "original" | "raw" => Ok(OutputMode::Passthrough),
            other => Err(anyhow!("unknown output mode '{}'", other)),
        }
    }
}

/// Outcome of one processed frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameReport {
    pub sequence: u64,
    pub timestamp: FrameTimestamp,
    pub processing: Duration,
    /// Sinks that accepted the result.
    pub delivered: usize,
}

// ----------------------------------------------------------------------------
// Startup format check
// ----------------------------------------------------------------------------

/// Turns "every frame so far failed format validation" into one diagnostic.
#[derive(Debug)]
struct StartupCheck {
    threshold: u64,
    leading_format_errors: u64,
    seen_success: bool,
    reported: bool,
}

impl StartupCheck {
    fn new(threshold: u64) -> Self {
        Self {
            threshold,
            leading_format_errors: 0,
            seen_success: false,
            reported: false,
        }
    }

    /// Returns true exactly once, when the threshold is first reached.
    fn observe_format_error(&mut self) -> bool {
        if self.seen_success || self.reported {
            return false;
        }
        self.leading_format_errors += 1;
        if self.leading_format_errors >= self.threshold {
            self.reported = true;
            return true;
        }
        false
    }

    fn observe_success(&mut self) -> bool {
        let was_reported = self.reported;
        self.seen_success = true;
        self.reported = false;
        was_reported
    }
}

// ----------------------------------------------------------------------------
// FrameProcessor
// ----------------------------------------------------------------------------

/// Convert, detect and publish, one frame at a time.
pub struct FrameProcessor {
    backend: Box<dyn EdgeBackend>,
    arena: FrameArena,
    publisher: ResultPublisher,
    mode: OutputMode,
    diagnostics: Arc<Diagnostics>,
    startup: StartupCheck,
}

impl FrameProcessor {
    pub fn new(
        backend: Box<dyn EdgeBackend>,
        publisher: ResultPublisher,
        mode: OutputMode,
        diagnostics: Arc<Diagnostics>,
    ) -> Self {
        Self {
            backend,
            arena: FrameArena::new(),
            publisher,
            mode,
            diagnostics,
            startup: StartupCheck::new(DEFAULT_MISCONFIG_THRESHOLD),
        }
    }

    pub fn with_misconfig_threshold(mut self, threshold: u64) -> Self {
        self.startup = StartupCheck::new(threshold.max(1));
        self
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    pub fn arena(&self) -> &FrameArena {
        &self.arena
    }

    /// Run one frame through the pipeline. The frame is released on return.
    ///
    /// Errors are already counted in the diagnostics; callers only need to
    /// decide whether to log them.
    pub fn process(&mut self, frame: RawFrame) -> Result<FrameReport, FrameError> {
        let started = Instant::now();
        if let Err(e) = self.run_stages(&frame) {
            self.diagnostics.record_frame_error(&e);
            if matches!(e, FrameError::Format(_)) && self.startup.observe_format_error() {
                self.diagnostics.record_capture_misconfigured(true);
                log::error!(
                    "all of the first {} frames failed format validation; capture format {} ({}x{}, stride {}) looks misconfigured: {}",
                    self.startup.threshold,
                    frame.format,
                    frame.width,
                    frame.height,
                    frame.row_stride(),
                    e
                );
            }
            return Err(e);
        }
        let processing = started.elapsed();

        if self.startup.observe_success() {
            self.diagnostics.record_capture_misconfigured(false);
            log::info!("capture format recovered");
        }

        let result = ProcessingResult {
            edge_map: self.arena.edges.as_bytes(),
            width: frame.width,
            height: frame.height,
            timestamp: frame.timestamp,
            processing,
            sequence: frame.sequence(),
            mode: self.mode,
        };
        let delivered = self.publisher.publish(&result);
        self.diagnostics.record_processed(processing);

        Ok(FrameReport {
            sequence: frame.sequence(),
            timestamp: frame.timestamp,
            processing,
            delivered,
        })
    }

    fn run_stages(&mut self, frame: &RawFrame) -> Result<(), FrameError> {
        to_intensity(frame, &mut self.arena.intensity)?;
        self.arena.prepare(frame.width, frame.height);
        match self.mode {
            OutputMode::Edges => self.backend.detect(
                &self.arena.intensity,
                &mut self.arena.edges,
                &mut self.arena.scratch,
            ),
            OutputMode::Passthrough => {
                self.arena
                    .edges
                    .as_mut_slice()
                    .copy_from_slice(self.arena.intensity.as_slice());
                Ok(())
            }
        }
    }

    /// Free arena buffers.
    pub fn release(&mut self) {
        self.arena.release();
    }
}

// ----------------------------------------------------------------------------
// FrameSubmitter
// ----------------------------------------------------------------------------

/// Cloneable capture-lane handle. Every call returns immediately.
#[derive(Clone)]
pub struct FrameSubmitter {
    queue: Arc<FrameQueue>,
    epoch: Instant,
}

impl FrameSubmitter {
    /// Capture timestamp for a frame grabbed now.
    pub fn now(&self) -> FrameTimestamp {
        FrameTimestamp::since(self.epoch)
    }

    pub fn submit(
        &self,
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: PixelFormat,
        timestamp: FrameTimestamp,
    ) -> SubmitOutcome {
        self.submit_frame(RawFrame::new(data, width, height, format, timestamp))
    }

    pub fn submit_frame(&self, frame: RawFrame) -> SubmitOutcome {
        self.queue.submit(frame)
    }
}

// ----------------------------------------------------------------------------
// Pipeline
// ----------------------------------------------------------------------------

/// Frame queue plus the processing thread.
pub struct Pipeline {
    submitter: FrameSubmitter,
    diagnostics: Arc<Diagnostics>,
    worker: Option<JoinHandle<()>>,
}

impl Pipeline {
    /// Start the processing lane with an explicit backend and sinks.
    pub fn start(
        backend: Box<dyn EdgeBackend>,
        sinks: Vec<Box<dyn DisplaySink>>,
        mode: OutputMode,
        misconfig_threshold: u64,
    ) -> Result<Self> {
        let diagnostics = Arc::new(Diagnostics::new());
        let queue = Arc::new(FrameQueue::new(diagnostics.clone()));
        let publisher = ResultPublisher::with_sinks(diagnostics.clone(), sinks);
        let mut processor = FrameProcessor::new(backend, publisher, mode, diagnostics.clone())
            .with_misconfig_threshold(misconfig_threshold);

        log::info!(
            "processing lane starting: backend={} mode={:?} sinks={}",
            processor.backend_name(),
            mode,
            processor.publisher.sink_count()
        );

        let lane_queue = queue.clone();
        let worker = std::thread::Builder::new()
            .name("edge-processing".into())
            .spawn(move || {
                while let Ok(frame) = lane_queue.take() {
                    if let Err(e) = processor.process(frame) {
                        log::debug!("frame dropped: {}", e);
                    }
                }
                processor.release();
                log::info!("processing lane stopped");
            })
            .context("failed to spawn processing lane")?;

        Ok(Self {
            submitter: FrameSubmitter {
                queue,
                epoch: Instant::now(),
            },
            diagnostics,
            worker: Some(worker),
        })
    }

    /// Start from configuration, selecting the configured backend.
    pub fn from_config(config: &PipelineConfig, sinks: Vec<Box<dyn DisplaySink>>) -> Result<Self> {
        let mut registry = BackendRegistry::with_builtin(config.detector);
        let backend = registry.take(&config.backend)?;
        Self::start(backend, sinks, config.mode, config.misconfig_threshold)
    }

    /// Handle for the capture lane.
    pub fn submitter(&self) -> FrameSubmitter {
        self.submitter.clone()
    }

    pub fn now(&self) -> FrameTimestamp {
        self.submitter.now()
    }

    /// Hand a captured frame to the processing lane. Never blocks.
    pub fn submit(
        &self,
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: PixelFormat,
        timestamp: FrameTimestamp,
    ) -> SubmitOutcome {
        self.submitter.submit(data, width, height, format, timestamp)
    }

    pub fn submit_frame(&self, frame: RawFrame) -> SubmitOutcome {
        self.submitter.submit_frame(frame)
    }

    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    /// Stop accepting frames, cancel the blocked `take`, wait for the in-flight
    /// frame to finish and release all buffers.
    pub fn shutdown(mut self) -> Result<DiagnosticsSnapshot> {
        self.teardown()?;
        Ok(self.diagnostics.snapshot())
    }

    fn teardown(&mut self) -> Result<()> {
        self.submitter.queue.close();
        if let Some(worker) = self.worker.take() {
            worker
                .join()
                .map_err(|_| anyhow!("processing lane panicked"))?;
        }
        Ok(())
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            log::error!("pipeline teardown failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{DetectorParams, SobelBackend};
    use crate::publish::{ChannelSink, Delivery};

    fn processor(mode: OutputMode) -> (FrameProcessor, std::sync::mpsc::Receiver<crate::OwnedResult>, Arc<Diagnostics>) {
        let diagnostics = Arc::new(Diagnostics::new());
        let (sink, rx) = ChannelSink::bounded(8);
        let publisher = ResultPublisher::with_sinks(diagnostics.clone(), vec![Box::new(sink)]);
        let processor = FrameProcessor::new(
            Box::new(SobelBackend::new(DetectorParams::default())),
            publisher,
            mode,
            diagnostics.clone(),
        );
        (processor, rx, diagnostics)
    }

    fn gray(data: Vec<u8>, width: u32, height: u32, ts_ms: u64) -> RawFrame {
        RawFrame::new(data, width, height, PixelFormat::Gray8, FrameTimestamp::from_millis(ts_ms))
    }

    #[test]
    fn processes_four_by_four_scenario() -> Result<()> {
        let (mut processor, rx, diagnostics) = processor(OutputMode::Edges);
        let report = processor.process(gray([0u8, 0, 255, 255].repeat(4), 4, 4, 10))?;
        assert_eq!(report.delivered, 1);

        let result = rx.try_recv()?;
        assert_eq!((result.width, result.height), (4, 4));
        assert_eq!(result.edge_map, [0u8, 255, 255, 0].repeat(4));
        assert_eq!(result.timestamp, FrameTimestamp::from_millis(10));
        assert_eq!(diagnostics.snapshot().frames_processed, 1);
        Ok(())
    }

    #[test]
    fn passthrough_publishes_luma() -> Result<()> {
        let (mut processor, rx, _) = processor(OutputMode::Passthrough);
        let rgb = vec![255, 0, 0, 0, 0, 255];
        let frame = RawFrame::new(rgb, 2, 1, PixelFormat::Rgb24, FrameTimestamp::ZERO);
        processor.process(frame)?;
        assert_eq!(rx.try_recv()?.edge_map, vec![77, 29]);
        Ok(())
    }

    #[test]
    fn same_frame_bytes_give_identical_maps() -> Result<()> {
        let (mut processor, rx, _) = processor(OutputMode::Edges);
        let data: Vec<u8> = (0..48u32 * 32).map(|i| ((i * 7919) % 251) as u8).collect();
        processor.process(gray(data.clone(), 48, 32, 1))?;
        processor.process(gray(data, 48, 32, 2))?;
        assert_eq!(rx.try_recv()?.edge_map, rx.try_recv()?.edge_map);
        assert_eq!(processor.arena().reallocations(), 1);
        Ok(())
    }

    #[test]
    fn frame_errors_are_counted_and_lane_continues() -> Result<()> {
        let (mut processor, rx, diagnostics) = processor(OutputMode::Edges);
        let bad = RawFrame::new(vec![0u8; 7], 4, 2, PixelFormat::Nv12, FrameTimestamp::ZERO);
        assert!(matches!(processor.process(bad), Err(FrameError::Format(_))));
        let empty = gray(vec![], 0, 0, 1);
        assert!(matches!(processor.process(empty), Err(FrameError::Dimension(_))));
        processor.process(gray(vec![5u8; 16], 4, 4, 2))?;

        assert_eq!(rx.try_recv()?.edge_map, vec![0u8; 16]);
        let snap = diagnostics.snapshot();
        assert_eq!(snap.format_errors, 1);
        assert_eq!(snap.dimension_errors, 1);
        assert_eq!(snap.frames_processed, 1);
        Ok(())
    }

    #[test]
    fn leading_format_errors_flag_misconfiguration_once() {
        let diagnostics = Arc::new(Diagnostics::new());
        let publisher = ResultPublisher::new(diagnostics.clone());
        let mut processor = FrameProcessor::new(
            Box::new(SobelBackend::default()),
            publisher,
            OutputMode::Edges,
            diagnostics.clone(),
        )
        .with_misconfig_threshold(3);

        for i in 0..2 {
            let bad = RawFrame::new(vec![0u8; 10], 4, 4, PixelFormat::Rgb24, FrameTimestamp::from_millis(i));
            let _ = processor.process(bad);
        }
        assert!(!diagnostics.snapshot().capture_misconfigured);

        let bad = RawFrame::new(vec![0u8; 10], 4, 4, PixelFormat::Rgb24, FrameTimestamp::from_millis(2));
        let _ = processor.process(bad);
        assert!(diagnostics.snapshot().capture_misconfigured);

        let good = RawFrame::new(vec![0u8; 48], 4, 4, PixelFormat::Rgb24, FrameTimestamp::from_millis(3));
        assert!(processor.process(good).is_ok());
        assert!(!diagnostics.snapshot().capture_misconfigured);
    }

    #[test]
    fn startup_check_ignores_errors_after_first_success() {
        let mut check = StartupCheck::new(2);
        assert!(!check.observe_success());
        assert!(!check.observe_format_error());
        assert!(!check.observe_format_error());
        assert!(!check.observe_format_error());
    }

    #[test]
    fn output_mode_parses() -> Result<()> {
        assert_eq!("Edges".parse::<OutputMode>()?, OutputMode::Edges);
        assert_eq!("original".parse::<OutputMode>()?, OutputMode::Passthrough);
        assert!("sketch".parse::<OutputMode>().is_err());
        Ok(())
    }

    #[test]
    fn pipeline_shutdown_without_frames() -> Result<()> {
        let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let seen = counter.clone();
        let sink = move |_r: &ProcessingResult<'_>| {
            seen.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            Delivery::Delivered
        };
        let pipeline = Pipeline::start(
            Box::new(SobelBackend::default()),
            vec![Box::new(sink)],
            OutputMode::Edges,
            DEFAULT_MISCONFIG_THRESHOLD,
        )?;
        let snap = pipeline.shutdown()?;
        assert_eq!(snap.frames_processed, 0);
        assert_eq!(counter.load(std::sync::atomic::Ordering::Relaxed), 0);
        Ok(())
    }
}
