//! Read-only pipeline counters.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use crate::FrameError;

/// Counters shared between the capture lane, the processing lane and observers.
#[derive(Debug, Default)]
pub struct Diagnostics {
    frames_submitted: AtomicU64,
    frames_processed: AtomicU64,
    frames_superseded: AtomicU64,
    frames_rejected: AtomicU64,
    format_errors: AtomicU64,
    dimension_errors: AtomicU64,
    results_dropped: AtomicU64,
    latency_total_us: AtomicU64,
    capture_misconfigured: AtomicBool,
}

/// Point-in-time copy of the counters.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DiagnosticsSnapshot {
    pub frames_submitted: u64,
    pub frames_processed: u64,
    /// Replaced in the queue before processing.
    pub frames_superseded: u64,
    /// Submitted after shutdown began.
    pub frames_rejected: u64,
    pub format_errors: u64,
    pub dimension_errors: u64,
    /// Results a display sink could not take.
    pub results_dropped: u64,
    pub average_latency_ms: f64,
    /// Superseded plus frames that failed conversion.
    pub frames_lost: u64,
    /// Every frame since startup failed format validation.
    pub capture_misconfigured: bool,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        let processed = self.frames_processed.load(Ordering::Relaxed);
        let latency_total_us = self.latency_total_us.load(Ordering::Relaxed);
        let average_latency_ms = if processed == 0 {
            0.0
        } else {
            latency_total_us as f64 / processed as f64 / 1000.0
        };
        let frames_superseded = self.frames_superseded.load(Ordering::Relaxed);
        let format_errors = self.format_errors.load(Ordering::Relaxed);
        let dimension_errors = self.dimension_errors.load(Ordering::Relaxed);
        DiagnosticsSnapshot {
            frames_submitted: self.frames_submitted.load(Ordering::Relaxed),
            frames_processed: processed,
            frames_superseded,
            frames_rejected: self.frames_rejected.load(Ordering::Relaxed),
            format_errors,
            dimension_errors,
            results_dropped: self.results_dropped.load(Ordering::Relaxed),
            average_latency_ms,
            frames_lost: frames_superseded + format_errors + dimension_errors,
            capture_misconfigured: self.capture_misconfigured.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn record_submitted(&self) {
        self.frames_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_superseded(&self) {
        self.frames_superseded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.frames_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_processed(&self, latency: Duration) {
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.latency_total_us.fetch_add(micros, Ordering::Relaxed);
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_frame_error(&self, err: &FrameError) {
        match err {
            FrameError::Format(_) => self.format_errors.fetch_add(1, Ordering::Relaxed),
            FrameError::Dimension(_) => self.dimension_errors.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub(crate) fn record_result_dropped(&self) {
        self.results_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_capture_misconfigured(&self, misconfigured: bool) {
        self.capture_misconfigured.store(misconfigured, Ordering::Relaxed);
    }
}
