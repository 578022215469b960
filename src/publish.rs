//! Result delivery to display collaborators.
//!
//! Delivery is fire-and-forget. A sink that is slow or gone reports
//! `Delivery::Dropped` (or an error) and the result is simply lost for that
//! sink. The processing lane never waits and never retries. Drops are only
//! visible through `Diagnostics::results_dropped`.

use anyhow::Result;
use serde::Serialize;
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::time::Duration;

use crate::diagnostics::Diagnostics;
use crate::frame::FrameTimestamp;
use crate::pipeline::OutputMode;

/// One processed frame, borrowed from the processing lane's arena.
///
/// `edge_map` is only valid for the duration of `DisplaySink::on_result`;
/// the buffer is reused for the next frame right after.
#[derive(Clone, Copy, Debug)]
pub struct ProcessingResult<'a> {
    pub edge_map: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub timestamp: FrameTimestamp,
    /// Convert + detect time.
    pub processing: Duration,
    pub sequence: u64,
    pub mode: OutputMode,
}

impl ProcessingResult<'_> {
    pub fn processing_ms(&self) -> f64 {
        self.processing.as_secs_f64() * 1000.0
    }

    /// Copy out of the arena, for sinks that hand results to another thread.
    pub fn to_owned_result(&self) -> OwnedResult {
        OwnedResult {
            edge_map: self.edge_map.to_vec(),
            width: self.width,
            height: self.height,
            timestamp: self.timestamp,
            processing: self.processing,
            sequence: self.sequence,
            mode: self.mode,
        }
    }
}

/// Owned copy of a `ProcessingResult`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OwnedResult {
    #[serde(skip)]
    pub edge_map: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: FrameTimestamp,
    pub processing: Duration,
    pub sequence: u64,
    pub mode: OutputMode,
}

impl OwnedResult {
    pub fn as_result(&self) -> ProcessingResult<'_> {
        ProcessingResult {
            edge_map: &self.edge_map,
            width: self.width,
            height: self.height,
            timestamp: self.timestamp,
            processing: self.processing,
            sequence: self.sequence,
            mode: self.mode,
        }
    }
}

/// Whether a sink accepted a result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    Dropped,
}

/// Display collaborator boundary (app surface, web viewer bridge, test probe).
///
/// Called synchronously on the processing lane. Implementations must copy or
/// fully consume the result before returning and must not block.
pub trait DisplaySink: Send {
    fn name(&self) -> &str {
        "sink"
    }

    fn on_result(&mut self, result: &ProcessingResult<'_>) -> Result<Delivery>;
}

impl<F> DisplaySink for F
where
    F: FnMut(&ProcessingResult<'_>) -> Delivery + Send,
{
    fn on_result(&mut self, result: &ProcessingResult<'_>) -> Result<Delivery> {
        Ok(self(result))
    }
}

/// Fans a result out to every sink.
pub struct ResultPublisher {
    sinks: Vec<Box<dyn DisplaySink>>,
    last_timestamp: Option<FrameTimestamp>,
    diagnostics: Arc<Diagnostics>,
}

impl ResultPublisher {
    pub fn new(diagnostics: Arc<Diagnostics>) -> Self {
        Self {
            sinks: Vec::new(),
            last_timestamp: None,
            diagnostics,
        }
    }

    pub fn with_sinks(diagnostics: Arc<Diagnostics>, sinks: Vec<Box<dyn DisplaySink>>) -> Self {
        let mut publisher = Self::new(diagnostics);
        publisher.sinks = sinks;
        publisher
    }

    pub fn add_sink(&mut self, sink: Box<dyn DisplaySink>) {
        self.sinks.push(sink);
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// Deliver `result` to every sink. Returns how many sinks accepted it.
    ///
    /// A result older than the last published one is dropped whole, so
    /// observers always see non-decreasing timestamps.
    pub fn publish(&mut self, result: &ProcessingResult<'_>) -> usize {
        if self.last_timestamp.is_some_and(|last| result.timestamp < last) {
            log::debug!(
                "dropping out-of-order result seq={} ts={}us",
                result.sequence,
                result.timestamp.as_micros()
            );
            self.diagnostics.record_result_dropped();
            return 0;
        }
        self.last_timestamp = Some(result.timestamp);

        let mut delivered = 0;
        for sink in &mut self.sinks {
            match sink.on_result(result) {
                Ok(Delivery::Delivered) => delivered += 1,
                Ok(Delivery::Dropped) => self.diagnostics.record_result_dropped(),
                Err(e) => {
                    log::debug!("sink {} failed for seq={}: {}", sink.name(), result.sequence, e);
                    self.diagnostics.record_result_dropped();
                }
            }
        }
        delivered
    }

    pub fn last_timestamp(&self) -> Option<FrameTimestamp> {
        self.last_timestamp
    }
}

// ----------------------------------------------------------------------------
// ChannelSink
// ----------------------------------------------------------------------------

/// Hands owned copies to a consumer thread through a bounded channel.
///
/// A full channel or a disconnected receiver drops the result.
pub struct ChannelSink {
    tx: SyncSender<OwnedResult>,
}

impl ChannelSink {
    pub fn bounded(capacity: usize) -> (Self, Receiver<OwnedResult>) {
        let (tx, rx) = mpsc::sync_channel(capacity);
        (Self { tx }, rx)
    }
}

impl DisplaySink for ChannelSink {
    fn name(&self) -> &str {
        "channel"
    }

    fn on_result(&mut self, result: &ProcessingResult<'_>) -> Result<Delivery> {
        match self.tx.try_send(result.to_owned_result()) {
            Ok(()) => Ok(Delivery::Delivered),
            Err(TrySendError::Full(_)) => Ok(Delivery::Dropped),
            Err(TrySendError::Disconnected(_)) => {
                log::debug!("channel sink receiver gone");
                Ok(Delivery::Dropped)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    fn result(bytes: &[u8], ts_ms: u64, sequence: u64) -> ProcessingResult<'_> {
        ProcessingResult {
            edge_map: bytes,
            width: bytes.len() as u32,
            height: 1,
            timestamp: FrameTimestamp::from_millis(ts_ms),
            processing: Duration::from_micros(250),
            sequence,
            mode: OutputMode::Edges,
        }
    }

    struct FailingSink;

    impl DisplaySink for FailingSink {
        fn on_result(&mut self, _result: &ProcessingResult<'_>) -> Result<Delivery> {
            Err(anyhow!("surface detached"))
        }
    }

    #[test]
    fn full_channel_drops_without_blocking() {
        let diagnostics = Arc::new(Diagnostics::new());
        let (sink, rx) = ChannelSink::bounded(1);
        let mut publisher = ResultPublisher::with_sinks(diagnostics.clone(), vec![Box::new(sink)]);

        assert_eq!(publisher.publish(&result(&[1, 2], 1, 1)), 1);
        assert_eq!(publisher.publish(&result(&[3, 4], 2, 2)), 0);

        let received = rx.try_recv().expect("first result");
        assert_eq!(received.edge_map, vec![1, 2]);
        assert_eq!(received.sequence, 1);
        assert!(rx.try_recv().is_err());
        assert_eq!(diagnostics.snapshot().results_dropped, 1);
    }

    #[test]
    fn failing_sink_counts_as_drop_and_others_still_receive() {
        let diagnostics = Arc::new(Diagnostics::new());
        let mut seen = Vec::new();
        let (sink, rx) = ChannelSink::bounded(4);
        let mut publisher = ResultPublisher::new(diagnostics.clone());
        publisher.add_sink(Box::new(FailingSink));
        publisher.add_sink(Box::new(sink));

        for ts in 1..=3 {
            publisher.publish(&result(&[0], ts, ts));
        }
        while let Ok(r) = rx.try_recv() {
            seen.push(r.sequence);
        }
        assert_eq!(seen, vec![1, 2, 3]);
        assert_eq!(diagnostics.snapshot().results_dropped, 3);
    }

    #[test]
    fn out_of_order_result_is_dropped() {
        let diagnostics = Arc::new(Diagnostics::new());
        let mut count = 0;
        let mut publisher = ResultPublisher::new(diagnostics.clone());
        publisher.add_sink(Box::new(move |_r: &ProcessingResult<'_>| {
            count += 1;
            assert!(count <= 2);
            Delivery::Delivered
        }));

        assert_eq!(publisher.publish(&result(&[0], 5, 1)), 1);
        assert_eq!(publisher.publish(&result(&[0], 5, 2)), 1);
        assert_eq!(publisher.publish(&result(&[0], 4, 3)), 0);
        assert_eq!(publisher.last_timestamp(), Some(FrameTimestamp::from_millis(5)));
        assert_eq!(diagnostics.snapshot().results_dropped, 1);
    }

    #[test]
    fn disconnected_receiver_is_a_silent_drop() {
        let diagnostics = Arc::new(Diagnostics::new());
        let (sink, rx) = ChannelSink::bounded(1);
        drop(rx);
        let mut publisher = ResultPublisher::with_sinks(diagnostics.clone(), vec![Box::new(sink)]);
        assert_eq!(publisher.publish(&result(&[9], 1, 1)), 0);
        assert_eq!(diagnostics.snapshot().results_dropped, 1);
    }

    #[test]
    fn owned_result_round_trips_to_borrowed_view() {
        let bytes = [0u8, 255, 255, 0];
        let owned = result(&bytes, 7, 3).to_owned_result();
        let view = owned.as_result();
        assert_eq!(view.edge_map, &bytes);
        assert_eq!(view.timestamp.as_millis(), 7);
        assert!((view.processing_ms() - 0.25).abs() < 1e-9);
    }
}
