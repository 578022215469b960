//! Latest-wins frame hand-off between the capture lane and the processing lane.
//!
//! The queue holds at most one pending frame. `submit` replaces an unclaimed
//! frame instead of growing, because edge detection on a stale frame only burns
//! the latency budget. `take` blocks until a frame arrives or the queue closes.
//!
//! Replace and claim are each one critical section under the slot mutex, so a
//! taker sees either a whole frame or nothing, and never the same frame twice.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::diagnostics::Diagnostics;
use crate::frame::RawFrame;
use crate::Cancelled;

/// What happened to a submitted frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The slot was empty; the frame is pending.
    Queued,
    /// An unclaimed frame was evicted and released in favour of this one.
    Replaced,
    /// The queue is closed; the frame was released.
    Closed,
}

#[derive(Default)]
struct Slot {
    pending: Option<RawFrame>,
    closed: bool,
    next_sequence: u64,
}

/// Single-slot frame queue.
pub struct FrameQueue {
    slot: Mutex<Slot>,
    ready: Condvar,
    diagnostics: Arc<Diagnostics>,
}

impl FrameQueue {
    pub fn new(diagnostics: Arc<Diagnostics>) -> Self {
        Self {
            slot: Mutex::new(Slot::default()),
            ready: Condvar::new(),
            diagnostics,
        }
    }

    /// Hand a frame to the processing lane. Never waits on processing.
    pub fn submit(&self, mut frame: RawFrame) -> SubmitOutcome {
        let (outcome, evicted) = {
            let mut slot = self.lock();
            if slot.closed {
                (SubmitOutcome::Closed, Some(frame))
            } else {
                slot.next_sequence += 1;
                frame.set_sequence(slot.next_sequence);
                match slot.pending.replace(frame) {
                    Some(old) => (SubmitOutcome::Replaced, Some(old)),
                    None => (SubmitOutcome::Queued, None),
                }
            }
        };

        match outcome {
            SubmitOutcome::Closed => self.diagnostics.record_rejected(),
            SubmitOutcome::Replaced => {
                self.diagnostics.record_submitted();
                self.diagnostics.record_superseded();
            }
            SubmitOutcome::Queued => self.diagnostics.record_submitted(),
        }
        if outcome != SubmitOutcome::Closed {
            self.ready.notify_one();
        }

        // Release outside the lock.
        if let Some(frame) = evicted {
            log::trace!("released frame seq={} ({:?})", frame.sequence(), outcome);
        }
        outcome
    }

    /// Claim the pending frame, blocking until one is available.
    ///
    /// Returns `Err(Cancelled)` once the queue is closed.
    pub fn take(&self) -> Result<RawFrame, Cancelled> {
        let mut slot = self.lock();
        loop {
            if slot.closed {
                return Err(Cancelled);
            }
            if let Some(frame) = slot.pending.take() {
                return Ok(frame);
            }
            slot = self
                .ready
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like `take`, but gives up after `timeout` with `Ok(None)`.
    pub fn take_timeout(&self, timeout: Duration) -> Result<Option<RawFrame>, Cancelled> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self.take().map(Some);
        };
        let mut slot = self.lock();
        loop {
            if slot.closed {
                return Err(Cancelled);
            }
            if let Some(frame) = slot.pending.take() {
                return Ok(Some(frame));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let (guard, _) = self
                .ready
                .wait_timeout(slot, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            slot = guard;
        }
    }

    /// Claim the pending frame without waiting.
    pub fn try_take(&self) -> Result<Option<RawFrame>, Cancelled> {
        let mut slot = self.lock();
        if slot.closed {
            return Err(Cancelled);
        }
        Ok(slot.pending.take())
    }

    /// Stop accepting frames, release any pending frame and wake every taker.
    pub fn close(&self) {
        let pending = {
            let mut slot = self.lock();
            slot.closed = true;
            slot.pending.take()
        };
        self.ready.notify_all();
        if let Some(frame) = pending {
            self.diagnostics.record_superseded();
            log::debug!("released pending frame seq={} on close", frame.sequence());
        }
    }

    pub fn has_pending(&self) -> bool {
        self.lock().pending.is_some()
    }

    // The slot stays consistent across a panic in another lane: every update is
    // a single `Option` swap or bool store.
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FrameTimestamp, PixelFormat};
    use std::thread;

    fn frame(ts_ms: u64) -> RawFrame {
        RawFrame::new(
            vec![ts_ms as u8; 4],
            2,
            2,
            PixelFormat::Gray8,
            FrameTimestamp::from_millis(ts_ms),
        )
    }

    fn queue() -> (FrameQueue, Arc<Diagnostics>) {
        let diagnostics = Arc::new(Diagnostics::new());
        (FrameQueue::new(diagnostics.clone()), diagnostics)
    }

    #[test]
    fn newer_frame_replaces_pending_frame() {
        let (queue, diagnostics) = queue();
        assert_eq!(queue.submit(frame(1)), SubmitOutcome::Queued);
        assert_eq!(queue.submit(frame(2)), SubmitOutcome::Replaced);

        let taken = queue.take().expect("frame");
        assert_eq!(taken.timestamp, FrameTimestamp::from_millis(2));
        assert_eq!(taken.sequence(), 2);

        assert!(matches!(queue.try_take(), Ok(None)));
        let snap = diagnostics.snapshot();
        assert_eq!(snap.frames_submitted, 2);
        assert_eq!(snap.frames_superseded, 1);
    }

    #[test]
    fn submit_after_close_is_rejected() {
        let (queue, diagnostics) = queue();
        queue.close();
        assert_eq!(queue.submit(frame(1)), SubmitOutcome::Closed);
        assert_eq!(queue.take().unwrap_err(), Cancelled);
        assert_eq!(diagnostics.snapshot().frames_rejected, 1);
    }

    #[test]
    fn close_releases_pending_frame_instead_of_delivering_it() {
        let (queue, diagnostics) = queue();
        queue.submit(frame(1));
        queue.close();
        assert!(!queue.has_pending());
        assert!(queue.take().is_err());
        assert_eq!(diagnostics.snapshot().frames_superseded, 1);
    }

    #[test]
    fn close_wakes_blocked_take() {
        let (queue, _) = queue();
        let queue = Arc::new(queue);
        let taker = {
            let queue = queue.clone();
            thread::spawn(move || {
                let start = Instant::now();
                (queue.take(), start.elapsed())
            })
        };
        thread::sleep(Duration::from_millis(50));
        queue.close();

        let (result, waited) = taker.join().expect("taker thread");
        assert_eq!(result.unwrap_err(), Cancelled);
        assert!(waited < Duration::from_secs(2));
    }

    #[test]
    fn take_timeout_returns_none_when_idle() {
        let (queue, _) = queue();
        let result = queue.take_timeout(Duration::from_millis(20));
        assert!(matches!(result, Ok(None)));
    }

    #[test]
    fn take_timeout_without_deadline_waits_like_take() {
        let (queue, _) = queue();
        queue.submit(frame(5));
        let taken = queue.take_timeout(Duration::MAX).expect("open queue");
        assert_eq!(taken.map(|f| f.timestamp), Some(FrameTimestamp::from_millis(5)));

        queue.close();
        assert_eq!(queue.take_timeout(Duration::MAX).unwrap_err(), Cancelled);
    }

    #[test]
    fn concurrent_takers_never_share_a_frame() {
        let (queue, _) = queue();
        let queue = Arc::new(queue);
        let mut takers = Vec::new();
        for _ in 0..4 {
            let queue = queue.clone();
            takers.push(thread::spawn(move || {
                let mut seen = Vec::new();
                while let Ok(frame) = queue.take() {
                    assert_eq!(frame.byte_len(), 4);
                    seen.push(frame.sequence());
                }
                seen
            }));
        }

        for ts in 1..=2000 {
            queue.submit(frame(ts));
            if ts % 64 == 0 {
                thread::yield_now();
            }
        }
        // Let the takers drain the last frame before closing.
        let deadline = Instant::now() + Duration::from_secs(2);
        while queue.has_pending() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        queue.close();

        let mut all: Vec<u64> = takers
            .into_iter()
            .flat_map(|t| t.join().expect("taker thread"))
            .collect();
        let taken = all.len();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), taken, "a frame was delivered twice");
        assert!(taken >= 1);
    }
}
