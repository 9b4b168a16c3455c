//! Pipes: the only channel between two nodes.
//!
//! A pipe has exactly one [`PipeWriter`] and any number of [`PipeReader`]s.
//! Every reader owns an independent FIFO tap, so a frame pushed once is seen
//! by every connected reader in push order. What happens when a tap is full
//! is decided per pipe by its [`PipePolicy`].
//!
//! ```text
//!              ┌── tap 0 ──► PipeReader (consumer A)
//! PipeWriter ──┤
//!              └── tap 1 ──► PipeReader (consumer B)
//! ```
//!
//! Dropping the writer closes the pipe. Readers drain what is still queued
//! and then report [`PipeReader::is_closed`].

use crate::error::{MediaFlowError, Result};
use crate::frame::{format, Frame, FormatId};
use crate::pipeline::cancel::CancellationToken;
use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Backpressure behavior of a pipe once a reader's queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipePolicy {
    /// Producer waits for space, re-checking cancellation between waits.
    Blocking { capacity: usize },
    /// Oldest queued frame is evicted to make room.
    DropOldest { capacity: usize },
    /// Single slot; the newest frame replaces whatever is queued.
    Latest,
}

impl PipePolicy {
    pub fn capacity(&self) -> usize {
        match self {
            PipePolicy::Blocking { capacity } | PipePolicy::DropOldest { capacity } => {
                (*capacity).max(1)
            }
            PipePolicy::Latest => 1,
        }
    }
}

impl Default for PipePolicy {
    fn default() -> Self {
        PipePolicy::Blocking { capacity: 8 }
    }
}

impl fmt::Display for PipePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipePolicy::Blocking { capacity } => write!(f, "blocking({})", capacity),
            PipePolicy::DropOldest { capacity } => write!(f, "drop_oldest({})", capacity),
            PipePolicy::Latest => f.write_str("latest"),
        }
    }
}

/// Result of a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Queued on every tap; `dropped` frames were evicted to make room.
    Delivered { dropped: usize },
    /// Format not in the pipe's accepted set. Nothing was queued.
    Rejected,
    /// Cancellation was observed while waiting for space.
    Cancelled,
    /// Every reader has detached. The frame went nowhere.
    NoReaders,
}

impl PushOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, PushOutcome::Delivered { .. })
    }
}

/// Counters for one pipe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipeStats {
    pub pushed: u64,
    pub dropped: u64,
    pub rejected: u64,
}

struct Tap {
    id: u64,
    tx: Sender<Frame>,
    // Kept so the writer can evict under drop policies.
    rx: Receiver<Frame>,
    attached: Arc<AtomicBool>,
}

impl Tap {
    fn snapshot(&self) -> Tap {
        Tap {
            id: self.id,
            tx: self.tx.clone(),
            rx: self.rx.clone(),
            attached: Arc::clone(&self.attached),
        }
    }
}

struct PipeShared {
    name: String,
    policy: PipePolicy,
    accepted: Vec<FormatId>,
    taps: Mutex<Vec<Tap>>,
    next_tap: AtomicU64,
    writer_taken: AtomicBool,
    closed: AtomicBool,
    pushed: AtomicU64,
    dropped: AtomicU64,
    rejected: AtomicU64,
}

impl PipeShared {
    fn taps(&self) -> MutexGuard<'_, Vec<Tap>> {
        self.taps.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn accepts(&self, format: FormatId) -> bool {
        self.accepted.is_empty() || self.accepted.contains(&format)
    }
}

/// Handle to a pipe, used at graph-build time to attach the writer and readers.
#[derive(Clone)]
pub struct Pipe {
    shared: Arc<PipeShared>,
}

impl Pipe {
    /// Create a pipe carrying only `accepted` formats (empty means any).
    pub fn new(name: impl Into<String>, policy: PipePolicy, accepted: Vec<FormatId>) -> Self {
        Self {
            shared: Arc::new(PipeShared {
                name: name.into(),
                policy,
                accepted,
                taps: Mutex::new(Vec::new()),
                next_tap: AtomicU64::new(0),
                writer_taken: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                pushed: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
                rejected: AtomicU64::new(0),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn policy(&self) -> PipePolicy {
        self.shared.policy
    }

    pub fn accepted_formats(&self) -> &[FormatId] {
        &self.shared.accepted
    }

    /// Take the single writer end. Fails on the second call.
    pub fn take_writer(&self) -> Result<PipeWriter> {
        if self.shared.writer_taken.swap(true, Ordering::SeqCst) {
            return Err(MediaFlowError::Pipe(format!(
                "pipe '{}' already has a writer",
                self.shared.name
            )));
        }
        Ok(PipeWriter {
            shared: Arc::clone(&self.shared),
        })
    }

    /// Attach a new reader with its own queue.
    ///
    /// A reader connected to an already closed pipe is closed right away.
    pub fn connect_reader(&self) -> PipeReader {
        let (tx, rx) = crossbeam_channel::bounded(self.shared.policy.capacity());
        let id = self.shared.next_tap.fetch_add(1, Ordering::Relaxed);
        let attached = Arc::new(AtomicBool::new(true));
        if !self.shared.closed.load(Ordering::Acquire) {
            self.shared.taps().push(Tap {
                id,
                tx,
                rx: rx.clone(),
                attached: Arc::clone(&attached),
            });
        }
        PipeReader {
            shared: Arc::clone(&self.shared),
            id,
            rx,
            attached,
        }
    }

    pub fn reader_count(&self) -> usize {
        self.shared.taps().len()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> PipeStats {
        PipeStats {
            pushed: self.shared.pushed.load(Ordering::Relaxed),
            dropped: self.shared.dropped.load(Ordering::Relaxed),
            rejected: self.shared.rejected.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for Pipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipe")
            .field("name", &self.shared.name)
            .field("policy", &self.shared.policy)
            .field("readers", &self.reader_count())
            .finish()
    }
}

/// Producer end of a pipe.
pub struct PipeWriter {
    shared: Arc<PipeShared>,
}

impl PipeWriter {
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn accepts(&self, format: FormatId) -> bool {
        self.shared.accepts(format)
    }

    pub fn pipe(&self) -> Pipe {
        Pipe {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Push a frame to every reader.
    ///
    /// Under [`PipePolicy::Blocking`] the call waits for space in `slice`
    /// steps and gives up with [`PushOutcome::Cancelled`] as soon as `cancel`
    /// is set. Other policies never wait.
    pub fn push(&self, frame: Frame, cancel: &CancellationToken, slice: Duration) -> PushOutcome {
        if !self.shared.accepts(frame.format()) {
            self.shared.rejected.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                "Pipe '{}' rejected frame of format {}",
                self.shared.name,
                format::format_name(frame.format())
            );
            return PushOutcome::Rejected;
        }

        // Never hold the tap list while waiting: a reader detaching needs it.
        let taps: Vec<Tap> = self.shared.taps().iter().map(Tap::snapshot).collect();
        if taps.is_empty() {
            tracing::trace!("Pipe '{}' has no readers left", self.shared.name);
            return PushOutcome::NoReaders;
        }
        let slice = slice.max(Duration::from_millis(1));
        let mut dropped = 0;
        let mut reached = 0;

        for tap in &taps {
            match self.shared.policy {
                PipePolicy::Blocking { .. } => {
                    let mut pending = frame.clone();
                    loop {
                        match tap.tx.send_timeout(pending, slice) {
                            Ok(()) => {
                                reached += 1;
                                break;
                            }
                            Err(SendTimeoutError::Timeout(f)) => {
                                if cancel.is_cancelled() {
                                    return PushOutcome::Cancelled;
                                }
                                if !tap.attached.load(Ordering::Acquire) {
                                    break;
                                }
                                pending = f;
                            }
                            Err(SendTimeoutError::Disconnected(_)) => break,
                        }
                    }
                }
                PipePolicy::DropOldest { .. } | PipePolicy::Latest => {
                    let mut pending = frame.clone();
                    loop {
                        match tap.tx.try_send(pending) {
                            Ok(()) => {
                                reached += 1;
                                break;
                            }
                            Err(TrySendError::Full(f)) => {
                                if tap.rx.try_recv().is_ok() {
                                    dropped += 1;
                                }
                                pending = f;
                            }
                            Err(TrySendError::Disconnected(_)) => break,
                        }
                    }
                }
            }
        }

        if reached == 0 {
            return PushOutcome::NoReaders;
        }
        self.shared.pushed.fetch_add(1, Ordering::Relaxed);
        if dropped > 0 {
            self.shared.dropped.fetch_add(dropped as u64, Ordering::Relaxed);
            tracing::trace!("Pipe '{}' evicted {} frame(s)", self.shared.name, dropped);
        }
        PushOutcome::Delivered { dropped }
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::Release);
        // Dropping the senders lets readers see disconnection after draining.
        self.shared.taps().clear();
        tracing::trace!("Pipe '{}' closed", self.shared.name);
    }
}

/// Consumer end of a pipe.
pub struct PipeReader {
    shared: Arc<PipeShared>,
    id: u64,
    rx: Receiver<Frame>,
    attached: Arc<AtomicBool>,
}

impl PipeReader {
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Next frame if one is queued.
    pub fn pop(&self) -> Option<Frame> {
        self.rx.try_recv().ok()
    }

    /// Wait up to `timeout` for a frame.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<Frame> {
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => Some(frame),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Writer is gone and nothing is left to drain.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire) && self.rx.is_empty()
    }

    /// Underlying channel, for multi-input waits.
    pub fn receiver(&self) -> &Receiver<Frame> {
        &self.rx
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        self.attached.store(false, Ordering::Release);
        self.shared.taps().retain(|t| t.id != self.id);
    }
}

impl fmt::Debug for PipeReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipeReader")
            .field("pipe", &self.shared.name)
            .field("queued", &self.rx.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::format::{RGB24, Y8};
    use crate::frame::{RawVideoFrame, Resolution};

    fn frame(format: FormatId, tag: u8) -> Frame {
        let data = [tag; 16];
        RawVideoFrame::create_empty_with_data(format, Resolution::new(2, 2), &data, false)
            .unwrap()
            .into()
    }

    fn tag(frame: &Frame) -> u8 {
        frame.as_raw_video().unwrap().planes()[0].data()[0]
    }

    const SLICE: Duration = Duration::from_millis(5);

    #[test]
    fn test_fifo_order() {
        let pipe = Pipe::new("p", PipePolicy::Blocking { capacity: 4 }, vec![]);
        let writer = pipe.take_writer().unwrap();
        let reader = pipe.connect_reader();
        let cancel = CancellationToken::new();
        for i in 0..3 {
            assert!(writer.push(frame(Y8, i), &cancel, SLICE).is_delivered());
        }
        let seen: Vec<u8> = std::iter::from_fn(|| reader.pop()).map(|f| tag(&f)).collect();
        assert_eq!(seen, vec![0, 1, 2]);
    }

    #[test]
    fn test_single_writer() {
        let pipe = Pipe::new("p", PipePolicy::Latest, vec![]);
        let _w = pipe.take_writer().unwrap();
        assert!(pipe.take_writer().is_err());
    }

    #[test]
    fn test_rejects_unaccepted_format() {
        let pipe = Pipe::new("p", PipePolicy::Latest, vec![Y8]);
        let writer = pipe.take_writer().unwrap();
        let reader = pipe.connect_reader();
        let outcome = writer.push(frame(RGB24, 1), &CancellationToken::new(), SLICE);
        assert_eq!(outcome, PushOutcome::Rejected);
        assert!(reader.pop().is_none());
        assert_eq!(pipe.stats().rejected, 1);
    }

    #[test]
    fn test_drop_oldest_evicts() {
        let pipe = Pipe::new("p", PipePolicy::DropOldest { capacity: 2 }, vec![]);
        let writer = pipe.take_writer().unwrap();
        let reader = pipe.connect_reader();
        let cancel = CancellationToken::new();
        for i in 0..4 {
            writer.push(frame(Y8, i), &cancel, SLICE);
        }
        assert_eq!(tag(&reader.pop().unwrap()), 2);
        assert_eq!(tag(&reader.pop().unwrap()), 3);
        assert_eq!(pipe.stats().dropped, 2);
    }

    #[test]
    fn test_latest_keeps_newest() {
        let pipe = Pipe::new("p", PipePolicy::Latest, vec![]);
        let writer = pipe.take_writer().unwrap();
        let reader = pipe.connect_reader();
        let cancel = CancellationToken::new();
        writer.push(frame(Y8, 1), &cancel, SLICE);
        let outcome = writer.push(frame(Y8, 2), &cancel, SLICE);
        assert_eq!(outcome, PushOutcome::Delivered { dropped: 1 });
        assert_eq!(tag(&reader.pop().unwrap()), 2);
        assert!(reader.pop().is_none());
    }

    #[test]
    fn test_blocking_push_cancelled_when_full() {
        let pipe = Pipe::new("p", PipePolicy::Blocking { capacity: 1 }, vec![]);
        let writer = pipe.take_writer().unwrap();
        let _reader = pipe.connect_reader();
        let cancel = CancellationToken::new();
        writer.push(frame(Y8, 1), &cancel, SLICE);

        cancel.request();
        assert_eq!(writer.push(frame(Y8, 2), &cancel, SLICE), PushOutcome::Cancelled);
    }

    #[test]
    fn test_fan_out() {
        let pipe = Pipe::new("p", PipePolicy::Blocking { capacity: 2 }, vec![]);
        let writer = pipe.take_writer().unwrap();
        let a = pipe.connect_reader();
        let b = pipe.connect_reader();
        writer.push(frame(Y8, 7), &CancellationToken::new(), SLICE);
        assert_eq!(tag(&a.pop().unwrap()), 7);
        assert_eq!(tag(&b.pop().unwrap()), 7);
    }

    #[test]
    fn test_reader_drains_then_closed() {
        let pipe = Pipe::new("p", PipePolicy::Blocking { capacity: 2 }, vec![]);
        let writer = pipe.take_writer().unwrap();
        let reader = pipe.connect_reader();
        writer.push(frame(Y8, 1), &CancellationToken::new(), SLICE);
        drop(writer);

        assert!(!reader.is_closed());
        assert!(reader.pop().is_some());
        assert!(reader.is_closed());
    }

    #[test]
    fn test_dropped_reader_detaches() {
        let pipe = Pipe::new("p", PipePolicy::Blocking { capacity: 1 }, vec![]);
        let writer = pipe.take_writer().unwrap();
        let reader = pipe.connect_reader();
        assert_eq!(pipe.reader_count(), 1);
        drop(reader);
        assert_eq!(pipe.reader_count(), 0);

        // No tap left, so a full queue can no longer block the producer.
        let cancel = CancellationToken::new();
        assert_eq!(writer.push(frame(Y8, 1), &cancel, SLICE), PushOutcome::NoReaders);
        assert_eq!(writer.push(frame(Y8, 2), &cancel, SLICE), PushOutcome::NoReaders);
        assert_eq!(pipe.stats().pushed, 0);
    }

    #[test]
    fn test_one_reader_left_still_delivers() {
        let pipe = Pipe::new("p", PipePolicy::DropOldest { capacity: 2 }, vec![]);
        let writer = pipe.take_writer().unwrap();
        let a = pipe.connect_reader();
        let b = pipe.connect_reader();
        drop(a);

        let cancel = CancellationToken::new();
        assert!(writer.push(frame(Y8, 7), &cancel, SLICE).is_delivered());
        assert_eq!(tag(&b.pop().unwrap()), 7);
        drop(b);
        assert_eq!(writer.push(frame(Y8, 8), &cancel, SLICE), PushOutcome::NoReaders);
    }

    #[test]
    fn test_policy_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            policy: PipePolicy,
        }
        let w: Wrapper =
            toml::from_str("policy = { kind = \"drop_oldest\", capacity = 3 }").unwrap();
        assert_eq!(w.policy, PipePolicy::DropOldest { capacity: 3 });
        let w: Wrapper = toml::from_str("policy = { kind = \"latest\" }").unwrap();
        assert_eq!(w.policy, PipePolicy::Latest);
    }
}
