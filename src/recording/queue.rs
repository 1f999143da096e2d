//! Single-producer/single-consumer frame hand-off
//!
//! The queue is split into a [`FrameProducer`] and a [`FrameConsumer`]. Neither
//! half is `Clone`, so exactly one thread can produce and exactly one thread
//! can consume. Storage is a lock-free unbounded channel: consumed entries are
//! released as the consumer passes them, so memory tracks the unconsumed
//! backlog rather than every frame ever produced.
//!
//! With [`BacklogPolicy::DropOldest`] the producer collapses backlog by
//! evicting the oldest unconsumed entries. The consumer then sees a strictly
//! increasing subsequence of production order, never a reordering or a
//! duplicate.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use serde::{Deserialize, Serialize};

/// How the producer treats a consumer that falls behind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum BacklogPolicy {
    /// Keep every produced frame until it is consumed
    Unbounded,
    /// Keep at most `max_backlog` unconsumed frames, evicting the oldest.
    ///
    /// The producer measures backlog as what is still in the channel, so a
    /// frame the consumer has already taken never counts against the limit.
    /// A consume racing an eviction can still leave one frame fewer.
    DropOldest { max_backlog: usize },
}

impl Default for BacklogPolicy {
    fn default() -> Self {
        BacklogPolicy::Unbounded
    }
}

/// Result of a bounded wait on the consumer side
#[derive(Debug, PartialEq, Eq)]
pub enum Consumed<T> {
    Frame(T),
    /// Nothing arrived within the wait
    Empty,
    /// Producer is gone and every frame has been consumed
    Closed,
}

#[derive(Debug, Default)]
struct Counters {
    produced: AtomicU64,
    consumed: AtomicU64,
    evicted: AtomicU64,
}

impl Counters {
    fn backlog(&self) -> usize {
        let produced = self.produced.load(Ordering::Acquire);
        let gone = self.consumed.load(Ordering::Acquire) + self.evicted.load(Ordering::Acquire);
        produced.saturating_sub(gone) as usize
    }
}

/// Create a connected producer/consumer pair
pub fn frame_queue<T>(policy: BacklogPolicy) -> (FrameProducer<T>, FrameConsumer<T>) {
    let (sender, receiver) = crossbeam_channel::unbounded();
    let counters = Arc::new(Counters::default());

    let evictor = match policy {
        BacklogPolicy::Unbounded => None,
        BacklogPolicy::DropOldest { max_backlog } => Some((receiver.clone(), max_backlog.max(1))),
    };

    (
        FrameProducer {
            sender,
            evictor,
            counters: counters.clone(),
        },
        FrameConsumer { receiver, counters },
    )
}

/// Producing half; owned by the single capture thread
pub struct FrameProducer<T> {
    sender: Sender<T>,
    evictor: Option<(Receiver<T>, usize)>,
    counters: Arc<Counters>,
}

impl<T> FrameProducer<T> {
    /// Append a frame. Never blocks.
    ///
    /// Returns `false` if the consumer has been dropped, in which case the
    /// frame is discarded. Under `DropOldest` the evicting receiver keeps the
    /// channel open, so a dropped consumer only shows up as evictions.
    pub fn produce(&self, item: T) -> bool {
        if self.sender.send(item).is_err() {
            return false;
        }
        self.counters.produced.fetch_add(1, Ordering::AcqRel);

        if let Some((oldest, max_backlog)) = &self.evictor {
            while oldest.len() > *max_backlog {
                match oldest.try_recv() {
                    Ok(_) => {
                        self.counters.evicted.fetch_add(1, Ordering::AcqRel);
                    }
                    Err(_) => break,
                }
            }
        }
        true
    }

    /// Approximate number of unconsumed frames
    pub fn size(&self) -> usize {
        self.counters.backlog()
    }

    pub fn produced(&self) -> u64 {
        self.counters.produced.load(Ordering::Acquire)
    }

    pub fn evicted(&self) -> u64 {
        self.counters.evicted.load(Ordering::Acquire)
    }
}

/// Consuming half; owned by the single worker thread
pub struct FrameConsumer<T> {
    receiver: Receiver<T>,
    counters: Arc<Counters>,
}

impl<T> FrameConsumer<T> {
    /// Take the next unseen frame, if any
    pub fn consume(&self) -> Option<T> {
        match self.receiver.try_recv() {
            Ok(item) => {
                self.counters.consumed.fetch_add(1, Ordering::AcqRel);
                Some(item)
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Wait up to `timeout` for the next frame
    pub fn consume_timeout(&self, timeout: Duration) -> Consumed<T> {
        match self.receiver.recv_timeout(timeout) {
            Ok(item) => {
                self.counters.consumed.fetch_add(1, Ordering::AcqRel);
                Consumed::Frame(item)
            }
            Err(RecvTimeoutError::Timeout) => Consumed::Empty,
            Err(RecvTimeoutError::Disconnected) => Consumed::Closed,
        }
    }

    /// Drop every buffered frame; returns how many were discarded
    pub fn discard_all(&self) -> usize {
        let mut discarded = 0;
        while self.receiver.try_recv().is_ok() {
            discarded += 1;
        }
        self.counters
            .consumed
            .fetch_add(discarded as u64, Ordering::AcqRel);
        discarded
    }

    pub fn size(&self) -> usize {
        self.counters.backlog()
    }

    pub fn consumed(&self) -> u64 {
        self.counters.consumed.load(Ordering::Acquire)
    }

    pub fn evicted(&self) -> u64 {
        self.counters.evicted.load(Ordering::Acquire)
    }
}
