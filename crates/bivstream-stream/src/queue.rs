use std::time::Duration;

use crossbeam::channel::{self, Receiver, SendTimeoutError, Sender, TrySendError};

use crate::config::OverflowPolicy;

/// Result of pushing onto a bounded channel queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Queued without loss.
    Queued,
    /// Queued after evicting the oldest entry.
    ReplacedOldest,
    /// The queue stayed full for the whole wait; the new entry was dropped.
    Dropped,
    /// Every consumer has gone away.
    Disconnected,
}

impl PushOutcome {
    /// True if something was lost to make or fail to make room.
    pub fn lost_data(self) -> bool {
        matches!(self, Self::ReplacedOldest | Self::Dropped)
    }
}

/// Producer half of a bounded queue that never blocks forever.
///
/// With [`OverflowPolicy::DropOldest`] the sender keeps a receiver of its own
/// to evict the head of a full queue, so the queue stays open while the
/// sender lives.
#[derive(Debug)]
pub struct ChannelSender<T> {
    tx: Sender<T>,
    evict: Option<Receiver<T>>,
    block_timeout: Duration,
    dropped: u64,
}

/// Create a bounded queue with the given overflow policy.
pub fn bounded_queue<T>(depth: usize, policy: OverflowPolicy) -> (ChannelSender<T>, Receiver<T>) {
    let (tx, rx) = channel::bounded(depth.max(1));
    let (evict, block_timeout) = match policy {
        OverflowPolicy::DropOldest => (Some(rx.clone()), Duration::ZERO),
        OverflowPolicy::Block { timeout_ms } => (None, Duration::from_millis(timeout_ms)),
    };
    (
        ChannelSender {
            tx,
            evict,
            block_timeout,
            dropped: 0,
        },
        rx,
    )
}

impl<T> ChannelSender<T> {
    /// Push one entry according to the queue's overflow policy.
    pub fn push(&mut self, item: T) -> PushOutcome {
        match &self.evict {
            Some(evict) => {
                let mut item = item;
                let mut evicted = false;
                loop {
                    match self.tx.try_send(item) {
                        Ok(()) if evicted => return PushOutcome::ReplacedOldest,
                        Ok(()) => return PushOutcome::Queued,
                        Err(TrySendError::Full(back)) => {
                            item = back;
                            if evict.try_recv().is_ok() {
                                evicted = true;
                                self.dropped += 1;
                            }
                        }
                        Err(TrySendError::Disconnected(_)) => return PushOutcome::Disconnected,
                    }
                }
            }
            None => match self.tx.send_timeout(item, self.block_timeout) {
                Ok(()) => PushOutcome::Queued,
                Err(SendTimeoutError::Timeout(_)) => {
                    self.dropped += 1;
                    PushOutcome::Dropped
                }
                Err(SendTimeoutError::Disconnected(_)) => PushOutcome::Disconnected,
            },
        }
    }

    /// Entries lost to overflow so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Entries currently queued.
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}
