//! Bounded queues with backpressure and cancellation support
//!
//! Both pipeline queues (candidate paths, scan outcomes) are bounded FIFO
//! channels. A full queue blocks the producer, which throttles the walker
//! relative to parse throughput and the workers relative to the consumer.
//! Every blocking send or receive races against the shared [`CancelToken`].
//!
//! The queue is closed when every [`QueueSender`] has been dropped.

use crate::shutdown::CancelToken;
use crossbeam_channel::{select, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Default capacity of both pipeline queues
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Statistics for a queue, shared by every handle of that queue
#[derive(Debug, Default)]
pub struct QueueStats {
    enqueued: AtomicU64,
    dequeued: AtomicU64,

    /// Sends that found the queue full and had to block
    backpressure_events: AtomicU64,
}

impl QueueStats {
    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    pub fn dequeued(&self) -> u64 {
        self.dequeued.load(Ordering::Relaxed)
    }

    /// Items sent but not yet received
    pub fn pending(&self) -> u64 {
        self.enqueued().saturating_sub(self.dequeued())
    }

    /// Get backpressure event count
    pub fn backpressure_count(&self) -> u64 {
        self.backpressure_events.load(Ordering::Relaxed)
    }
}

/// Result of a cancellable send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    /// Item is in the queue
    Sent,

    /// Cancellation fired first; the item was dropped
    Cancelled,

    /// Every receiver is gone; the item was dropped
    Disconnected,
}

/// Create a bounded queue with the given capacity
pub fn bounded<T>(capacity: usize) -> (QueueSender<T>, QueueReceiver<T>) {
    let (sender, receiver) = crossbeam_channel::bounded(capacity);
    let stats = Arc::new(QueueStats::default());

    (
        QueueSender {
            sender,
            stats: Arc::clone(&stats),
        },
        QueueReceiver { receiver, stats },
    )
}

/// Handle for sending items to the queue
pub struct QueueSender<T> {
    sender: Sender<T>,
    stats: Arc<QueueStats>,
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            stats: Arc::clone(&self.stats),
        }
    }
}

impl<T> QueueSender<T> {
    /// Send an item, blocking while the queue is full unless cancelled
    pub fn send(&self, item: T, cancel: &CancelToken) -> SendStatus {
        if cancel.is_cancelled() {
            return SendStatus::Cancelled;
        }

        let item = match self.sender.try_send(item) {
            Ok(()) => {
                self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
                return SendStatus::Sent;
            }
            Err(TrySendError::Disconnected(_)) => return SendStatus::Disconnected,
            Err(TrySendError::Full(item)) => {
                self.stats.backpressure_events.fetch_add(1, Ordering::Relaxed);
                item
            }
        };

        select! {
            send(self.sender, item) -> res => match res {
                Ok(()) => {
                    self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
                    SendStatus::Sent
                }
                Err(_) => SendStatus::Disconnected,
            },
            recv(cancel.signal()) -> _ => SendStatus::Cancelled,
        }
    }

    /// Get queue statistics
    pub fn stats(&self) -> Arc<QueueStats> {
        Arc::clone(&self.stats)
    }
}

/// Handle for receiving items from the queue
pub struct QueueReceiver<T> {
    receiver: Receiver<T>,
    stats: Arc<QueueStats>,
}

impl<T> Clone for QueueReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            receiver: self.receiver.clone(),
            stats: Arc::clone(&self.stats),
        }
    }
}

impl<T> QueueReceiver<T> {
    /// Receive an item, blocking until one is available or the queue closes
    pub fn recv(&self) -> Option<T> {
        match self.receiver.recv() {
            Ok(item) => {
                self.stats.dequeued.fetch_add(1, Ordering::Relaxed);
                Some(item)
            }
            Err(_) => None,
        }
    }

    /// Receive an item unless the queue closes or cancellation fires first
    pub fn recv_or_cancel(&self, cancel: &CancelToken) -> Option<T> {
        if cancel.is_cancelled() {
            return None;
        }

        select! {
            recv(self.receiver) -> msg => match msg {
                Ok(item) => {
                    self.stats.dequeued.fetch_add(1, Ordering::Relaxed);
                    Some(item)
                }
                Err(_) => None,
            },
            recv(cancel.signal()) -> _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn test_queue_basic() {
        let cancel = CancelToken::new();
        let (tx, rx) = bounded(10);

        assert_eq!(tx.send("/test", &cancel), SendStatus::Sent);
        assert_eq!(tx.stats().pending(), 1);
        assert_eq!(rx.recv(), Some("/test"));
        assert_eq!(tx.stats().pending(), 0);
    }

    #[test]
    fn test_queue_closes_when_senders_drop() {
        let cancel = CancelToken::new();
        let (tx, rx) = bounded(10);
        let tx2 = tx.clone();

        tx.send(1, &cancel);
        drop(tx);
        tx2.send(2, &cancel);
        drop(tx2);

        let items: Vec<_> = std::iter::from_fn(|| rx.recv()).collect();
        assert_eq!(items, vec![1, 2]);
        assert_eq!(rx.recv(), None);
    }

    #[test]
    fn test_send_blocks_until_cancelled() {
        let cancel = CancelToken::new();
        let (tx, rx) = bounded(1);

        assert_eq!(tx.send(1, &cancel), SendStatus::Sent);

        let canceller = cancel.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            canceller.cancel();
        });

        let start = Instant::now();
        assert_eq!(tx.send(2, &cancel), SendStatus::Cancelled);
        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(tx.stats().backpressure_count(), 1);
        handle.join().unwrap();

        // Only the first item made it
        drop(tx);
        assert_eq!(rx.recv(), Some(1));
        assert_eq!(rx.recv(), None);
    }

    #[test]
    fn test_send_unblocks_when_consumed() {
        let cancel = CancelToken::new();
        let (tx, rx) = bounded(1);
        tx.send(1, &cancel);

        let consumer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            let first = rx.recv();
            let second = rx.recv();
            (first, second)
        });

        assert_eq!(tx.send(2, &cancel), SendStatus::Sent);
        drop(tx);
        assert_eq!(consumer.join().unwrap(), (Some(1), Some(2)));
    }

    #[test]
    fn test_send_to_dropped_receiver() {
        let cancel = CancelToken::new();
        let (tx, rx) = bounded::<u32>(1);
        drop(rx);
        assert_eq!(tx.send(1, &cancel), SendStatus::Disconnected);
    }

    #[test]
    fn test_recv_or_cancel() {
        let cancel = CancelToken::new();
        let (_tx, rx) = bounded::<u32>(1);

        let canceller = cancel.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            canceller.cancel();
        });

        assert_eq!(rx.recv_or_cancel(&cancel), None);
        handle.join().unwrap();
    }

    #[test]
    fn test_queue_stats() {
        let cancel = CancelToken::new();
        let (tx, rx) = bounded(10);

        tx.send("a", &cancel);
        tx.send("b", &cancel);
        rx.recv().unwrap();
        rx.recv().unwrap();

        let stats = tx.stats();
        assert_eq!(stats.enqueued(), 2);
        assert_eq!(stats.dequeued(), 2);
        assert_eq!(stats.pending(), 0);
        assert_eq!(stats.backpressure_count(), 0);
    }
}
