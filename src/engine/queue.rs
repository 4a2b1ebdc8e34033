use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

/// Outcome of a bounded wait for the next queued item
#[derive(Debug)]
pub enum Dequeued<T> {
    Item(T),
    /// Nothing arrived within the timeout; the stream may still continue
    TimedOut,
    /// The queue was closed and everything in it has been taken
    Closed,
}

/// Returned by `enqueue` on a closed queue, handing the item back
#[derive(Debug)]
pub struct QueueClosed<T>(pub T);

/// Fixed-capacity FIFO shared by one producer side and many consumers.
///
/// `enqueue` waits while the queue is full, `dequeue` waits (up to a timeout)
/// while it is empty. Closing is the end-of-stream marker: consumers keep
/// receiving what was already queued, then see `Dequeued::Closed`.
pub struct BoundedFrameQueue<T> {
    inner: Arc<QueueInner<T>>,
}

struct QueueInner<T> {
    tx: RwLock<Option<mpsc::Sender<T>>>,
    rx: Mutex<mpsc::Receiver<T>>,
    capacity: usize,
    len: AtomicUsize,
}

impl<T: Send> BoundedFrameQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            inner: Arc::new(QueueInner {
                tx: RwLock::new(Some(tx)),
                rx: Mutex::new(rx),
                capacity: capacity.max(1),
                len: AtomicUsize::new(0),
            }),
        }
    }

    /// Wait for a free slot and queue `item`; never drops it
    pub async fn enqueue(&self, item: T) -> Result<(), QueueClosed<T>> {
        let tx = match self.sender() {
            Some(tx) => tx,
            None => return Err(QueueClosed(item)),
        };

        let permit = match tx.reserve().await {
            Ok(permit) => permit,
            Err(_) => return Err(QueueClosed(item)),
        };
        // Count before sending so a consumer can never decrement first
        self.inner.len.fetch_add(1, Ordering::Relaxed);
        permit.send(item);
        Ok(())
    }

    /// Wait up to `timeout` for the next item
    pub async fn dequeue(&self, timeout: Duration) -> Dequeued<T> {
        let next = async {
            let mut rx = self.inner.rx.lock().await;
            rx.recv().await
        };

        match tokio::time::timeout(timeout, next).await {
            Ok(Some(item)) => {
                self.inner.len.fetch_sub(1, Ordering::Relaxed);
                Dequeued::Item(item)
            }
            Ok(None) => Dequeued::Closed,
            Err(_) => Dequeued::TimedOut,
        }
    }

    /// Remove and return everything currently queued
    pub async fn drain(&self) -> Vec<T> {
        let mut rx = self.inner.rx.lock().await;
        let mut drained = Vec::new();
        while let Ok(item) = rx.try_recv() {
            self.inner.len.fetch_sub(1, Ordering::Relaxed);
            drained.push(item);
        }
        drained
    }

    /// Mark end of stream. Producers already waiting for a slot still complete.
    pub fn close(&self) {
        self.inner
            .tx
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
    }

    pub fn is_closed(&self) -> bool {
        self.inner
            .tx
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_none()
    }

    /// Approximate number of queued items; for observability only
    pub fn size(&self) -> usize {
        self.inner.len.load(Ordering::Relaxed).min(self.inner.capacity)
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    fn sender(&self) -> Option<mpsc::Sender<T>> {
        self.inner
            .tx
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl<T> Clone for BoundedFrameQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}
