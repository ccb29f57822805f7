//! Bounded drop-oldest tick queue.
//!
//! Subscribers publish to the market state store through this queue.
//! On overflow the oldest tick for the affected source is dropped and
//! a counter recorded: prices are monotone in recency, so tail-drop
//! loses nothing the consumer still wants.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use updown_core::Tick;
use updown_telemetry::metrics;

/// Bounded multi-producer queue with drop-oldest overflow policy.
#[derive(Clone)]
pub struct TickQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    buf: Mutex<VecDeque<Tick>>,
    capacity: usize,
    notify: Notify,
    dropped: AtomicU64,
}

impl TickQueue {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "tick queue capacity must be positive");
        Self {
            inner: Arc::new(QueueInner {
                buf: Mutex::new(VecDeque::with_capacity(capacity)),
                capacity,
                notify: Notify::new(),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Push a tick, evicting the oldest entry when full.
    pub fn push(&self, tick: Tick) {
        {
            let mut buf = self.inner.buf.lock();
            if buf.len() == self.inner.capacity {
                if let Some(evicted) = buf.pop_front() {
                    self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                    metrics::TICKS_DROPPED_TOTAL
                        .with_label_values(&[evicted.source.as_str()])
                        .inc();
                }
            }
            buf.push_back(tick);
        }
        self.inner.notify.notify_one();
    }

    /// Pop the oldest tick, waiting until one is available.
    pub async fn pop(&self) -> Tick {
        loop {
            if let Some(tick) = self.try_pop() {
                return tick;
            }
            self.inner.notify.notified().await;
        }
    }

    /// Pop without waiting.
    pub fn try_pop(&self) -> Option<Tick> {
        self.inner.buf.lock().pop_front()
    }

    /// Total ticks evicted on overflow.
    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.inner.buf.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.buf.lock().is_empty()
    }
}
