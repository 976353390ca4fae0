//! Source back-pressure.
//!
//! The driver blocks once the number of in-flight seeded stores reaches the
//! high-water mark and resumes only after it drops below the low-water
//! mark, so a fast source cannot flood the graph.

use parking_lot::Mutex;
use tokio::sync::Notify;

/// High/low watermark gate over an in-flight count.
#[derive(Debug)]
pub struct Watermark {
    inflight: Mutex<usize>,
    notify: Notify,
    high: usize,
    low: usize,
}

impl Watermark {
    /// Build a gate; `low` is clamped below `high`.
    pub fn new(high: usize, low: usize) -> Self {
        let high = high.max(1);
        Self {
            inflight: Mutex::new(0),
            notify: Notify::new(),
            high,
            low: low.min(high - 1).max(if high > 1 { 1 } else { 0 }),
        }
    }

    /// Count one in-flight store, waiting while the gate is closed.
    pub async fn acquire(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut inflight = self.inflight.lock();
                if *inflight < self.high {
                    *inflight += 1;
                    return;
                }
            }
            notified.await;
        }
    }

    /// Release one in-flight store; wakes waiters below the low mark.
    pub fn release(&self) {
        let mut inflight = self.inflight.lock();
        *inflight = inflight.saturating_sub(1);
        if *inflight < self.low || self.high == 1 {
            self.notify.notify_waiters();
        }
    }

    /// Current in-flight count.
    pub fn inflight(&self) -> usize {
        *self.inflight.lock()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_acquire_below_high_is_immediate() {
        let gate = Watermark::new(2, 1);
        gate.acquire().await;
        gate.acquire().await;
        assert_eq!(gate.inflight(), 2);
    }

    #[tokio::test]
    async fn test_blocks_at_high_resumes_below_low() {
        let gate = Arc::new(Watermark::new(2, 1));
        gate.acquire().await;
        gate.acquire().await;

        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                gate.acquire().await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        // One release: still at the low mark, waiter stays blocked.
        gate.release();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        // Second release drops below low: waiter proceeds.
        gate.release();
        waiter.await.unwrap();
        assert_eq!(gate.inflight(), 1);
    }
}
