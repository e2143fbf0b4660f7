//! Politeness pacing for upstream requests.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until};

/// Spaces request starts at least `delay` apart, across every task sharing
/// the pacer. A zero delay never waits.
#[derive(Debug)]
pub struct Pacer {
    delay: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl Pacer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            next_slot: Mutex::new(None),
        }
    }

    /// Wait for the next free slot and claim it.
    pub async fn wait(&self) {
        if self.delay.is_zero() {
            return;
        }
        let mut next_slot = self.next_slot.lock().await;
        let now = Instant::now();
        let start = match *next_slot {
            Some(slot) if slot > now => {
                sleep_until(slot).await;
                slot
            }
            _ => now,
        };
        *next_slot = Some(start + self.delay);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn zero_delay_never_waits() {
        let pacer = Pacer::new(Duration::ZERO);
        let t0 = std::time::Instant::now();
        for _ in 0..100 {
            pacer.wait().await;
        }
        assert!(t0.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn first_wait_is_immediate_and_later_waits_are_spaced() {
        let pacer = Pacer::new(Duration::from_millis(40));
        let t0 = std::time::Instant::now();
        pacer.wait().await;
        assert!(t0.elapsed() < Duration::from_millis(30));
        pacer.wait().await;
        pacer.wait().await;
        assert!(t0.elapsed() >= Duration::from_millis(80));
    }

    #[tokio::test]
    async fn concurrent_waiters_share_the_schedule() {
        let pacer = Arc::new(Pacer::new(Duration::from_millis(30)));
        let t0 = std::time::Instant::now();
        let waits = (0..4).map(|_| {
            let pacer = Arc::clone(&pacer);
            async move { pacer.wait().await }
        });
        futures::future::join_all(waits).await;
        assert!(t0.elapsed() >= Duration::from_millis(90));
    }
}
