//! Emission pacing
//!
//! Work done between two emissions counts toward the interval, so slow
//! fetches never stretch a slide beyond the target and fast ones never
//! shorten it.

use std::time::Duration;
use tokio::time::Instant;

use crate::cancel::{CancelToken, Cancelled};

/// Default time each slide stays on screen
pub const DEFAULT_SLIDE_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug)]
pub struct Pacer {
    interval: Duration,
    last_emit: Option<Instant>,
}

impl Pacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: None,
        }
    }

    /// Time still to wait before the next emission
    pub fn remaining(&self) -> Duration {
        match self.last_emit {
            Some(last) => self.interval.saturating_sub(last.elapsed()),
            None => Duration::ZERO,
        }
    }

    /// Sleep out the rest of the interval, then mark the emission
    pub async fn wait(&mut self, cancel: &CancelToken) -> Result<(), Cancelled> {
        let remaining = self.remaining();
        if !remaining.is_zero() {
            cancel.sleep(remaining).await?;
        }
        cancel.check()?;
        self.last_emit = Some(Instant::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_first_emission_is_immediate() {
        let mut pacer = Pacer::new(DEFAULT_SLIDE_INTERVAL);
        let start = Instant::now();
        pacer.wait(&CancelToken::new()).await.unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_work_waits_remaining_interval() {
        let cancel = CancelToken::new();
        let mut pacer = Pacer::new(DEFAULT_SLIDE_INTERVAL);
        pacer.wait(&cancel).await.unwrap();

        tokio::time::sleep(Duration::from_secs(3)).await;
        let before = Instant::now();
        pacer.wait(&cancel).await.unwrap();

        let waited = before.elapsed();
        assert!(waited >= Duration::from_secs(7));
        assert!(waited < Duration::from_millis(7_100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_work_emits_immediately() {
        let cancel = CancelToken::new();
        let mut pacer = Pacer::new(DEFAULT_SLIDE_INTERVAL);
        pacer.wait(&cancel).await.unwrap();

        tokio::time::sleep(Duration::from_secs(15)).await;
        let before = Instant::now();
        pacer.wait(&cancel).await.unwrap();
        assert_eq!(before.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_wait() {
        let cancel = CancelToken::new();
        let mut pacer = Pacer::new(DEFAULT_SLIDE_INTERVAL);
        pacer.wait(&cancel).await.unwrap();
        cancel.cancel();
        assert_eq!(pacer.wait(&cancel).await, Err(Cancelled));
    }
}
