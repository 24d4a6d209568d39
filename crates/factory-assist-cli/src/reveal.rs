//! Timer behind the typewriter reveal.
//!
//! At most one step is pending at any time. The event loop awaits
//! [`RevealScheduler::wait`] as one `select!` arm and calls back into the
//! app when it fires.

use std::time::Duration;

use tokio::time::Instant;

/// Schedules reveal steps at a fixed interval.
#[derive(Debug)]
pub struct RevealScheduler {
    interval: Duration,
    next_due: Option<Instant>,
}

impl RevealScheduler {
    /// Create an idle scheduler.
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_due: None,
        }
    }

    /// Whether a step is pending.
    #[cfg(test)]
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.next_due.is_some()
    }

    /// Schedule a step one interval from now, unless one is already pending.
    pub fn schedule(&mut self) {
        self.schedule_from(Instant::now());
    }

    /// Schedule a step one interval after `now`, unless one is already pending.
    pub fn schedule_from(&mut self, now: Instant) {
        if self.next_due.is_none() {
            self.next_due = Some(now + self.interval);
        }
    }

    /// Drop the pending step, if any.
    pub fn cancel(&mut self) {
        self.next_due = None;
    }

    /// Wait until the pending step is due, then clear it.
    ///
    /// Never completes while nothing is scheduled.
    pub async fn wait(&mut self) {
        match self.next_due {
            Some(due) => {
                tokio::time::sleep_until(due).await;
                self.next_due = None;
            }
            None => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn wait_fires_after_interval() {
        let mut reveal = RevealScheduler::new(Duration::from_millis(10));
        let start = Instant::now();
        reveal.schedule();
        assert!(reveal.is_pending());

        reveal.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(10));
        assert!(!reveal.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn second_schedule_keeps_first_deadline() {
        let mut reveal = RevealScheduler::new(Duration::from_millis(10));
        let start = Instant::now();
        reveal.schedule();
        tokio::time::advance(Duration::from_millis(5)).await;
        reveal.schedule();

        reveal.wait().await;
        assert!(start.elapsed() < Duration::from_millis(15));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_scheduler_never_fires() {
        let mut reveal = RevealScheduler::new(Duration::from_millis(10));
        let fired = tokio::time::timeout(Duration::from_secs(1), reveal.wait()).await;
        assert!(fired.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_clears_pending_step() {
        let mut reveal = RevealScheduler::new(Duration::from_millis(10));
        reveal.schedule();
        reveal.cancel();
        assert!(!reveal.is_pending());
        let fired = tokio::time::timeout(Duration::from_millis(50), reveal.wait()).await;
        assert!(fired.is_err());
    }
}
