//! Scoped delayed callbacks.
//!
//! A [`TimerGuard`] owns the tokio task behind a one-shot or repeating timer
//! and aborts it when dropped, so releasing the guard is the single way a
//! timer ends early. Timer callbacks only enqueue an event; they never touch
//! channel state directly.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Aborts the timer task on drop.
#[derive(Debug)]
pub struct TimerGuard {
    task: JoinHandle<()>,
}

impl TimerGuard {
    /// Run `fire` once after `delay`.
    pub fn once<F>(delay: Duration, fire: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            fire();
        });
        Self { task }
    }

    /// Run `fire` every `period`, first after one full period.
    pub fn every<F>(period: Duration, fire: F) -> Self
    where
        F: Fn() + Send + 'static,
    {
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                fire();
            }
        });
        Self { task }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for TimerGuard {
    fn drop(&mut self) {
        self.task.abort();
    }
}
