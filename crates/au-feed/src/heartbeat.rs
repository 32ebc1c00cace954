//! Keep-alive pings while the channel is connected.
//!
//! The monitor owns at most one repeating timer. It is started on entry to
//! `Connected` and stopped on every exit from it; starting again replaces the
//! previous timer, so two heartbeats can never run for one channel.
//!
//! There is no pong tracking. Loss of liveness is detected only through the
//! transport's own close and error events.

use std::time::Duration;

use tracing::debug;

use crate::timer::TimerGuard;

pub struct HeartbeatMonitor {
    interval: Duration,
    timer: Option<TimerGuard>,
}

impl HeartbeatMonitor {
    pub fn new(interval: Duration) -> Self {
        Self { interval, timer: None }
    }

    /// Start ticking. `on_tick` runs every interval until [`stop`](Self::stop).
    pub fn start<F>(&mut self, on_tick: F)
    where
        F: Fn() + Send + 'static,
    {
        // Assigning drops (and aborts) any previous timer.
        self.timer = Some(TimerGuard::every(self.interval, on_tick));
        debug!("[heartbeat] started, interval={:?}", self.interval);
    }

    pub fn stop(&mut self) {
        if self.timer.take().is_some() {
            debug!("[heartbeat] stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_some()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}
