//! Liveness watchdog - forces a reconnect after prolonged feed silence
//!
//! The watchdog tracks a single deadline. Every liveness signal while
//! armed pushes the deadline out; the runtime sleeps until the deadline
//! inside its event loop, so moving it atomically cancels the pending
//! firing. When the deadline elapses the machine enters `Firing` and the
//! runtime replaces the feed connection, retrying until it succeeds.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogState {
    /// Deadline timer running; signals of life re-arm it.
    Armed,
    /// Deadline elapsed; a reconnect is in progress.
    Firing,
}

#[derive(Debug)]
pub struct Watchdog {
    timeout: Duration,
    deadline: Instant,
    state: WatchdogState,
}

impl Watchdog {
    /// Start armed with a full quiet period ahead.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: Instant::now() + timeout,
            state: WatchdogState::Armed,
        }
    }

    pub fn state(&self) -> WatchdogState {
        self.state
    }

    /// The instant the runtime must sleep until.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// A sign of life arrived. Pushes the deadline out while armed;
    /// ignored mid-reconnect, where a stale signal must not mask a dead
    /// connection being replaced.
    pub fn record_liveness(&mut self) {
        if self.state == WatchdogState::Armed {
            self.deadline = Instant::now() + self.timeout;
        }
    }

    /// The deadline elapsed; a reconnect attempt is starting.
    pub fn fire(&mut self) {
        self.state = WatchdogState::Firing;
    }

    /// A replacement connection is installed; start a fresh quiet period.
    pub fn rearm(&mut self) {
        self.state = WatchdogState::Armed;
        self.deadline = Instant::now() + self.timeout;
    }
}
