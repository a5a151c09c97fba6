use std::time::Duration;

use tokio::time::Instant;

// Stand-in deadline for timeouts too large to add to `Instant::now()`
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Deadline after which a quiet subscriber is owed a heartbeat
#[derive(Debug, Clone)]
pub struct IdleTimer {
    idle_timeout: Duration,
    deadline: Instant,
}

impl IdleTimer {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            idle_timeout,
            deadline: Self::deadline_after(idle_timeout),
        }
    }

    fn deadline_after(idle_timeout: Duration) -> Instant {
        let now = Instant::now();
        now.checked_add(idle_timeout).unwrap_or(now + FAR_FUTURE)
    }

    pub fn reset(&mut self) {
        self.deadline = Self::deadline_after(self.idle_timeout);
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub fn is_expired(&self) -> bool {
        self.deadline <= Instant::now()
    }
}
