use std::time::Duration;

pub trait InvocationBudget {
    /// Time left before the invoking environment stops the invocation, or
    /// `None` when there is no deadline.
    fn remaining(&self) -> Option<Duration>;
}

pub struct NoDeadline;

impl InvocationBudget for NoDeadline {
    fn remaining(&self) -> Option<Duration> {
        None
    }
}

/// Deadline expressed in milliseconds since the Unix epoch, as handed to
/// Lambda handlers.
pub struct EpochDeadline {
    deadline_ms: i64,
}

impl EpochDeadline {
    pub fn new(deadline_ms: u64) -> Self {
        Self {
            deadline_ms: i64::try_from(deadline_ms).unwrap_or(i64::MAX),
        }
    }

    fn remaining_at(&self, now_ms: i64) -> Duration {
        let left = self.deadline_ms.saturating_sub(now_ms).max(0);
        Duration::from_millis(left as u64)
    }
}

impl InvocationBudget for EpochDeadline {
    fn remaining(&self) -> Option<Duration> {
        Some(self.remaining_at(chrono::Utc::now().timestamp_millis()))
    }
}
