use chrono::{DateTime, Duration, Utc};

/// Outcome of a throttle check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Open,
    /// `max_per_poll` deliveries already happened in this cycle.
    PollBudgetSpent,
    /// Last delivery is younger than the cooldown.
    CoolingDown,
}

/// Pacing gate for feed notifications: a per-poll budget plus a cooldown
/// measured from the last successful delivery.
#[derive(Debug, Clone)]
pub struct AntiFlutter {
    cooldown: Duration,
    max_per_poll: usize,
}

impl AntiFlutter {
    /// `cooldown_secs` <= 0 disables the cooldown.
    pub fn new(cooldown_secs: i64, max_per_poll: usize) -> Self {
        Self {
            cooldown: Duration::seconds(cooldown_secs.max(0)),
            max_per_poll,
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Check whether one more delivery may go out at `now`. Does NOT mutate state;
    /// the caller records the send in the cursor.
    pub fn check(
        &self,
        last_sent: Option<DateTime<Utc>>,
        sent_this_poll: usize,
        now: DateTime<Utc>,
    ) -> Gate {
        if sent_this_poll >= self.max_per_poll {
            return Gate::PollBudgetSpent;
        }
        match last_sent {
            Some(ts) if self.cooldown > Duration::zero() && now.signed_duration_since(ts) < self.cooldown => {
                Gate::CoolingDown
            }
            _ => Gate::Open,
        }
    }
}
