// src/health/mod.rs
//! # Health Debouncer
//! Turns noisy boolean probe outcomes into rare UP/DOWN transitions.
//!
//! ```text
//! any   → Down : verdict != Down && fail_streak >= down_fails_min
//! any   → Up   : verdict != Up   && success_streak >= back_succ_min
//!                                && now - first_success_at >= back_window
//! ```
//!
//! Going down is fast, coming back is slow: recovery has to hold for a whole
//! stability window, and a single failure restarts that window.
//! Pure state machine, no I/O; the sampling loop lives in [`runner`].

pub mod probe;
pub mod runner;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    #[default]
    Unknown,
    Up,
    Down,
}

/// One sampling tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthSample {
    pub at: DateTime<Utc>,
    pub ok: bool,
}

/// A realized verdict change, delivered once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Down {
        at: DateTime<Utc>,
        fail_streak: u32,
    },
    Up {
        at: DateTime<Utc>,
        success_streak: u32,
        stable_for: Duration,
    },
}

impl Transition {
    pub fn verdict(&self) -> Verdict {
        match self {
            Transition::Down { .. } => Verdict::Down,
            Transition::Up { .. } => Verdict::Up,
        }
    }

    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Transition::Down { at, .. } | Transition::Up { at, .. } => *at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct HealthState {
    pub verdict: Verdict,
    pub success_streak: u32,
    pub fail_streak: u32,
    /// Start of the current success run; `None` while failing.
    pub first_success_at: Option<DateTime<Utc>>,
}

/// Upper bound for the stability window (one year).
const MAX_WINDOW_SECS: i64 = 365 * 24 * 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceCfg {
    pub down_fails_min: u32,
    pub back_succ_min: u32,
    pub back_window: Duration,
}

impl DebounceCfg {
    pub fn new(down_fails_min: u32, back_succ_min: u32, back_window_secs: u64) -> Self {
        Self {
            down_fails_min: down_fails_min.max(1),
            back_succ_min: back_succ_min.max(1),
            back_window: Duration::seconds(
                i64::try_from(back_window_secs)
                    .unwrap_or(i64::MAX)
                    .min(MAX_WINDOW_SECS),
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Debouncer {
    cfg: DebounceCfg,
    state: HealthState,
}

impl Debouncer {
    pub fn new(cfg: DebounceCfg) -> Self {
        Self {
            cfg,
            state: HealthState::default(),
        }
    }

    pub fn state(&self) -> &HealthState {
        &self.state
    }

    pub fn verdict(&self) -> Verdict {
        self.state.verdict
    }

    /// True while down or inside a failure streak (adaptive sampling hint).
    pub fn is_degraded(&self) -> bool {
        self.state.verdict == Verdict::Down || self.state.fail_streak > 0
    }

    pub fn observe(&mut self, sample: HealthSample) -> Option<Transition> {
        self.record(sample.ok, sample.at)
    }

    /// Feed one outcome taken at `now`; returns the transition it caused, if any.
    pub fn record(&mut self, ok: bool, now: DateTime<Utc>) -> Option<Transition> {
        let s = &mut self.state;
        if ok {
            if s.success_streak == 0 {
                s.first_success_at = Some(now);
            }
            s.success_streak = s.success_streak.saturating_add(1);
            s.fail_streak = 0;
        } else {
            s.fail_streak = s.fail_streak.saturating_add(1);
            s.success_streak = 0;
            s.first_success_at = None;
        }

        if s.verdict != Verdict::Down && s.fail_streak >= self.cfg.down_fails_min {
            s.verdict = Verdict::Down;
            return Some(Transition::Down {
                at: now,
                fail_streak: s.fail_streak,
            });
        }

        if s.verdict != Verdict::Up && s.success_streak >= self.cfg.back_succ_min {
            if let Some(start) = s.first_success_at {
                let stable_for = now.signed_duration_since(start);
                if stable_for >= self.cfg.back_window {
                    s.verdict = Verdict::Up;
                    return Some(Transition::Up {
                        at: now,
                        success_streak: s.success_streak,
                        stable_for,
                    });
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 6, 9, 0, 0).unwrap() + Duration::seconds(secs)
    }

    #[test]
    fn failure_resets_success_run_and_window() {
        let mut d = Debouncer::new(DebounceCfg::new(2, 2, 120));
        d.record(true, t(0));
        assert_eq!(d.state().first_success_at, Some(t(0)));
        d.record(false, t(60));
        assert_eq!(d.state().success_streak, 0);
        assert_eq!(d.state().first_success_at, None);
        d.record(true, t(120));
        assert_eq!(d.state().first_success_at, Some(t(120)));
        assert_eq!(d.state().fail_streak, 0);
    }

    #[test]
    fn down_is_edge_triggered() {
        let mut d = Debouncer::new(DebounceCfg::new(2, 1, 0));
        assert_eq!(d.record(false, t(0)), None);
        assert!(matches!(d.record(false, t(60)), Some(Transition::Down { fail_streak: 2, .. })));
        assert_eq!(d.record(false, t(120)), None);
        assert_eq!(d.record(false, t(180)), None);
        assert!(d.is_degraded());
    }

    #[test]
    fn up_needs_streak_and_window() {
        let mut d = Debouncer::new(DebounceCfg::new(2, 2, 300));
        // streak reached at t=60 but window not yet elapsed
        assert_eq!(d.record(true, t(0)), None);
        assert_eq!(d.record(true, t(60)), None);
        assert_eq!(d.record(true, t(240)), None);
        let up = d.record(true, t(300));
        assert!(matches!(up, Some(Transition::Up { success_streak: 4, .. })));
        if let Some(Transition::Up { stable_for, .. }) = up {
            assert_eq!(stable_for, Duration::seconds(300));
        }
        assert_eq!(d.verdict(), Verdict::Up);
        assert!(!d.is_degraded());
    }

    #[test]
    fn zero_thresholds_are_raised() {
        let cfg = DebounceCfg::new(0, 0, 10);
        assert_eq!(cfg.down_fails_min, 1);
        assert_eq!(cfg.back_succ_min, 1);
    }
}
