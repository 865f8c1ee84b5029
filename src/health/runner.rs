// src/health/runner.rs
use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};

use super::probe::Probe;
use super::{DebounceCfg, Debouncer, HealthSample, Transition};
use crate::config::HealthConfig;
use crate::format::MessageFormatter;
use crate::notify::Notifier;
use crate::state::MonitorState;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("health_checks_total", "Combined probe samples, by outcome.");
        describe_counter!("health_transitions_total", "Debounced UP/DOWN transitions.");
    });
}

/// Sampling loop: probe → debouncer → notifier.
pub struct HealthMonitor {
    service: String,
    probe: Arc<dyn Probe>,
    debouncer: Debouncer,
    interval: Duration,
    degraded_interval: Duration,
    notifier: Arc<dyn Notifier>,
    formatter: MessageFormatter,
    state: MonitorState,
    sends: JoinSet<()>,
}

impl HealthMonitor {
    pub fn from_config(
        cfg: &HealthConfig,
        probe: Arc<dyn Probe>,
        notifier: Arc<dyn Notifier>,
        formatter: MessageFormatter,
        state: MonitorState,
    ) -> Self {
        Self {
            service: cfg.name.clone(),
            probe,
            debouncer: Debouncer::new(DebounceCfg::new(
                cfg.down_fails_min,
                cfg.back_succ_min,
                cfg.back_window_secs,
            )),
            interval: Duration::from_secs(cfg.interval_secs),
            degraded_interval: Duration::from_secs(cfg.degraded_interval_secs()),
            notifier,
            formatter,
            state,
            sends: JoinSet::new(),
        }
    }

    pub fn debouncer(&self) -> &Debouncer {
        &self.debouncer
    }

    /// Shorter cadence while down or failing, to catch the recovery edge sooner.
    pub fn next_delay(&self) -> Duration {
        if self.debouncer.is_degraded() {
            self.degraded_interval
        } else {
            self.interval
        }
    }

    /// Take one sample at `now`, update the shared state and notify on a transition.
    /// The send runs in the background; a failure is logged and the transition stands.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> Option<Transition> {
        ensure_metrics_described();
        while self.sends.try_join_next().is_some() {}
        let ok = self.probe.check().await;
        let transition = self.debouncer.observe(HealthSample { at: now, ok });
        let st = *self.debouncer.state();

        tracing::debug!(
            target: "health",
            ok,
            verdict = ?st.verdict,
            succ = st.success_streak,
            fail = st.fail_streak,
            "sample"
        );
        self.state
            .record_health(&st, ok, now, transition.as_ref())
            .await;

        if let Some(t) = &transition {
            let to = match t {
                Transition::Down { .. } => "down",
                Transition::Up { .. } => "up",
            };
            counter!("health_transitions_total", "to" => to).increment(1);
            tracing::info!(target: "health", service = %self.service, to, "verdict changed");

            let text = self.formatter.health_transition(&self.service, t);
            let notifier = Arc::clone(&self.notifier);
            self.sends.spawn(async move {
                if let Err(e) = notifier.notify(&text).await {
                    tracing::warn!(target: "health", "transition notification failed: {e:#}");
                }
            });
        }
        transition
    }

    /// Wait for in-flight transition notifications.
    pub async fn flush_sends(&mut self) {
        while self.sends.join_next().await.is_some() {}
    }

    pub async fn run(mut self) {
        tracing::info!(
            target: "health",
            service = %self.service,
            probe = %self.probe.label(),
            interval_s = self.interval.as_secs(),
            degraded_interval_s = self.degraded_interval.as_secs(),
            "health monitor started"
        );
        loop {
            if self.state.is_paused().await {
                tracing::trace!(target: "health", "paused, skipping sample");
                tokio::time::sleep(self.interval).await;
                continue;
            }
            self.tick(Utc::now()).await;
            tokio::time::sleep(self.next_delay()).await;
        }
    }
}

pub fn spawn_health_monitor(monitor: HealthMonitor) -> JoinHandle<()> {
    tokio::spawn(monitor.run())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::Verdict;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Scripted {
        outcomes: Vec<bool>,
        idx: AtomicUsize,
    }

    #[async_trait]
    impl Probe for Scripted {
        async fn check(&self) -> bool {
            let i = self.idx.fetch_add(1, Ordering::SeqCst);
            self.outcomes.get(i).copied().unwrap_or(false)
        }
        fn label(&self) -> String {
            "scripted".into()
        }
    }

    #[derive(Default)]
    struct Failing {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for Failing {
        async fn notify(&self, text: &str) -> anyhow::Result<()> {
            self.seen.lock().unwrap().push(text.to_string());
            anyhow::bail!("transport down")
        }
        fn name(&self) -> &'static str {
            "failing"
        }
    }

    #[tokio::test]
    async fn send_failure_does_not_roll_back_transition() {
        let cfg = HealthConfig {
            name: "API".into(),
            down_fails_min: 2,
            interval_secs: 60,
            ..HealthConfig::default()
        };
        let notifier = Arc::new(Failing::default());
        let state = MonitorState::new("API", Utc::now(), None);
        let mut m = HealthMonitor::from_config(
            &cfg,
            Arc::new(Scripted {
                outcomes: vec![false, false, false],
                idx: AtomicUsize::new(0),
            }),
            notifier.clone(),
            MessageFormatter::default(),
            state.clone(),
        );

        let t0 = Utc::now();
        assert_eq!(m.next_delay(), Duration::from_secs(60));
        assert!(m.tick(t0).await.is_none());
        assert_eq!(m.next_delay(), Duration::from_secs(15));
        assert!(m.tick(t0).await.is_some());
        assert!(m.tick(t0).await.is_none());
        m.flush_sends().await;

        assert_eq!(m.debouncer().verdict(), Verdict::Down);
        assert_eq!(notifier.seen.lock().unwrap().len(), 1);
        let snap = state.snapshot().await;
        assert_eq!(snap.health.verdict, Verdict::Down);
        assert_eq!(snap.health.fail_streak, 3);
        assert_eq!(snap.health.checks_total, 3);
    }

    struct Stalled;

    #[async_trait]
    impl Notifier for Stalled {
        async fn notify(&self, _text: &str) -> anyhow::Result<()> {
            std::future::pending::<()>().await;
            Ok(())
        }
        fn name(&self) -> &'static str {
            "stalled"
        }
    }

    #[tokio::test]
    async fn stalled_transport_does_not_hold_up_sampling() {
        let cfg = HealthConfig {
            down_fails_min: 1,
            ..HealthConfig::default()
        };
        let state = MonitorState::new("API", Utc::now(), None);
        let mut m = HealthMonitor::from_config(
            &cfg,
            Arc::new(Scripted {
                outcomes: vec![false, false],
                idx: AtomicUsize::new(0),
            }),
            Arc::new(Stalled),
            MessageFormatter::default(),
            state.clone(),
        );

        let t0 = Utc::now();
        let first = tokio::time::timeout(Duration::from_secs(1), m.tick(t0)).await;
        assert!(matches!(first, Ok(Some(Transition::Down { .. }))));
        let second = tokio::time::timeout(Duration::from_secs(1), m.tick(t0)).await;
        assert!(matches!(second, Ok(None)));
        assert_eq!(state.snapshot().await.health.checks_total, 2);
    }
}
