// src/health/probe.rs
//! Probe adapters: one HTTP check per target, combined into a single outcome.
//! Errors and timeouts count as failed checks and never propagate.

use anyhow::Result;
use async_trait::async_trait;
use metrics::counter;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{HealthConfig, ProbeTarget};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeMethod {
    #[default]
    Get,
    Post,
}

impl FromStr for ProbeMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(ProbeMethod::Get),
            "POST" => Ok(ProbeMethod::Post),
            other => anyhow::bail!("unsupported probe method '{other}'"),
        }
    }
}

/// How several probe outcomes fold into one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombineMode {
    /// Only the first probe counts.
    #[default]
    Single,
    /// Healthy only if every probe succeeded (AND).
    All,
    /// Healthy if any probe succeeded (OR).
    Any,
}

impl FromStr for CombineMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" | "first" => Ok(CombineMode::Single),
            "all" | "and" => Ok(CombineMode::All),
            "any" | "or" => Ok(CombineMode::Any),
            other => anyhow::bail!("unknown combine mode '{other}'"),
        }
    }
}

impl CombineMode {
    pub fn combine(self, outcomes: &[bool]) -> bool {
        match self {
            CombineMode::Single => outcomes.first().copied().unwrap_or(false),
            CombineMode::All => !outcomes.is_empty() && outcomes.iter().all(|ok| *ok),
            CombineMode::Any => outcomes.iter().any(|ok| *ok),
        }
    }
}

#[async_trait]
pub trait Probe: Send + Sync {
    /// One health check. Never errors: failures and timeouts are `false`.
    async fn check(&self) -> bool;
    fn label(&self) -> String;
}

pub struct HttpProbe {
    target: ProbeTarget,
    client: Client,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(target: ProbeTarget) -> Self {
        Self {
            target,
            client: Client::new(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    async fn status(&self) -> Result<reqwest::StatusCode> {
        let req = match self.target.method {
            ProbeMethod::Get => self.client.get(&self.target.url),
            ProbeMethod::Post => {
                let req = self.client.post(&self.target.url);
                match &self.target.body {
                    Some(body) => req
                        .header(reqwest::header::CONTENT_TYPE, "application/json")
                        .body(body.clone()),
                    None => req,
                }
            }
        };
        let rsp = req.timeout(self.timeout).send().await?;
        Ok(rsp.status())
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn check(&self) -> bool {
        match self.status().await {
            Ok(status) => {
                tracing::debug!(target: "health", url = %self.target.url, %status, "probe");
                status.is_success()
            }
            Err(e) => {
                tracing::debug!(target: "health", url = %self.target.url, "probe error: {e}");
                false
            }
        }
    }

    fn label(&self) -> String {
        self.target.url.clone()
    }
}

/// Several probes behind one logical target.
pub struct CompositeProbe {
    probes: Vec<Arc<dyn Probe>>,
    mode: CombineMode,
}

impl CompositeProbe {
    pub fn new(probes: Vec<Arc<dyn Probe>>, mode: CombineMode) -> Self {
        Self { probes, mode }
    }

    pub fn from_config(cfg: &HealthConfig) -> Self {
        let probes = cfg
            .targets
            .iter()
            .cloned()
            .map(|t| Arc::new(HttpProbe::new(t).with_timeout(cfg.timeout_secs)) as Arc<dyn Probe>)
            .collect();
        Self::new(probes, cfg.combine)
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }
}

#[async_trait]
impl Probe for CompositeProbe {
    async fn check(&self) -> bool {
        let probes: &[Arc<dyn Probe>] = match self.mode {
            CombineMode::Single => &self.probes[..self.probes.len().min(1)],
            _ => &self.probes,
        };

        let mut set = tokio::task::JoinSet::new();
        for (idx, p) in probes.iter().enumerate() {
            let p = Arc::clone(p);
            set.spawn(async move { (idx, p.check().await) });
        }
        let mut outcomes = vec![false; probes.len()];
        while let Some(res) = set.join_next().await {
            if let Ok((idx, ok)) = res {
                outcomes[idx] = ok;
            }
        }

        let ok = self.mode.combine(&outcomes);
        counter!("health_checks_total", "outcome" => if ok { "ok" } else { "fail" }).increment(1);
        ok
    }

    fn label(&self) -> String {
        let labels: Vec<String> = self.probes.iter().map(|p| p.label()).collect();
        format!("{:?}[{}]", self.mode, labels.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(bool);

    #[async_trait]
    impl Probe for Fixed {
        async fn check(&self) -> bool {
            self.0
        }
        fn label(&self) -> String {
            format!("fixed:{}", self.0)
        }
    }

    #[test]
    fn combine_modes() {
        assert!(CombineMode::All.combine(&[true, true]));
        assert!(!CombineMode::All.combine(&[true, false]));
        assert!(!CombineMode::All.combine(&[]));
        assert!(CombineMode::Any.combine(&[false, true]));
        assert!(!CombineMode::Any.combine(&[false, false]));
        assert!(!CombineMode::Single.combine(&[false, true]));
        assert!(CombineMode::Single.combine(&[true, false]));
    }

    #[test]
    fn combine_mode_aliases_parse() {
        assert_eq!("AND".parse::<CombineMode>().unwrap(), CombineMode::All);
        assert_eq!("or".parse::<CombineMode>().unwrap(), CombineMode::Any);
        assert!("xor".parse::<CombineMode>().is_err());
    }

    #[tokio::test]
    async fn composite_applies_mode() {
        let probes: Vec<Arc<dyn Probe>> = vec![Arc::new(Fixed(false)), Arc::new(Fixed(true))];
        assert!(CompositeProbe::new(probes.clone(), CombineMode::Any).check().await);
        assert!(!CompositeProbe::new(probes.clone(), CombineMode::All).check().await);
        assert!(!CompositeProbe::new(probes, CombineMode::Single).check().await);
        assert!(!CompositeProbe::new(vec![], CombineMode::Any).check().await);
    }

    #[tokio::test]
    async fn unreachable_target_is_a_failed_check() {
        let probe = HttpProbe::new(ProbeTarget {
            url: "http://127.0.0.1:9/health".into(),
            method: ProbeMethod::Get,
            body: None,
        })
        .with_timeout(1);
        assert!(!probe.check().await);
    }
}
