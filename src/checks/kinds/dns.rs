//! Name resolution through the system resolver

use std::collections::BTreeSet;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::time::timeout;

use crate::checks::{CheckConfig, CheckResult, ConfigError, Probe, Telemetry};

/// Resolves a name and requires every answer to be in the acceptable set.
///
/// A single answer outside the set fails the check, so a stray record in a
/// round-robin pool is caught even when the other answers are fine.
#[derive(Debug, Clone)]
pub struct DnsProbe {
    name: String,
    acceptable: BTreeSet<IpAddr>,
    timeout: Duration,
}

impl DnsProbe {
    pub fn new(name: impl Into<String>, acceptable: impl IntoIterator<Item = IpAddr>) -> Self {
        Self {
            name: name.into(),
            acceptable: acceptable.into_iter().collect(),
            timeout: crate::checks::DEFAULT_PROBE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Judge a set of answers. Offending addresses go to telemetry, not the
    /// reason, so a rotating pool keeps one failure history.
    fn evaluate(&self, answers: &BTreeSet<IpAddr>, telemetry: &mut Telemetry) -> CheckResult {
        if answers.is_empty() {
            return CheckResult::failed(format!("no answer for {}", self.name));
        }
        let unacceptable: Vec<String> = answers
            .difference(&self.acceptable)
            .map(|ip| ip.to_string())
            .collect();
        if unacceptable.is_empty() {
            return CheckResult::ok();
        }
        telemetry.set("unacceptable", unacceptable.join(", "));
        CheckResult::failed(format!("unacceptable answer for {}", self.name))
    }
}

pub fn from_config(config: &mut CheckConfig) -> Result<Box<dyn Probe>, ConfigError> {
    let name = config.require_str("name")?;
    let acceptable = config.require_ip_list("acceptable")?;
    let timeout = config.take_timeout()?;
    Ok(Box::new(DnsProbe::new(name, acceptable).with_timeout(timeout)))
}

#[async_trait]
impl Probe for DnsProbe {
    async fn perform(&self, telemetry: &mut Telemetry) -> CheckResult {
        let start = Instant::now();
        let lookup = timeout(
            self.timeout,
            tokio::net::lookup_host((self.name.as_str(), 0)),
        )
        .await;
        telemetry.set("msecs", start.elapsed().as_secs_f64() * 1000.0);

        let answers: BTreeSet<IpAddr> = match lookup {
            Err(_) => return CheckResult::failed(format!("timeout resolving {}", self.name)),
            Ok(Err(e)) => {
                telemetry.set("error", e.to_string());
                return CheckResult::failed(format!("resolution failed for {}", self.name));
            }
            Ok(Ok(addrs)) => addrs.map(|addr| addr.ip()).collect(),
        };
        telemetry.set("answers", answers.len());

        self.evaluate(&answers, telemetry)
    }

    fn description(&self) -> String {
        let acceptable: Vec<String> = self.acceptable.iter().map(|ip| ip.to_string()).collect();
        format!(
            "DNS check, name {}, acceptable: {}",
            self.name,
            acceptable.join(", ")
        )
    }

    fn kind(&self) -> &'static str {
        "dns"
    }
}
