//! HTTP redirect correctness

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header::LOCATION, redirect::Policy, Client, Url};

use crate::checks::{CheckConfig, CheckResult, ConfigError, Probe, Telemetry};

/// Requests `from` without following redirects and expects a redirect to `to`
#[derive(Debug, Clone)]
pub struct RedirectProbe {
    from: Url,
    to: String,
    client: Client,
}

impl RedirectProbe {
    pub fn new(from: Url, to: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .redirect(Policy::none())
            .timeout(timeout)
            .user_agent(concat!("lookout/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            from,
            to: to.into(),
            client,
        })
    }

    fn evaluate(&self, status: reqwest::StatusCode, location: Option<&str>) -> CheckResult {
        if !status.is_redirection() {
            return CheckResult::failed(format!("no redirect, HTTP status {}", status.as_u16()));
        }
        match location {
            Some(location) if location == self.to => CheckResult::ok(),
            Some(_) => CheckResult::failed(format!("redirect does not point to {}", self.to)),
            None => CheckResult::failed("redirect without Location header"),
        }
    }
}

pub fn from_config(config: &mut CheckConfig) -> Result<Box<dyn Probe>, ConfigError> {
    let raw_from = config.require_str("from")?;
    let from = Url::parse(&raw_from).map_err(|e| config.invalid("from", &e.to_string()))?;
    let to = config.require_str("to")?;
    let timeout = config.take_timeout()?;

    let probe = RedirectProbe::new(from, to, timeout)
        .map_err(|e| config.invalid("from", &e.to_string()))?;
    Ok(Box::new(probe))
}

#[async_trait]
impl Probe for RedirectProbe {
    async fn perform(&self, telemetry: &mut Telemetry) -> CheckResult {
        let response = match self.client.get(self.from.clone()).send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return CheckResult::failed("timeout"),
            Err(e) => {
                telemetry.set("error", e.to_string());
                return CheckResult::failed("request failed");
            }
        };

        let status = response.status();
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok());
        telemetry.set("status", status.as_u16());
        telemetry.set("location", location);

        self.evaluate(status, location)
    }

    fn description(&self) -> String {
        format!("HTTP(s) redirect check, from {}, to {}", self.from, self.to)
    }

    fn kind(&self) -> &'static str {
        "redir"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    fn probe() -> RedirectProbe {
        RedirectProbe::new(
            Url::parse("http://example.com/").unwrap(),
            "https://example.com/",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_evaluate_redirects() {
        let probe = probe();
        assert!(probe
            .evaluate(StatusCode::MOVED_PERMANENTLY, Some("https://example.com/"))
            .is_ok());
        // The observed target differs cycle to cycle on some sites; the reason must not.
        for location in ["https://example.org/a", "https://example.org/b"] {
            assert_eq!(
                probe.evaluate(StatusCode::FOUND, Some(location)).reason(),
                "redirect does not point to https://example.com/"
            );
        }
        assert_eq!(
            probe.evaluate(StatusCode::OK, None).reason(),
            "no redirect, HTTP status 200"
        );
        assert!(!probe.evaluate(StatusCode::FOUND, None).is_ok());
    }

    #[test]
    fn test_from_config_requires_target() {
        let mut config = CheckConfig::from_json(serde_json::json!({
            "kind": "redir",
            "from": "http://example.com/"
        }))
        .unwrap();
        assert!(matches!(
            from_config(&mut config),
            Err(ConfigError::MissingKey { key, .. }) if key == "to"
        ));
    }
}
