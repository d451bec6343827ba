//! HTTP(S) endpoint health

use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header::LAST_MODIFIED, tls::TlsInfo, Client, Method, Url};

use crate::checks::{CheckConfig, CheckResult, ConfigError, Probe, Telemetry};

/// Default minimum remaining certificate validity in days
pub const DEFAULT_MIN_CERT_DAYS: i64 = 14;

const SECS_PER_DAY: i64 = 86_400;

/// Fetches a URL and requires a 2xx status, a minimum body size, a
/// certificate that is not about to expire and optionally fresh content.
///
/// Failure reasons never carry measured values; those go to telemetry so a
/// persistent fault keeps a single reason across cycles.
#[derive(Debug, Clone)]
pub struct HttpsProbe {
    url: Url,
    method: Method,
    min_bytes: usize,
    server_ip: Option<IpAddr>,
    /// Zero disables the certificate check
    min_cert_days: i64,
    max_age_minutes: Option<i64>,
    client: Client,
}

impl HttpsProbe {
    pub fn new(
        url: Url,
        method: Method,
        min_bytes: usize,
        server_ip: Option<IpAddr>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let mut builder = Client::builder()
            .timeout(timeout)
            .tls_info(true)
            .user_agent(concat!("lookout/", env!("CARGO_PKG_VERSION")));

        // Pin the host name to a specific server, bypassing DNS.
        if let (Some(ip), Some(host)) = (server_ip, url.host_str()) {
            let port = url.port_or_known_default().unwrap_or(443);
            builder = builder.resolve(host, SocketAddr::new(ip, port));
        }

        Ok(Self {
            url,
            method,
            min_bytes,
            server_ip,
            min_cert_days: DEFAULT_MIN_CERT_DAYS,
            max_age_minutes: None,
            client: builder.build()?,
        })
    }

    pub fn with_min_cert_days(mut self, days: i64) -> Self {
        self.min_cert_days = days;
        self
    }

    pub fn with_max_age_minutes(mut self, minutes: Option<i64>) -> Self {
        self.max_age_minutes = minutes;
        self
    }

    fn checks_certificate(&self) -> bool {
        self.url.scheme() == "https" && self.min_cert_days > 0
    }

    fn evaluate(&self, status: reqwest::StatusCode, bytes: usize) -> CheckResult {
        if !status.is_success() {
            return CheckResult::failed(format!("HTTP status {}", status.as_u16()));
        }
        if bytes < self.min_bytes {
            return CheckResult::failed(format!("body smaller than {} bytes", self.min_bytes));
        }
        CheckResult::ok()
    }

    /// Judge the peer certificate's DER encoding as of `now`
    fn evaluate_certificate(
        &self,
        der: Option<&[u8]>,
        now: DateTime<Utc>,
        telemetry: &mut Telemetry,
    ) -> CheckResult {
        let Some(der) = der else {
            return CheckResult::failed("no peer certificate");
        };
        let not_after = match x509_parser::parse_x509_certificate(der) {
            Ok((_, cert)) => cert.validity().not_after.timestamp(),
            Err(e) => {
                telemetry.set("error", e.to_string());
                return CheckResult::failed("unparseable peer certificate");
            }
        };

        let days_left = (not_after - now.timestamp()).div_euclid(SECS_PER_DAY);
        telemetry.set("cert_days", days_left);
        if days_left < self.min_cert_days {
            return CheckResult::failed(format!(
                "certificate expires within {} days",
                self.min_cert_days
            ));
        }
        CheckResult::ok()
    }

    /// Judge a `Last-Modified` header value as of `now`
    fn evaluate_freshness(
        &self,
        last_modified: Option<&str>,
        now: DateTime<Utc>,
        telemetry: &mut Telemetry,
    ) -> CheckResult {
        let Some(max_age) = self.max_age_minutes else {
            return CheckResult::ok();
        };
        let modified = match last_modified.map(DateTime::parse_from_rfc2822) {
            None => return CheckResult::failed("no Last-Modified header"),
            Some(Err(_)) => return CheckResult::failed("invalid Last-Modified header"),
            Some(Ok(modified)) => modified.with_timezone(&Utc),
        };

        let age = (now - modified).num_minutes();
        telemetry.set("age_minutes", age);
        if age > max_age {
            return CheckResult::failed(format!("content older than {} minutes", max_age));
        }
        CheckResult::ok()
    }
}

pub fn from_config(config: &mut CheckConfig) -> Result<Box<dyn Probe>, ConfigError> {
    let raw_url = config.require_str("url")?;
    let url = Url::parse(&raw_url).map_err(|e| config.invalid("url", &e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(config.invalid("url", "scheme must be http or https"));
    }

    let method = match config.take_str("method")?.as_deref() {
        None | Some("GET") => Method::GET,
        Some("HEAD") => Method::HEAD,
        Some(other) => {
            return Err(config.invalid("method", &format!("unsupported method {}", other)))
        }
    };

    let min_bytes = config.take_u64("minBytes")?.unwrap_or(0) as usize;
    let server_ip = match config.take_str("serverIP")? {
        None => None,
        Some(ip) => Some(
            ip.parse::<IpAddr>()
                .map_err(|e| config.invalid("serverIP", &e.to_string()))?,
        ),
    };
    let min_cert_days = match config.take_u64("minCertDays")? {
        None => DEFAULT_MIN_CERT_DAYS,
        Some(days) => i64::try_from(days)
            .map_err(|_| config.invalid("minCertDays", "value out of range"))?,
    };
    let max_age_minutes = match config.take_u64("maxAgeMinutes")? {
        None => None,
        Some(0) => return Err(config.invalid("maxAgeMinutes", "must be at least 1 minute")),
        Some(minutes) => Some(
            i64::try_from(minutes)
                .map_err(|_| config.invalid("maxAgeMinutes", "value out of range"))?,
        ),
    };
    let timeout = config.take_timeout()?;

    let probe = HttpsProbe::new(url, method, min_bytes, server_ip, timeout)
        .map_err(|e| config.invalid("url", &e.to_string()))?
        .with_min_cert_days(min_cert_days)
        .with_max_age_minutes(max_age_minutes);
    Ok(Box::new(probe))
}

#[async_trait]
impl Probe for HttpsProbe {
    async fn perform(&self, telemetry: &mut Telemetry) -> CheckResult {
        let start = Instant::now();
        let response = match self
            .client
            .request(self.method.clone(), self.url.clone())
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return CheckResult::failed("timeout"),
            Err(e) => {
                telemetry.set("error", e.to_string());
                let reason = if e.is_connect() {
                    "connection failed"
                } else {
                    "request failed"
                };
                return CheckResult::failed(reason);
            }
        };

        let status = response.status();
        let certificate = response
            .extensions()
            .get::<TlsInfo>()
            .and_then(|info| info.peer_certificate())
            .map(<[u8]>::to_vec);
        let last_modified = response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let bytes = match response.bytes().await {
            Ok(body) => body.len(),
            Err(e) => {
                telemetry.set("error", e.to_string());
                return CheckResult::failed("reading body failed");
            }
        };

        telemetry.set("status", status.as_u16());
        telemetry.set("bytes", bytes);
        telemetry.set("msecs", start.elapsed().as_secs_f64() * 1000.0);

        let result = self.evaluate(status, bytes);
        if !result.is_ok() {
            return result;
        }

        let now = Utc::now();
        if self.checks_certificate() {
            let result = self.evaluate_certificate(certificate.as_deref(), now, telemetry);
            if !result.is_ok() {
                return result;
            }
        }
        self.evaluate_freshness(last_modified.as_deref(), now, telemetry)
    }

    fn description(&self) -> String {
        match self.server_ip {
            Some(ip) => format!(
                "HTTPS check, URL {}, method {}, server {}",
                self.url, self.method, ip
            ),
            None => format!("HTTPS check, URL {}, method {}", self.url, self.method),
        }
    }

    fn kind(&self) -> &'static str {
        "https"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::AlertFilter;
    use crate::checks::{AlertParams, CheckId};
    use crate::data::Value;
    use chrono::TimeZone;
    use serde_json::json;

    fn probe(min_bytes: usize) -> HttpsProbe {
        HttpsProbe::new(
            Url::parse("https://example.com/").unwrap(),
            Method::GET,
            min_bytes,
            None,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_evaluate_status_and_size() {
        let probe = probe(100);
        assert!(probe.evaluate(reqwest::StatusCode::OK, 500).is_ok());
        assert_eq!(
            probe.evaluate(reqwest::StatusCode::BAD_GATEWAY, 500).reason(),
            "HTTP status 502"
        );
        assert_eq!(
            probe.evaluate(reqwest::StatusCode::OK, 10).reason(),
            "body smaller than 100 bytes"
        );
    }

    #[test]
    fn test_short_bodies_of_varying_size_accumulate() {
        let probe = probe(512);
        let filter = AlertFilter::default();
        let check = CheckId::next();
        let params = AlertParams::new(3, 120);

        for (t, bytes) in [(0, 100), (30, 101), (60, 102)] {
            let result = probe.evaluate(reqwest::StatusCode::OK, bytes);
            filter.report(check, params, result.reason(), t);
        }

        let active = filter.filtered_results(60);
        assert_eq!(active.len(), 1);
        assert_eq!(filter.tracked_pairs(), 1);
    }

    /// Self-signed P-256 certificate valid until 2026-11-18T01:18:30Z
    const CERT_DER: &[u8] = include_bytes!("testdata/example.der");
    const CERT_NOT_AFTER: i64 = 1_794_964_710;

    #[test]
    fn test_certificate_expiry() {
        let probe = probe(0);
        let mut telemetry = Telemetry::default();

        let plenty = at(CERT_NOT_AFTER - 30 * SECS_PER_DAY);
        assert!(probe
            .evaluate_certificate(Some(CERT_DER), plenty, &mut telemetry)
            .is_ok());
        assert_eq!(telemetry.attributes.get("cert_days"), Some(&Value::Int64(30)));

        let soon = at(CERT_NOT_AFTER - 10 * SECS_PER_DAY);
        assert_eq!(
            probe
                .evaluate_certificate(Some(CERT_DER), soon, &mut telemetry)
                .reason(),
            "certificate expires within 14 days"
        );

        let expired = at(CERT_NOT_AFTER + SECS_PER_DAY);
        assert!(!probe
            .evaluate_certificate(Some(CERT_DER), expired, &mut telemetry)
            .is_ok());
    }

    #[test]
    fn test_missing_or_broken_certificate() {
        let probe = probe(0);
        let now = at(CERT_NOT_AFTER);
        let mut telemetry = Telemetry::default();

        assert_eq!(
            probe.evaluate_certificate(None, now, &mut telemetry).reason(),
            "no peer certificate"
        );
        assert_eq!(
            probe
                .evaluate_certificate(Some(b"not a certificate"), now, &mut telemetry)
                .reason(),
            "unparseable peer certificate"
        );
    }

    #[test]
    fn test_certificate_check_applies_to_https_only() {
        assert!(probe(0).checks_certificate());
        assert!(!probe(0).with_min_cert_days(0).checks_certificate());

        let plain = HttpsProbe::new(
            Url::parse("http://example.com/").unwrap(),
            Method::GET,
            0,
            None,
            Duration::from_secs(5),
        )
        .unwrap();
        assert!(!plain.checks_certificate());
    }

    #[test]
    fn test_content_freshness() {
        let probe = probe(0).with_max_age_minutes(Some(60));
        let now = at(784_111_777 + 3600 * 2);
        let header = "Sun, 06 Nov 1994 08:49:37 GMT";
        let mut telemetry = Telemetry::default();

        assert_eq!(
            probe
                .evaluate_freshness(Some(header), now, &mut telemetry)
                .reason(),
            "content older than 60 minutes"
        );
        assert_eq!(telemetry.attributes.get("age_minutes"), Some(&Value::Int64(120)));

        let fresh = at(784_111_777 + 30 * 60);
        assert!(probe
            .evaluate_freshness(Some(header), fresh, &mut telemetry)
            .is_ok());
        assert_eq!(
            probe.evaluate_freshness(None, fresh, &mut telemetry).reason(),
            "no Last-Modified header"
        );

        // Without a limit the header is not consulted.
        assert!(probe
            .with_max_age_minutes(None)
            .evaluate_freshness(None, fresh, &mut telemetry)
            .is_ok());
    }

    #[test]
    fn test_from_config() {
        let mut config = CheckConfig::from_json(json!({
            "kind": "https",
            "url": "https://example.com/health",
            "method": "HEAD",
            "minBytes": 0,
            "serverIP": "192.0.2.10",
            "minCertDays": 30,
            "maxAgeMinutes": 90,
            "timeout": 3
        }))
        .unwrap();
        let probe = from_config(&mut config).unwrap();
        config.ensure_consumed().unwrap();
        assert_eq!(
            probe.description(),
            "HTTPS check, URL https://example.com/health, method HEAD, server 192.0.2.10"
        );
    }

    #[test]
    fn test_from_config_rejects_zero_max_age() {
        let mut config = CheckConfig::from_json(json!({
            "kind": "https",
            "url": "https://example.com/",
            "maxAgeMinutes": 0
        }))
        .unwrap();
        assert!(matches!(
            from_config(&mut config),
            Err(ConfigError::InvalidValue { key, .. }) if key == "maxAgeMinutes"
        ));
    }

    #[test]
    fn test_from_config_rejects_bad_url() {
        let mut config =
            CheckConfig::from_json(json!({"kind": "https", "url": "ftp://example.com"})).unwrap();
        assert!(from_config(&mut config).is_err());

        let mut config =
            CheckConfig::from_json(json!({"kind": "https", "url": "not a url"})).unwrap();
        assert!(from_config(&mut config).is_err());
    }

    #[tokio::test]
    async fn test_connection_failure_is_a_result() {
        let probe = HttpsProbe::new(
            Url::parse("http://127.0.0.1:1/").unwrap(),
            Method::GET,
            0,
            None,
            Duration::from_secs(2),
        )
        .unwrap();
        let mut telemetry = Telemetry::default();
        let result = probe.perform(&mut telemetry).await;
        assert_eq!(result.reason(), "connection failed");
        assert!(telemetry.attributes.contains_key("error"));
    }
}
