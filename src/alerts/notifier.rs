//! Notification transports for alert edges

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Default bound on a single notification send
pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

fn http_client(timeout: Duration) -> Result<reqwest::Client, NotifierError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(NotifierError::Client)
}

/// Direction of an alert edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertEdge {
    Raised,
    Cleared,
}

impl AlertEdge {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertEdge::Raised => "raised",
            AlertEdge::Cleared => "cleared",
        }
    }
}

/// Destination for alert notifications. Called from any worker task.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// An incident was raised
    async fn notify(&self, description: &str, reason: &str) -> Result<(), NotifierError>;

    /// A previously raised incident cleared
    async fn clear(&self, description: &str, reason: &str) -> Result<(), NotifierError>;
}

/// Writes alerts to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, description: &str, reason: &str) -> Result<(), NotifierError> {
        tracing::warn!(check = %description, reason = %reason, "Alert raised");
        Ok(())
    }

    async fn clear(&self, description: &str, reason: &str) -> Result<(), NotifierError> {
        tracing::info!(check = %description, reason = %reason, "Alert cleared");
        Ok(())
    }
}

/// Posts a JSON document per alert edge
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    headers: HashMap<String, String>,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, headers: HashMap<String, String>) -> Result<Self, NotifierError> {
        Self::with_timeout(url, headers, DEFAULT_NOTIFY_TIMEOUT)
    }

    pub fn with_timeout(
        url: impl Into<String>,
        headers: HashMap<String, String>,
        timeout: Duration,
    ) -> Result<Self, NotifierError> {
        Ok(Self {
            client: http_client(timeout)?,
            url: url.into(),
            headers,
        })
    }

    async fn send(&self, edge: AlertEdge, description: &str, reason: &str) -> Result<(), NotifierError> {
        let payload = serde_json::json!({
            "event": edge,
            "check": description,
            "reason": reason,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        let mut request = self.client.post(&self.url).json(&payload);
        for (key, value) in &self.headers {
            request = request.header(key, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| NotifierError::Webhook(format!("Failed to send webhook: {}", e)))?;

        if !response.status().is_success() {
            return Err(NotifierError::Webhook(format!(
                "Webhook returned status {}",
                response.status()
            )));
        }

        tracing::debug!(url = %self.url, event = edge.as_str(), "Webhook notification sent");
        Ok(())
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn notify(&self, description: &str, reason: &str) -> Result<(), NotifierError> {
        self.send(AlertEdge::Raised, description, reason).await
    }

    async fn clear(&self, description: &str, reason: &str) -> Result<(), NotifierError> {
        self.send(AlertEdge::Cleared, description, reason).await
    }
}

/// Publishes plain-text messages to an ntfy topic
pub struct NtfyNotifier {
    client: reqwest::Client,
    topic_url: String,
}

impl NtfyNotifier {
    pub fn new(server: &str, topic: &str) -> Result<Self, NotifierError> {
        Self::with_timeout(server, topic, DEFAULT_NOTIFY_TIMEOUT)
    }

    pub fn with_timeout(server: &str, topic: &str, timeout: Duration) -> Result<Self, NotifierError> {
        Ok(Self {
            client: http_client(timeout)?,
            topic_url: format!("{}/{}", server.trim_end_matches('/'), topic),
        })
    }

    pub fn topic_url(&self) -> &str {
        &self.topic_url
    }

    async fn publish(&self, title: &str, body: String, tags: &str) -> Result<(), NotifierError> {
        let response = self
            .client
            .post(&self.topic_url)
            .header("Title", title)
            .header("Tags", tags)
            .body(body)
            .send()
            .await
            .map_err(|e| NotifierError::Ntfy(e.to_string()))?;

        if !response.status().is_success() {
            return Err(NotifierError::Ntfy(format!(
                "ntfy returned status {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for NtfyNotifier {
    fn name(&self) -> &str {
        "ntfy"
    }

    async fn notify(&self, description: &str, reason: &str) -> Result<(), NotifierError> {
        self.publish(description, reason.to_string(), "warning").await
    }

    async fn clear(&self, description: &str, reason: &str) -> Result<(), NotifierError> {
        self.publish(description, format!("cleared: {}", reason), "white_check_mark")
            .await
    }
}

/// Notifier definition as it appears in the checks file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NotifierConfig {
    /// Log via tracing
    Log,
    /// HTTP webhook
    Webhook {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
        /// Request timeout in seconds
        #[serde(default = "default_timeout_secs")]
        timeout: u64,
    },
    /// ntfy topic
    Ntfy {
        #[serde(default = "default_ntfy_server")]
        url: String,
        topic: String,
        #[serde(default = "default_timeout_secs")]
        timeout: u64,
    },
}

fn default_ntfy_server() -> String {
    "https://ntfy.sh".to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_NOTIFY_TIMEOUT.as_secs()
}

impl NotifierConfig {
    pub fn build(&self) -> Result<Arc<dyn Notifier>, NotifierError> {
        Ok(match self {
            NotifierConfig::Log => Arc::new(LogNotifier),
            NotifierConfig::Webhook {
                url,
                headers,
                timeout,
            } => Arc::new(WebhookNotifier::with_timeout(
                url.clone(),
                headers.clone(),
                Duration::from_secs((*timeout).max(1)),
            )?),
            NotifierConfig::Ntfy {
                url,
                topic,
                timeout,
            } => Arc::new(NtfyNotifier::with_timeout(
                url,
                topic,
                Duration::from_secs((*timeout).max(1)),
            )?),
        })
    }
}

/// Notifier errors
#[derive(Debug, thiserror::Error)]
pub enum NotifierError {
    #[error("Webhook error: {0}")]
    Webhook(String),

    #[error("ntfy error: {0}")]
    Ntfy(String),

    #[error("HTTP client error: {0}")]
    Client(#[source] reqwest::Error),

    #[error("notification timed out after {0:?}")]
    Timeout(Duration),
}
