use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    get_check, health_check, list_alerts, list_checks, recent_telemetry, AppState,
};
use crate::alerts::{AlertFilter, Runner, DEFAULT_MAX_WINDOW_SECS};
use crate::checks::CheckRegistry;
use crate::config::ChecksFile;
use crate::storage::{JsonLinesSink, MemorySink, MultiSink, TelemetrySink};

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// JSON file with notifier and check definitions
    pub checks_file: PathBuf,
    /// Seconds between evaluation cycles
    pub interval_secs: u64,
    /// Ceiling for any check's failure window
    pub max_window_secs: i64,
    /// How long a cycle waits for slow probes before evaluating
    pub cycle_timeout_secs: u64,
    /// Append telemetry rows to this file when set
    pub telemetry_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            checks_file: PathBuf::from("checks.json"),
            interval_secs: 60,
            max_window_secs: DEFAULT_MAX_WINDOW_SECS,
            cycle_timeout_secs: 30,
            telemetry_path: None,
        }
    }
}

/// Build the application router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/checks", get(list_checks))
        .route("/checks/:id", get(get_check))
        .route("/alerts", get(list_alerts))
        .route("/telemetry/:checker", get(recent_telemetry))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Load checks, start the runner, and serve the status surface until Ctrl+C
pub async fn run_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let registry = CheckRegistry::with_builtin_kinds().with_max_window(config.max_window_secs);
    let loaded = ChecksFile::from_path(&config.checks_file)?.build(&registry)?;

    let memory = Arc::new(MemorySink::default());
    let mut sinks: Vec<Arc<dyn TelemetrySink>> = vec![memory.clone() as Arc<dyn TelemetrySink>];
    if let Some(path) = &config.telemetry_path {
        sinks.push(Arc::new(JsonLinesSink::open(path)?));
    }

    let filter = Arc::new(AlertFilter::new(config.max_window_secs));
    let runner = Arc::new(
        Runner::new(loaded.checks, filter)
            .with_sink(Arc::new(MultiSink::new(sinks)))
            .with_cycle_timeout(Duration::from_secs(config.cycle_timeout_secs)),
    );
    let runner_handle = Arc::clone(&runner).start(Duration::from_secs(config.interval_secs));

    let state = Arc::new(AppState {
        runner: Arc::clone(&runner),
        telemetry: Some(memory),
    });
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Starting status server on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(Arc::clone(&runner)))
        .await?;

    // In-flight probes are abandoned rather than awaited.
    runner_handle.abort();

    tracing::info!("Lookout stopped");
    Ok(())
}

async fn shutdown_signal(runner: Arc<Runner>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }

    tracing::info!("Shutdown signal received, stopping runner...");
    runner.stop();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::{AlertParams, Check, CheckResult, Probe, Telemetry};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::util::ServiceExt;

    struct FailingProbe;

    #[async_trait]
    impl Probe for FailingProbe {
        async fn perform(&self, telemetry: &mut Telemetry) -> CheckResult {
            telemetry.set("attempts", 1i64);
            CheckResult::failed("connection refused")
        }

        fn description(&self) -> String {
            "always failing".to_string()
        }

        fn kind(&self) -> &'static str {
            "failing"
        }
    }

    fn create_state() -> (Arc<AppState>, Arc<Check>) {
        let check = Arc::new(Check::new(
            AlertParams::default(),
            Some("api".to_string()),
            Box::new(FailingProbe),
            Vec::new(),
        ));
        let memory = Arc::new(MemorySink::default());
        let runner = Runner::new(vec![Arc::clone(&check)], Arc::new(AlertFilter::default()))
            .with_sink(memory.clone());
        let state = Arc::new(AppState {
            runner: Arc::new(runner),
            telemetry: Some(memory),
        });
        (state, check)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health_check() {
        let (state, _) = create_state();
        let (status, body) = get_json(build_router(state), "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_checks_and_alerts_after_cycle() {
        let (state, check) = create_state();
        let app = build_router(Arc::clone(&state));

        let (_, before) = get_json(app.clone(), "/alerts").await;
        assert_eq!(before["alerts"].as_array().unwrap().len(), 0);

        state.runner.run_cycle_at(1000).await;

        let (status, checks) = get_json(app.clone(), "/checks").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(checks["checks"][0]["reason"], "connection refused");
        assert_eq!(checks["checks"][0]["ok"], false);
        assert_eq!(checks["checks"][0]["last_checked"], 1000);

        let (_, alerts) = get_json(app.clone(), "/alerts").await;
        assert_eq!(alerts["alerts"][0]["check_id"], check.id().as_u64());
        assert_eq!(alerts["alerts"][0]["label"], "api");

        let (_, telemetry) = get_json(app, "/telemetry/failing").await;
        assert_eq!(telemetry["rows"][0]["attributes"]["attempts"], 1);
    }

    #[tokio::test]
    async fn test_get_check_by_id() {
        let (state, check) = create_state();
        let uri = format!("/checks/{}", check.id().as_u64());
        let (status, body) = get_json(build_router(state), &uri).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], check.id().as_u64());
        assert_eq!(body["subject"], "api");
        assert_eq!(body["has_run"], false);
    }

    #[tokio::test]
    async fn test_malformed_check_id() {
        let (state, _) = create_state();
        let response = build_router(state)
            .oneshot(Request::builder().uri("/checks/abc").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_check_not_found() {
        let (state, _) = create_state();
        let (status, body) = get_json(build_router(state), "/checks/999999").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("999999"));
    }
}
