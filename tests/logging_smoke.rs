use std::io;
use std::io::Write;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use pulseforge::{
    log_app_bind, log_app_start, log_backend_selected, view_router, ChartLifecycle, ClientConfig,
    CredentialManager, DataGateway, HeadlessRenderTarget, InMemoryMockTransport, LivePoller,
    LoggingConfig, MemoryCredentialStore, Method, Orchestrator, OrchestratorConfig, RouteId,
};
use serde_json::json;
use tower::util::ServiceExt;
use tracing::dispatcher::with_default;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriter;

#[derive(Clone, Default)]
struct SharedWriter {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedWriter {
    fn output_string(&self) -> String {
        let bytes = self
            .inner
            .lock()
            .expect("writer lock should not be poisoned");
        String::from_utf8_lossy(&bytes).to_string()
    }
}

struct SharedWriterGuard {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl<'a> MakeWriter<'a> for SharedWriter {
    type Writer = SharedWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        SharedWriterGuard {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Write for SharedWriterGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut out = self
            .inner
            .lock()
            .expect("writer lock should not be poisoned");
        out.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn capture_logs(max_level: Level, f: impl FnOnce()) -> String {
    let writer = SharedWriter::default();
    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_ansi(false)
        .with_max_level(max_level)
        .with_writer(writer.clone())
        .finish();
    let dispatch = tracing::Dispatch::new(subscriber);

    with_default(&dispatch, f);
    writer.output_string()
}

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .start_paused(true)
        .build()
        .expect("single-thread runtime should build")
}

#[test]
fn client_lifecycle_helpers_emit_baseline_events() {
    let logs = capture_logs(Level::INFO, || {
        log_app_start(&LoggingConfig::default(), &ClientConfig::default());
        log_backend_selected("demo", Some("PULSEFORGE_USE_DEMO"), None);
        log_app_bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8090));
    });

    assert!(logs.contains("\"event\":\"app.start\""));
    assert!(logs.contains("\"event\":\"backend.selected\""));
    assert!(logs.contains("\"event\":\"app.bind\""));
    assert!(logs.contains("/view/snapshot"));
}

#[test]
fn gateway_failures_are_logged_with_kind() {
    let logs = capture_logs(Level::INFO, || {
        paused_runtime().block_on(async {
            let mock = InMemoryMockTransport::new();
            mock.respond_json(Method::Get, "/api/macro", 500, json!({ "error": "boom" }));
            let gateway = DataGateway::new(Arc::new(mock));

            let outcome = gateway
                .call(&pulseforge::endpoints::macro_snapshot("IN"))
                .await;
            assert_eq!(outcome.failure_message(), Some("boom"));
        });
    });

    assert!(logs.contains("\"event\":\"fetch.failure\""));
    assert!(logs.contains("\"kind\":\"api\""));
}

#[test]
fn chart_and_polling_transitions_are_logged() {
    let logs = capture_logs(Level::INFO, || {
        let mut chart = ChartLifecycle::new(Box::new(HeadlessRenderTarget::new()));
        chart.on_route_change(RouteId::Dashboard);
        chart.on_route_change(RouteId::Live);

        paused_runtime().block_on(async {
            let mut poller = LivePoller::new(Duration::from_millis(4_000));
            poller.start("AAPL", |_| std::future::ready(()));
            assert!(poller.stop());
        });
    });

    assert!(logs.contains("\"event\":\"chart.create\""));
    assert!(logs.contains("\"event\":\"chart.destroy\""));
    assert!(logs.contains("\"event\":\"polling.start\""));
    assert!(logs.contains("\"event\":\"polling.stop\""));
}

#[test]
fn navigation_and_login_emit_orchestrator_events() {
    let logs = capture_logs(Level::INFO, || {
        paused_runtime().block_on(async {
            let (orchestrator, handle) = Orchestrator::new(
                OrchestratorConfig::default(),
                DataGateway::new(Arc::new(InMemoryMockTransport::demo())),
                CredentialManager::new(Box::new(MemoryCredentialStore::new())),
                Box::new(HeadlessRenderTarget::new()),
            );
            tokio::spawn(orchestrator.run());

            handle.navigate("risk").await.expect("orchestrator running");
            handle
                .login("demo@pulseforge.local", "pw")
                .await
                .expect("demo login succeeds");
        });
    });

    assert!(logs.contains("\"event\":\"orchestrator.start\""));
    assert!(logs.contains("\"event\":\"route.changed\""));
    assert!(logs.contains("\"event\":\"auth.login.success\""));
    assert!(!logs.contains("demo-token"));
}

#[test]
fn snapshot_route_emits_http_snapshot_event() {
    let logs = capture_logs(Level::INFO, || {
        paused_runtime().block_on(async {
            let (orchestrator, handle) = Orchestrator::new(
                OrchestratorConfig::default(),
                DataGateway::new(Arc::new(InMemoryMockTransport::demo())),
                CredentialManager::new(Box::new(MemoryCredentialStore::new())),
                Box::new(HeadlessRenderTarget::new()),
            );
            tokio::spawn(orchestrator.run());

            let response = view_router(handle)
                .oneshot(
                    Request::builder()
                        .uri("/view/snapshot")
                        .body(Body::empty())
                        .expect("request should build"),
                )
                .await
                .expect("snapshot request should succeed");

            assert_eq!(response.status(), StatusCode::OK);
        });
    });

    assert!(logs.contains("\"event\":\"http.snapshot.request\""));
}
