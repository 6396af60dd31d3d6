use std::sync::Arc;

use pulseforge::{
    client_config_from_env, init_logging, log_app_bind, log_app_start, log_backend_selected,
    logging_config_from_env, view_router, ClientConfig, CredentialManager, DataGateway,
    FileCredentialStore, HeadlessRenderTarget, HttpTransport, InMemoryMockTransport, Orchestrator,
    OrchestratorConfig, ReqwestTransport,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging_cfg = logging_config_from_env();
    init_logging(&logging_cfg)?;

    let client_cfg = client_config_from_env()?;
    log_app_start(&logging_cfg, &client_cfg);

    let gateway = DataGateway::new(transport_from_env(&client_cfg)?);
    let credentials = CredentialManager::new(Box::new(FileCredentialStore::new(
        client_cfg.credentials_path.clone(),
    )));
    let (orchestrator, handle) = Orchestrator::new(
        OrchestratorConfig::from(&client_cfg),
        gateway,
        credentials,
        Box::new(HeadlessRenderTarget::new()),
    );
    let orchestrator_task = tokio::spawn(orchestrator.run());

    let app = view_router(handle);
    let listener = tokio::net::TcpListener::bind(client_cfg.view_addr).await?;
    let bound_addr = listener.local_addr()?;

    log_app_bind(bound_addr);
    axum::serve(listener, app).await?;

    orchestrator_task.await?;
    Ok(())
}

fn transport_from_env(
    cfg: &ClientConfig,
) -> Result<Arc<dyn HttpTransport>, Box<dyn std::error::Error>> {
    let force_demo = std::env::var("PULSEFORGE_USE_DEMO")
        .map(|raw| raw == "1" || raw.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    if force_demo {
        log_backend_selected("demo", Some("PULSEFORGE_USE_DEMO"), None);
        return Ok(Arc::new(InMemoryMockTransport::demo().without_call_log()));
    }

    let transport = ReqwestTransport::new(&cfg.api_base, cfg.http_timeout_ms)?;
    log_backend_selected("http", None, Some(transport.base_url()));
    Ok(Arc::new(transport))
}
