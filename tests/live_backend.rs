#![cfg(feature = "live-backend-tests")]

use std::sync::Arc;
use std::time::Duration;

use pulseforge::{
    client_config_from_env, CredentialManager, DataGateway, HeadlessRenderTarget,
    MemoryCredentialStore, Orchestrator, OrchestratorConfig, ReqwestTransport,
};
use tokio::time::sleep;

async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..50 {
        if check() {
            return true;
        }
        sleep(Duration::from_millis(100)).await;
    }
    false
}

#[tokio::test]
async fn live_backend_serves_dashboard_and_risk_panels() {
    let cfg = client_config_from_env().expect("client config should parse");
    let transport = ReqwestTransport::new(&cfg.api_base, cfg.http_timeout_ms)
        .expect("base URL should be valid");
    let (orchestrator, handle) = Orchestrator::new(
        OrchestratorConfig::from(&cfg),
        DataGateway::new(Arc::new(transport)),
        CredentialManager::new(Box::new(MemoryCredentialStore::new())),
        Box::new(HeadlessRenderTarget::new()),
    );
    tokio::spawn(orchestrator.run());

    handle.navigate("dashboard").await.unwrap();
    assert!(
        wait_until(|| handle
            .snapshot()
            .panels
            .news
            .is_some_and(|news| !news.sources.is_empty()))
        .await,
        "news sources never arrived from {}",
        cfg.api_base
    );

    handle.navigate("risk").await.unwrap();
    assert!(
        wait_until(|| handle.snapshot().panels.risk.is_some()).await,
        "risk overview never arrived from {}",
        cfg.api_base
    );
}
