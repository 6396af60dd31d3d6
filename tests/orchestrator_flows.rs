use std::sync::{Arc, Mutex};
use std::time::Duration;

use pulseforge::{
    Command, CommandOutcome, CredentialManager, DataGateway, HeadlessRenderTarget,
    InMemoryMockTransport, IndicatorSettings, MemoryCredentialStore, Method, Orchestrator,
    OrchestratorConfig, OrchestratorHandle, PollingState, PredictionPanel, PredictionStatus,
    RouteId, AUTH_EMAIL_KEY, AUTH_TOKEN_KEY,
};
use serde_json::json;
use tokio::task::JoinHandle;
use tokio::time::sleep;

const LIVE_PRICE: &str = "/api/live/price";

struct Harness {
    handle: OrchestratorHandle,
    mock: InMemoryMockTransport,
    target: HeadlessRenderTarget,
    store: MemoryCredentialStore,
    task: JoinHandle<()>,
}

fn start_with(fragment: &str, mock: InMemoryMockTransport, store: MemoryCredentialStore) -> Harness {
    let target = HeadlessRenderTarget::new();
    let config = OrchestratorConfig {
        default_symbol: "aapl".to_string(),
        initial_fragment: fragment.to_string(),
        live_poll: Duration::from_millis(4_000),
    };
    let (orchestrator, handle) = Orchestrator::new(
        config,
        DataGateway::new(Arc::new(mock.clone())),
        CredentialManager::new(Box::new(store.clone())),
        Box::new(target.clone()),
    );
    let task = tokio::spawn(orchestrator.run());

    Harness {
        handle,
        mock,
        target,
        store,
        task,
    }
}

fn start(fragment: &str) -> Harness {
    start_with(
        fragment,
        InMemoryMockTransport::demo(),
        MemoryCredentialStore::new(),
    )
}

fn logged_in_store() -> MemoryCredentialStore {
    MemoryCredentialStore::with_entries(&[
        (AUTH_TOKEN_KEY, "stored-token"),
        (AUTH_EMAIL_KEY, "stored@pulseforge.local"),
    ])
}

/// Lets every spawned fetch and completion run to quiescence.
async fn settle() {
    sleep(Duration::from_millis(1)).await;
}

fn live_calls_for(mock: &InMemoryMockTransport, symbol: &str) -> usize {
    mock.calls_to(Method::Get, LIVE_PRICE)
        .iter()
        .filter(|call| call.query_value("symbol") == Some(symbol))
        .count()
}

#[tokio::test(start_paused = true)]
async fn unknown_and_empty_fragments_fall_back_to_dashboard() {
    let h = start("#nope");
    settle().await;
    assert_eq!(h.handle.snapshot().current_route, RouteId::Dashboard);

    h.handle.navigate("risk").await.unwrap();
    assert_eq!(h.handle.snapshot().current_route, RouteId::Risk);

    h.handle.navigate("").await.unwrap();
    assert_eq!(h.handle.snapshot().current_route, RouteId::Dashboard);

    h.handle.navigate("#Risk").await.unwrap();
    assert_eq!(h.handle.snapshot().current_route, RouteId::Dashboard);
}

#[tokio::test(start_paused = true)]
async fn initial_symbol_is_normalized_and_route_fetches_use_it() {
    let h = start("risk");
    settle().await;

    let snapshot = h.handle.snapshot();
    assert_eq!(snapshot.active_symbol, "AAPL");
    assert!(snapshot.panels.risk.is_some());
    let calls = h.mock.calls_to(Method::Get, "/api/risk/overview");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].query_value("symbol"), Some("AAPL"));
}

#[tokio::test(start_paused = true)]
async fn leaving_live_stops_all_further_price_fetches() {
    let h = start("live");
    settle().await;
    assert_eq!(live_calls_for(&h.mock, "AAPL"), 1);
    assert!(h.handle.snapshot().panels.live.is_some());

    sleep(Duration::from_millis(4_000)).await;
    assert_eq!(live_calls_for(&h.mock, "AAPL"), 2);

    h.handle.navigate("dashboard").await.unwrap();
    settle().await;
    assert_eq!(h.handle.snapshot().polling, PollingState::Idle);

    sleep(Duration::from_millis(20_000)).await;
    assert_eq!(h.mock.count(Method::Get, LIVE_PRICE), 2);

    h.handle.navigate("risk").await.unwrap();
    sleep(Duration::from_millis(8_000)).await;
    assert_eq!(h.mock.count(Method::Get, LIVE_PRICE), 2);
}

#[tokio::test(start_paused = true)]
async fn symbol_change_on_live_restarts_with_one_immediate_fetch() {
    let h = start("live");
    settle().await;
    assert_eq!(live_calls_for(&h.mock, "AAPL"), 1);

    h.handle.set_symbol(" tsla ").await.unwrap();
    settle().await;

    assert_eq!(live_calls_for(&h.mock, "TSLA"), 1);
    assert_eq!(live_calls_for(&h.mock, "AAPL"), 1);
    assert!(matches!(
        h.handle.snapshot().polling,
        PollingState::Polling { ref symbol, .. } if symbol == "TSLA"
    ));

    sleep(Duration::from_millis(4_000)).await;
    assert_eq!(live_calls_for(&h.mock, "TSLA"), 2);
    assert_eq!(live_calls_for(&h.mock, "AAPL"), 1);
}

#[tokio::test(start_paused = true)]
async fn live_failures_clear_the_slot_but_keep_polling() {
    let mock = InMemoryMockTransport::demo();
    let h = start_with("live", mock.clone(), MemoryCredentialStore::new());
    settle().await;
    assert!(h.handle.snapshot().panels.live.is_some());

    mock.respond_json(Method::Get, LIVE_PRICE, 503, json!({ "error": "feed down" }));
    sleep(Duration::from_millis(4_000)).await;
    assert!(h.handle.snapshot().panels.live.is_none());

    mock.respond_json(
        Method::Get,
        LIVE_PRICE,
        200,
        json!({ "price": 190.0, "change": 1.0, "market_state": "open" }),
    );
    sleep(Duration::from_millis(4_000)).await;
    assert_eq!(h.handle.snapshot().panels.live.unwrap().price, 190.0);
    assert_eq!(h.mock.count(Method::Get, LIVE_PRICE), 3);
}

#[tokio::test(start_paused = true)]
async fn zero_poll_period_still_fetches_live_prices() {
    let mock = InMemoryMockTransport::demo();
    let (orchestrator, handle) = Orchestrator::new(
        OrchestratorConfig {
            default_symbol: "AAPL".to_string(),
            initial_fragment: "live".to_string(),
            live_poll: Duration::ZERO,
        },
        DataGateway::new(Arc::new(mock.clone())),
        CredentialManager::new(Box::new(MemoryCredentialStore::new())),
        Box::new(HeadlessRenderTarget::new()),
    );
    let task = tokio::spawn(orchestrator.run());
    sleep(Duration::from_millis(10)).await;

    assert!(matches!(handle.snapshot().polling, PollingState::Polling { .. }));
    assert!(live_calls_for(&mock, "AAPL") >= 2);
    assert!(handle.snapshot().panels.live.is_some());

    handle.navigate("dashboard").await.unwrap();
    drop(handle);
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn chart_surface_stays_singleton_across_dashboard_round_trip() {
    let h = start("dashboard");
    settle().await;
    let first = h.handle.snapshot().chart_surface;
    assert!(first.is_some());

    h.handle.navigate("news").await.unwrap();
    settle().await;
    assert!(h.handle.snapshot().chart_surface.is_none());
    assert_eq!(h.target.stats().live, 0);

    h.handle.navigate("dashboard").await.unwrap();
    settle().await;
    let second = h.handle.snapshot().chart_surface;
    assert!(second.is_some());
    assert_ne!(first, second);

    let stats = h.target.stats();
    assert_eq!(stats.live, 1);
    assert_eq!(stats.created, 2);
    assert_eq!(stats.destroyed, 1);
    assert_eq!(stats.max_concurrent, 1);
}

#[tokio::test(start_paused = true)]
async fn account_panels_wait_for_login() {
    let h = start("accounts");
    settle().await;
    assert_eq!(h.mock.count(Method::Get, "/api/users/watchlist"), 0);
    assert_eq!(h.mock.count(Method::Get, "/api/users/history"), 0);
    assert!(!h.handle.snapshot().authenticated);

    let credential = h.handle.login("demo@pulseforge.local", "pw").await.unwrap();
    assert_eq!(credential.token, "demo-token");
    settle().await;

    assert_eq!(h.mock.count(Method::Get, "/api/users/watchlist"), 1);
    assert_eq!(h.mock.count(Method::Get, "/api/users/history"), 1);
    let watchlist_call = &h.mock.calls_to(Method::Get, "/api/users/watchlist")[0];
    assert_eq!(watchlist_call.auth_token.as_deref(), Some("demo-token"));

    let snapshot = h.handle.snapshot();
    assert!(snapshot.authenticated);
    assert_eq!(snapshot.panels.watchlist, Some(vec!["AAPL".to_string()]));
    assert_eq!(snapshot.panels.history, Some(Vec::new()));
    assert_eq!(h.store.get(AUTH_TOKEN_KEY).as_deref(), Some("demo-token"));
}

#[tokio::test(start_paused = true)]
async fn entering_accounts_after_login_fetches_each_account_panel_once() {
    let h = start("dashboard");
    settle().await;
    h.handle.login("demo@pulseforge.local", "pw").await.unwrap();
    settle().await;
    assert_eq!(h.mock.count(Method::Get, "/api/users/watchlist"), 0);

    h.handle.navigate("accounts").await.unwrap();
    settle().await;
    assert_eq!(h.mock.count(Method::Get, "/api/users/watchlist"), 1);
    assert_eq!(h.mock.count(Method::Get, "/api/users/history"), 1);

    h.handle.set_symbol("MSFT").await.unwrap();
    settle().await;
    assert_eq!(h.mock.count(Method::Get, "/api/users/watchlist"), 1);
}

#[tokio::test(start_paused = true)]
async fn hydrated_credential_gates_accounts_at_startup() {
    let h = start_with("accounts", InMemoryMockTransport::demo(), logged_in_store());
    settle().await;

    let calls = h.mock.calls_to(Method::Get, "/api/users/history");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].auth_token.as_deref(), Some("stored-token"));
    assert_eq!(
        h.handle.snapshot().credential.unwrap().email,
        "stored@pulseforge.local"
    );
}

#[tokio::test(start_paused = true)]
async fn logout_twice_leaves_identical_state() {
    let h = start_with("accounts", InMemoryMockTransport::demo(), logged_in_store());
    settle().await;
    assert!(h.handle.snapshot().panels.watchlist.is_some());

    assert_eq!(h.handle.logout().await.unwrap(), CommandOutcome::Applied);
    settle().await;
    let first = h.handle.snapshot();

    assert_eq!(h.handle.logout().await.unwrap(), CommandOutcome::Applied);
    settle().await;
    let second = h.handle.snapshot();

    assert!(first.credential.is_none());
    assert!(!first.authenticated);
    assert!(first.panels.watchlist.is_none());
    assert!(first.panels.history.is_none());
    assert_eq!(first.credential, second.credential);
    assert_eq!(first.panels, second.panels);
    assert_eq!(first.revision, second.revision);
    assert!(h.store.get(AUTH_TOKEN_KEY).is_none());
    assert!(h.store.get(AUTH_EMAIL_KEY).is_none());
    assert_eq!(h.mock.count(Method::Get, "/api/users/watchlist"), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_login_is_reported_and_leaves_client_unauthenticated() {
    let mock = InMemoryMockTransport::demo();
    mock.respond_json(
        Method::Post,
        "/api/users/login",
        401,
        json!({ "error": "Invalid credentials" }),
    );
    let h = start_with("accounts", mock, logged_in_store());
    settle().await;
    assert!(h.handle.snapshot().authenticated);

    let err = h.handle.login("a@b.c", "wrong").await.unwrap_err();
    assert_eq!(err.to_string(), "Invalid credentials");
    settle().await;

    let snapshot = h.handle.snapshot();
    assert!(!snapshot.authenticated);
    assert!(snapshot.panels.watchlist.is_none());
    assert_eq!(h.store.get(AUTH_TOKEN_KEY).as_deref(), Some("stored-token"));
}

#[tokio::test(start_paused = true)]
async fn register_failure_is_a_value_and_register_and_login_still_logs_in() {
    let mock = InMemoryMockTransport::demo();
    mock.respond_json(
        Method::Post,
        "/api/users/register",
        400,
        json!({ "error": "User already exists" }),
    );
    let h = start_with("dashboard", mock, MemoryCredentialStore::new());
    settle().await;

    let err = h.handle.register("a@b.c", "pw").await.unwrap_err();
    assert_eq!(err.to_string(), "User already exists");
    assert!(!h.handle.snapshot().authenticated);

    let credential = h.handle.register_and_login("a@b.c", "pw").await.unwrap();
    assert_eq!(credential.token, "demo-token");
    assert_eq!(h.mock.count(Method::Post, "/api/users/register"), 2);
    assert_eq!(h.mock.count(Method::Post, "/api/users/login"), 1);
}

#[tokio::test(start_paused = true)]
async fn news_sentiment_failure_keeps_sources_populated() {
    let mock = InMemoryMockTransport::demo();
    mock.respond_json(Method::Get, "/api/news/sentiment", 500, json!({}));
    let h = start_with("news", mock, MemoryCredentialStore::new());
    settle().await;

    let news = h.handle.snapshot().panels.news.unwrap();
    assert!(news.items.is_empty());
    assert!(news.breakdown.is_none());
    assert_eq!(news.sources.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn news_items_with_null_fields_still_populate_the_panel() {
    let mock = InMemoryMockTransport::demo();
    mock.respond_json(
        Method::Get,
        "/api/news/sentiment",
        200,
        json!({
            "items": [{
                "title": "Guidance raised",
                "summary": null,
                "source": "wire",
                "url": null,
                "published_at": "2026-01-02T09:30:00",
                "sentiment": 0.6
            }],
            "breakdown": { "positive": 1.0, "negative": 0.0, "neutral": 0.0, "model": null }
        }),
    );
    let h = start_with("news", mock, MemoryCredentialStore::new());
    settle().await;

    let news = h.handle.snapshot().panels.news.unwrap();
    assert_eq!(news.items.len(), 1);
    assert_eq!(news.items[0].title, "Guidance raised");
    assert!(news.items[0].url.is_empty());
    assert!(news.items[0].summary.is_empty());
    assert_eq!(news.breakdown.unwrap().positive, 1.0);
    assert_eq!(news.sources.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn route_fetch_failures_reset_their_slot() {
    let mock = InMemoryMockTransport::demo();
    let h = start_with("macro", mock.clone(), MemoryCredentialStore::new());
    settle().await;
    assert!(h.handle.snapshot().panels.macro_snapshot.is_some());
    assert_eq!(
        h.mock.calls_to(Method::Get, "/api/macro")[0].query_value("region"),
        Some("IN")
    );

    mock.fail_transport(Method::Get, "/api/macro", "connection refused");
    h.handle.navigate("dashboard").await.unwrap();
    h.handle.navigate("macro").await.unwrap();
    settle().await;
    assert!(h.handle.snapshot().panels.macro_snapshot.is_none());
}

#[tokio::test(start_paused = true)]
async fn prediction_status_goes_loading_then_idle_exactly_once() {
    let mock = InMemoryMockTransport::demo();
    mock.delay(Method::Post, "/api/predict", Duration::from_millis(500));
    let h = start_with("prediction", mock, MemoryCredentialStore::new());
    settle().await;

    let statuses = Arc::new(Mutex::new(Vec::new()));
    let mut rx = h.handle.subscribe();
    rx.borrow_and_update();
    let sink = statuses.clone();
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let status = rx.borrow_and_update().prediction_status;
            let mut seen = sink.lock().unwrap();
            if seen.last() != Some(&status) {
                seen.push(status);
            }
        }
    });

    assert_eq!(
        h.handle.send(Command::RunPrediction).await.unwrap(),
        CommandOutcome::Applied
    );
    settle().await;
    assert_eq!(h.handle.snapshot().prediction_status, PredictionStatus::Loading);

    assert!(matches!(
        h.handle.send(Command::RunPrediction).await.unwrap(),
        CommandOutcome::Ignored { .. }
    ));

    sleep(Duration::from_millis(600)).await;
    let snapshot = h.handle.snapshot();
    assert_eq!(snapshot.prediction_status, PredictionStatus::Idle);
    assert!(matches!(
        snapshot.panels.prediction,
        Some(PredictionPanel::Signal(_))
    ));
    assert_eq!(h.mock.count(Method::Post, "/api/predict"), 1);
    assert_eq!(
        *statuses.lock().unwrap(),
        vec![PredictionStatus::Loading, PredictionStatus::Idle]
    );
}

#[tokio::test(start_paused = true)]
async fn prediction_failure_returns_to_idle_with_inline_warning() {
    let mock = InMemoryMockTransport::demo();
    mock.respond_json(
        Method::Post,
        "/api/predict",
        400,
        json!({ "error": "symbol is required" }),
    );
    let h = start_with("prediction", mock, logged_in_store());
    settle().await;

    h.handle.send(Command::RunPrediction).await.unwrap();
    settle().await;

    let snapshot = h.handle.snapshot();
    assert_eq!(snapshot.prediction_status, PredictionStatus::Idle);
    assert_eq!(
        snapshot.panels.prediction,
        Some(PredictionPanel::Warning {
            message: "symbol is required".to_string()
        })
    );
    let call = &h.mock.calls_to(Method::Post, "/api/predict")[0];
    assert_eq!(call.auth_token.as_deref(), Some("stored-token"));
    assert_eq!(call.body.as_ref().unwrap()["symbol"], "AAPL");
}

#[tokio::test(start_paused = true)]
async fn stale_completion_is_discarded_after_symbol_change() {
    let mock = InMemoryMockTransport::demo();
    mock.respond_json(
        Method::Get,
        "/api/risk/overview",
        200,
        json!({ "beta": 1.0, "volatility": 0.2, "var": 0.04, "correlations": [] }),
    );
    mock.delay(Method::Get, "/api/risk/overview", Duration::from_millis(1_000));
    let h = start_with("risk", mock.clone(), MemoryCredentialStore::new());
    settle().await;

    mock.respond_json(
        Method::Get,
        "/api/risk/overview",
        200,
        json!({ "beta": 2.0, "volatility": 0.3, "var": 0.05, "correlations": [] }),
    );
    mock.delay(Method::Get, "/api/risk/overview", Duration::ZERO);
    h.handle.set_symbol("TSLA").await.unwrap();
    settle().await;
    assert_eq!(h.handle.snapshot().panels.risk.unwrap().beta, 2.0);

    sleep(Duration::from_millis(1_500)).await;
    assert_eq!(h.handle.snapshot().panels.risk.unwrap().beta, 2.0);
    assert_eq!(h.mock.count(Method::Get, "/api/risk/overview"), 2);
}

#[tokio::test(start_paused = true)]
async fn user_actions_each_issue_one_call_and_fill_their_slot() {
    let h = start("strategy");
    settle().await;
    h.mock.clear_calls();

    for command in [
        Command::SimulatePortfolio,
        Command::RunBacktest,
        Command::ParseStrategy {
            rule: "rsi < 30 and sentiment > 0".to_string(),
        },
        Command::EvaluateStrategy {
            rule: "rsi < 30".to_string(),
        },
        Command::AskAssistant {
            question: "Should I hold?".to_string(),
        },
        Command::RunEnsemble,
    ] {
        assert_eq!(h.handle.send(command).await.unwrap(), CommandOutcome::Applied);
    }
    settle().await;

    let panels = h.handle.snapshot().panels;
    assert_eq!(panels.portfolio.unwrap().sharpe, 1.21);
    assert_eq!(panels.backtest.unwrap().trades.len(), 1);
    assert!(panels.strategy_parse.unwrap().valid);
    assert_eq!(panels.strategy_eval.unwrap().action, "buy");
    assert!(panels.assistant.unwrap().reply.contains("not financial advice"));
    assert_eq!(panels.ensemble.unwrap().models.len(), 1);
    assert_eq!(panels.multi_frame.unwrap().len(), 3);

    for (method, path) in [
        (Method::Post, "/api/portfolio/simulate"),
        (Method::Post, "/api/backtest/run"),
        (Method::Post, "/api/strategy/parse"),
        (Method::Post, "/api/strategy/evaluate"),
        (Method::Post, "/api/assistant"),
        (Method::Post, "/api/predict/ensemble"),
        (Method::Get, "/api/predict/multiframe"),
    ] {
        assert_eq!(h.mock.count(method, path), 1, "{path}");
    }
}

#[tokio::test(start_paused = true)]
async fn ensemble_failure_clears_both_forecasts_and_skips_multiframe() {
    let mock = InMemoryMockTransport::demo();
    let h = start_with("prediction", mock.clone(), MemoryCredentialStore::new());
    settle().await;
    h.handle.send(Command::RunEnsemble).await.unwrap();
    settle().await;
    assert!(h.handle.snapshot().panels.ensemble.is_some());

    mock.respond_json(Method::Post, "/api/predict/ensemble", 500, json!({}));
    h.handle.send(Command::RunEnsemble).await.unwrap();
    settle().await;

    let panels = h.handle.snapshot().panels;
    assert!(panels.ensemble.is_none());
    assert!(panels.multi_frame.is_none());
    assert_eq!(h.mock.count(Method::Get, "/api/predict/multiframe"), 1);
}

#[tokio::test(start_paused = true)]
async fn indicator_compute_validates_settings_before_calling() {
    let h = start("indicators");
    settle().await;
    assert_eq!(
        h.handle.snapshot().panels.indicator_catalog.unwrap().len(),
        3
    );

    let bad = IndicatorSettings {
        rsi_period: 0,
        ..IndicatorSettings::default()
    };
    let outcome = h
        .handle
        .send(Command::ComputeIndicators { settings: bad })
        .await
        .unwrap();
    assert!(matches!(outcome, CommandOutcome::Invalid { ref errors } if errors.len() == 1));
    assert_eq!(h.mock.count(Method::Post, "/api/indicators/advanced"), 0);

    h.handle
        .send(Command::ComputeIndicators {
            settings: IndicatorSettings::default(),
        })
        .await
        .unwrap();
    settle().await;
    assert_eq!(h.handle.snapshot().panels.indicator_rows.unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn add_to_watchlist_requires_authentication() {
    let h = start("accounts");
    settle().await;

    let outcome = h.handle.send(Command::AddToWatchlist).await.unwrap();
    assert!(matches!(outcome, CommandOutcome::Ignored { .. }));
    assert_eq!(h.mock.count(Method::Post, "/api/users/watchlist"), 0);

    h.handle.login("demo@pulseforge.local", "pw").await.unwrap();
    h.handle.set_symbol("nvda").await.unwrap();
    assert_eq!(
        h.handle.send(Command::AddToWatchlist).await.unwrap(),
        CommandOutcome::Applied
    );
    settle().await;

    let call = &h.mock.calls_to(Method::Post, "/api/users/watchlist")[0];
    assert_eq!(call.body.as_ref().unwrap()["symbol"], "NVDA");
    assert_eq!(call.auth_token.as_deref(), Some("demo-token"));
}

#[tokio::test(start_paused = true)]
async fn empty_symbol_is_ignored() {
    let h = start("risk");
    settle().await;

    let outcome = h.handle.set_symbol("   ").await.unwrap();
    assert!(matches!(outcome, CommandOutcome::Ignored { .. }));
    assert_eq!(h.handle.snapshot().active_symbol, "AAPL");
    assert_eq!(h.mock.count(Method::Get, "/api/risk/overview"), 1);
}

#[tokio::test(start_paused = true)]
async fn dropping_every_handle_shuts_down_and_releases_resources() {
    let h = start("dashboard");
    settle().await;
    assert_eq!(h.target.stats().live, 1);

    let Harness {
        handle,
        target,
        task,
        ..
    } = h;
    drop(handle);
    task.await.unwrap();

    assert_eq!(target.stats().live, 0);
}
