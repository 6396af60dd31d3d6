//! The reactive view-state orchestrator.
//!
//! One task owns the [`ViewState`] and everything that mutates it. Commands
//! arrive through an [`OrchestratorHandle`]; network calls run as spawned tasks
//! and report back on an internal completion channel, so state changes, timer
//! ticks and completions are all applied serially. Renderers follow along via a
//! `watch` channel of whole snapshots.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info};

use crate::chart::{ChartLifecycle, RenderTarget};
use crate::config::{ClientConfig, DEFAULT_SYMBOL};
use crate::credentials::{AuthError, Credential, CredentialManager};
use crate::effects::{plan_effects, Effect, Trigger};
use crate::endpoints;
use crate::gateway::{ApiRequest, DataGateway, FetchOutcome};
use crate::indicator_settings::IndicatorSettings;
use crate::panels::{
    EnsembleForecast, HistoryResponse, IndicatorCatalogResponse, IndicatorRowsResponse,
    LiveSnapshot, MultiFrameForecast, NewsPanel, NewsSentimentResponse, NewsSourcesResponse,
    PanelSlot, PanelUpdate, PredictionPanel, PredictionSignal, WatchlistResponse,
};
use crate::polling::{LivePoller, PollingState};
use crate::route::resolve;
use crate::view_state::{normalize_symbol, PredictionStatus, SlotEpochs, ViewState};

const COMMAND_BUFFER: usize = 64;

/// Everything a renderer or the HTTP surface can ask for.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    Navigate {
        fragment: String,
    },
    SetSymbol {
        symbol: String,
    },
    Login {
        email: String,
        password: String,
    },
    Register {
        email: String,
        password: String,
    },
    RegisterAndLogin {
        email: String,
        password: String,
    },
    Logout,
    RunPrediction,
    RunEnsemble,
    ComputeIndicators {
        #[serde(default)]
        settings: IndicatorSettings,
    },
    SimulatePortfolio,
    RunBacktest,
    ParseStrategy {
        rule: String,
    },
    EvaluateStrategy {
        rule: String,
    },
    AskAssistant {
        question: String,
    },
    AddToWatchlist,
}

impl Command {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Navigate { .. } => "navigate",
            Self::SetSymbol { .. } => "set_symbol",
            Self::Login { .. } => "login",
            Self::Register { .. } => "register",
            Self::RegisterAndLogin { .. } => "register_and_login",
            Self::Logout => "logout",
            Self::RunPrediction => "run_prediction",
            Self::RunEnsemble => "run_ensemble",
            Self::ComputeIndicators { .. } => "compute_indicators",
            Self::SimulatePortfolio => "simulate_portfolio",
            Self::RunBacktest => "run_backtest",
            Self::ParseStrategy { .. } => "parse_strategy",
            Self::EvaluateStrategy { .. } => "evaluate_strategy",
            Self::AskAssistant { .. } => "ask_assistant",
            Self::AddToWatchlist => "add_to_watchlist",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CommandOutcome {
    /// State updated and any resulting fetches dispatched.
    Applied,
    Ignored { reason: String },
    Invalid { errors: Vec<String> },
    Authenticated { credential: Credential },
    Registered,
    AuthFailed { error: AuthError },
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("orchestrator is not running")]
pub struct OrchestratorClosed;

struct Envelope {
    command: Command,
    reply: oneshot::Sender<CommandOutcome>,
}

enum Completion {
    Panel {
        epoch: u64,
        update: PanelUpdate,
    },
    LiveTick {
        session: u64,
        snapshot: Option<LiveSnapshot>,
    },
    Prediction {
        epoch: u64,
        panel: PredictionPanel,
    },
    Login {
        email: String,
        outcome: FetchOutcome<Value>,
        reply: oneshot::Sender<CommandOutcome>,
    },
    Register {
        email: String,
        outcome: FetchOutcome<Value>,
        reply: oneshot::Sender<CommandOutcome>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub default_symbol: String,
    pub initial_fragment: String,
    pub live_poll: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from(&ClientConfig::default())
    }
}

impl From<&ClientConfig> for OrchestratorConfig {
    fn from(config: &ClientConfig) -> Self {
        Self {
            default_symbol: config.default_symbol.clone(),
            initial_fragment: config.initial_fragment.clone(),
            live_poll: Duration::from_millis(config.live_poll_ms),
        }
    }
}

/// Clonable front door to a running orchestrator.
#[derive(Clone)]
pub struct OrchestratorHandle {
    commands: mpsc::Sender<Envelope>,
    snapshots: watch::Receiver<ViewState>,
}

impl OrchestratorHandle {
    pub async fn send(&self, command: Command) -> Result<CommandOutcome, OrchestratorClosed> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Envelope { command, reply })
            .await
            .map_err(|_| OrchestratorClosed)?;
        response.await.map_err(|_| OrchestratorClosed)
    }

    pub async fn navigate(&self, fragment: &str) -> Result<CommandOutcome, OrchestratorClosed> {
        self.send(Command::Navigate {
            fragment: fragment.to_string(),
        })
        .await
    }

    pub async fn set_symbol(&self, symbol: &str) -> Result<CommandOutcome, OrchestratorClosed> {
        self.send(Command::SetSymbol {
            symbol: symbol.to_string(),
        })
        .await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Credential, AuthError> {
        let outcome = self
            .send(Command::Login {
                email: email.to_string(),
                password: password.to_string(),
            })
            .await;
        credential_from(outcome)
    }

    pub async fn register(&self, email: &str, password: &str) -> Result<(), AuthError> {
        let outcome = self
            .send(Command::Register {
                email: email.to_string(),
                password: password.to_string(),
            })
            .await
            .map_err(|_| AuthError::Unavailable)?;
        match outcome {
            CommandOutcome::Registered => Ok(()),
            CommandOutcome::AuthFailed { error } => Err(error),
            other => Err(AuthError::Rejected(format!("unexpected outcome {other:?}"))),
        }
    }

    pub async fn register_and_login(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Credential, AuthError> {
        let outcome = self
            .send(Command::RegisterAndLogin {
                email: email.to_string(),
                password: password.to_string(),
            })
            .await;
        credential_from(outcome)
    }

    pub async fn logout(&self) -> Result<CommandOutcome, OrchestratorClosed> {
        self.send(Command::Logout).await
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewState> {
        self.snapshots.clone()
    }

    pub fn snapshot(&self) -> ViewState {
        self.snapshots.borrow().clone()
    }
}

fn credential_from(
    outcome: Result<CommandOutcome, OrchestratorClosed>,
) -> Result<Credential, AuthError> {
    match outcome.map_err(|_| AuthError::Unavailable)? {
        CommandOutcome::Authenticated { credential } => Ok(credential),
        CommandOutcome::AuthFailed { error } => Err(error),
        other => Err(AuthError::Rejected(format!("unexpected outcome {other:?}"))),
    }
}

pub struct Orchestrator {
    gateway: DataGateway,
    credentials: CredentialManager,
    chart: ChartLifecycle,
    poller: LivePoller,
    state: ViewState,
    epochs: SlotEpochs,
    last_trigger: Option<Trigger>,
    published_revision: Option<u64>,
    commands: mpsc::Receiver<Envelope>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
    snapshots: watch::Sender<ViewState>,
}

impl Orchestrator {
    /// Hydrates credentials and resolves the initial route. Nothing is fetched
    /// until [`Orchestrator::run`] starts.
    pub fn new(
        config: OrchestratorConfig,
        gateway: DataGateway,
        mut credentials: CredentialManager,
        render_target: Box<dyn RenderTarget>,
    ) -> (Self, OrchestratorHandle) {
        let credential = credentials.hydrate();
        let route = resolve(&config.initial_fragment);
        let symbol = normalize_symbol(&config.default_symbol)
            .unwrap_or_else(|| DEFAULT_SYMBOL.to_string());
        let state = ViewState::new(route, symbol, credential);

        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let (snapshots_tx, snapshots_rx) = watch::channel(state.clone());

        let orchestrator = Self {
            gateway,
            credentials,
            chart: ChartLifecycle::new(render_target),
            poller: LivePoller::new(config.live_poll),
            state,
            epochs: SlotEpochs::default(),
            last_trigger: None,
            published_revision: None,
            commands: commands_rx,
            completions_tx,
            completions_rx,
            snapshots: snapshots_tx,
        };
        let handle = OrchestratorHandle {
            commands: commands_tx,
            snapshots: snapshots_rx,
        };
        (orchestrator, handle)
    }

    /// Runs until every handle is dropped, then releases the timer and surface.
    pub async fn run(mut self) {
        info!(
            component = "orchestrator",
            event = "orchestrator.start",
            route = %self.state.current_route,
            symbol = %self.state.active_symbol,
            authenticated = self.state.authenticated
        );

        self.reconcile();
        self.publish();

        loop {
            tokio::select! {
                envelope = self.commands.recv() => {
                    let Some(Envelope { command, reply }) = envelope else {
                        break;
                    };
                    let outcome = self.handle_command(command, reply);
                    self.publish();
                    if let Some((reply, outcome)) = outcome {
                        let _ = reply.send(outcome);
                    }
                }
                Some(completion) = self.completions_rx.recv() => {
                    let reply = self.handle_completion(completion);
                    self.publish();
                    if let Some((reply, outcome)) = reply {
                        let _ = reply.send(outcome);
                    }
                }
            }
        }

        self.poller.stop();
        self.chart.release();
        info!(component = "orchestrator", event = "orchestrator.stop");
    }

    fn publish(&mut self) {
        if self.published_revision == Some(self.state.revision) {
            return;
        }
        self.published_revision = Some(self.state.revision);
        self.snapshots.send_replace(self.state.clone());
    }

    /// Applies the effect table to whatever changed since the last pass.
    fn reconcile(&mut self) {
        let next = self.state.trigger();
        let effects = plan_effects(self.last_trigger.as_ref(), &next);
        self.last_trigger = Some(next);
        for effect in effects {
            self.run_effect(effect);
        }
    }

    fn run_effect(&mut self, effect: Effect) {
        debug!(
            component = "orchestrator",
            event = "effect.run",
            effect = effect.name()
        );
        match effect {
            Effect::StopPolling => {
                self.poller.stop();
                self.state.set_polling(PollingState::Idle);
            }
            Effect::RouteChart(route) => {
                let surface = self.chart.on_route_change(route);
                self.state.set_chart_surface(surface);
            }
            Effect::FetchNews { symbol } => self.spawn_news(symbol),
            Effect::FetchIndicatorCatalog => self.spawn_fetch(
                PanelSlot::IndicatorCatalog,
                endpoints::indicator_catalog(),
                |resp: Option<IndicatorCatalogResponse>| {
                    PanelUpdate::IndicatorCatalog(resp.map(|r| r.indicators))
                },
            ),
            Effect::FetchRisk { symbol } => self.spawn_fetch(
                PanelSlot::Risk,
                endpoints::risk_overview(&symbol),
                PanelUpdate::Risk,
            ),
            Effect::FetchExplain { symbol } => self.spawn_fetch(
                PanelSlot::Explain,
                endpoints::explainability(&symbol),
                PanelUpdate::Explain,
            ),
            Effect::FetchInstitutional { symbol } => self.spawn_fetch(
                PanelSlot::Institutional,
                endpoints::institutional(&symbol),
                PanelUpdate::Institutional,
            ),
            Effect::FetchMacro { region } => self.spawn_fetch(
                PanelSlot::Macro,
                endpoints::macro_snapshot(region),
                PanelUpdate::Macro,
            ),
            Effect::StartPolling { symbol } => self.start_polling(symbol),
            Effect::FetchAccount { token } => {
                self.spawn_fetch(
                    PanelSlot::Watchlist,
                    endpoints::watchlist(&token),
                    |resp: Option<WatchlistResponse>| {
                        PanelUpdate::Watchlist(resp.map(|r| r.watchlist))
                    },
                );
                self.spawn_fetch(
                    PanelSlot::History,
                    endpoints::history(&token),
                    |resp: Option<HistoryResponse>| PanelUpdate::History(resp.map(|r| r.history)),
                );
            }
        }
    }

    fn handle_command(
        &mut self,
        command: Command,
        reply: oneshot::Sender<CommandOutcome>,
    ) -> Option<(oneshot::Sender<CommandOutcome>, CommandOutcome)> {
        debug!(
            component = "orchestrator",
            event = "command.received",
            command = command.kind()
        );

        let symbol = self.state.active_symbol.clone();
        let outcome = match command {
            Command::Navigate { fragment } => {
                let route = resolve(&fragment);
                let from = self.state.current_route;
                if self.state.navigate(route) {
                    info!(
                        component = "orchestrator",
                        event = "route.changed",
                        from = %from,
                        to = %route
                    );
                    self.reconcile();
                }
                CommandOutcome::Applied
            }
            Command::SetSymbol { symbol: raw } => match self.state.set_symbol(&raw) {
                None => CommandOutcome::Ignored {
                    reason: "symbol must not be empty".to_string(),
                },
                Some(changed) => {
                    if changed {
                        info!(
                            component = "orchestrator",
                            event = "symbol.changed",
                            symbol = %self.state.active_symbol
                        );
                        self.reconcile();
                    }
                    CommandOutcome::Applied
                }
            },
            Command::Login { email, password } => {
                let gateway = self.gateway.clone();
                let tx = self.completions_tx.clone();
                tokio::spawn(async move {
                    let outcome = gateway.call(&endpoints::login(&email, &password)).await;
                    let _ = tx.send(Completion::Login {
                        email,
                        outcome,
                        reply,
                    });
                });
                return None;
            }
            Command::Register { email, password } => {
                let gateway = self.gateway.clone();
                let tx = self.completions_tx.clone();
                tokio::spawn(async move {
                    let outcome = gateway
                        .call(&endpoints::register(&email, &password))
                        .await;
                    let _ = tx.send(Completion::Register {
                        email,
                        outcome,
                        reply,
                    });
                });
                return None;
            }
            Command::RegisterAndLogin { email, password } => {
                let gateway = self.gateway.clone();
                let tx = self.completions_tx.clone();
                tokio::spawn(async move {
                    let registered = gateway
                        .call(&endpoints::register(&email, &password))
                        .await;
                    let _ = CredentialManager::complete_register(&email, registered);
                    let outcome = gateway.call(&endpoints::login(&email, &password)).await;
                    let _ = tx.send(Completion::Login {
                        email,
                        outcome,
                        reply,
                    });
                });
                return None;
            }
            Command::Logout => {
                self.credentials.logout();
                self.sync_credential();
                CommandOutcome::Applied
            }
            Command::RunPrediction => {
                if self.state.prediction_status == PredictionStatus::Loading {
                    CommandOutcome::Ignored {
                        reason: "prediction already running".to_string(),
                    }
                } else {
                    self.spawn_prediction(symbol);
                    CommandOutcome::Applied
                }
            }
            Command::RunEnsemble => {
                self.spawn_ensemble(symbol);
                CommandOutcome::Applied
            }
            Command::ComputeIndicators { settings } => match settings.validate() {
                Err(errors) => CommandOutcome::Invalid {
                    errors: errors.iter().map(ToString::to_string).collect(),
                },
                Ok(()) => {
                    self.spawn_fetch(
                        PanelSlot::IndicatorRows,
                        endpoints::indicator_compute(&symbol, &settings),
                        |resp: Option<IndicatorRowsResponse>| {
                            PanelUpdate::IndicatorRows(resp.map(|r| r.rows))
                        },
                    );
                    CommandOutcome::Applied
                }
            },
            Command::SimulatePortfolio => {
                self.spawn_fetch(
                    PanelSlot::Portfolio,
                    endpoints::portfolio_simulate(&symbol),
                    PanelUpdate::Portfolio,
                );
                CommandOutcome::Applied
            }
            Command::RunBacktest => {
                self.spawn_fetch(
                    PanelSlot::Backtest,
                    endpoints::backtest_run(&symbol),
                    PanelUpdate::Backtest,
                );
                CommandOutcome::Applied
            }
            Command::ParseStrategy { rule } => {
                self.spawn_fetch(
                    PanelSlot::StrategyParse,
                    endpoints::strategy_parse(&rule),
                    PanelUpdate::StrategyParse,
                );
                CommandOutcome::Applied
            }
            Command::EvaluateStrategy { rule } => {
                self.spawn_fetch(
                    PanelSlot::StrategyEval,
                    endpoints::strategy_evaluate(&symbol, &rule),
                    PanelUpdate::StrategyEval,
                );
                CommandOutcome::Applied
            }
            Command::AskAssistant { question } => {
                self.spawn_fetch(
                    PanelSlot::Assistant,
                    endpoints::assistant(&question, &symbol),
                    PanelUpdate::Assistant,
                );
                CommandOutcome::Applied
            }
            Command::AddToWatchlist => match self.state.auth_token().map(str::to_string) {
                None => CommandOutcome::Ignored {
                    reason: "not authenticated".to_string(),
                },
                Some(token) => {
                    self.spawn_fetch(
                        PanelSlot::Watchlist,
                        endpoints::add_watchlist(&token, &symbol),
                        |resp: Option<WatchlistResponse>| {
                            PanelUpdate::Watchlist(resp.map(|r| r.watchlist))
                        },
                    );
                    CommandOutcome::Applied
                }
            },
        };

        Some((reply, outcome))
    }

    fn handle_completion(
        &mut self,
        completion: Completion,
    ) -> Option<(oneshot::Sender<CommandOutcome>, CommandOutcome)> {
        match completion {
            Completion::Panel { epoch, update } => {
                let slot = update.slot();
                if self.epochs.is_current(slot, epoch) {
                    self.state.apply_panel(update);
                } else {
                    debug!(
                        component = "orchestrator",
                        event = "fetch.stale_discarded",
                        slot = ?slot,
                        epoch
                    );
                }
                None
            }
            Completion::LiveTick { session, snapshot } => {
                if self.poller.is_current(session) {
                    self.state.apply_panel(PanelUpdate::Live(snapshot));
                } else {
                    debug!(
                        component = "orchestrator",
                        event = "fetch.stale_discarded",
                        slot = ?PanelSlot::Live,
                        session
                    );
                }
                None
            }
            Completion::Prediction { epoch, panel } => {
                self.state.set_prediction_status(PredictionStatus::Idle);
                if self.epochs.is_current(PanelSlot::Prediction, epoch) {
                    self.state.apply_panel(PanelUpdate::Prediction(Some(panel)));
                }
                None
            }
            Completion::Login {
                email,
                outcome,
                reply,
            } => {
                let result = self.credentials.complete_login(&email, outcome);
                self.sync_credential();
                let outcome = match result {
                    Ok(credential) => CommandOutcome::Authenticated { credential },
                    Err(error) => CommandOutcome::AuthFailed { error },
                };
                Some((reply, outcome))
            }
            Completion::Register {
                email,
                outcome,
                reply,
            } => {
                let outcome = match CredentialManager::complete_register(&email, outcome) {
                    Ok(()) => CommandOutcome::Registered,
                    Err(error) => CommandOutcome::AuthFailed { error },
                };
                Some((reply, outcome))
            }
        }
    }

    /// Mirrors the credential manager into the store and re-runs the effect
    /// table. Losing the token empties the account panels.
    fn sync_credential(&mut self) {
        let had_token = self.state.auth_token().is_some();
        self.state.set_credential(self.credentials.current().cloned());

        if had_token && !self.credentials.is_authenticated() {
            for slot in [PanelSlot::Watchlist, PanelSlot::History] {
                self.epochs.begin(slot);
            }
            self.state.apply_panel(PanelUpdate::Watchlist(None));
            self.state.apply_panel(PanelUpdate::History(None));
        }

        self.reconcile();
    }

    fn spawn_fetch<T, F>(&mut self, slot: PanelSlot, request: ApiRequest, into_update: F)
    where
        T: DeserializeOwned + Send + 'static,
        F: FnOnce(Option<T>) -> PanelUpdate + Send + 'static,
    {
        let epoch = self.epochs.begin(slot);
        let gateway = self.gateway.clone();
        let tx = self.completions_tx.clone();
        tokio::spawn(async move {
            let payload = gateway.call(&request).await.decode::<T>().ok();
            let _ = tx.send(Completion::Panel {
                epoch,
                update: into_update(payload),
            });
        });
    }

    fn spawn_news(&mut self, symbol: String) {
        let epoch = self.epochs.begin(PanelSlot::News);
        let gateway = self.gateway.clone();
        let tx = self.completions_tx.clone();
        tokio::spawn(async move {
            let sentiment_request = endpoints::news_sentiment(&symbol);
            let sources_request = endpoints::news_sources();
            let (sentiment, sources) = tokio::join!(
                gateway.call(&sentiment_request),
                gateway.call(&sources_request)
            );
            let panel = NewsPanel::merge(
                sentiment.decode::<NewsSentimentResponse>(),
                sources.decode::<NewsSourcesResponse>(),
            );
            let _ = tx.send(Completion::Panel {
                epoch,
                update: PanelUpdate::News(Some(panel)),
            });
        });
    }

    fn spawn_prediction(&mut self, symbol: String) {
        self.state.set_prediction_status(PredictionStatus::Loading);
        let epoch = self.epochs.begin(PanelSlot::Prediction);
        let request = endpoints::predict(&symbol, self.state.auth_token());
        let gateway = self.gateway.clone();
        let tx = self.completions_tx.clone();
        tokio::spawn(async move {
            let outcome = gateway.call(&request).await.decode::<PredictionSignal>();
            let _ = tx.send(Completion::Prediction {
                epoch,
                panel: PredictionPanel::from_outcome(outcome),
            });
        });
    }

    /// Ensemble first, then the multi-timeframe view; any failure clears both.
    fn spawn_ensemble(&mut self, symbol: String) {
        let epoch = self.epochs.begin(PanelSlot::Ensemble);
        let gateway = self.gateway.clone();
        let tx = self.completions_tx.clone();
        tokio::spawn(async move {
            let ensemble = gateway
                .call(&endpoints::ensemble(&symbol))
                .await
                .decode::<EnsembleForecast>()
                .ok();
            let multi_frame = match ensemble {
                Some(_) => gateway
                    .call(&endpoints::multi_timeframe(&symbol))
                    .await
                    .decode::<MultiFrameForecast>()
                    .ok(),
                None => None,
            };
            let update = match (ensemble, multi_frame) {
                (Some(ensemble), Some(multi_frame)) => PanelUpdate::Ensemble {
                    ensemble: Some(ensemble),
                    multi_frame: Some(multi_frame),
                },
                _ => PanelUpdate::Ensemble {
                    ensemble: None,
                    multi_frame: None,
                },
            };
            let _ = tx.send(Completion::Panel { epoch, update });
        });
    }

    fn start_polling(&mut self, symbol: String) {
        let gateway = self.gateway.clone();
        let tx = self.completions_tx.clone();
        let request = endpoints::live_price(&symbol);
        self.poller.start(&symbol, move |session| {
            let gateway = gateway.clone();
            let tx = tx.clone();
            let request = request.clone();
            async move {
                let snapshot = gateway.call(&request).await.decode::<LiveSnapshot>().ok();
                let _ = tx.send(Completion::LiveTick { session, snapshot });
            }
        });
        self.state.set_polling(self.poller.state());
    }
}
