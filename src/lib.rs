//! PulseForge dashboard client core.
//!
//! Current implemented scope:
//! - route catalog and navigation-fragment resolution
//! - credential lifecycle over a durable key/value store
//! - JSON-over-HTTP data gateway with typed panel payloads
//! - chart surface and live polling lifecycles
//! - effect table and the view-state orchestrator driving all of the above
//! - HTTP surface exposing view snapshots and commands

mod chart;
mod config;
mod credentials;
mod effects;
pub mod endpoints;
mod gateway;
mod indicator_settings;
mod observability;
mod orchestrator;
mod panels;
mod polling;
mod route;
mod view_server;
mod view_state;

pub use chart::{
    ChartLifecycle, ForecastSeries, HeadlessRenderTarget, RenderStats, RenderTarget, SurfaceId,
};
pub use config::{
    client_config_from_env, ClientConfig, ConfigError, DEFAULT_API_BASE, DEFAULT_LIVE_POLL_MS,
    DEFAULT_SYMBOL,
};
pub use credentials::{
    AuthError, Credential, CredentialManager, CredentialStore, CredentialStoreError,
    FileCredentialStore, MemoryCredentialStore, AUTH_EMAIL_KEY, AUTH_TOKEN_KEY,
};
pub use effects::{plan_effects, Effect, Trigger};
pub use gateway::{
    ApiRequest, DataGateway, FetchError, FetchOutcome, GatewayBuildError, HttpTransport,
    InMemoryMockTransport, Method, MockReply, RawResponse, RecordedCall, ReqwestTransport,
    TransportFuture, AUTH_HEADER, GENERIC_FAILURE,
};
pub use indicator_settings::{IndicatorSettings, IndicatorSettingsError};
pub use observability::{
    init_logging, log_app_bind, log_app_start, log_backend_selected, logging_config_from_env,
    LogFormat, LoggingConfig, LoggingInitError,
};
pub use orchestrator::{
    Command, CommandOutcome, Orchestrator, OrchestratorClosed, OrchestratorConfig,
    OrchestratorHandle,
};
pub use panels::{
    AssistantReply, BacktestResult, BacktestTrade, BlockDeal, EnsembleForecast, Explainability,
    FeatureContribution, HistoryEntry, IndicatorDescriptor, IndicatorRow, InstitutionalSnapshot,
    LiveSnapshot, MacroEvent, MacroSnapshot, ModelForecast, MultiFrameForecast, NewsItem,
    NewsPanel, NewsSource, PanelSlot, PanelUpdate, Panels, PortfolioResult, PredictionPanel,
    PredictionSignal, RiskOverview, SectorCorrelation, SentimentBreakdown, StrategyEvaluation,
    StrategyParse, TimeframeForecast,
};
pub use polling::{LivePoller, PollingState, MIN_POLL_PERIOD};
pub use route::{resolve, Route, RouteId, DEFAULT_ROUTE, ROUTES};
pub use view_server::view_router;
pub use view_state::{normalize_symbol, PredictionStatus, SlotEpochs, ViewState};
