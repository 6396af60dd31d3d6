//! Panel payloads as consumed from the backend, and the per-panel slot table.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::gateway::FetchOutcome;

/// Reads an explicit `null` the same as a missing key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PanelSlot {
    News,
    IndicatorCatalog,
    IndicatorRows,
    Risk,
    Explain,
    Institutional,
    Macro,
    Live,
    Prediction,
    Ensemble,
    Portfolio,
    Backtest,
    StrategyParse,
    StrategyEval,
    Assistant,
    Watchlist,
    History,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsItem {
    #[serde(deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(deserialize_with = "null_as_default")]
    pub summary: String,
    #[serde(deserialize_with = "null_as_default")]
    pub source: String,
    #[serde(deserialize_with = "null_as_default")]
    pub url: String,
    #[serde(deserialize_with = "null_as_default")]
    pub published_at: String,
    #[serde(deserialize_with = "null_as_default")]
    pub sentiment: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SentimentBreakdown {
    pub positive: f64,
    pub negative: f64,
    pub neutral: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub model: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsSource {
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewsSentimentResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub items: Vec<NewsItem>,
    pub breakdown: Option<SentimentBreakdown>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewsSourcesResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub sources: Vec<NewsSource>,
}

/// News sentiment and news sources, fetched side by side and merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NewsPanel {
    pub items: Vec<NewsItem>,
    pub breakdown: Option<SentimentBreakdown>,
    pub sources: Vec<NewsSource>,
}

impl NewsPanel {
    /// Each half falls back to empty on its own failure; a failed sibling never
    /// blanks out a successful one.
    pub fn merge(
        sentiment: FetchOutcome<NewsSentimentResponse>,
        sources: FetchOutcome<NewsSourcesResponse>,
    ) -> Self {
        let (items, breakdown) = match sentiment.ok() {
            Some(resp) => (resp.items, resp.breakdown),
            None => (Vec::new(), None),
        };
        let sources = sources.ok().map(|resp| resp.sources).unwrap_or_default();

        Self {
            items,
            breakdown,
            sources,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorDescriptor {
    pub id: String,
    pub label: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub defaults: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IndicatorCatalogResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub indicators: Vec<IndicatorDescriptor>,
}

pub type IndicatorRow = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IndicatorRowsResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub rows: Vec<IndicatorRow>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SectorCorrelation {
    #[serde(deserialize_with = "null_as_default")]
    pub sector: String,
    #[serde(deserialize_with = "null_as_default")]
    pub corr: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskOverview {
    pub beta: f64,
    pub volatility: f64,
    pub var: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub correlations: Vec<SectorCorrelation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureContribution {
    #[serde(deserialize_with = "null_as_default")]
    pub feature: String,
    #[serde(deserialize_with = "null_as_default")]
    pub impact: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explainability {
    pub contributions: Vec<FeatureContribution>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockDeal {
    #[serde(deserialize_with = "null_as_default")]
    pub party: String,
    #[serde(deserialize_with = "null_as_default")]
    pub volume: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstitutionalSnapshot {
    pub fii_flow: f64,
    pub dii_flow: f64,
    pub insider_activity: String,
    pub earnings_impact: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub block_deals: Vec<BlockDeal>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MacroEvent {
    #[serde(deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(deserialize_with = "null_as_default")]
    pub eta_days: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroSnapshot {
    pub interest_rate: f64,
    pub inflation: f64,
    pub policy_event: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub next_events: Vec<MacroEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveSnapshot {
    pub price: f64,
    pub change: f64,
    pub market_state: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionSignal {
    pub action: String,
    pub confidence: f64,
    pub score: f64,
}

/// Prediction is the one action whose failure is shown to the user.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PredictionPanel {
    Signal(PredictionSignal),
    Warning { message: String },
}

impl PredictionPanel {
    pub fn from_outcome(outcome: FetchOutcome<PredictionSignal>) -> Self {
        match outcome {
            FetchOutcome::Success(signal) => Self::Signal(signal),
            FetchOutcome::Failure(message) => Self::Warning { message },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelForecast {
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub direction: String,
    #[serde(deserialize_with = "null_as_default")]
    pub price: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleForecast {
    pub direction: String,
    pub next_close: f64,
    pub probability: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub models: Vec<ModelForecast>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeframeForecast {
    pub direction: String,
    pub next_close: f64,
}

pub type MultiFrameForecast = BTreeMap<String, TimeframeForecast>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioResult {
    pub pnl: f64,
    pub sharpe: f64,
    pub max_drawdown: f64,
    pub risk_score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestTrade {
    #[serde(deserialize_with = "null_as_default")]
    pub id: u32,
    #[serde(deserialize_with = "null_as_default")]
    pub side: String,
    #[serde(deserialize_with = "null_as_default")]
    pub entry: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub exit: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub pnl: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub total_return: f64,
    pub win_rate: f64,
    pub max_drawdown: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub trades: Vec<BacktestTrade>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyParse {
    pub valid: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyEvaluation {
    pub action: String,
    pub confidence: f64,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantReply {
    pub reply: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WatchlistResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub watchlist: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryEntry {
    #[serde(deserialize_with = "null_as_default")]
    pub symbol: String,
    #[serde(deserialize_with = "null_as_default")]
    pub action: String,
    #[serde(deserialize_with = "null_as_default")]
    pub score: Option<f64>,
    #[serde(deserialize_with = "null_as_default")]
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HistoryResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub history: Vec<HistoryEntry>,
}

/// Latest resolved payload per panel; `None` is an empty panel.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Panels {
    pub news: Option<NewsPanel>,
    pub indicator_catalog: Option<Vec<IndicatorDescriptor>>,
    pub indicator_rows: Option<Vec<IndicatorRow>>,
    pub risk: Option<RiskOverview>,
    pub explain: Option<Explainability>,
    pub institutional: Option<InstitutionalSnapshot>,
    #[serde(rename = "macro")]
    pub macro_snapshot: Option<MacroSnapshot>,
    pub live: Option<LiveSnapshot>,
    pub prediction: Option<PredictionPanel>,
    pub ensemble: Option<EnsembleForecast>,
    pub multi_frame: Option<MultiFrameForecast>,
    pub portfolio: Option<PortfolioResult>,
    pub backtest: Option<BacktestResult>,
    pub strategy_parse: Option<StrategyParse>,
    pub strategy_eval: Option<StrategyEvaluation>,
    pub assistant: Option<AssistantReply>,
    pub watchlist: Option<Vec<String>>,
    pub history: Option<Vec<HistoryEntry>>,
}

/// One write to one panel slot.
#[derive(Debug, Clone, PartialEq)]
pub enum PanelUpdate {
    News(Option<NewsPanel>),
    IndicatorCatalog(Option<Vec<IndicatorDescriptor>>),
    IndicatorRows(Option<Vec<IndicatorRow>>),
    Risk(Option<RiskOverview>),
    Explain(Option<Explainability>),
    Institutional(Option<InstitutionalSnapshot>),
    Macro(Option<MacroSnapshot>),
    Live(Option<LiveSnapshot>),
    Prediction(Option<PredictionPanel>),
    Ensemble {
        ensemble: Option<EnsembleForecast>,
        multi_frame: Option<MultiFrameForecast>,
    },
    Portfolio(Option<PortfolioResult>),
    Backtest(Option<BacktestResult>),
    StrategyParse(Option<StrategyParse>),
    StrategyEval(Option<StrategyEvaluation>),
    Assistant(Option<AssistantReply>),
    Watchlist(Option<Vec<String>>),
    History(Option<Vec<HistoryEntry>>),
}

impl PanelUpdate {
    pub fn slot(&self) -> PanelSlot {
        match self {
            Self::News(_) => PanelSlot::News,
            Self::IndicatorCatalog(_) => PanelSlot::IndicatorCatalog,
            Self::IndicatorRows(_) => PanelSlot::IndicatorRows,
            Self::Risk(_) => PanelSlot::Risk,
            Self::Explain(_) => PanelSlot::Explain,
            Self::Institutional(_) => PanelSlot::Institutional,
            Self::Macro(_) => PanelSlot::Macro,
            Self::Live(_) => PanelSlot::Live,
            Self::Prediction(_) => PanelSlot::Prediction,
            Self::Ensemble { .. } => PanelSlot::Ensemble,
            Self::Portfolio(_) => PanelSlot::Portfolio,
            Self::Backtest(_) => PanelSlot::Backtest,
            Self::StrategyParse(_) => PanelSlot::StrategyParse,
            Self::StrategyEval(_) => PanelSlot::StrategyEval,
            Self::Assistant(_) => PanelSlot::Assistant,
            Self::Watchlist(_) => PanelSlot::Watchlist,
            Self::History(_) => PanelSlot::History,
        }
    }
}

impl Panels {
    pub fn apply(&mut self, update: PanelUpdate) {
        match update {
            PanelUpdate::News(v) => self.news = v,
            PanelUpdate::IndicatorCatalog(v) => self.indicator_catalog = v,
            PanelUpdate::IndicatorRows(v) => self.indicator_rows = v,
            PanelUpdate::Risk(v) => self.risk = v,
            PanelUpdate::Explain(v) => self.explain = v,
            PanelUpdate::Institutional(v) => self.institutional = v,
            PanelUpdate::Macro(v) => self.macro_snapshot = v,
            PanelUpdate::Live(v) => self.live = v,
            PanelUpdate::Prediction(v) => self.prediction = v,
            PanelUpdate::Ensemble {
                ensemble,
                multi_frame,
            } => {
                self.ensemble = ensemble;
                self.multi_frame = multi_frame;
            }
            PanelUpdate::Portfolio(v) => self.portfolio = v,
            PanelUpdate::Backtest(v) => self.backtest = v,
            PanelUpdate::StrategyParse(v) => self.strategy_parse = v,
            PanelUpdate::StrategyEval(v) => self.strategy_eval = v,
            PanelUpdate::Assistant(v) => self.assistant = v,
            PanelUpdate::Watchlist(v) => self.watchlist = v,
            PanelUpdate::History(v) => self.history = v,
        }
    }
}
