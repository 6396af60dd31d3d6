//! Uniform JSON-over-HTTP request/response translation.
//!
//! Every call yields exactly one [`FetchOutcome`]. Transport failures, non-success
//! statuses and malformed bodies are all folded into `Failure(message)` here, so
//! nothing past this boundary ever sees an error type.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

pub const AUTH_HEADER: &str = "X-Auth-Token";
pub const GENERIC_FAILURE: &str = "Request failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub auth_token: Option<String>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            query: Vec::new(),
            auth_token: None,
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            query: Vec::new(),
            auth_token: None,
            body: Some(body),
        }
    }

    pub fn with_query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    pub fn with_auth(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("{message}")]
    Api { status: u16, message: String },
    #[error("invalid JSON response: {0}")]
    Decode(String),
}

impl FetchError {
    fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Api { .. } => "api",
            Self::Decode(_) => "decode",
        }
    }
}

#[derive(Debug, Error)]
pub enum GatewayBuildError {
    #[error("HTTP client build error: {0}")]
    ClientBuild(String),
    #[error("invalid API base URL '{0}'")]
    InvalidBaseUrl(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome<T> {
    Success(T),
    Failure(String),
}

impl<T> FetchOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn ok(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            Self::Failure(_) => None,
        }
    }

    pub fn failure_message(&self) -> Option<&str> {
        match self {
            Self::Success(_) => None,
            Self::Failure(message) => Some(message),
        }
    }
}

impl FetchOutcome<Value> {
    /// Decodes a successful JSON payload into the panel type that consumes it.
    pub fn decode<T: DeserializeOwned>(self) -> FetchOutcome<T> {
        match self {
            Self::Success(value) => match serde_json::from_value(value) {
                Ok(decoded) => FetchOutcome::Success(decoded),
                Err(err) => FetchOutcome::Failure(FetchError::Decode(err.to_string()).to_string()),
            },
            Self::Failure(message) => FetchOutcome::Failure(message),
        }
    }
}

pub type TransportFuture<'a> =
    Pin<Box<dyn Future<Output = Result<RawResponse, FetchError>> + Send + 'a>>;

/// Sends one request and hands back whatever status and body came back.
///
/// Implementations only return `Err` when no response was received at all.
pub trait HttpTransport: Send + Sync + 'static {
    fn send<'a>(&'a self, request: &'a ApiRequest) -> TransportFuture<'a>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
}

impl ReqwestTransport {
    pub fn new(base_url: &str, timeout_ms: u64) -> Result<Self, GatewayBuildError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        Url::parse(&base_url).map_err(|_| GatewayBuildError::InvalidBaseUrl(base_url.clone()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .user_agent("pulseforge-client/0.1")
            .build()
            .map_err(|err| GatewayBuildError::ClientBuild(err.to_string()))?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, request: &ApiRequest) -> Result<Url, FetchError> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, request.path))
            .map_err(|err| FetchError::Transport(err.to_string()))?;
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(request.query.iter());
        }
        Ok(url)
    }

    async fn send_inner(&self, request: &ApiRequest) -> Result<RawResponse, FetchError> {
        let url = self.url_for(request)?;
        let mut builder = match request.method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
        };

        if let Some(token) = &request.auth_token {
            builder = builder.header(AUTH_HEADER, token.as_str());
        }
        if let Some(body) = &request.body {
            let bytes =
                serde_json::to_vec(body).map_err(|err| FetchError::Transport(err.to_string()))?;
            builder = builder.header(CONTENT_TYPE, "application/json").body(bytes);
        }

        let response = builder
            .send()
            .await
            .map_err(|err| FetchError::Transport(err.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|err| FetchError::Transport(err.to_string()))?;

        Ok(RawResponse {
            status,
            body: body.to_vec(),
        })
    }
}

impl HttpTransport for ReqwestTransport {
    fn send<'a>(&'a self, request: &'a ApiRequest) -> TransportFuture<'a> {
        Box::pin(self.send_inner(request))
    }
}

#[derive(Clone)]
pub struct DataGateway {
    transport: Arc<dyn HttpTransport>,
}

impl DataGateway {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    pub async fn call(&self, request: &ApiRequest) -> FetchOutcome<Value> {
        debug!(
            component = "gateway",
            event = "fetch.request",
            method = request.method.as_str(),
            path = %request.path,
            authenticated = request.auth_token.is_some()
        );

        match self.try_call(request).await {
            Ok(value) => FetchOutcome::Success(value),
            Err(err) => {
                warn!(
                    component = "gateway",
                    event = "fetch.failure",
                    method = request.method.as_str(),
                    path = %request.path,
                    kind = err.kind(),
                    message = %err
                );
                FetchOutcome::Failure(err.to_string())
            }
        }
    }

    async fn try_call(&self, request: &ApiRequest) -> Result<Value, FetchError> {
        let raw = self.transport.send(request).await?;
        let decoded = serde_json::from_slice::<Value>(&raw.body);

        if !raw.is_success() {
            let message = decoded
                .ok()
                .as_ref()
                .and_then(|body| body.get("error"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| GENERIC_FAILURE.to_string());
            return Err(FetchError::Api {
                status: raw.status,
                message,
            });
        }

        decoded.map_err(|err| FetchError::Decode(err.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MockReply {
    Json { status: u16, body: Value },
    Raw { status: u16, body: Vec<u8> },
    TransportFailure(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub auth_token: Option<String>,
    pub body: Option<Value>,
}

impl RecordedCall {
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Default)]
struct MockState {
    replies: HashMap<(Method, String), MockReply>,
    delays: HashMap<(Method, String), Duration>,
    calls: Vec<RecordedCall>,
    unrecorded: bool,
}

/// Canned in-process backend keyed by method and path; records every call
/// unless built with [`InMemoryMockTransport::without_call_log`].
///
/// Unknown routes answer `404 {"error": "not found"}`.
#[derive(Clone, Default)]
pub struct InMemoryMockTransport {
    inner: Arc<Mutex<MockState>>,
}

impl InMemoryMockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn demo() -> Self {
        let mock = Self::new();
        for (method, path, body) in demo_replies() {
            mock.respond_json(method, path, 200, body);
        }
        mock
    }

    /// Stops recording calls; for demo backends that run indefinitely.
    pub fn without_call_log(self) -> Self {
        {
            let mut state = self.lock();
            state.unrecorded = true;
            state.calls.clear();
        }
        self
    }

    pub fn respond_json(&self, method: Method, path: &str, status: u16, body: Value) -> &Self {
        self.set_reply(method, path, MockReply::Json { status, body })
    }

    pub fn respond_raw(&self, method: Method, path: &str, status: u16, body: &[u8]) -> &Self {
        self.set_reply(
            method,
            path,
            MockReply::Raw {
                status,
                body: body.to_vec(),
            },
        )
    }

    pub fn fail_transport(&self, method: Method, path: &str, message: &str) -> &Self {
        self.set_reply(method, path, MockReply::TransportFailure(message.to_string()))
    }

    /// Holds every later reply on this route for `delay` before answering.
    pub fn delay(&self, method: Method, path: &str, delay: Duration) -> &Self {
        self.lock().delays.insert((method, path.to_string()), delay);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    pub fn calls_to(&self, method: Method, path: &str) -> Vec<RecordedCall> {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.method == method && call.path == path)
            .cloned()
            .collect()
    }

    pub fn count(&self, method: Method, path: &str) -> usize {
        self.calls_to(method, path).len()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    fn set_reply(&self, method: Method, path: &str, reply: MockReply) -> &Self {
        self.lock().replies.insert((method, path.to_string()), reply);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.inner
            .lock()
            .expect("mock transport lock should not be poisoned")
    }

    fn reply_for(&self, request: &ApiRequest) -> (MockReply, Option<Duration>) {
        let mut state = self.lock();
        if !state.unrecorded {
            state.calls.push(RecordedCall {
                method: request.method,
                path: request.path.clone(),
                query: request.query.clone(),
                auth_token: request.auth_token.clone(),
                body: request.body.clone(),
            });
        }
        let key = (request.method, request.path.clone());
        let reply = state.replies.get(&key).cloned().unwrap_or(MockReply::Json {
            status: 404,
            body: json!({ "error": "not found" }),
        });
        (reply, state.delays.get(&key).copied())
    }
}

impl HttpTransport for InMemoryMockTransport {
    fn send<'a>(&'a self, request: &'a ApiRequest) -> TransportFuture<'a> {
        let (reply, delay) = self.reply_for(request);
        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            match reply {
                MockReply::Json { status, body } => Ok(RawResponse {
                    status,
                    body: serde_json::to_vec(&body)
                        .map_err(|err| FetchError::Transport(err.to_string()))?,
                }),
                MockReply::Raw { status, body } => Ok(RawResponse { status, body }),
                MockReply::TransportFailure(message) => Err(FetchError::Transport(message)),
            }
        })
    }
}

fn demo_replies() -> Vec<(Method, &'static str, Value)> {
    vec![
        (
            Method::Get,
            "/api/news/sentiment",
            json!({
                "items": [{
                    "title": "Add your Reuters or Moneycontrol ingestion pipeline",
                    "source": "placeholder",
                    "summary": "News scraping is disabled by default.",
                    "sentiment": 0.0
                }],
                "breakdown": { "positive": 0.45, "negative": 0.18, "neutral": 0.37, "model": "Mock" }
            }),
        ),
        (
            Method::Get,
            "/api/news/sources",
            json!({ "sources": [
                { "name": "Reuters", "status": "ready" },
                { "name": "Moneycontrol", "status": "ready" }
            ]}),
        ),
        (
            Method::Get,
            "/api/indicators/catalog",
            json!({ "indicators": [
                { "id": "rsi", "label": "RSI", "defaults": { "period": 14 } },
                { "id": "macd", "label": "MACD", "defaults": { "fast": 12, "slow": 26, "signal": 9 } },
                { "id": "vwap", "label": "VWAP", "defaults": {} }
            ]}),
        ),
        (
            Method::Post,
            "/api/indicators/advanced",
            json!({ "rows": [{ "rsi": 48.2, "macd_hist": 0.31, "vwap": 171.4 }] }),
        ),
        (
            Method::Get,
            "/api/risk/overview",
            json!({
                "beta": 1.12, "volatility": 0.241, "var": 0.043,
                "correlations": [{ "sector": "Tech", "corr": 0.71 }]
            }),
        ),
        (
            Method::Get,
            "/api/explainability",
            json!({ "contributions": [
                { "feature": "RSI", "impact": 0.082 },
                { "feature": "Sentiment", "impact": -0.021 }
            ]}),
        ),
        (
            Method::Get,
            "/api/institutional",
            json!({
                "fii_flow": 112.4, "dii_flow": -35.2,
                "insider_activity": "Neutral", "earnings_impact": "Positive",
                "block_deals": [{ "party": "Institutional Desk A", "volume": 180000 }]
            }),
        ),
        (
            Method::Get,
            "/api/macro",
            json!({
                "interest_rate": 6.5, "inflation": 4.8, "policy_event": "RBI Statement",
                "next_events": [{ "title": "Policy Meeting", "eta_days": 6 }]
            }),
        ),
        (
            Method::Get,
            "/api/live/price",
            json!({ "price": 182.35, "change": 0.84, "market_state": "open" }),
        ),
        (
            Method::Post,
            "/api/predict",
            json!({ "action": "hold", "confidence": 0.4, "score": 1.2 }),
        ),
        (
            Method::Post,
            "/api/predict/ensemble",
            json!({
                "direction": "up", "next_close": 184.1, "probability": 0.61,
                "models": [{ "name": "LSTM", "direction": "up", "price": 185.0, "confidence": 0.64 }]
            }),
        ),
        (
            Method::Get,
            "/api/predict/multiframe",
            json!({
                "intraday": { "direction": "up", "next_close": 182.9 },
                "daily": { "direction": "up", "next_close": 184.1 },
                "weekly": { "direction": "down", "next_close": 179.6 }
            }),
        ),
        (
            Method::Post,
            "/api/portfolio/simulate",
            json!({ "pnl": 4210.5, "sharpe": 1.21, "max_drawdown": 0.084, "risk_score": 0.43 }),
        ),
        (
            Method::Post,
            "/api/backtest/run",
            json!({
                "total_return": 0.118, "win_rate": 0.56, "max_drawdown": 0.12,
                "trades": [{ "id": 1, "side": "buy", "entry": 150.2, "exit": 161.8, "pnl": 0.041 }]
            }),
        ),
        (
            Method::Post,
            "/api/strategy/parse",
            json!({ "valid": true, "message": "Parsed rule set" }),
        ),
        (
            Method::Post,
            "/api/strategy/evaluate",
            json!({
                "action": "buy", "confidence": 0.62,
                "explanation": "Rule-based evaluation using configured indicators and sentiment."
            }),
        ),
        (
            Method::Post,
            "/api/assistant",
            json!({ "reply": "This is not financial advice. The current signal mix suggests caution." }),
        ),
        (Method::Post, "/api/users/register", json!({})),
        (
            Method::Post,
            "/api/users/login",
            json!({ "token": "demo-token", "email": "demo@pulseforge.local" }),
        ),
        (Method::Get, "/api/users/watchlist", json!({ "watchlist": ["AAPL"] })),
        (Method::Post, "/api/users/watchlist", json!({ "watchlist": ["AAPL"] })),
        (Method::Get, "/api/users/history", json!({ "history": [] })),
    ]
}
