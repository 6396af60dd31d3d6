//! Request builders for every backend endpoint the client consumes.

use serde_json::json;

use crate::gateway::ApiRequest;
use crate::indicator_settings::IndicatorSettings;

pub const MACRO_REGION: &str = "IN";
pub const ENSEMBLE_TIMEFRAME: &str = "daily";
pub const PORTFOLIO_INITIAL_CASH: f64 = 100_000.0;
pub const BACKTEST_START: &str = "2023-01-01";
pub const BACKTEST_END: &str = "2024-01-01";
pub const BACKTEST_STRATEGY: &str = "rsi_reversion";

pub fn news_sentiment(symbol: &str) -> ApiRequest {
    ApiRequest::get("/api/news/sentiment").with_query("symbol", symbol)
}

pub fn news_sources() -> ApiRequest {
    ApiRequest::get("/api/news/sources")
}

pub fn indicator_catalog() -> ApiRequest {
    ApiRequest::get("/api/indicators/catalog")
}

pub fn indicator_compute(symbol: &str, settings: &IndicatorSettings) -> ApiRequest {
    ApiRequest::post(
        "/api/indicators/advanced",
        json!({ "symbol": symbol, "settings": settings }),
    )
}

pub fn risk_overview(symbol: &str) -> ApiRequest {
    ApiRequest::get("/api/risk/overview").with_query("symbol", symbol)
}

pub fn explainability(symbol: &str) -> ApiRequest {
    ApiRequest::get("/api/explainability").with_query("symbol", symbol)
}

pub fn institutional(symbol: &str) -> ApiRequest {
    ApiRequest::get("/api/institutional").with_query("symbol", symbol)
}

pub fn macro_snapshot(region: &str) -> ApiRequest {
    ApiRequest::get("/api/macro").with_query("region", region)
}

pub fn live_price(symbol: &str) -> ApiRequest {
    ApiRequest::get("/api/live/price").with_query("symbol", symbol)
}

/// The backend tags the prediction into the user's history when a token is sent.
pub fn predict(symbol: &str, auth_token: Option<&str>) -> ApiRequest {
    let request = ApiRequest::post("/api/predict", json!({ "symbol": symbol }));
    match auth_token {
        Some(token) => request.with_auth(token),
        None => request,
    }
}

pub fn ensemble(symbol: &str) -> ApiRequest {
    ApiRequest::post(
        "/api/predict/ensemble",
        json!({ "symbol": symbol, "timeframe": ENSEMBLE_TIMEFRAME }),
    )
}

pub fn multi_timeframe(symbol: &str) -> ApiRequest {
    ApiRequest::get("/api/predict/multiframe").with_query("symbol", symbol)
}

pub fn portfolio_simulate(symbol: &str) -> ApiRequest {
    ApiRequest::post(
        "/api/portfolio/simulate",
        json!({
            "symbol": symbol,
            "initial_cash": PORTFOLIO_INITIAL_CASH,
            "trades": [
                { "side": "buy", "qty": 50 },
                { "side": "sell", "qty": 20 }
            ]
        }),
    )
}

pub fn backtest_run(symbol: &str) -> ApiRequest {
    ApiRequest::post(
        "/api/backtest/run",
        json!({
            "symbol": symbol,
            "start": BACKTEST_START,
            "end": BACKTEST_END,
            "strategy": BACKTEST_STRATEGY
        }),
    )
}

pub fn strategy_parse(rule: &str) -> ApiRequest {
    ApiRequest::post("/api/strategy/parse", json!({ "rule": rule }))
}

pub fn strategy_evaluate(symbol: &str, rule: &str) -> ApiRequest {
    ApiRequest::post(
        "/api/strategy/evaluate",
        json!({ "symbol": symbol, "rule": rule }),
    )
}

pub fn assistant(question: &str, symbol: &str) -> ApiRequest {
    ApiRequest::post(
        "/api/assistant",
        json!({ "question": question, "symbol": symbol }),
    )
}

pub fn register(email: &str, password: &str) -> ApiRequest {
    ApiRequest::post(
        "/api/users/register",
        json!({ "email": email, "password": password }),
    )
}

pub fn login(email: &str, password: &str) -> ApiRequest {
    ApiRequest::post(
        "/api/users/login",
        json!({ "email": email, "password": password }),
    )
}

pub fn watchlist(token: &str) -> ApiRequest {
    ApiRequest::get("/api/users/watchlist").with_auth(token)
}

pub fn add_watchlist(token: &str, symbol: &str) -> ApiRequest {
    ApiRequest::post("/api/users/watchlist", json!({ "symbol": symbol })).with_auth(token)
}

pub fn history(token: &str) -> ApiRequest {
    ApiRequest::get("/api/users/history").with_auth(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::Method;

    #[test]
    fn symbol_endpoints_carry_symbol_as_query() {
        let req = risk_overview("TSLA");
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.path, "/api/risk/overview");
        assert_eq!(req.query_value("symbol"), Some("TSLA"));
        assert!(req.auth_token.is_none());
    }

    #[test]
    fn only_account_endpoints_are_authenticated() {
        assert_eq!(watchlist("t").auth_token.as_deref(), Some("t"));
        assert_eq!(history("t").auth_token.as_deref(), Some("t"));
        assert_eq!(add_watchlist("t", "AAPL").auth_token.as_deref(), Some("t"));
        assert!(news_sources().auth_token.is_none());
        assert!(predict("AAPL", None).auth_token.is_none());
        assert_eq!(predict("AAPL", Some("t")).auth_token.as_deref(), Some("t"));
    }

    #[test]
    fn macro_region_is_fixed_and_fixed_payloads_match_backend_contract() {
        assert_eq!(macro_snapshot(MACRO_REGION).query_value("region"), Some("IN"));

        let backtest = backtest_run("AAPL").body.unwrap();
        assert_eq!(backtest["start"], "2023-01-01");
        assert_eq!(backtest["strategy"], "rsi_reversion");

        let portfolio = portfolio_simulate("AAPL").body.unwrap();
        assert_eq!(portfolio["trades"].as_array().unwrap().len(), 2);

        let ensemble = ensemble("AAPL").body.unwrap();
        assert_eq!(ensemble["timeframe"], "daily");
    }

    #[test]
    fn indicator_compute_serializes_explicit_settings_schema() {
        let body = indicator_compute("AAPL", &IndicatorSettings::default())
            .body
            .unwrap();
        assert_eq!(body["settings"]["rsi_period"], 14);
        assert_eq!(body["settings"]["bb_std"], 2.0);
    }
}
