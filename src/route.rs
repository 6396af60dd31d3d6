//! Static route catalog and navigation-fragment resolution.
//!
//! Rules implemented:
//! - a fragment matches a route only by exact, case-sensitive id
//! - one leading `#` is ignored (fragments come straight from a URL hash)
//! - anything else resolves to the first catalog entry, `dashboard`

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteId {
    Dashboard,
    Prediction,
    News,
    Indicators,
    Portfolio,
    Backtest,
    Strategy,
    Live,
    Risk,
    Accounts,
    Explain,
    Institutional,
    Macro,
    Assistant,
}

impl RouteId {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dashboard => "dashboard",
            Self::Prediction => "prediction",
            Self::News => "news",
            Self::Indicators => "indicators",
            Self::Portfolio => "portfolio",
            Self::Backtest => "backtest",
            Self::Strategy => "strategy",
            Self::Live => "live",
            Self::Risk => "risk",
            Self::Accounts => "accounts",
            Self::Explain => "explain",
            Self::Institutional => "institutional",
            Self::Macro => "macro",
            Self::Assistant => "assistant",
        }
    }

    pub fn route(self) -> &'static Route {
        ROUTES
            .iter()
            .find(|route| route.id == self)
            .unwrap_or(&ROUTES[0])
    }
}

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Route {
    pub id: RouteId,
    pub label: &'static str,
    pub meta: &'static str,
}

pub const ROUTES: [Route; 14] = [
    Route {
        id: RouteId::Dashboard,
        label: "Command Deck",
        meta: "Overview + signals",
    },
    Route {
        id: RouteId::Prediction,
        label: "AI Prediction Engine",
        meta: "Ensemble + confidence",
    },
    Route {
        id: RouteId::News,
        label: "AI News Sentiment",
        meta: "Sources + impact",
    },
    Route {
        id: RouteId::Indicators,
        label: "Indicators Panel",
        meta: "RSI / MACD / VWAP",
    },
    Route {
        id: RouteId::Portfolio,
        label: "Portfolio Simulator",
        meta: "PnL + risk",
    },
    Route {
        id: RouteId::Backtest,
        label: "Backtesting Engine",
        meta: "Strategy replay",
    },
    Route {
        id: RouteId::Strategy,
        label: "Strategy Builder",
        meta: "No-code rules",
    },
    Route {
        id: RouteId::Live,
        label: "Live Market Mode",
        meta: "Streaming snapshot",
    },
    Route {
        id: RouteId::Risk,
        label: "Risk Dashboard",
        meta: "VaR + beta",
    },
    Route {
        id: RouteId::Accounts,
        label: "Accounts",
        meta: "Login + watchlist",
    },
    Route {
        id: RouteId::Explain,
        label: "AI Explainability",
        meta: "Feature impact",
    },
    Route {
        id: RouteId::Institutional,
        label: "Institutional Data",
        meta: "FII / DII",
    },
    Route {
        id: RouteId::Macro,
        label: "Macro Impact",
        meta: "Rates + events",
    },
    Route {
        id: RouteId::Assistant,
        label: "Market Assistant",
        meta: "Q&A",
    },
];

pub const DEFAULT_ROUTE: RouteId = ROUTES[0].id;

pub fn resolve(fragment: &str) -> RouteId {
    let id = fragment.strip_prefix('#').unwrap_or(fragment);
    ROUTES
        .iter()
        .find(|route| route.id.as_str() == id)
        .map(|route| route.id)
        .unwrap_or(DEFAULT_ROUTE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_fragments_resolve_to_their_route() {
        assert_eq!(resolve("risk"), RouteId::Risk);
        assert_eq!(resolve("live"), RouteId::Live);
        assert_eq!(resolve("#accounts"), RouteId::Accounts);
    }

    #[test]
    fn unknown_or_empty_fragments_fall_back_to_dashboard() {
        assert_eq!(resolve("unknown"), RouteId::Dashboard);
        assert_eq!(resolve(""), RouteId::Dashboard);
        assert_eq!(resolve("#"), RouteId::Dashboard);
        assert_eq!(resolve("##risk"), RouteId::Dashboard);
        assert_eq!(resolve(" risk"), RouteId::Dashboard);
    }

    #[test]
    fn matching_is_case_sensitive() {
        assert_eq!(resolve("Risk"), RouteId::Dashboard);
        assert_eq!(resolve("LIVE"), RouteId::Dashboard);
    }

    #[test]
    fn every_catalog_id_round_trips_through_resolve() {
        for route in ROUTES {
            assert_eq!(resolve(route.id.as_str()), route.id);
            assert_eq!(route.id.route().label, route.label);
        }
    }

    #[test]
    fn default_route_is_first_catalog_entry() {
        assert_eq!(DEFAULT_ROUTE, RouteId::Dashboard);
        assert_eq!(ROUTES.len(), 14);
    }
}
