//! The reactive effect table, as a pure function of two trigger tuples.
//!
//! | change                               | effects                                  |
//! |--------------------------------------|------------------------------------------|
//! | route or symbol, previous was live   | stop polling                             |
//! | route                                | chart transition                         |
//! | route or symbol, on news/dashboard   | news sentiment + sources                 |
//! | route, on indicators                 | indicator catalog                        |
//! | route or symbol, on risk             | risk overview                            |
//! | route or symbol, on explain          | explainability                           |
//! | route or symbol, on institutional    | institutional flows                      |
//! | route, on macro                      | macro snapshot (region `IN`)             |
//! | route or symbol, on live             | start polling                            |
//! | route or token, on accounts + authed | watchlist + history                      |

use crate::endpoints::MACRO_REGION;
use crate::route::RouteId;

/// The tuple the scheduler reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    pub route: RouteId,
    pub symbol: String,
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    StopPolling,
    RouteChart(RouteId),
    FetchNews { symbol: String },
    FetchIndicatorCatalog,
    FetchRisk { symbol: String },
    FetchExplain { symbol: String },
    FetchInstitutional { symbol: String },
    FetchMacro { region: &'static str },
    StartPolling { symbol: String },
    FetchAccount { token: String },
}

impl Effect {
    pub fn name(&self) -> &'static str {
        match self {
            Self::StopPolling => "stop_polling",
            Self::RouteChart(_) => "route_chart",
            Self::FetchNews { .. } => "fetch_news",
            Self::FetchIndicatorCatalog => "fetch_indicator_catalog",
            Self::FetchRisk { .. } => "fetch_risk",
            Self::FetchExplain { .. } => "fetch_explain",
            Self::FetchInstitutional { .. } => "fetch_institutional",
            Self::FetchMacro { .. } => "fetch_macro",
            Self::StartPolling { .. } => "start_polling",
            Self::FetchAccount { .. } => "fetch_account",
        }
    }
}

/// Effects due when the trigger moves from `prev` to `next`. `prev = None` is
/// the first evaluation, where everything counts as changed.
pub fn plan_effects(prev: Option<&Trigger>, next: &Trigger) -> Vec<Effect> {
    let route_changed = prev.map_or(true, |p| p.route != next.route);
    let symbol_changed = prev.map_or(true, |p| p.symbol != next.symbol);
    let token_changed = prev.map_or(true, |p| p.auth_token != next.auth_token);
    let view_changed = route_changed || symbol_changed;

    let mut effects = Vec::new();

    if view_changed && prev.is_some_and(|p| p.route == RouteId::Live) {
        effects.push(Effect::StopPolling);
    }

    if route_changed {
        effects.push(Effect::RouteChart(next.route));
    }

    let symbol = || next.symbol.clone();
    match next.route {
        RouteId::News | RouteId::Dashboard if view_changed => {
            effects.push(Effect::FetchNews { symbol: symbol() });
        }
        RouteId::Indicators if route_changed => effects.push(Effect::FetchIndicatorCatalog),
        RouteId::Risk if view_changed => effects.push(Effect::FetchRisk { symbol: symbol() }),
        RouteId::Explain if view_changed => {
            effects.push(Effect::FetchExplain { symbol: symbol() });
        }
        RouteId::Institutional if view_changed => {
            effects.push(Effect::FetchInstitutional { symbol: symbol() });
        }
        RouteId::Macro if route_changed => effects.push(Effect::FetchMacro {
            region: MACRO_REGION,
        }),
        RouteId::Live if view_changed => {
            effects.push(Effect::StartPolling { symbol: symbol() });
        }
        _ => {}
    }

    if next.route == RouteId::Accounts && (route_changed || token_changed) {
        if let Some(token) = next.auth_token.as_deref().filter(|t| !t.is_empty()) {
            effects.push(Effect::FetchAccount {
                token: token.to_string(),
            });
        }
    }

    effects
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trigger(route: RouteId, symbol: &str, token: Option<&str>) -> Trigger {
        Trigger {
            route,
            symbol: symbol.to_string(),
            auth_token: token.map(str::to_string),
        }
    }

    #[test]
    fn first_evaluation_on_dashboard_creates_chart_and_fetches_news() {
        let effects = plan_effects(None, &trigger(RouteId::Dashboard, "AAPL", None));
        assert_eq!(
            effects,
            vec![
                Effect::RouteChart(RouteId::Dashboard),
                Effect::FetchNews {
                    symbol: "AAPL".to_string()
                },
            ]
        );
    }

    #[test]
    fn leaving_live_stops_polling_and_moves_chart() {
        let prev = trigger(RouteId::Live, "AAPL", None);
        let effects = plan_effects(Some(&prev), &trigger(RouteId::Risk, "AAPL", None));
        assert_eq!(
            effects,
            vec![
                Effect::StopPolling,
                Effect::RouteChart(RouteId::Risk),
                Effect::FetchRisk {
                    symbol: "AAPL".to_string()
                },
            ]
        );
    }

    #[test]
    fn symbol_change_on_live_restarts_polling_without_chart_transition() {
        let prev = trigger(RouteId::Live, "AAPL", None);
        let effects = plan_effects(Some(&prev), &trigger(RouteId::Live, "TSLA", None));
        assert_eq!(
            effects,
            vec![
                Effect::StopPolling,
                Effect::StartPolling {
                    symbol: "TSLA".to_string()
                },
            ]
        );
    }

    #[test]
    fn symbol_independent_panels_ignore_symbol_changes() {
        let prev = trigger(RouteId::Macro, "AAPL", None);
        assert!(plan_effects(Some(&prev), &trigger(RouteId::Macro, "TSLA", None)).is_empty());

        let prev = trigger(RouteId::Indicators, "AAPL", None);
        assert!(plan_effects(Some(&prev), &trigger(RouteId::Indicators, "TSLA", None)).is_empty());
    }

    #[test]
    fn unchanged_trigger_plans_nothing() {
        let same = trigger(RouteId::Risk, "AAPL", Some("t"));
        assert!(plan_effects(Some(&same), &same.clone()).is_empty());
    }

    #[test]
    fn accounts_fetch_requires_token_and_reruns_on_token_change() {
        let unauth = trigger(RouteId::Accounts, "AAPL", None);
        let from_dashboard = plan_effects(
            Some(&trigger(RouteId::Dashboard, "AAPL", None)),
            &unauth,
        );
        assert_eq!(from_dashboard, vec![Effect::RouteChart(RouteId::Accounts)]);

        let authed = trigger(RouteId::Accounts, "AAPL", Some("t-1"));
        assert_eq!(
            plan_effects(Some(&unauth), &authed),
            vec![Effect::FetchAccount {
                token: "t-1".to_string()
            }]
        );

        let relogged = trigger(RouteId::Accounts, "AAPL", Some("t-2"));
        assert_eq!(plan_effects(Some(&authed), &relogged).len(), 1);

        let symbol_only = trigger(RouteId::Accounts, "TSLA", Some("t-2"));
        assert!(plan_effects(Some(&relogged), &symbol_only).is_empty());
    }

    #[test]
    fn token_change_off_accounts_plans_nothing() {
        let prev = trigger(RouteId::Risk, "AAPL", None);
        assert!(plan_effects(Some(&prev), &trigger(RouteId::Risk, "AAPL", Some("t"))).is_empty());
    }

    #[test]
    fn news_route_fetches_news_on_symbol_change() {
        let prev = trigger(RouteId::News, "AAPL", None);
        assert_eq!(
            plan_effects(Some(&prev), &trigger(RouteId::News, "MSFT", None)),
            vec![Effect::FetchNews {
                symbol: "MSFT".to_string()
            }]
        );
    }
}
