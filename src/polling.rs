//! Live price polling: one repeating timer, only while the live route is shown.
//!
//! State machine:
//! - `Idle` -> `Polling(symbol)` on `start`: one immediate tick, then one per period
//! - `Polling(a)` -> `Polling(b)` on a symbol change: the old timer is aborted
//!   before the new one is armed
//! - `Polling` -> `Idle` on `stop`, and unconditionally on drop
//!
//! Sessions are numbered so results from a torn-down timer can be told apart.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::info;

/// Shortest period a timer is armed with; `tokio` rejects a zero interval.
pub const MIN_POLL_PERIOD: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PollingState {
    Idle,
    Polling { symbol: String, session: u64 },
}

struct ActiveSession {
    symbol: String,
    session: u64,
    task: JoinHandle<()>,
}

pub struct LivePoller {
    period: Duration,
    last_session: u64,
    active: Option<ActiveSession>,
}

impl LivePoller {
    /// Periods below [`MIN_POLL_PERIOD`] are raised to it.
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(MIN_POLL_PERIOD),
            last_session: 0,
            active: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn state(&self) -> PollingState {
        match &self.active {
            Some(active) => PollingState::Polling {
                symbol: active.symbol.clone(),
                session: active.session,
            },
            None => PollingState::Idle,
        }
    }

    /// True only for the session currently armed.
    pub fn is_current(&self, session: u64) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| active.session == session)
    }

    /// Tears down any running session, then arms a new one for `symbol`.
    ///
    /// `tick` runs once immediately and then once per period, never overlapping
    /// itself. Must be called from inside a tokio runtime.
    pub fn start<F, Fut>(&mut self, symbol: &str, mut tick: F) -> u64
    where
        F: FnMut(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.stop();

        self.last_session += 1;
        let session = self.last_session;
        let period = self.period;

        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                tick(session).await;
            }
        });

        info!(
            component = "polling",
            event = "polling.start",
            symbol,
            session,
            period_ms = period.as_millis() as u64
        );

        self.active = Some(ActiveSession {
            symbol: symbol.to_string(),
            session,
            task,
        });
        session
    }

    /// Returns whether a session was actually stopped.
    pub fn stop(&mut self) -> bool {
        let Some(active) = self.active.take() else {
            return false;
        };
        active.task.abort();
        info!(
            component = "polling",
            event = "polling.stop",
            symbol = %active.symbol,
            session = active.session
        );
        true
    }
}

impl Drop for LivePoller {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.task.abort();
        }
    }
}
