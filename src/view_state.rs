//! The view-state store: single owner, explicit mutation entry points.
//!
//! Every mutation bumps `revision`; renderers receive whole snapshots.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::chart::SurfaceId;
use crate::credentials::Credential;
use crate::effects::Trigger;
use crate::panels::{PanelSlot, PanelUpdate, Panels};
use crate::polling::PollingState;
use crate::route::RouteId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionStatus {
    Idle,
    Loading,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewState {
    pub current_route: RouteId,
    pub active_symbol: String,
    pub authenticated: bool,
    pub credential: Option<Credential>,
    pub panels: Panels,
    pub prediction_status: PredictionStatus,
    pub polling: PollingState,
    pub chart_surface: Option<SurfaceId>,
    pub revision: u64,
    pub updated_at: DateTime<Utc>,
}

/// Trimmed, upper-cased symbol; `None` when nothing is left.
pub fn normalize_symbol(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_uppercase())
    }
}

impl ViewState {
    pub fn new(route: RouteId, symbol: String, credential: Option<Credential>) -> Self {
        Self {
            current_route: route,
            active_symbol: symbol,
            authenticated: credential.as_ref().is_some_and(|c| !c.token.is_empty()),
            credential,
            panels: Panels::default(),
            prediction_status: PredictionStatus::Idle,
            polling: PollingState::Idle,
            chart_surface: None,
            revision: 0,
            updated_at: Utc::now(),
        }
    }

    pub fn auth_token(&self) -> Option<&str> {
        self.credential
            .as_ref()
            .map(|credential| credential.token.as_str())
            .filter(|token| !token.is_empty())
    }

    pub fn trigger(&self) -> Trigger {
        Trigger {
            route: self.current_route,
            symbol: self.active_symbol.clone(),
            auth_token: self.auth_token().map(str::to_string),
        }
    }

    /// Returns whether the route actually changed.
    pub fn navigate(&mut self, route: RouteId) -> bool {
        if self.current_route == route {
            return false;
        }
        self.current_route = route;
        self.touch();
        true
    }

    /// Empty input keeps the previous symbol. Returns `None` when rejected,
    /// otherwise whether the symbol changed.
    pub fn set_symbol(&mut self, raw: &str) -> Option<bool> {
        let symbol = normalize_symbol(raw)?;
        if symbol == self.active_symbol {
            return Some(false);
        }
        self.active_symbol = symbol;
        self.touch();
        Some(true)
    }

    pub fn set_credential(&mut self, credential: Option<Credential>) {
        if self.credential == credential {
            return;
        }
        self.credential = credential;
        self.authenticated = self.auth_token().is_some();
        self.touch();
    }

    pub fn apply_panel(&mut self, update: PanelUpdate) {
        self.panels.apply(update);
        self.touch();
    }

    pub fn set_prediction_status(&mut self, status: PredictionStatus) {
        if self.prediction_status != status {
            self.prediction_status = status;
            self.touch();
        }
    }

    pub fn set_polling(&mut self, polling: PollingState) {
        if self.polling != polling {
            self.polling = polling;
            self.touch();
        }
    }

    pub fn set_chart_surface(&mut self, surface: Option<SurfaceId>) {
        if self.chart_surface != surface {
            self.chart_surface = surface;
            self.touch();
        }
    }

    fn touch(&mut self) {
        self.revision += 1;
        self.updated_at = Utc::now();
    }
}

/// Per-slot request counters. A completion is applied only if it carries the
/// latest epoch issued for its slot.
#[derive(Debug, Default)]
pub struct SlotEpochs {
    latest: HashMap<PanelSlot, u64>,
}

impl SlotEpochs {
    pub fn begin(&mut self, slot: PanelSlot) -> u64 {
        let epoch = self.latest.entry(slot).or_insert(0);
        *epoch += 1;
        *epoch
    }

    pub fn is_current(&self, slot: PanelSlot, epoch: u64) -> bool {
        self.latest.get(&slot).copied() == Some(epoch)
    }
}
