//! Single chart surface bound to the dashboard route.
//!
//! The lifecycle owns at most one surface handle. Every route change destroys the
//! current surface before anything else happens; a fresh one is created only
//! when the new route is `dashboard` and the render target is available.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{debug, info};

use crate::route::RouteId;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastSeries {
    pub label: String,
    pub labels: Vec<String>,
    pub values: Vec<f64>,
}

impl ForecastSeries {
    /// Static weekday forecast drawn on the dashboard.
    pub fn weekly_demo() -> Self {
        Self {
            label: "Price Forecast".to_string(),
            labels: ["Mon", "Tue", "Wed", "Thu", "Fri", "Mon", "Tue"]
                .iter()
                .map(|label| (*label).to_string())
                .collect(),
            values: vec![162.0, 166.0, 164.0, 170.0, 173.0, 171.0, 178.0],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SurfaceId(pub u64);

/// Whatever can host a chart. Only create and destroy are modelled.
pub trait RenderTarget: Send + 'static {
    fn is_available(&self) -> bool;
    fn create_surface(&mut self, series: &ForecastSeries) -> SurfaceId;
    fn destroy_surface(&mut self, id: SurfaceId);
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RenderStats {
    pub live: usize,
    pub created: u64,
    pub destroyed: u64,
    pub max_concurrent: usize,
}

#[derive(Debug, Default)]
struct HeadlessState {
    available: bool,
    next_id: u64,
    live: BTreeSet<SurfaceId>,
    created: u64,
    destroyed: u64,
    max_concurrent: usize,
    last_series: Option<ForecastSeries>,
}

/// Render target with no pixels; records surface traffic. Clones share state.
#[derive(Debug, Clone)]
pub struct HeadlessRenderTarget {
    state: Arc<Mutex<HeadlessState>>,
}

impl Default for HeadlessRenderTarget {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessRenderTarget {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(HeadlessState {
                available: true,
                ..HeadlessState::default()
            })),
        }
    }

    pub fn unavailable() -> Self {
        let target = Self::new();
        target.set_available(false);
        target
    }

    pub fn set_available(&self, available: bool) {
        self.lock().available = available;
    }

    pub fn stats(&self) -> RenderStats {
        let state = self.lock();
        RenderStats {
            live: state.live.len(),
            created: state.created,
            destroyed: state.destroyed,
            max_concurrent: state.max_concurrent,
        }
    }

    pub fn last_series(&self) -> Option<ForecastSeries> {
        self.lock().last_series.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HeadlessState> {
        self.state
            .lock()
            .expect("render target lock should not be poisoned")
    }
}

impl RenderTarget for HeadlessRenderTarget {
    fn is_available(&self) -> bool {
        self.lock().available
    }

    fn create_surface(&mut self, series: &ForecastSeries) -> SurfaceId {
        let mut state = self.lock();
        state.next_id += 1;
        let id = SurfaceId(state.next_id);
        state.live.insert(id);
        state.created += 1;
        state.max_concurrent = state.max_concurrent.max(state.live.len());
        state.last_series = Some(series.clone());
        id
    }

    fn destroy_surface(&mut self, id: SurfaceId) {
        let mut state = self.lock();
        if state.live.remove(&id) {
            state.destroyed += 1;
        }
    }
}

pub struct ChartLifecycle {
    target: Box<dyn RenderTarget>,
    series: ForecastSeries,
    surface: Option<SurfaceId>,
}

impl ChartLifecycle {
    pub fn new(target: Box<dyn RenderTarget>) -> Self {
        Self {
            target,
            series: ForecastSeries::weekly_demo(),
            surface: None,
        }
    }

    pub fn live_surface(&self) -> Option<SurfaceId> {
        self.surface
    }

    pub fn on_route_change(&mut self, route: RouteId) -> Option<SurfaceId> {
        self.release();

        if route != RouteId::Dashboard {
            return None;
        }
        if !self.target.is_available() {
            debug!(
                component = "chart",
                event = "chart.skipped",
                reason = "render target unavailable"
            );
            return None;
        }

        let id = self.target.create_surface(&self.series);
        self.surface = Some(id);
        info!(
            component = "chart",
            event = "chart.create",
            surface = id.0,
            points = self.series.values.len()
        );
        Some(id)
    }

    /// Destroys the held surface, if any.
    pub fn release(&mut self) {
        if let Some(id) = self.surface.take() {
            self.target.destroy_surface(id);
            info!(component = "chart", event = "chart.destroy", surface = id.0);
        }
    }
}

impl Drop for ChartLifecycle {
    fn drop(&mut self) {
        self.release();
    }
}
