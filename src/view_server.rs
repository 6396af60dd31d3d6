//! HTTP surface over a running orchestrator, for external renderers.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tracing::info;

use crate::orchestrator::{Command, CommandOutcome, OrchestratorHandle};
use crate::route::ROUTES;

pub fn view_router(handle: OrchestratorHandle) -> Router {
    Router::new()
        .route("/view/snapshot", get(get_view_snapshot))
        .route("/view/routes", get(get_view_routes))
        .route("/view/commands", post(post_view_command))
        .with_state(ViewAppState { handle })
}

#[derive(Clone)]
struct ViewAppState {
    handle: OrchestratorHandle,
}

async fn get_view_snapshot(State(state): State<ViewAppState>) -> impl IntoResponse {
    let snapshot = state.handle.snapshot();
    info!(
        component = "view_server",
        event = "http.snapshot.request",
        revision = snapshot.revision
    );
    Json(snapshot)
}

async fn get_view_routes() -> impl IntoResponse {
    Json(ROUTES)
}

async fn post_view_command(
    State(state): State<ViewAppState>,
    Json(command): Json<Command>,
) -> Response {
    let kind = command.kind();
    match state.handle.send(command).await {
        Ok(outcome) => {
            let status = status_for(&outcome);
            info!(
                component = "view_server",
                event = "http.command",
                command = kind,
                status = status.as_u16()
            );
            (status, Json(outcome)).into_response()
        }
        Err(err) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": err.to_string() })),
        )
            .into_response(),
    }
}

fn status_for(outcome: &CommandOutcome) -> StatusCode {
    match outcome {
        CommandOutcome::Applied
        | CommandOutcome::Registered
        | CommandOutcome::Authenticated { .. }
        | CommandOutcome::Ignored { .. } => StatusCode::OK,
        CommandOutcome::Invalid { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        CommandOutcome::AuthFailed { .. } => StatusCode::UNAUTHORIZED,
    }
}
