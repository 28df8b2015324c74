use axum::Json;
use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::{AppState, RouteError};
use crate::config::{SessionView, SettingsUpdate};

#[derive(Debug, Serialize)]
pub(super) struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
pub(super) struct LogsResponse {
    logs: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct LogsQuery {
    limit: Option<usize>,
}

pub(super) async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub(super) async fn settings(State(state): State<AppState>) -> Json<SessionView> {
    Json(state.context.load_session().await.view())
}

pub(super) async fn update_settings(
    State(state): State<AppState>,
    Json(update): Json<SettingsUpdate>,
) -> Result<Json<SessionView>, RouteError> {
    if update.is_empty() {
        return Err(RouteError::bad_request("no settings provided"));
    }

    let mut session = state.context.load_session().await;
    update.apply(&mut session);
    state
        .context
        .save_session_async(session.clone())
        .await
        .map_err(|err| {
            error!(error = %format!("{err:#}"), "failed to save settings");
            RouteError::internal("failed to save settings")
        })?;

    info!(base_url = %session.base_url, mock_mode = session.mock_mode, "settings updated");
    Ok(Json(session.view()))
}

pub(super) async fn logs(
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> Json<LogsResponse> {
    let limit = query.limit.unwrap_or(200).clamp(1, 1000);
    Json(LogsResponse {
        logs: state.logs.recent_lines(limit),
    })
}
