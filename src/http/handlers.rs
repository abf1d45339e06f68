//! Request handlers for the stack lifecycle endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode as HttpStatus;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tracing::{info_span, warn, Instrument};

use super::server::AppState;
use crate::models::stack::{StackKey, StackRecord};
use crate::models::status::StatusEnvelope;
use crate::orchestrator::TerminalUrl;
use crate::persistence::stack_repo::StackRepo;
use crate::{AppError, Result};

/// Body of a view request. All fields are optional.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ViewRequest {
    /// Orchestration template to launch the stack from.
    pub template: Option<String>,
    /// Training user name overriding the configured default.
    pub stack_user_name: Option<String>,
}

/// Error response rendered as `{"error": "..."}`.
#[derive(Debug)]
pub struct ApiError(AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            AppError::NotFound(_) => HttpStatus::NOT_FOUND,
            _ => HttpStatus::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!(err = %self.0, "request failed");
        }
        (
            status,
            Json(serde_json::json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

/// Load a stack that must already have been viewed.
async fn load_existing(repo: &StackRepo, key: &StackKey, state: &AppState) -> Result<StackRecord> {
    let record = repo
        .get(key)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("no stack for {}", key.stack_name())))?;
    Ok(record.with_credentials(state.config.credentials()))
}

/// `POST /courses/{course}/users/{user}/view`: launch or resume the
/// stack and start the dead man's switch.
///
/// # Errors
///
/// Returns `ApiError` on persistence or task submission failure.
pub async fn view(
    State(state): State<Arc<AppState>>,
    Path((course, user)): Path<(String, String)>,
    Json(body): Json<ViewRequest>,
) -> std::result::Result<Json<StatusEnvelope>, ApiError> {
    let key = StackKey::new(course, user);
    let span = info_span!("view", stack_name = %key.stack_name());
    async move {
        let repo = StackRepo::new(Arc::clone(&state.db));
        let mut record = repo
            .get_or_new(&key)
            .await?
            .with_credentials(state.config.credentials());

        if let Some(name) = body.stack_user_name {
            record.stack_user_name = name;
        } else if record.stack_user_name.is_empty() {
            record.stack_user_name.clone_from(&state.config.stack_user_name);
        }

        let outcome = state.orchestrator.view(&mut record, body.template).await;
        repo.upsert(&mut record).await?;
        Ok::<_, ApiError>(Json(outcome?))
    }
    .instrument(span)
    .await
}

/// `POST /courses/{course}/users/{user}/status`: reconcile and report.
///
/// # Errors
///
/// Returns `ApiError` if the stack was never viewed, or on persistence or
/// task submission failure.
pub async fn status(
    State(state): State<Arc<AppState>>,
    Path((course, user)): Path<(String, String)>,
) -> std::result::Result<Json<StatusEnvelope>, ApiError> {
    let key = StackKey::new(course, user);
    let repo = StackRepo::new(Arc::clone(&state.db));
    let mut record = load_existing(&repo, &key, &state).await?;

    let outcome = state.orchestrator.get_status(&mut record).await;
    // Store even on failure: the switch may already have been disarmed.
    repo.upsert(&mut record).await?;
    Ok(Json(outcome?))
}

/// `POST /courses/{course}/users/{user}/keepalive`: reset the switch.
///
/// # Errors
///
/// Returns `ApiError` if the stack was never viewed, or on persistence or
/// task submission failure.
pub async fn keepalive(
    State(state): State<Arc<AppState>>,
    Path((course, user)): Path<(String, String)>,
) -> std::result::Result<Json<serde_json::Value>, ApiError> {
    let key = StackKey::new(course, user);
    let repo = StackRepo::new(Arc::clone(&state.db));
    let mut record = load_existing(&repo, &key, &state).await?;

    let outcome = state.orchestrator.keepalive(&mut record).await;
    repo.upsert(&mut record).await?;
    outcome?;
    Ok(Json(serde_json::json!({})))
}

/// `POST /courses/{course}/users/{user}/terminal_url`: terminal location.
pub async fn terminal_url(
    State(state): State<Arc<AppState>>,
    Path(_): Path<(String, String)>,
) -> Json<TerminalUrl> {
    Json(state.orchestrator.terminal_url())
}
