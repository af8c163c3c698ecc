// ABOUTME: One-shot code execution endpoint
// ABOUTME: Runs source through the sandbox directly, outside of any room

use axum::{extract::State, Json};
use pairroom_sandbox::{CodeExecutor, ExecutionRequest, ExecutionResult};
use serde::Deserialize;
use tracing::info;

use crate::error::AppError;
use crate::AppState;

fn default_language() -> String {
    pairroom_storage::DEFAULT_LANGUAGE.to_string()
}

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub code: String,
    #[serde(default = "default_language")]
    pub language: String,
}

/// Execute code and return its result
///
/// POST /api/execute
pub async fn execute_code(
    State(state): State<AppState>,
    Json(request): Json<ExecuteRequest>,
) -> Result<Json<ExecutionResult>, AppError> {
    info!(language = %request.language, bytes = request.code.len(), "One-shot execution requested");

    let request = ExecutionRequest::new(request.code, request.language);
    let result = state.rooms.executor().execute(&request).await?;
    Ok(Json(result))
}
