//! Evaluation endpoints.
//!
//! Both handlers answer 200 with an `EvaluationResult` body whenever a
//! structurally valid request arrives, even when every test errored — the
//! frontend renders results, not HTTP failures. Only a request missing
//! `task` or `files` gets a 400, and even that carries a degenerate result
//! keyed `"error"` so the client has one rendering path.

use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use crate::engine::model::{EvaluationResult, Submission, TestDefinition};
use crate::engine::ExecutionBackend;
use crate::AppContext;

#[derive(Debug, Deserialize)]
pub struct EvalRequest {
    task: Option<TaskPayload>,
    files: Option<Submission>,
}

#[derive(Debug, Deserialize)]
pub struct TaskPayload {
    #[serde(default)]
    tests: Vec<TestDefinition>,
}

/// POST /api/v1/eval — evaluate against the in-process DOM runtime.
pub async fn eval(
    State(ctx): State<Arc<AppContext>>,
    Json(request): Json<EvalRequest>,
) -> (StatusCode, Json<EvaluationResult>) {
    handle(&ctx.engine, request).await
}

/// POST /api/v1/eval/remote — evaluate at the remote sandbox provider.
pub async fn eval_remote(
    State(ctx): State<Arc<AppContext>>,
    Json(request): Json<EvalRequest>,
) -> (StatusCode, Json<EvaluationResult>) {
    handle(&ctx.remote, request).await
}

async fn handle(
    backend: &dyn ExecutionBackend,
    request: EvalRequest,
) -> (StatusCode, Json<EvaluationResult>) {
    let (Some(task), Some(files)) = (request.task, request.files) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(EvaluationResult::malformed_request("Missing task or files")),
        );
    };
    debug!(
        tests = task.tests.len(),
        files = files.len(),
        "evaluation request"
    );
    let result = backend.evaluate(&files, &task.tests).await;
    (StatusCode::OK, Json(result))
}
