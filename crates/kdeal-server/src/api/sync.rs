use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    Extension, Json,
};
use kdeal_core::{SelectionPolicyKind, SyncKind};
use kdeal_sync::{
    execute_command, CancelToken, CatalogStore, SyncCommand, SyncCommandResult, SyncError, SyncRun,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::middleware::RequestId;
use crate::pipeline::{build_orchestrator, FeedRequirement, LiveRun, PgOrchestrator};

use super::{map_db_error, normalize_limit, ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct RunsQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct StartRunRequest {
    #[serde(default)]
    pub policy: Option<SelectionPolicyKind>,
}

pub(super) fn map_sync_error(request_id: String, error: &SyncError) -> ApiError {
    match error {
        SyncError::RunNotFound(_) => ApiError::new(request_id, "not_found", error.to_string()),
        SyncError::RunFinalized(_) | SyncError::RunInProgress => {
            ApiError::new(request_id, "conflict", error.to_string())
        }
        SyncError::NotConfigured(_) => ApiError::new(request_id, "bad_request", error.to_string()),
        SyncError::Feed(_) => {
            tracing::warn!(error = %error, "sync: feed request failed");
            ApiError::new(request_id, "bad_gateway", error.to_string())
        }
        SyncError::Store(db) => map_db_error(request_id, db),
        SyncError::InvalidRunRecord { .. } => {
            tracing::error!(error = %error, "sync: unreadable run record");
            ApiError::new(request_id, "internal_error", "sync run record is unreadable")
        }
    }
}

async fn orchestrator(
    state: &AppState,
    req_id: &RequestId,
    feed: FeedRequirement,
) -> Result<PgOrchestrator, ApiError> {
    build_orchestrator(&state.pool, &state.config, feed)
        .await
        .map_err(|e| map_sync_error(req_id.0.clone(), &e))
}

fn claim_run(state: &AppState, req_id: &RequestId, run_id: Uuid) -> Result<LiveRun, ApiError> {
    state.live_runs.claim(run_id).ok_or_else(|| {
        ApiError::new(
            req_id.0.clone(),
            "conflict",
            format!("run {run_id} is already being processed"),
        )
    })
}

/// Drive the claimed run to a terminal state off the request path. The
/// claim is released when the driver returns.
fn spawn_drive(orchestrator: PgOrchestrator, live: LiveRun) {
    tokio::spawn(async move {
        let run_id = live.run_id();
        match orchestrator.resume(run_id, &CancelToken::new()).await {
            Ok(run) => {
                tracing::info!(run_id = %run.id, status = %run.status, "sync: background run finished");
            }
            Err(e) => {
                tracing::error!(run_id = %run_id, error = %e, "sync: background run aborted");
            }
        }
        drop(live);
    });
}

pub(super) async fn run_command(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(command): Json<SyncCommand>,
) -> Result<Json<ApiResponse<SyncCommandResult>>, ApiError> {
    let feed = if matches!(command, SyncCommand::FetchChunk { .. }) {
        FeedRequirement::Required
    } else {
        FeedRequirement::Optional
    };
    let orchestrator = orchestrator(&state, &req_id, feed).await?;

    let result = execute_command(&orchestrator, command)
        .await
        .map_err(|e| map_sync_error(req_id.0.clone(), &e))?;
    Ok(Json(ApiResponse::new(result, req_id.0)))
}

/// Create a run and process it in the background. Poll `GET /sync/runs/{id}`
/// for progress.
pub(super) async fn start_run(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    body: Bytes,
) -> Result<Json<ApiResponse<SyncRun>>, ApiError> {
    let request: StartRunRequest = if body.is_empty() {
        StartRunRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| {
            ApiError::new(req_id.0.clone(), "bad_request", format!("invalid body: {e}"))
        })?
    };
    let orchestrator = orchestrator(&state, &req_id, FeedRequirement::Required).await?;

    let policy = request.policy.unwrap_or(orchestrator.config().policy);
    let run = orchestrator
        .store()
        .create_run(SyncKind::Manual, policy)
        .await
        .map_err(|e| map_sync_error(req_id.0.clone(), &e))?;
    tracing::info!(run_id = %run.id, policy = %run.policy, "sync: manual run accepted");

    let live = claim_run(&state, &req_id, run.id)?;
    spawn_drive(orchestrator, live);
    Ok(Json(ApiResponse::new(run, req_id.0)))
}

pub(super) async fn list_runs(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<RunsQuery>,
) -> Result<Json<ApiResponse<Vec<SyncRun>>>, ApiError> {
    let rows = kdeal_db::list_sync_runs(&state.pool, normalize_limit(query.limit, 20, 200))
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let runs = rows
        .into_iter()
        .map(SyncRun::try_from)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| map_sync_error(req_id.0.clone(), &e))?;
    Ok(Json(ApiResponse::new(runs, req_id.0)))
}

pub(super) async fn get_run(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<SyncRun>>, ApiError> {
    let orchestrator = orchestrator(&state, &req_id, FeedRequirement::Optional).await?;
    let run = orchestrator
        .store()
        .require_run(id)
        .await
        .map_err(|e| map_sync_error(req_id.0.clone(), &e))?;
    Ok(Json(ApiResponse::new(run, req_id.0)))
}

/// Flag a started run for cancellation. The driving process stops at its
/// next checkpoint.
pub(super) async fn cancel_run(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<SyncRun>>, ApiError> {
    let orchestrator = orchestrator(&state, &req_id, FeedRequirement::Optional).await?;
    let store = orchestrator.store();

    let run = store
        .require_run(id)
        .await
        .map_err(|e| map_sync_error(req_id.0.clone(), &e))?;
    if run.status.is_terminal() {
        return Err(map_sync_error(req_id.0, &SyncError::RunFinalized(id)));
    }

    store
        .request_cancel(id)
        .await
        .map_err(|e| map_sync_error(req_id.0.clone(), &e))?;
    tracing::info!(run_id = %id, "sync: cancellation requested");

    let run = store
        .require_run(id)
        .await
        .map_err(|e| map_sync_error(req_id.0.clone(), &e))?;
    Ok(Json(ApiResponse::new(run, req_id.0)))
}

/// Continue a `started` run whose driving process went away, e.g. after a
/// restart. Conflicts while this server is still driving it.
pub(super) async fn resume_run(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<SyncRun>>, ApiError> {
    let orchestrator = orchestrator(&state, &req_id, FeedRequirement::Required).await?;
    let run = orchestrator
        .store()
        .require_run(id)
        .await
        .map_err(|e| map_sync_error(req_id.0.clone(), &e))?;
    if run.status.is_terminal() {
        return Err(map_sync_error(req_id.0, &SyncError::RunFinalized(id)));
    }

    let live = claim_run(&state, &req_id, run.id)?;
    tracing::info!(run_id = %id, "sync: resume accepted");
    spawn_drive(orchestrator, live);
    Ok(Json(ApiResponse::new(run, req_id.0)))
}

#[cfg(test)]
#[path = "sync_test.rs"]
mod tests;
