use std::sync::Arc;

use {
    axum::{
        extract::{Path, Query, State, rejection::JsonRejection},
        http::StatusCode,
        response::{IntoResponse, Json, Response},
    },
    sandbar_jobs::Error as JobError,
    serde::Deserialize,
    tracing::{error, warn},
};

use crate::state::GatewayState;

const DEFAULT_LIST_LIMIT: usize = 50;
const MAX_LIST_LIMIT: usize = 1000;

fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({ "error": message.into() })),
    )
        .into_response()
}

fn internal_error(err: impl std::fmt::Display) -> Response {
    error!(error = %err, "request failed");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    pub kind: String,
    pub code: String,
}

pub async fn schedule_handler(
    State(state): State<Arc<GatewayState>>,
    body: Result<Json<ScheduleRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => return api_error(StatusCode::BAD_REQUEST, rejection.body_text()),
    };

    match state.registry.schedule(&req.kind, &req.code).await {
        Ok(job_id) => Json(serde_json::json!({ "job_id": job_id })).into_response(),
        Err(JobError::UnsupportedKind(e)) => {
            warn!(kind = %req.kind, "rejected unsupported job kind");
            api_error(StatusCode::BAD_REQUEST, e.to_string())
        },
        Err(JobError::ShuttingDown) => {
            api_error(StatusCode::SERVICE_UNAVAILABLE, JobError::ShuttingDown.to_string())
        },
        Err(e) => internal_error(e),
    }
}

pub async fn status_handler(
    State(state): State<Arc<GatewayState>>,
    Path(job_id): Path<String>,
) -> Response {
    match state.registry.status(&job_id).await {
        Ok(Some(status)) => Json(status).into_response(),
        Ok(None) => api_error(StatusCode::NOT_FOUND, format!("job not found: {job_id}")),
        Err(e) => internal_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

pub async fn jobs_handler(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<ListQuery>,
) -> Response {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .min(MAX_LIST_LIMIT);
    match state.registry.list(limit).await {
        Ok(jobs) => Json(jobs).into_response(),
        Err(e) => internal_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct ContextQuery {
    pub tail: Option<usize>,
}

pub async fn context_handler(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<ContextQuery>,
) -> Response {
    let Some(context) = state.registry.context() else {
        return Json(serde_json::json!([])).into_response();
    };
    let records = match query.tail {
        Some(n) => context.tail(n).await,
        None => context.dump().await,
    };
    match records {
        Ok(records) => Json(records).into_response(),
        Err(e) => internal_error(e),
    }
}

pub async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": state.version,
        "accepting": state.registry.is_accepting(),
        "workers": state.registry.workers(),
        "uptime_secs": state.started_at.elapsed().as_secs(),
    }))
}
