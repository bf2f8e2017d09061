//! Minimal HTTP binding for [`JobService`]: something has to listen on
//! the configured address, even though wire-level RPC framing is out of
//! scope. A `POST /jobs` with a JSON [`JobRequest`] body is the whole
//! surface besides a liveness probe.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tracing::error;

use crate::job::{JobError, JobRequest};

use super::JobService;

/// Build the router. `service` is shared behind an `Arc` across connections.
#[must_use]
pub fn router(service: Arc<JobService>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/jobs", post(submit))
        .with_state(service)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn submit(
    State(service): State<Arc<JobService>>,
    Json(request): Json<JobRequest>,
) -> Result<Response, ApiError> {
    let response = service.submit(request).await?;
    Ok(Json(response).into_response())
}

struct ApiError(JobError);

impl From<JobError> for ApiError {
    fn from(error: JobError) -> Self {
        Self(error)
    }
}

#[derive(Serialize)]
struct ApiErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            JobError::InvalidFileName(_) => StatusCode::BAD_REQUEST,
            JobError::Provisioning(_) | JobError::Dispatch(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        error!(error = %self.0, "job submission failed");
        (
            status,
            Json(ApiErrorBody {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}
