//! Worker status HTTP endpoint.
//!
//! GET /api/v1/worker/status — current state of the background route
//! optimizer worker, mirroring the teacher's poller status endpoint.

use axum::extract::State;
use axum::Json;

use crate::services::worker::{SharedWorkerState, WorkerState};

#[utoipa::path(
    get,
    path = "/api/v1/worker/status",
    tag = "Worker",
    responses(
        (status = 200, description = "Current worker status", body = WorkerState),
    )
)]
pub async fn get_worker_status(State(state): State<SharedWorkerState>) -> Json<WorkerState> {
    let s = state.read().await;
    Json(s.clone())
}
