//! `GET /health`

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use super::AppState;
use crate::delivery::DeliveryStatsSnapshot;
use crate::irc::ConnectionState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `ok` while the connection is ready, `degraded` otherwise.
    pub status: &'static str,
    pub connection: ConnectionState,
    pub queue: QueueHealth,
    pub delivery: DeliveryStatsSnapshot,
}

#[derive(Debug, Serialize)]
pub struct QueueHealth {
    pub len: usize,
    pub capacity: usize,
    pub dropped: u64,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let connection = *state.connection.borrow();
    let queue = state.queue.stats();
    Json(HealthResponse {
        status: if connection == ConnectionState::Ready {
            "ok"
        } else {
            "degraded"
        },
        connection,
        queue: QueueHealth {
            len: queue.len,
            capacity: queue.capacity,
            dropped: queue.dropped,
        },
        delivery: state.stats.snapshot(),
    })
}
