use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report whether the mirror store is reachable along with the number of live lobbies.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.mirror_store().await {
        Some(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "mirror store health check failed");
            }
        }
        None => warn!("mirror store unavailable (degraded mode)"),
    }

    let active_lobbies = state.sessions().lock().await.len();
    if state.is_degraded().await {
        HealthResponse::degraded(active_lobbies)
    } else {
        HealthResponse::ok(active_lobbies)
    }
}
