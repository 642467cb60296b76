use serde::Serialize;
use utoipa::ToSchema;

/// Health payload returned by the `/health` route.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Lobbies currently held in memory.
    pub active_lobbies: usize,
    /// HTTP and WebSocket endpoints served by this process.
    pub endpoints: Vec<String>,
    /// Inbound WebSocket event names.
    pub events: Vec<String>,
}

impl HealthResponse {
    /// Create a health response indicating the system is operational.
    pub fn ok(active_lobbies: usize) -> Self {
        Self::with_status("ok", active_lobbies)
    }

    /// Create a health response indicating the mirror store is unavailable.
    pub fn degraded(active_lobbies: usize) -> Self {
        Self::with_status("degraded", active_lobbies)
    }

    fn with_status(status: &str, active_lobbies: usize) -> Self {
        Self {
            status: status.to_string(),
            active_lobbies,
            endpoints: ENDPOINTS.iter().map(|e| e.to_string()).collect(),
            events: crate::dto::ws::CLIENT_EVENT_NAMES
                .iter()
                .map(|e| e.to_string())
                .collect(),
        }
    }
}

const ENDPOINTS: [&str; 5] = [
    "GET /health",
    "GET /ws",
    "GET /lobby/{id}/status",
    "GET /lobby/{id}/leaderboard",
    "GET /docs",
];
