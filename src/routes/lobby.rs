use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use axum_valid::Valid;

use crate::{
    dto::public::{LeaderboardResponse, LobbyPath, LobbyStatusResponse},
    error::AppError,
    services::lobby_query_service,
    state::SharedState,
};

/// Read-only endpoints over the mirrored lobby records.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/lobby/{id}/status", get(get_lobby_status))
        .route("/lobby/{id}/leaderboard", get(get_leaderboard))
}

#[utoipa::path(
    get,
    path = "/lobby/{id}/status",
    tag = "lobby",
    params(("id" = String, Path, description = "Lobby identifier")),
    responses(
        (status = 200, description = "Mirrored lobby state", body = LobbyStatusResponse),
        (status = 400, description = "Invalid lobby identifier"),
        (status = 404, description = "Lobby not found"),
        (status = 503, description = "Mirror store unavailable")
    )
)]
/// Return the mirrored lobby record and its participants.
pub async fn get_lobby_status(
    State(state): State<SharedState>,
    Valid(Path(path)): Valid<Path<LobbyPath>>,
) -> Result<Json<LobbyStatusResponse>, AppError> {
    let payload = lobby_query_service::get_lobby_status(&state, &path.id).await?;
    Ok(Json(payload))
}

#[utoipa::path(
    get,
    path = "/lobby/{id}/leaderboard",
    tag = "lobby",
    params(("id" = String, Path, description = "Lobby identifier")),
    responses(
        (status = 200, description = "Participants ranked by score", body = LeaderboardResponse),
        (status = 400, description = "Invalid lobby identifier"),
        (status = 404, description = "Lobby not found"),
        (status = 503, description = "Mirror store unavailable")
    )
)]
/// Return the participants of a lobby ranked by score.
pub async fn get_leaderboard(
    State(state): State<SharedState>,
    Valid(Path(path)): Valid<Path<LobbyPath>>,
) -> Result<Json<LeaderboardResponse>, AppError> {
    let payload = lobby_query_service::get_leaderboard(&state, &path.id).await?;
    Ok(Json(payload))
}
