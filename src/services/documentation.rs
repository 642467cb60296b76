use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the quiz lobby backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::lobby::get_lobby_status,
        crate::routes::lobby::get_leaderboard,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::public::LobbyStatusResponse,
            crate::dto::public::ParticipantStatusEntry,
            crate::dto::public::LeaderboardResponse,
            crate::dto::public::LeaderboardEntry,
            crate::dto::ws::CreateLobbyPayload,
            crate::dto::ws::JoinLobbyPayload,
            crate::dto::ws::PlayerReadyPayload,
            crate::dto::ws::UpdateScorePayload,
            crate::dto::ws::LobbyRef,
            crate::dto::ws::LobbyWelcome,
            crate::dto::ws::ErrorMessage,
            crate::dto::ws::PlayerJoined,
            crate::dto::ws::PlayerChange,
            crate::dto::ws::PlayerReadyUpdated,
            crate::dto::ws::ScoreUpdated,
            crate::dto::ws::CountdownTick,
            crate::dto::ws::QuizStarted,
            crate::dto::ws::NewHost,
            crate::dto::ws::QuizFinished,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "lobby", description = "Read-only lobby snapshots from the durable mirror"),
        (name = "websocket", description = "Real-time lobby protocol"),
    )
)]
pub struct ApiDoc;
