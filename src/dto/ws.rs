use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;
use thiserror::Error;
use utoipa::ToSchema;
use validator::{Validate, ValidationErrors};

use crate::dto::{
    lobby::{LobbySnapshot, ParticipantSummary},
    validation::{AVATAR_MAX_INDEX, validate_display_name, validate_identifier},
};

/// Names of the inbound events, advertised by the health endpoint.
pub const CLIENT_EVENT_NAMES: [&str; 7] = [
    "create-lobby",
    "join-lobby",
    "player-ready",
    "update-score",
    "start-quiz",
    "leave-lobby",
    "end-quiz",
];

/// Why an inbound frame was rejected before reaching the lobby state machine.
#[derive(Debug, Error)]
pub enum InboundError {
    /// The frame is not JSON or does not match any known event shape.
    #[error("malformed event: {0}")]
    Malformed(#[from] serde_json::Error),
    /// The event parsed but one of its fields is out of bounds.
    #[error("invalid event: {0}")]
    Invalid(#[from] ValidationErrors),
}

/// Events accepted from lobby WebSocket clients, framed as `{"event": ..., "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    CreateLobby(CreateLobbyPayload),
    JoinLobby(JoinLobbyPayload),
    PlayerReady(PlayerReadyPayload),
    UpdateScore(UpdateScorePayload),
    StartQuiz(LobbyRef),
    LeaveLobby(LobbyRef),
    EndQuiz(LobbyRef),
}

impl ClientEvent {
    /// Parse and validate a text frame.
    pub fn from_json_str(text: &str) -> Result<Self, InboundError> {
        let event: Self = serde_json::from_str(text)?;
        event.validate()?;
        Ok(event)
    }

    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateLobby(_) => "create-lobby",
            Self::JoinLobby(_) => "join-lobby",
            Self::PlayerReady(_) => "player-ready",
            Self::UpdateScore(_) => "update-score",
            Self::StartQuiz(_) => "start-quiz",
            Self::LeaveLobby(_) => "leave-lobby",
            Self::EndQuiz(_) => "end-quiz",
        }
    }

    /// Lobby the event targets.
    pub fn lobby_id(&self) -> &str {
        match self {
            Self::CreateLobby(payload) => &payload.lobby_id,
            Self::JoinLobby(payload) => &payload.lobby_id,
            Self::PlayerReady(payload) => &payload.lobby_id,
            Self::UpdateScore(payload) => &payload.lobby_id,
            Self::StartQuiz(payload) | Self::LeaveLobby(payload) | Self::EndQuiz(payload) => {
                &payload.lobby_id
            }
        }
    }

    fn validate(&self) -> Result<(), ValidationErrors> {
        match self {
            Self::CreateLobby(payload) => payload.validate(),
            Self::JoinLobby(payload) => payload.validate(),
            Self::PlayerReady(payload) => payload.validate(),
            Self::UpdateScore(payload) => payload.validate(),
            Self::StartQuiz(payload) | Self::LeaveLobby(payload) | Self::EndQuiz(payload) => {
                payload.validate()
            }
        }
    }
}

/// `create-lobby` payload.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateLobbyPayload {
    pub lobby_id: String,
    pub host_name: String,
    #[serde(default)]
    pub host_avatar: u32,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub quiz_payload: Value,
    /// Lets a host keep a stable id across page reloads; generated when absent.
    #[serde(default)]
    pub player_id: Option<String>,
}

impl Validate for CreateLobbyPayload {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Err(e) = validate_identifier(&self.lobby_id) {
            errors.add("lobbyId", e);
        }
        if let Err(e) = validate_display_name(&self.host_name) {
            errors.add("hostName", e);
        }
        if self.host_avatar > AVATAR_MAX_INDEX {
            errors.add("hostAvatar", validator::ValidationError::new("range"));
        }
        if let Some(ref id) = self.player_id {
            if let Err(e) = validate_identifier(id) {
                errors.add("playerId", e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// `join-lobby` payload. A known `playerId` turns the join into a reconnect.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JoinLobbyPayload {
    pub lobby_id: String,
    pub player_name: String,
    #[serde(default)]
    pub player_avatar: u32,
    #[serde(default)]
    pub player_id: Option<String>,
}

impl Validate for JoinLobbyPayload {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Err(e) = validate_identifier(&self.lobby_id) {
            errors.add("lobbyId", e);
        }
        if let Err(e) = validate_display_name(&self.player_name) {
            errors.add("playerName", e);
        }
        if self.player_avatar > AVATAR_MAX_INDEX {
            errors.add("playerAvatar", validator::ValidationError::new("range"));
        }
        if let Some(ref id) = self.player_id {
            if let Err(e) = validate_identifier(id) {
                errors.add("playerId", e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// `player-ready` payload.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PlayerReadyPayload {
    #[validate(custom(function = "validate_identifier"))]
    pub lobby_id: String,
    pub is_ready: bool,
}

/// `update-score` payload. Counters replace the stored ones.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateScorePayload {
    #[validate(custom(function = "validate_identifier"))]
    pub lobby_id: String,
    #[validate(custom(function = "validate_identifier"))]
    pub player_id: String,
    pub score: i32,
    pub correct_answers: u32,
    pub wrong_answers: u32,
    #[serde(default)]
    pub question_index: u32,
}

/// Payload of events that only name a lobby (`start-quiz`, `leave-lobby`, `end-quiz`).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LobbyRef {
    #[validate(custom(function = "validate_identifier"))]
    pub lobby_id: String,
}

/// Events pushed to lobby WebSocket clients, framed as `{"event": ..., "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    LobbyCreated(LobbyWelcome),
    LobbyJoined(LobbyWelcome),
    JoinError(ErrorMessage),
    PlayerJoined(PlayerJoined),
    PlayerReconnected(PlayerChange),
    PlayerReadyUpdated(PlayerReadyUpdated),
    ScoreUpdated(ScoreUpdated),
    StartError(ErrorMessage),
    Countdown(CountdownTick),
    QuizStarted(QuizStarted),
    PlayerLeft(PlayerChange),
    PlayerDisconnected(PlayerChange),
    NewHost(NewHost),
    QuizFinished(QuizFinished),
    Error(ErrorMessage),
}

impl ServerEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::LobbyCreated(_) => "lobby-created",
            Self::LobbyJoined(_) => "lobby-joined",
            Self::JoinError(_) => "join-error",
            Self::PlayerJoined(_) => "player-joined",
            Self::PlayerReconnected(_) => "player-reconnected",
            Self::PlayerReadyUpdated(_) => "player-ready-updated",
            Self::ScoreUpdated(_) => "score-updated",
            Self::StartError(_) => "start-error",
            Self::Countdown(_) => "countdown",
            Self::QuizStarted(_) => "quiz-started",
            Self::PlayerLeft(_) => "player-left",
            Self::PlayerDisconnected(_) => "player-disconnected",
            Self::NewHost(_) => "new-host",
            Self::QuizFinished(_) => "quiz-finished",
            Self::Error(_) => "error",
        }
    }

    /// Shorthand for the generic `error` event.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorMessage {
            message: message.into(),
        })
    }
}

/// Sent to the client that created or entered a lobby.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LobbyWelcome {
    pub player_id: String,
    pub lobby: LobbySnapshot,
    /// Present on `lobby-joined`; true when the join resumed an existing participant.
    pub reconnected: Option<bool>,
}

/// Error reported to the originating connection only.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ErrorMessage {
    pub message: String,
}

/// Broadcast when a new player entered the lobby.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlayerJoined {
    pub player: ParticipantSummary,
    pub participants: Vec<ParticipantSummary>,
}

/// Broadcast when a participant reconnected, left or lost its connection.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlayerChange {
    pub player_id: String,
    pub participants: Vec<ParticipantSummary>,
}

/// Broadcast when a participant toggled readiness.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlayerReadyUpdated {
    pub player_id: String,
    pub is_ready: bool,
    pub participants: Vec<ParticipantSummary>,
}

/// Broadcast after a score overwrite.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScoreUpdated {
    pub player_id: String,
    pub participants: Vec<ParticipantSummary>,
}

/// One countdown step.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct CountdownTick {
    pub countdown: u8,
}

/// Broadcast once the countdown reached zero.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuizStarted {
    pub lobby_id: String,
    pub participants: Vec<ParticipantSummary>,
    pub started_at: String,
}

/// Broadcast when the host role moved.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewHost {
    pub new_host: String,
    pub participants: Vec<ParticipantSummary>,
}

/// Broadcast when the host closed the quiz.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuizFinished {
    pub lobby_id: String,
    pub leaderboard: Vec<ParticipantSummary>,
}
