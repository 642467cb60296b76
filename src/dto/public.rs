use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    dao::models::{LobbyEntity, ParticipantEntity},
    dto::{format_system_time, validation::validate_identifier},
    state::lobby::{LobbyStatus, ParticipantStatus},
};

/// Path parameters of the lobby query routes.
#[derive(Debug, Deserialize, Validate)]
pub struct LobbyPath {
    #[validate(custom(function = "validate_identifier"))]
    pub id: String,
}

/// Participant row exposed by the status endpoint.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantStatusEntry {
    pub id: String,
    pub name: String,
    pub is_host: bool,
    pub is_ready: bool,
    pub score: i32,
    pub correct_answers: u32,
    pub wrong_answers: u32,
    pub status: ParticipantStatus,
}

impl From<ParticipantEntity> for ParticipantStatusEntry {
    fn from(value: ParticipantEntity) -> Self {
        Self {
            id: value.player_id,
            name: value.name,
            is_host: value.is_host,
            is_ready: value.is_ready,
            score: value.score,
            correct_answers: value.correct_answers,
            wrong_answers: value.wrong_answers,
            status: value.status,
        }
    }
}

/// Mirrored lobby state for polling clients.
#[skip_serializing_none]
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LobbyStatusResponse {
    pub lobby_id: String,
    pub status: LobbyStatus,
    pub host_id: String,
    #[schema(value_type = Object)]
    pub quiz_payload: Value,
    pub created_at: String,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub updated_at: Option<String>,
    /// Number of participants, disconnected ones included.
    pub participants: usize,
    pub participants_list: Vec<ParticipantStatusEntry>,
}

impl LobbyStatusResponse {
    /// Assemble the response from mirrored records; participants are expected in join order.
    pub fn from_entities(lobby: LobbyEntity, participants: Vec<ParticipantEntity>) -> Self {
        Self {
            lobby_id: lobby.lobby_id,
            status: lobby.status,
            host_id: lobby.host_id,
            quiz_payload: lobby.quiz_payload,
            created_at: format_system_time(lobby.created_at),
            started_at: lobby.started_at.map(format_system_time),
            finished_at: lobby.finished_at.map(format_system_time),
            updated_at: lobby.updated_at.map(format_system_time),
            participants: participants.len(),
            participants_list: participants.into_iter().map(Into::into).collect(),
        }
    }
}

/// One leaderboard row.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub id: String,
    pub name: String,
    pub score: i32,
    pub correct_answers: u32,
    pub wrong_answers: u32,
    pub avatar: u32,
    pub is_host: bool,
}

impl From<ParticipantEntity> for LeaderboardEntry {
    fn from(value: ParticipantEntity) -> Self {
        Self {
            id: value.player_id,
            name: value.name,
            score: value.score,
            correct_answers: value.correct_answers,
            wrong_answers: value.wrong_answers,
            avatar: value.avatar_index,
            is_host: value.is_host,
        }
    }
}

/// Participants ranked by score.
#[derive(Debug, Serialize, ToSchema)]
pub struct LeaderboardResponse {
    pub leaderboard: Vec<LeaderboardEntry>,
}
