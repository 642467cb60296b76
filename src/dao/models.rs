use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::state::lobby::{Lobby, LobbyStatus, Participant, ParticipantStatus};

/// Mirrored lobby record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LobbyEntity {
    pub lobby_id: String,
    pub status: LobbyStatus,
    pub host_id: String,
    pub quiz_payload: Value,
    pub created_at: SystemTime,
    pub started_at: Option<SystemTime>,
    pub finished_at: Option<SystemTime>,
    /// Assigned by the store on every write; ignored on input.
    #[serde(default)]
    pub updated_at: Option<SystemTime>,
}

impl From<&Lobby> for LobbyEntity {
    fn from(value: &Lobby) -> Self {
        Self {
            lobby_id: value.id.clone(),
            status: value.status,
            host_id: value.host_id.clone(),
            quiz_payload: value.quiz_payload.clone(),
            created_at: value.created_at,
            started_at: value.started_at,
            finished_at: value.finished_at,
            updated_at: None,
        }
    }
}

/// Mirrored participant record, keyed by `(lobby_id, player_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantEntity {
    pub lobby_id: String,
    pub player_id: String,
    pub name: String,
    pub avatar_index: u32,
    pub is_host: bool,
    pub is_ready: bool,
    pub score: i32,
    pub correct_answers: u32,
    pub wrong_answers: u32,
    pub current_question: Option<u32>,
    pub status: ParticipantStatus,
    pub joined_at: SystemTime,
    #[serde(default)]
    pub updated_at: Option<SystemTime>,
}

impl ParticipantEntity {
    /// Snapshot a participant of `lobby_id`.
    pub fn from_participant(lobby_id: &str, value: &Participant) -> Self {
        Self {
            lobby_id: lobby_id.to_owned(),
            player_id: value.player_id.clone(),
            name: value.name.clone(),
            avatar_index: value.avatar_index,
            is_host: value.is_host,
            is_ready: value.is_ready,
            score: value.score,
            correct_answers: value.correct_answers,
            wrong_answers: value.wrong_answers,
            current_question: value.current_question,
            status: value.status,
            joined_at: value.joined_at,
            updated_at: None,
        }
    }

    /// Snapshot every participant of `lobby`, in join order.
    pub fn all_from(lobby: &Lobby) -> Vec<Self> {
        lobby
            .participants()
            .map(|p| Self::from_participant(&lobby.id, p))
            .collect()
    }
}
