use mongodb::bson::{DateTime, Document, doc};
use serde::Deserialize;

use crate::{
    dao::models::{LobbyEntity, ParticipantEntity},
    state::lobby::{LobbyStatus, ParticipantStatus},
};

pub const LOBBY_COLLECTION_NAME: &str = "lobbies";
pub const PARTICIPANT_COLLECTION_NAME: &str = "participants";

/// Lobby document as read back from MongoDB. The quiz payload is stored as a JSON string.
#[derive(Debug, Clone, Deserialize)]
pub struct MongoLobbyDocument {
    #[serde(rename = "_id")]
    lobby_id: String,
    status: LobbyStatus,
    host_id: String,
    quiz_payload: String,
    created_at: DateTime,
    #[serde(default)]
    started_at: Option<DateTime>,
    #[serde(default)]
    finished_at: Option<DateTime>,
    #[serde(default)]
    updated_at: Option<DateTime>,
}

impl MongoLobbyDocument {
    pub fn lobby_id(&self) -> &str {
        &self.lobby_id
    }
}

impl TryFrom<MongoLobbyDocument> for LobbyEntity {
    type Error = serde_json::Error;

    fn try_from(value: MongoLobbyDocument) -> Result<Self, Self::Error> {
        Ok(Self {
            quiz_payload: serde_json::from_str(&value.quiz_payload)?,
            lobby_id: value.lobby_id,
            status: value.status,
            host_id: value.host_id,
            created_at: value.created_at.to_system_time(),
            started_at: value.started_at.map(DateTime::to_system_time),
            finished_at: value.finished_at.map(DateTime::to_system_time),
            updated_at: value.updated_at.map(DateTime::to_system_time),
        })
    }
}

/// Participant document as read back from MongoDB.
#[derive(Debug, Clone, Deserialize)]
pub struct MongoParticipantDocument {
    lobby_id: String,
    player_id: String,
    name: String,
    avatar_index: i64,
    is_host: bool,
    is_ready: bool,
    score: i32,
    correct_answers: i64,
    wrong_answers: i64,
    #[serde(default)]
    current_question: Option<i64>,
    status: ParticipantStatus,
    joined_at: DateTime,
    #[serde(default)]
    updated_at: Option<DateTime>,
}

impl From<MongoParticipantDocument> for ParticipantEntity {
    fn from(value: MongoParticipantDocument) -> Self {
        Self {
            lobby_id: value.lobby_id,
            player_id: value.player_id,
            name: value.name,
            avatar_index: saturating_u32(value.avatar_index),
            is_host: value.is_host,
            is_ready: value.is_ready,
            score: value.score,
            correct_answers: saturating_u32(value.correct_answers),
            wrong_answers: saturating_u32(value.wrong_answers),
            current_question: value.current_question.map(saturating_u32),
            status: value.status,
            joined_at: value.joined_at.to_system_time(),
            updated_at: value.updated_at.map(DateTime::to_system_time),
        }
    }
}

fn saturating_u32(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

fn participant_status(status: ParticipantStatus) -> &'static str {
    match status {
        ParticipantStatus::Active => "active",
        ParticipantStatus::Disconnected => "disconnected",
    }
}

pub fn lobby_filter(lobby_id: &str) -> Document {
    doc! { "_id": lobby_id }
}

pub fn participant_filter(lobby_id: &str, player_id: &str) -> Document {
    doc! { "lobby_id": lobby_id, "player_id": player_id }
}

/// Merge update for a lobby; `updated_at` is stamped by the server.
pub fn lobby_update(lobby: &LobbyEntity) -> serde_json::Result<Document> {
    let quiz_payload = serde_json::to_string(&lobby.quiz_payload)?;
    Ok(doc! {
        "$set": {
            "status": lobby.status.as_str(),
            "host_id": lobby.host_id.as_str(),
            "quiz_payload": quiz_payload,
            "created_at": DateTime::from_system_time(lobby.created_at),
            "started_at": lobby.started_at.map(DateTime::from_system_time),
            "finished_at": lobby.finished_at.map(DateTime::from_system_time),
        },
        "$currentDate": { "updated_at": true },
    })
}

/// Merge update for a participant; `updated_at` is stamped by the server.
pub fn participant_update(participant: &ParticipantEntity) -> Document {
    doc! {
        "$set": {
            "name": participant.name.as_str(),
            "avatar_index": i64::from(participant.avatar_index),
            "is_host": participant.is_host,
            "is_ready": participant.is_ready,
            "score": participant.score,
            "correct_answers": i64::from(participant.correct_answers),
            "wrong_answers": i64::from(participant.wrong_answers),
            "current_question": participant.current_question.map(i64::from),
            "status": participant_status(participant.status),
            "joined_at": DateTime::from_system_time(participant.joined_at),
        },
        "$currentDate": { "updated_at": true },
    }
}
