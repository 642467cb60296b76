use serde::Serialize;
use serde_json::Value;
use serde_with::skip_serializing_none;
use utoipa::ToSchema;

use crate::{
    dto::format_system_time,
    state::lobby::{Lobby, LobbyStatus, Participant, ParticipantStatus},
};

/// Public projection of a participant pushed to lobby members.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantSummary {
    pub id: String,
    pub name: String,
    pub avatar: u32,
    pub is_host: bool,
    pub is_ready: bool,
    pub score: i32,
    pub correct_answers: u32,
    pub wrong_answers: u32,
    pub status: ParticipantStatus,
}

impl From<&Participant> for ParticipantSummary {
    fn from(value: &Participant) -> Self {
        Self {
            id: value.player_id.clone(),
            name: value.name.clone(),
            avatar: value.avatar_index,
            is_host: value.is_host,
            is_ready: value.is_ready,
            score: value.score,
            correct_answers: value.correct_answers,
            wrong_answers: value.wrong_answers,
            status: value.status,
        }
    }
}

/// Summaries of every participant, in join order.
pub fn participant_summaries(lobby: &Lobby) -> Vec<ParticipantSummary> {
    lobby.participants().map(ParticipantSummary::from).collect()
}

/// Participants ordered for a leaderboard: score descending, join order on ties.
pub fn ranked_summaries(lobby: &Lobby) -> Vec<ParticipantSummary> {
    let mut ranked = participant_summaries(lobby);
    ranked.sort_by(|a, b| b.score.cmp(&a.score));
    ranked
}

/// Full lobby view sent to a client when it enters a lobby.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LobbySnapshot {
    pub lobby_id: String,
    pub status: LobbyStatus,
    pub host_id: String,
    #[schema(value_type = Object)]
    pub quiz_payload: Value,
    pub created_at: String,
    pub started_at: Option<String>,
    pub participants: Vec<ParticipantSummary>,
}

impl From<&Lobby> for LobbySnapshot {
    fn from(value: &Lobby) -> Self {
        Self {
            lobby_id: value.id.clone(),
            status: value.status,
            host_id: value.host_id.clone(),
            quiz_payload: value.quiz_payload.clone(),
            created_at: format_system_time(value.created_at),
            started_at: value.started_at.map(format_system_time),
            participants: participant_summaries(value),
        }
    }
}
