use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dao::models::{LobbyEntity, ParticipantEntity};

pub const LOBBY_PREFIX: &str = "lobby::";
pub const PARTICIPANT_PREFIX: &str = "participant::";
pub const END_SUFFIX: &str = "\u{ffff}";

#[derive(Debug, Deserialize)]
pub struct AllDocsResponse {
    pub rows: Vec<AllDocsRow>,
}

#[derive(Debug, Deserialize)]
pub struct AllDocsRow {
    pub id: String,
    #[serde(default)]
    pub doc: Option<Value>,
}

/// Only the revision of a document, used before deletes.
#[derive(Debug, Deserialize)]
pub struct RevisionOnly {
    #[serde(rename = "_rev")]
    pub rev: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchLobbyDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub lobby: LobbyEntity,
}

impl From<(LobbyEntity, Option<String>)> for CouchLobbyDocument {
    fn from((lobby, rev): (LobbyEntity, Option<String>)) -> Self {
        Self {
            id: lobby_doc_id(&lobby.lobby_id),
            rev,
            lobby,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchParticipantDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub participant: ParticipantEntity,
}

impl From<(ParticipantEntity, Option<String>)> for CouchParticipantDocument {
    fn from((participant, rev): (ParticipantEntity, Option<String>)) -> Self {
        Self {
            id: participant_doc_id(&participant.lobby_id, &participant.player_id),
            rev,
            participant,
        }
    }
}

/// Escape `%` and `:` so an identifier never forges a `::` separator.
fn escape_segment(segment: &str) -> String {
    let mut escaped = String::with_capacity(segment.len());
    for ch in segment.chars() {
        match ch {
            '%' => escaped.push_str("%25"),
            ':' => escaped.push_str("%3A"),
            other => escaped.push(other),
        }
    }
    escaped
}

pub fn lobby_doc_id(lobby_id: &str) -> String {
    format!("{LOBBY_PREFIX}{}", escape_segment(lobby_id))
}

pub fn participant_doc_id(lobby_id: &str, player_id: &str) -> String {
    format!("{}{}", participant_prefix(lobby_id), escape_segment(player_id))
}

/// Key prefix shared by every participant document of a lobby.
pub fn participant_prefix(lobby_id: &str) -> String {
    format!("{PARTICIPANT_PREFIX}{}::", escape_segment(lobby_id))
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use serde_json::json;

    use super::*;
    use crate::state::lobby::ParticipantStatus;

    #[test]
    fn participant_ids_share_the_lobby_prefix() {
        let id = participant_doc_id("q1", "p1");
        assert_eq!(id, "participant::q1::p1");
        assert!(id.starts_with(&participant_prefix("q1")));
        assert!(!id.starts_with(&participant_prefix("q")));
    }

    #[test]
    fn colons_in_identifiers_cannot_collide() {
        let nested_lobby = participant_doc_id("a::b", "c");
        let nested_player = participant_doc_id("a", "b::c");
        assert_ne!(nested_lobby, nested_player);
        assert_eq!(nested_lobby, "participant::a%3A%3Ab::c");
        assert!(!nested_lobby.starts_with(&participant_prefix("a")));
        assert!(nested_player.starts_with(&participant_prefix("a")));

        assert_ne!(participant_doc_id("a%3A", "b"), participant_doc_id("a:", "b"));
        assert_eq!(lobby_doc_id("x:y"), "lobby::x%3Ay");
    }

    #[test]
    fn document_flattens_entity_next_to_couch_keys() {
        let entity = ParticipantEntity {
            lobby_id: "q1".into(),
            player_id: "p1".into(),
            name: "Ada".into(),
            avatar_index: 3,
            is_host: false,
            is_ready: true,
            score: 10,
            correct_answers: 1,
            wrong_answers: 0,
            current_question: Some(1),
            status: ParticipantStatus::Active,
            joined_at: SystemTime::UNIX_EPOCH,
            updated_at: None,
        };

        let value = serde_json::to_value(CouchParticipantDocument::from((entity, None))).unwrap();
        assert_eq!(value["_id"], json!("participant::q1::p1"));
        assert!(value.get("_rev").is_none());
        assert_eq!(value["status"], json!("active"));
        assert_eq!(value["score"], json!(10));
    }
}
