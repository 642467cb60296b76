use std::{fmt, time::SystemTime};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::time::Instant;
use utoipa::ToSchema;

use crate::state::connections::ConnectionId;

/// Lifecycle of a lobby. Variants are declared in their only legal order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum LobbyStatus {
    /// Players may join and toggle readiness.
    Waiting,
    /// The host triggered the start; the countdown is running.
    Starting,
    /// The countdown completed and the quiz is being played.
    Active,
    /// The host closed the quiz. Terminal.
    Finished,
}

impl LobbyStatus {
    /// The single status this one may advance to, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Waiting => Some(Self::Starting),
            Self::Starting => Some(Self::Active),
            Self::Active => Some(Self::Finished),
            Self::Finished => None,
        }
    }

    /// Wire name of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Starting => "starting",
            Self::Active => "active",
            Self::Finished => "finished",
        }
    }
}

impl fmt::Display for LobbyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection state of a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantStatus {
    /// Bound to a live connection.
    Active,
    /// Transport lost; the row is kept so the player can resume.
    Disconnected,
}

/// Errors raised by lobby and session store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LobbyError {
    /// No lobby is registered under the id.
    #[error("lobby `{0}` not found")]
    LobbyNotFound(String),
    /// A lobby with the id already exists.
    #[error("lobby `{0}` already exists")]
    LobbyAlreadyExists(String),
    /// The lobby left the waiting status and no longer accepts new players.
    #[error("lobby `{0}` already started")]
    LobbyAlreadyStarted(String),
    /// The lobby reached its participant limit.
    #[error("lobby `{lobby_id}` is full ({limit} participants)")]
    LobbyFull {
        /// Lobby that rejected the join.
        lobby_id: String,
        /// Configured capacity.
        limit: usize,
    },
    /// The player is not the host of the lobby.
    #[error("player `{0}` is not the host")]
    NotHost(String),
    /// Not enough active participants to start.
    #[error("at least {required} active participant(s) required, {actual} present")]
    NotEnoughPlayers {
        /// Configured minimum.
        required: usize,
        /// Active participants at the time of the request.
        actual: usize,
    },
    /// The player is not part of the lobby.
    #[error("player `{player_id}` not found in lobby `{lobby_id}`")]
    ParticipantNotFound {
        /// Lobby that was searched.
        lobby_id: String,
        /// Missing player.
        player_id: String,
    },
    /// The player id is already taken inside the lobby.
    #[error("player `{player_id}` already in lobby `{lobby_id}`")]
    ParticipantExists {
        /// Lobby holding the player.
        lobby_id: String,
        /// Duplicate player id.
        player_id: String,
    },
    /// The connection is not bound to the lobby named in the event.
    #[error("connection is not bound to lobby `{0}`")]
    NotInLobby(String),
    /// Status change that does not follow the forward-only order.
    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition {
        /// Current status.
        from: LobbyStatus,
        /// Rejected target status.
        to: LobbyStatus,
    },
}

impl LobbyError {
    /// Message shown to the client that caused the error.
    pub fn client_message(&self) -> String {
        match self {
            Self::LobbyNotFound(_) => "Lobby not found".into(),
            Self::LobbyAlreadyExists(_) => "Lobby already exists".into(),
            Self::LobbyAlreadyStarted(_) => "Quiz already started".into(),
            Self::LobbyFull { .. } => "Lobby is full".into(),
            Self::NotHost(_) => "Only the host can do this".into(),
            Self::NotEnoughPlayers { required, .. } => {
                format!("At least {required} active player(s) are required")
            }
            Self::ParticipantNotFound { .. } => "Player not found in lobby".into(),
            Self::ParticipantExists { .. } => "Player already in lobby".into(),
            Self::NotInLobby(_) => "You are not in this lobby".into(),
            Self::InvalidTransition { from, to } => {
                format!("Quiz cannot move from {from} to {to}")
            }
        }
    }
}

/// A player or host bound to a lobby.
#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    /// Stable identifier, kept across reconnects.
    pub player_id: String,
    /// Display name.
    pub name: String,
    /// Index into the client's avatar set.
    pub avatar_index: u32,
    /// Whether this participant may start the quiz.
    pub is_host: bool,
    /// Readiness flag toggled from the lobby screen.
    pub is_ready: bool,
    /// Last reported score (overwritten, never accumulated).
    pub score: i32,
    /// Last reported number of correct answers.
    pub correct_answers: u32,
    /// Last reported number of wrong answers.
    pub wrong_answers: u32,
    /// Last reported question index.
    pub current_question: Option<u32>,
    /// Connection state.
    pub status: ParticipantStatus,
    /// Wall-clock join time.
    pub joined_at: SystemTime,
    /// Current transport identity; `None` while disconnected.
    pub connection_id: Option<ConnectionId>,
    /// When the participant lost its connection.
    pub disconnected_at: Option<Instant>,
}

impl Participant {
    /// Build a regular player bound to `connection_id`.
    pub fn new(
        player_id: impl Into<String>,
        name: impl Into<String>,
        avatar_index: u32,
        connection_id: ConnectionId,
    ) -> Self {
        Self {
            player_id: player_id.into(),
            name: name.into(),
            avatar_index,
            is_host: false,
            is_ready: false,
            score: 0,
            correct_answers: 0,
            wrong_answers: 0,
            current_question: None,
            status: ParticipantStatus::Active,
            joined_at: SystemTime::now(),
            connection_id: Some(connection_id),
            disconnected_at: None,
        }
    }

    /// Build the lobby creator; hosts start ready.
    pub fn host(
        player_id: impl Into<String>,
        name: impl Into<String>,
        avatar_index: u32,
        connection_id: ConnectionId,
    ) -> Self {
        Self {
            is_host: true,
            is_ready: true,
            ..Self::new(player_id, name, avatar_index, connection_id)
        }
    }

    /// Whether the participant currently holds a live connection.
    pub fn is_active(&self) -> bool {
        self.status == ParticipantStatus::Active
    }
}

/// Server-side session scoped to one quiz instance.
#[derive(Debug, Clone)]
pub struct Lobby {
    /// Lobby identifier (the quiz id).
    pub id: String,
    /// Current lifecycle status.
    pub status: LobbyStatus,
    /// Quiz content, opaque to the coordinator.
    pub quiz_payload: Value,
    /// Player id of the current host.
    pub host_id: String,
    /// Creation time.
    pub created_at: SystemTime,
    /// Set when the countdown completes.
    pub started_at: Option<SystemTime>,
    /// Set when the host ends the quiz.
    pub finished_at: Option<SystemTime>,
    participants: IndexMap<String, Participant>,
}

impl Lobby {
    /// Create a waiting lobby owned by `host`.
    pub fn new(id: impl Into<String>, quiz_payload: Value, mut host: Participant) -> Self {
        host.is_host = true;
        let host_id = host.player_id.clone();
        let mut participants = IndexMap::new();
        participants.insert(host_id.clone(), host);

        Self {
            id: id.into(),
            status: LobbyStatus::Waiting,
            quiz_payload,
            host_id,
            created_at: SystemTime::now(),
            started_at: None,
            finished_at: None,
            participants,
        }
    }

    /// Participants in join order.
    pub fn participants(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values()
    }

    /// Look up a participant by player id.
    pub fn participant(&self, player_id: &str) -> Option<&Participant> {
        self.participants.get(player_id)
    }

    pub(crate) fn participant_mut(&mut self, player_id: &str) -> Option<&mut Participant> {
        self.participants.get_mut(player_id)
    }

    /// Number of participants, disconnected ones included.
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    /// Whether nobody is left in the lobby.
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Number of participants holding a live connection.
    pub fn active_count(&self) -> usize {
        self.participants().filter(|p| p.is_active()).count()
    }

    /// The participant flagged as host.
    pub fn host(&self) -> Option<&Participant> {
        self.participants().find(|p| p.is_host)
    }

    /// Whether every participant has been disconnected since at least `since`.
    pub fn abandoned_since(&self, since: Instant) -> bool {
        !self.is_empty()
            && self
                .participants()
                .all(|p| p.disconnected_at.is_some_and(|at| at <= since))
    }

    pub(crate) fn insert(&mut self, participant: Participant) {
        self.participants
            .insert(participant.player_id.clone(), participant);
    }

    pub(crate) fn remove(&mut self, player_id: &str) -> Option<Participant> {
        self.participants.shift_remove(player_id)
    }

    /// Move to `next`, which must be the immediate successor of the current status.
    pub(crate) fn advance_to(&mut self, next: LobbyStatus) -> Result<(), LobbyError> {
        if self.status.next() != Some(next) {
            return Err(LobbyError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }

        self.status = next;
        match next {
            LobbyStatus::Active => self.started_at = Some(SystemTime::now()),
            LobbyStatus::Finished => self.finished_at = Some(SystemTime::now()),
            LobbyStatus::Waiting | LobbyStatus::Starting => {}
        }
        Ok(())
    }

    /// Restore the host invariant after a membership or connection change.
    ///
    /// An active host is kept. A disconnected host hands over to the
    /// earliest-joined active participant, and keeps the role when nobody is
    /// active. A missing host is replaced by the earliest-joined active
    /// participant, or the earliest-joined one when nobody is active.
    /// Returns the new host id when the role moved.
    pub(crate) fn elect_host(&mut self) -> Option<String> {
        let current = self.host().map(|p| (p.player_id.clone(), p.is_active()));
        if let Some((_, true)) = current {
            return None;
        }

        let candidate = self
            .participants()
            .find(|p| p.is_active())
            .or_else(|| {
                current
                    .is_none()
                    .then(|| self.participants().next())
                    .flatten()
            })
            .map(|p| p.player_id.clone())?;

        self.assign_host(&candidate);
        Some(candidate)
    }

    fn assign_host(&mut self, player_id: &str) {
        for participant in self.participants.values_mut() {
            participant.is_host = participant.player_id == player_id;
        }
        self.host_id = player_id.to_owned();
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use uuid::Uuid;

    use super::*;

    fn lobby_with(players: &[&str]) -> Lobby {
        let mut lobby = Lobby::new(
            "quiz-1",
            json!({"title": "Science"}),
            Participant::host(players[0], "Host", 0, Uuid::new_v4()),
        );
        for id in &players[1..] {
            lobby.insert(Participant::new(*id, *id, 1, Uuid::new_v4()));
        }
        lobby
    }

    fn disconnect(lobby: &mut Lobby, player_id: &str) {
        let p = lobby.participant_mut(player_id).unwrap();
        p.status = ParticipantStatus::Disconnected;
        p.connection_id = None;
        p.disconnected_at = Some(Instant::now());
    }

    fn host_count(lobby: &Lobby) -> usize {
        lobby.participants().filter(|p| p.is_host).count()
    }

    #[test]
    fn status_only_advances_one_step() {
        let mut lobby = lobby_with(&["a"]);
        assert_eq!(
            lobby.advance_to(LobbyStatus::Active),
            Err(LobbyError::InvalidTransition {
                from: LobbyStatus::Waiting,
                to: LobbyStatus::Active
            })
        );
        assert_eq!(lobby.status, LobbyStatus::Waiting);

        lobby.advance_to(LobbyStatus::Starting).unwrap();
        lobby.advance_to(LobbyStatus::Active).unwrap();
        assert!(lobby.started_at.is_some());
        assert!(lobby.advance_to(LobbyStatus::Starting).is_err());
        lobby.advance_to(LobbyStatus::Finished).unwrap();
        assert!(lobby.finished_at.is_some());
        assert!(lobby.advance_to(LobbyStatus::Finished).is_err());
        assert_eq!(lobby.status, LobbyStatus::Finished);
    }

    #[test]
    fn statuses_are_totally_ordered() {
        assert!(LobbyStatus::Waiting < LobbyStatus::Starting);
        assert!(LobbyStatus::Starting < LobbyStatus::Active);
        assert!(LobbyStatus::Active < LobbyStatus::Finished);
    }

    #[test]
    fn active_host_is_kept() {
        let mut lobby = lobby_with(&["a", "b"]);
        assert_eq!(lobby.elect_host(), None);
        assert_eq!(lobby.host_id, "a");
    }

    #[test]
    fn missing_host_goes_to_earliest_active() {
        let mut lobby = lobby_with(&["a", "b", "c", "d"]);
        disconnect(&mut lobby, "b");
        lobby.remove("a");

        assert_eq!(lobby.elect_host().as_deref(), Some("c"));
        assert_eq!(lobby.host_id, "c");
        assert_eq!(host_count(&lobby), 1);
    }

    #[test]
    fn missing_host_falls_back_to_earliest_when_nobody_is_active() {
        let mut lobby = lobby_with(&["a", "b", "c"]);
        disconnect(&mut lobby, "b");
        disconnect(&mut lobby, "c");
        lobby.remove("a");

        assert_eq!(lobby.elect_host().as_deref(), Some("b"));
        assert_eq!(host_count(&lobby), 1);
    }

    #[test]
    fn disconnected_host_keeps_role_without_active_candidates() {
        let mut lobby = lobby_with(&["a", "b"]);
        disconnect(&mut lobby, "b");
        disconnect(&mut lobby, "a");

        assert_eq!(lobby.elect_host(), None);
        assert_eq!(lobby.host_id, "a");
        assert_eq!(host_count(&lobby), 1);
    }

    #[test]
    fn abandoned_requires_everyone_disconnected_long_enough() {
        let mut lobby = lobby_with(&["a", "b"]);
        disconnect(&mut lobby, "a");
        assert!(!lobby.abandoned_since(Instant::now()));

        disconnect(&mut lobby, "b");
        assert!(lobby.abandoned_since(Instant::now()));
    }
}
