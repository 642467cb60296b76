use std::{collections::HashMap, time::Duration};

use serde_json::Value;
use tokio::time::Instant;

use crate::state::{
    connections::ConnectionId,
    lobby::{Lobby, LobbyError, LobbyStatus, Participant, ParticipantStatus},
};

/// Result of removing a participant from a lobby.
#[derive(Debug, Clone)]
pub struct Removal {
    /// The participant that was removed.
    pub participant: Participant,
    /// New host when the removed participant held the role.
    pub new_host: Option<String>,
    /// True when the lobby became empty and was dropped.
    pub lobby_deleted: bool,
}

/// Result of re-attaching a known player to a new connection.
#[derive(Debug, Clone)]
pub struct Reconnection {
    /// Connection the participant was bound to before, if it was still active.
    pub previous_connection: Option<ConnectionId>,
    /// New host when the reconnect moved the role.
    pub new_host: Option<String>,
}

/// In-memory table of active lobbies. The only authoritative writer of lobby state.
#[derive(Debug)]
pub struct SessionStore {
    lobbies: HashMap<String, Lobby>,
    max_participants: usize,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(usize::MAX)
    }
}

impl SessionStore {
    /// Create an empty store accepting at most `max_participants` per lobby.
    pub fn new(max_participants: usize) -> Self {
        Self {
            lobbies: HashMap::new(),
            max_participants: max_participants.max(1),
        }
    }

    /// Number of lobbies currently alive.
    pub fn len(&self) -> usize {
        self.lobbies.len()
    }

    /// Whether no lobby is alive.
    pub fn is_empty(&self) -> bool {
        self.lobbies.is_empty()
    }

    /// Borrow a lobby.
    pub fn get(&self, lobby_id: &str) -> Option<&Lobby> {
        self.lobbies.get(lobby_id)
    }

    /// Borrow a lobby or fail with [`LobbyError::LobbyNotFound`].
    pub fn lobby(&self, lobby_id: &str) -> Result<&Lobby, LobbyError> {
        self.lobbies
            .get(lobby_id)
            .ok_or_else(|| LobbyError::LobbyNotFound(lobby_id.to_owned()))
    }

    fn lobby_mut(&mut self, lobby_id: &str) -> Result<&mut Lobby, LobbyError> {
        self.lobbies
            .get_mut(lobby_id)
            .ok_or_else(|| LobbyError::LobbyNotFound(lobby_id.to_owned()))
    }

    fn participant_mut(
        &mut self,
        lobby_id: &str,
        player_id: &str,
    ) -> Result<&mut Participant, LobbyError> {
        self.lobby_mut(lobby_id)?
            .participant_mut(player_id)
            .ok_or_else(|| LobbyError::ParticipantNotFound {
                lobby_id: lobby_id.to_owned(),
                player_id: player_id.to_owned(),
            })
    }

    /// Create a waiting lobby with `host` as its only participant.
    pub fn create_lobby(
        &mut self,
        lobby_id: &str,
        quiz_payload: Value,
        host: Participant,
    ) -> Result<&Lobby, LobbyError> {
        if self.lobbies.contains_key(lobby_id) {
            return Err(LobbyError::LobbyAlreadyExists(lobby_id.to_owned()));
        }

        let lobby = Lobby::new(lobby_id, quiz_payload, host);
        Ok(self.lobbies.entry(lobby_id.to_owned()).or_insert(lobby))
    }

    /// Add a new player to a waiting lobby.
    ///
    /// Returns the new host id when the lobby had no active host and the
    /// newcomer took the role.
    pub fn add_participant(
        &mut self,
        lobby_id: &str,
        participant: Participant,
    ) -> Result<Option<String>, LobbyError> {
        let limit = self.max_participants;
        let lobby = self.lobby_mut(lobby_id)?;

        if lobby.status != LobbyStatus::Waiting {
            return Err(LobbyError::LobbyAlreadyStarted(lobby_id.to_owned()));
        }
        if lobby.participant(&participant.player_id).is_some() {
            return Err(LobbyError::ParticipantExists {
                lobby_id: lobby_id.to_owned(),
                player_id: participant.player_id,
            });
        }
        if lobby.len() >= limit {
            return Err(LobbyError::LobbyFull {
                lobby_id: lobby_id.to_owned(),
                limit,
            });
        }

        let mut participant = participant;
        participant.is_host = false;
        lobby.insert(participant);
        Ok(lobby.elect_host())
    }

    /// Find a participant by its stable player id.
    pub fn find_participant_by_player_id(
        &self,
        lobby_id: &str,
        player_id: &str,
    ) -> Option<&Participant> {
        self.lobbies.get(lobby_id)?.participant(player_id)
    }

    /// Find the lobby and participant currently bound to `connection_id`.
    pub fn find_participant_by_connection_id(
        &self,
        connection_id: ConnectionId,
    ) -> Option<(&Lobby, &Participant)> {
        self.lobbies.values().find_map(|lobby| {
            lobby
                .participants()
                .find(|p| p.connection_id == Some(connection_id))
                .map(|p| (lobby, p))
        })
    }

    /// Remove a participant, reassigning the host and dropping the lobby when it empties.
    pub fn remove_participant(
        &mut self,
        lobby_id: &str,
        player_id: &str,
    ) -> Result<Removal, LobbyError> {
        let lobby = self.lobby_mut(lobby_id)?;
        let participant = lobby
            .remove(player_id)
            .ok_or_else(|| LobbyError::ParticipantNotFound {
                lobby_id: lobby_id.to_owned(),
                player_id: player_id.to_owned(),
            })?;

        if lobby.is_empty() {
            self.lobbies.remove(lobby_id);
            return Ok(Removal {
                participant,
                new_host: None,
                lobby_deleted: true,
            });
        }

        let new_host = lobby.elect_host();
        Ok(Removal {
            participant,
            new_host,
            lobby_deleted: false,
        })
    }

    /// Flag a participant as disconnected while keeping its progress.
    ///
    /// Returns the new host id when the role moved to another active participant.
    pub fn mark_disconnected(
        &mut self,
        lobby_id: &str,
        player_id: &str,
    ) -> Result<Option<String>, LobbyError> {
        let participant = self.participant_mut(lobby_id, player_id)?;
        participant.status = ParticipantStatus::Disconnected;
        participant.connection_id = None;
        participant.disconnected_at = Some(Instant::now());

        Ok(self.lobby_mut(lobby_id)?.elect_host())
    }

    /// Bind a known player to a new connection and flag it active again.
    pub fn reconnect(
        &mut self,
        lobby_id: &str,
        player_id: &str,
        connection_id: ConnectionId,
    ) -> Result<Reconnection, LobbyError> {
        let participant = self.participant_mut(lobby_id, player_id)?;
        let previous_connection = participant
            .connection_id
            .replace(connection_id)
            .filter(|previous| *previous != connection_id);
        participant.status = ParticipantStatus::Active;
        participant.disconnected_at = None;

        let new_host = self.lobby_mut(lobby_id)?.elect_host();
        Ok(Reconnection {
            previous_connection,
            new_host,
        })
    }

    /// Set the readiness flag of a participant.
    pub fn set_ready(
        &mut self,
        lobby_id: &str,
        player_id: &str,
        is_ready: bool,
    ) -> Result<(), LobbyError> {
        self.participant_mut(lobby_id, player_id)?.is_ready = is_ready;
        Ok(())
    }

    /// Overwrite the score counters reported by the client.
    pub fn update_score(
        &mut self,
        lobby_id: &str,
        player_id: &str,
        score: ScoreUpdate,
    ) -> Result<(), LobbyError> {
        let participant = self.participant_mut(lobby_id, player_id)?;
        participant.score = score.score;
        participant.correct_answers = score.correct_answers;
        participant.wrong_answers = score.wrong_answers;
        participant.current_question = Some(score.question_index);
        Ok(())
    }

    /// Advance the lobby status; only the immediate successor is accepted.
    pub fn set_status(&mut self, lobby_id: &str, status: LobbyStatus) -> Result<(), LobbyError> {
        self.lobby_mut(lobby_id)?.advance_to(status)
    }

    /// Drop every lobby whose participants all disconnected at least `ttl` before `now`.
    pub fn remove_abandoned(&mut self, ttl: Duration, now: Instant) -> Vec<Lobby> {
        let Some(cutoff) = now.checked_sub(ttl) else {
            return Vec::new();
        };

        let expired: Vec<String> = self
            .lobbies
            .values()
            .filter(|lobby| lobby.abandoned_since(cutoff))
            .map(|lobby| lobby.id.clone())
            .collect();

        expired
            .iter()
            .filter_map(|id| self.lobbies.remove(id))
            .collect()
    }
}

/// Score counters carried by an `update-score` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreUpdate {
    /// Running score.
    pub score: i32,
    /// Correct answers so far.
    pub correct_answers: u32,
    /// Wrong answers so far.
    pub wrong_answers: u32,
    /// Question the client is currently on.
    pub question_index: u32,
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use uuid::Uuid;

    use super::*;

    fn store_with_lobby(lobby_id: &str) -> SessionStore {
        let mut store = SessionStore::new(8);
        store
            .create_lobby(
                lobby_id,
                json!({"questions": 3}),
                Participant::host("host", "Host", 0, Uuid::new_v4()),
            )
            .unwrap();
        store
    }

    fn join(store: &mut SessionStore, lobby_id: &str, player_id: &str) -> ConnectionId {
        let connection = Uuid::new_v4();
        store
            .add_participant(
                lobby_id,
                Participant::new(player_id, player_id, 2, connection),
            )
            .unwrap();
        connection
    }

    fn assert_single_host(store: &SessionStore, lobby_id: &str) {
        let lobby = store.get(lobby_id).unwrap();
        let hosts: Vec<_> = lobby.participants().filter(|p| p.is_host).collect();
        assert_eq!(hosts.len(), 1, "exactly one host expected");
        assert_eq!(hosts[0].player_id, lobby.host_id);
    }

    #[test]
    fn duplicate_create_is_rejected() {
        let mut store = store_with_lobby("q1");
        let err = store
            .create_lobby(
                "q1",
                Value::Null,
                Participant::host("other", "Other", 0, Uuid::new_v4()),
            )
            .unwrap_err();
        assert_eq!(err, LobbyError::LobbyAlreadyExists("q1".into()));
        assert_eq!(store.get("q1").unwrap().host_id, "host");
    }

    #[test]
    fn join_requires_existing_waiting_lobby() {
        let mut store = store_with_lobby("q1");
        let err = store
            .add_participant("nope", Participant::new("p", "P", 0, Uuid::new_v4()))
            .unwrap_err();
        assert_eq!(err, LobbyError::LobbyNotFound("nope".into()));

        store.set_status("q1", LobbyStatus::Starting).unwrap();
        let err = store
            .add_participant("q1", Participant::new("p", "P", 0, Uuid::new_v4()))
            .unwrap_err();
        assert_eq!(err, LobbyError::LobbyAlreadyStarted("q1".into()));
    }

    #[test]
    fn join_enforces_capacity_and_unique_player_ids() {
        let mut store = SessionStore::new(2);
        store
            .create_lobby(
                "q1",
                Value::Null,
                Participant::host("host", "Host", 0, Uuid::new_v4()),
            )
            .unwrap();
        join(&mut store, "q1", "b");

        let err = store
            .add_participant("q1", Participant::new("b", "B", 0, Uuid::new_v4()))
            .unwrap_err();
        assert!(matches!(err, LobbyError::ParticipantExists { .. }));

        let err = store
            .add_participant("q1", Participant::new("c", "C", 0, Uuid::new_v4()))
            .unwrap_err();
        assert!(matches!(err, LobbyError::LobbyFull { limit: 2, .. }));
    }

    #[test]
    fn newcomer_never_steals_an_active_host() {
        let mut store = store_with_lobby("q1");
        store
            .add_participant("q1", {
                let mut p = Participant::new("b", "B", 0, Uuid::new_v4());
                p.is_host = true;
                p
            })
            .unwrap();
        assert_single_host(&store, "q1");
        assert_eq!(store.get("q1").unwrap().host_id, "host");
    }

    #[test]
    fn removing_host_promotes_earliest_active() {
        let mut store = store_with_lobby("q1");
        join(&mut store, "q1", "b");
        join(&mut store, "q1", "c");
        join(&mut store, "q1", "d");
        store.mark_disconnected("q1", "b").unwrap();

        let removal = store.remove_participant("q1", "host").unwrap();
        assert_eq!(removal.new_host.as_deref(), Some("c"));
        assert!(!removal.lobby_deleted);
        assert_single_host(&store, "q1");
    }

    #[test]
    fn removing_last_participant_deletes_lobby() {
        let mut store = store_with_lobby("q1");
        join(&mut store, "q1", "b");

        store.remove_participant("q1", "b").unwrap();
        let removal = store.remove_participant("q1", "host").unwrap();
        assert!(removal.lobby_deleted);
        assert!(store.get("q1").is_none());
        assert_eq!(
            store.lobby("q1").unwrap_err(),
            LobbyError::LobbyNotFound("q1".into())
        );
    }

    #[test]
    fn disconnect_keeps_row_and_moves_host() {
        let mut store = store_with_lobby("q1");
        join(&mut store, "q1", "b");

        let new_host = store.mark_disconnected("q1", "host").unwrap();
        assert_eq!(new_host.as_deref(), Some("b"));

        let lobby = store.get("q1").unwrap();
        assert_eq!(lobby.len(), 2);
        let old_host = lobby.participant("host").unwrap();
        assert_eq!(old_host.status, ParticipantStatus::Disconnected);
        assert_eq!(old_host.connection_id, None);
        assert_single_host(&store, "q1");
    }

    #[test]
    fn reconnect_restores_progress_without_duplicates() {
        let mut store = store_with_lobby("q1");
        let first = join(&mut store, "q1", "b");
        store
            .update_score(
                "q1",
                "b",
                ScoreUpdate {
                    score: 40,
                    correct_answers: 4,
                    wrong_answers: 1,
                    question_index: 5,
                },
            )
            .unwrap();
        store.mark_disconnected("q1", "b").unwrap();

        let second = Uuid::new_v4();
        let reconnection = store.reconnect("q1", "b", second).unwrap();
        assert_eq!(reconnection.previous_connection, None);
        assert_ne!(first, second);

        let lobby = store.get("q1").unwrap();
        assert_eq!(lobby.len(), 2);
        let b = lobby.participant("b").unwrap();
        assert_eq!(b.status, ParticipantStatus::Active);
        assert_eq!(b.score, 40);
        assert_eq!(b.correct_answers, 4);
        assert_eq!(b.wrong_answers, 1);
        assert_eq!(b.connection_id, Some(second));

        let found = store.find_participant_by_connection_id(second).unwrap();
        assert_eq!(found.1.player_id, "b");
        assert!(store.find_participant_by_connection_id(first).is_none());
    }

    #[test]
    fn reconnect_while_bound_reports_previous_connection() {
        let mut store = store_with_lobby("q1");
        let first = join(&mut store, "q1", "b");
        let reconnection = store.reconnect("q1", "b", Uuid::new_v4()).unwrap();
        assert_eq!(reconnection.previous_connection, Some(first));
    }

    #[test]
    fn reconnecting_player_takes_over_from_disconnected_host() {
        let mut store = store_with_lobby("q1");
        join(&mut store, "q1", "b");
        store.mark_disconnected("q1", "b").unwrap();
        assert_eq!(store.mark_disconnected("q1", "host").unwrap(), None);

        let reconnection = store.reconnect("q1", "b", Uuid::new_v4()).unwrap();
        assert_eq!(reconnection.new_host.as_deref(), Some("b"));
        assert_single_host(&store, "q1");
    }

    #[test]
    fn score_update_overwrites() {
        let mut store = store_with_lobby("q1");
        let update = ScoreUpdate {
            score: 30,
            correct_answers: 3,
            wrong_answers: 0,
            question_index: 3,
        };
        store.update_score("q1", "host", update).unwrap();
        store.update_score("q1", "host", update).unwrap();

        let host = store.find_participant_by_player_id("q1", "host").unwrap();
        assert_eq!(host.score, 30);
        assert_eq!(host.correct_answers, 3);
        assert_eq!(host.current_question, Some(3));
    }

    #[test]
    fn invalid_status_change_leaves_state_untouched() {
        let mut store = store_with_lobby("q1");
        assert!(store.set_status("q1", LobbyStatus::Active).is_err());
        assert!(store.set_status("q1", LobbyStatus::Finished).is_err());
        assert_eq!(store.get("q1").unwrap().status, LobbyStatus::Waiting);
    }

    #[test]
    fn abandoned_lobbies_are_removed_after_ttl() {
        let mut store = store_with_lobby("q1");
        join(&mut store, "q1", "b");
        store.mark_disconnected("q1", "host").unwrap();
        store.mark_disconnected("q1", "b").unwrap();
        let ttl = Duration::from_secs(60);

        assert!(store.remove_abandoned(ttl, Instant::now()).is_empty());

        let removed = store.remove_abandoned(ttl, Instant::now() + ttl * 2);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id, "q1");
        assert!(store.is_empty());
    }
}
