use std::time::{SystemTime, UNIX_EPOCH};

use rand::{Rng, rng};
use tracing::{debug, info, warn};

use crate::{
    dto::{
        lobby::{LobbySnapshot, ParticipantSummary, participant_summaries, ranked_summaries},
        ws::{
            ClientEvent, CreateLobbyPayload, ErrorMessage, JoinLobbyPayload, LobbyRef,
            LobbyWelcome, NewHost, PlayerChange, PlayerJoined, PlayerReadyPayload,
            PlayerReadyUpdated, QuizFinished, ScoreUpdated, ServerEvent, UpdateScorePayload,
        },
    },
    state::{
        SharedState,
        connections::{Binding, ConnectionId},
        lobby::{Lobby, LobbyError, LobbyStatus, Participant},
        session_store::{ScoreUpdate, SessionStore},
    },
};

const PLAYER_ID_ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const PLAYER_ID_SUFFIX_LEN: usize = 9;

/// Apply one inbound event on behalf of `connection_id`.
///
/// Failures are answered to the originating connection only: `join-error`
/// for joins, `start-error` for starts and `error` for everything else.
pub async fn handle_event(state: &SharedState, connection_id: ConnectionId, event: ClientEvent) {
    let event_name = event.name();
    let lobby_id = event.lobby_id().to_owned();
    let reply: fn(ErrorMessage) -> ServerEvent = match &event {
        ClientEvent::JoinLobby(_) => ServerEvent::JoinError,
        ClientEvent::StartQuiz(_) => ServerEvent::StartError,
        _ => ServerEvent::Error,
    };

    let result = match event {
        ClientEvent::CreateLobby(payload) => create_lobby(state, connection_id, payload).await,
        ClientEvent::JoinLobby(payload) => join_lobby(state, connection_id, payload).await,
        ClientEvent::PlayerReady(payload) => player_ready(state, connection_id, payload).await,
        ClientEvent::UpdateScore(payload) => update_score(state, payload).await,
        ClientEvent::StartQuiz(payload) => start_quiz(state, connection_id, payload).await,
        ClientEvent::LeaveLobby(payload) => leave_lobby(state, connection_id, payload).await,
        ClientEvent::EndQuiz(payload) => end_quiz(state, connection_id, payload).await,
    };

    if let Err(err) = result {
        debug!(%connection_id, lobby_id, event = event_name, error = %err, "event rejected");
        state.connections().send(
            connection_id,
            reply(ErrorMessage {
                message: err.client_message(),
            }),
        );
    }
}

/// Release whatever the closed connection was bound to: the participant is
/// kept but flagged disconnected so it can resume later.
pub async fn handle_disconnect(state: &SharedState, connection_id: ConnectionId) {
    let Some(binding) = state.connections().deregister(connection_id) else {
        debug!(%connection_id, "connection closed without a lobby binding");
        return;
    };

    let mut sessions = state.sessions().lock().await;
    detach_participant(state, &mut sessions, connection_id, &binding);
}

/// Build a player id shaped `player_<unix-millis>_<9 base36 chars>`.
pub fn generate_player_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default();
    let mut rng = rng();
    let suffix: String = (0..PLAYER_ID_SUFFIX_LEN)
        .map(|_| char::from(PLAYER_ID_ALPHABET[rng.random_range(0..PLAYER_ID_ALPHABET.len())]))
        .collect();
    format!("player_{millis}_{suffix}")
}

async fn create_lobby(
    state: &SharedState,
    connection_id: ConnectionId,
    payload: CreateLobbyPayload,
) -> Result<(), LobbyError> {
    let lobby_id = payload.lobby_id;
    let player_id = payload.player_id.unwrap_or_else(generate_player_id);
    let host = Participant::host(
        &player_id,
        payload.host_name.trim(),
        payload.host_avatar,
        connection_id,
    );

    let mut sessions = state.sessions().lock().await;
    sessions.create_lobby(&lobby_id, payload.quiz_payload, host)?;
    release_previous_binding(state, &mut sessions, connection_id, &lobby_id, &player_id);
    state.connections().bind(connection_id, &lobby_id, &player_id);

    let lobby = sessions.lobby(&lobby_id)?;
    state.mirror().upsert_all(lobby);
    state.connections().send(
        connection_id,
        ServerEvent::LobbyCreated(LobbyWelcome {
            player_id: player_id.clone(),
            lobby: LobbySnapshot::from(lobby),
            reconnected: None,
        }),
    );

    info!(lobby_id, player_id, %connection_id, "lobby created");
    Ok(())
}

async fn join_lobby(
    state: &SharedState,
    connection_id: ConnectionId,
    payload: JoinLobbyPayload,
) -> Result<(), LobbyError> {
    let lobby_id = payload.lobby_id.as_str();
    let mut sessions = state.sessions().lock().await;
    sessions.lobby(lobby_id)?;

    if let Some(player_id) = payload.player_id.as_deref() {
        if sessions
            .find_participant_by_player_id(lobby_id, player_id)
            .is_some()
        {
            return rejoin(state, &mut sessions, connection_id, lobby_id, player_id);
        }
    }

    let player_id = payload.player_id.clone().unwrap_or_else(generate_player_id);
    let participant = Participant::new(
        &player_id,
        payload.player_name.trim(),
        payload.player_avatar,
        connection_id,
    );
    let new_host = sessions.add_participant(lobby_id, participant)?;
    release_previous_binding(state, &mut sessions, connection_id, lobby_id, &player_id);
    state.connections().bind(connection_id, lobby_id, &player_id);

    let lobby = sessions.lobby(lobby_id)?;
    let joined = participant_in(lobby, &player_id)?;
    state.connections().send(
        connection_id,
        ServerEvent::LobbyJoined(LobbyWelcome {
            player_id: player_id.clone(),
            lobby: LobbySnapshot::from(lobby),
            reconnected: Some(false),
        }),
    );
    state.connections().broadcast(
        lobby_id,
        &ServerEvent::PlayerJoined(PlayerJoined {
            player: ParticipantSummary::from(joined),
            participants: participant_summaries(lobby),
        }),
    );

    match new_host {
        Some(host) => {
            announce_new_host(state, lobby, &host);
            state.mirror().upsert_all(lobby);
        }
        None => state.mirror().upsert_participant(lobby_id, joined),
    }

    info!(lobby_id, player_id, %connection_id, participants = lobby.len(), "player joined");
    Ok(())
}

/// Resume a known participant on a new connection.
fn rejoin(
    state: &SharedState,
    sessions: &mut SessionStore,
    connection_id: ConnectionId,
    lobby_id: &str,
    player_id: &str,
) -> Result<(), LobbyError> {
    let reconnection = sessions.reconnect(lobby_id, player_id, connection_id)?;
    release_previous_binding(state, sessions, connection_id, lobby_id, player_id);
    let displaced = state.connections().bind(connection_id, lobby_id, player_id);
    if let Some(previous) = reconnection.previous_connection {
        debug!(lobby_id, player_id, %previous, "participant taken over by a newer connection");
    }

    let lobby = sessions.lobby(lobby_id)?;
    state.connections().send(
        connection_id,
        ServerEvent::LobbyJoined(LobbyWelcome {
            player_id: player_id.to_owned(),
            lobby: LobbySnapshot::from(lobby),
            reconnected: Some(true),
        }),
    );
    state.connections().broadcast(
        lobby_id,
        &ServerEvent::PlayerReconnected(PlayerChange {
            player_id: player_id.to_owned(),
            participants: participant_summaries(lobby),
        }),
    );

    match reconnection.new_host {
        Some(host) => {
            announce_new_host(state, lobby, &host);
            state.mirror().upsert_all(lobby);
        }
        None => state
            .mirror()
            .upsert_participant(lobby_id, participant_in(lobby, player_id)?),
    }

    info!(lobby_id, player_id, %connection_id, displaced = displaced.len(), "player reconnected");
    Ok(())
}

async fn player_ready(
    state: &SharedState,
    connection_id: ConnectionId,
    payload: PlayerReadyPayload,
) -> Result<(), LobbyError> {
    let mut sessions = state.sessions().lock().await;
    let Binding {
        lobby_id,
        player_id,
    } = bound_participant(state, connection_id, &payload.lobby_id)?;
    sessions.set_ready(&lobby_id, &player_id, payload.is_ready)?;

    let lobby = sessions.lobby(&lobby_id)?;
    state.connections().broadcast(
        &lobby_id,
        &ServerEvent::PlayerReadyUpdated(PlayerReadyUpdated {
            player_id: player_id.clone(),
            is_ready: payload.is_ready,
            participants: participant_summaries(lobby),
        }),
    );
    state
        .mirror()
        .upsert_participant(&lobby_id, participant_in(lobby, &player_id)?);
    Ok(())
}

async fn update_score(state: &SharedState, payload: UpdateScorePayload) -> Result<(), LobbyError> {
    let lobby_id = payload.lobby_id.as_str();
    let player_id = payload.player_id.as_str();
    let mut sessions = state.sessions().lock().await;
    sessions.update_score(
        lobby_id,
        player_id,
        ScoreUpdate {
            score: payload.score,
            correct_answers: payload.correct_answers,
            wrong_answers: payload.wrong_answers,
            question_index: payload.question_index,
        },
    )?;

    let lobby = sessions.lobby(lobby_id)?;
    state.connections().broadcast(
        lobby_id,
        &ServerEvent::ScoreUpdated(ScoreUpdated {
            player_id: player_id.to_owned(),
            participants: participant_summaries(lobby),
        }),
    );
    state
        .mirror()
        .upsert_participant(lobby_id, participant_in(lobby, player_id)?);
    Ok(())
}

async fn start_quiz(
    state: &SharedState,
    connection_id: ConnectionId,
    payload: LobbyRef,
) -> Result<(), LobbyError> {
    let mut sessions = state.sessions().lock().await;
    let Binding {
        lobby_id,
        player_id,
    } = bound_participant(state, connection_id, &payload.lobby_id)?;

    let lobby = sessions.lobby(&lobby_id)?;
    if !participant_in(lobby, &player_id)?.is_host {
        return Err(LobbyError::NotHost(player_id));
    }
    if lobby.status != LobbyStatus::Waiting {
        return Err(LobbyError::LobbyAlreadyStarted(lobby_id));
    }
    let required = state.config().min_participants_to_start;
    let actual = lobby.active_count();
    if actual < required {
        return Err(LobbyError::NotEnoughPlayers { required, actual });
    }

    sessions.set_status(&lobby_id, LobbyStatus::Starting)?;
    state.mirror().upsert_lobby(sessions.lobby(&lobby_id)?);
    state.countdowns().schedule(state, &lobby_id);

    info!(lobby_id, host_id = player_id, participants = actual, "quiz countdown started");
    Ok(())
}

async fn leave_lobby(
    state: &SharedState,
    connection_id: ConnectionId,
    payload: LobbyRef,
) -> Result<(), LobbyError> {
    let mut sessions = state.sessions().lock().await;
    let Binding {
        lobby_id,
        player_id,
    } = bound_participant(state, connection_id, &payload.lobby_id)?;

    let removal = sessions.remove_participant(&lobby_id, &player_id)?;
    state.connections().unbind(connection_id);
    state.mirror().delete_participant(&lobby_id, &player_id);

    if removal.lobby_deleted {
        state.countdowns().cancel(&lobby_id);
        state.mirror().delete_lobby(&lobby_id);
        info!(lobby_id, player_id, "last participant left; lobby deleted");
        return Ok(());
    }

    let lobby = sessions.lobby(&lobby_id)?;
    state.connections().broadcast(
        &lobby_id,
        &ServerEvent::PlayerLeft(PlayerChange {
            player_id: player_id.clone(),
            participants: participant_summaries(lobby),
        }),
    );
    if let Some(host) = removal.new_host {
        announce_new_host(state, lobby, &host);
        state.mirror().upsert_all(lobby);
    }

    info!(lobby_id, player_id, remaining = lobby.len(), "player left");
    Ok(())
}

async fn end_quiz(
    state: &SharedState,
    connection_id: ConnectionId,
    payload: LobbyRef,
) -> Result<(), LobbyError> {
    let mut sessions = state.sessions().lock().await;
    let Binding {
        lobby_id,
        player_id,
    } = bound_participant(state, connection_id, &payload.lobby_id)?;

    if !participant_in(sessions.lobby(&lobby_id)?, &player_id)?.is_host {
        return Err(LobbyError::NotHost(player_id));
    }
    sessions.set_status(&lobby_id, LobbyStatus::Finished)?;

    let lobby = sessions.lobby(&lobby_id)?;
    state.connections().broadcast(
        &lobby_id,
        &ServerEvent::QuizFinished(QuizFinished {
            lobby_id: lobby_id.clone(),
            leaderboard: ranked_summaries(lobby),
        }),
    );
    state.mirror().upsert_all(lobby);

    info!(lobby_id, host_id = player_id, "quiz finished");
    Ok(())
}

/// The participant `connection_id` speaks for, which must belong to `lobby_id`.
fn bound_participant(
    state: &SharedState,
    connection_id: ConnectionId,
    lobby_id: &str,
) -> Result<Binding, LobbyError> {
    match state.connections().resolve(connection_id) {
        Some(binding) if binding.lobby_id == lobby_id => Ok(binding),
        _ => Err(LobbyError::NotInLobby(lobby_id.to_owned())),
    }
}

fn participant_in<'a>(lobby: &'a Lobby, player_id: &str) -> Result<&'a Participant, LobbyError> {
    lobby
        .participant(player_id)
        .ok_or_else(|| LobbyError::ParticipantNotFound {
            lobby_id: lobby.id.clone(),
            player_id: player_id.to_owned(),
        })
}

/// Drop the binding a connection holds before it takes another participant.
fn release_previous_binding(
    state: &SharedState,
    sessions: &mut SessionStore,
    connection_id: ConnectionId,
    lobby_id: &str,
    player_id: &str,
) {
    let Some(previous) = state.connections().resolve(connection_id) else {
        return;
    };
    if previous.lobby_id == lobby_id && previous.player_id == player_id {
        return;
    }

    state.connections().unbind(connection_id);
    detach_participant(state, sessions, connection_id, &previous);
}

/// Flag the participant behind `binding` disconnected, unless it already moved to another connection.
fn detach_participant(
    state: &SharedState,
    sessions: &mut SessionStore,
    connection_id: ConnectionId,
    binding: &Binding,
) {
    let Binding {
        lobby_id,
        player_id,
    } = binding;
    let still_bound = sessions
        .find_participant_by_player_id(lobby_id, player_id)
        .is_some_and(|p| p.connection_id == Some(connection_id));
    if !still_bound {
        debug!(lobby_id, player_id, %connection_id, "participant no longer bound to this connection");
        return;
    }

    let new_host = match sessions.mark_disconnected(lobby_id, player_id) {
        Ok(new_host) => new_host,
        Err(err) => {
            warn!(lobby_id, player_id, error = %err, "failed to mark participant disconnected");
            return;
        }
    };

    let Some(lobby) = sessions.get(lobby_id) else {
        return;
    };
    state.connections().broadcast(
        lobby_id,
        &ServerEvent::PlayerDisconnected(PlayerChange {
            player_id: player_id.clone(),
            participants: participant_summaries(lobby),
        }),
    );
    match new_host {
        Some(host) => {
            announce_new_host(state, lobby, &host);
            state.mirror().upsert_all(lobby);
        }
        None => {
            if let Some(participant) = lobby.participant(player_id) {
                state.mirror().upsert_participant(lobby_id, participant);
            }
        }
    }

    info!(lobby_id, player_id, %connection_id, "player disconnected");
}

fn announce_new_host(state: &SharedState, lobby: &Lobby, new_host: &str) {
    state.connections().broadcast(
        &lobby.id,
        &ServerEvent::NewHost(NewHost {
            new_host: new_host.to_owned(),
            participants: participant_summaries(lobby),
        }),
    );
    info!(lobby_id = %lobby.id, new_host, "host reassigned");
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    use super::*;
    use crate::{
        config::AppConfig,
        state::{AppState, lobby::ParticipantStatus},
    };

    struct Client {
        id: ConnectionId,
        rx: mpsc::UnboundedReceiver<ServerEvent>,
    }

    impl Client {
        fn connect(state: &SharedState) -> Self {
            let (tx, rx) = mpsc::unbounded_channel();
            let id = Uuid::new_v4();
            state.connections().register(id, tx);
            Self { id, rx }
        }

        fn drain(&mut self) -> Vec<ServerEvent> {
            let mut events = Vec::new();
            while let Ok(event) = self.rx.try_recv() {
                events.push(event);
            }
            events
        }

        fn names(&mut self) -> Vec<&'static str> {
            self.drain().iter().map(ServerEvent::name).collect()
        }
    }

    fn create(lobby_id: &str, player_id: &str) -> ClientEvent {
        ClientEvent::CreateLobby(CreateLobbyPayload {
            lobby_id: lobby_id.into(),
            host_name: "Host".into(),
            host_avatar: 1,
            quiz_payload: json!({ "title": "Capitals" }),
            player_id: Some(player_id.into()),
        })
    }

    fn join(lobby_id: &str, player_id: Option<&str>) -> ClientEvent {
        ClientEvent::JoinLobby(JoinLobbyPayload {
            lobby_id: lobby_id.into(),
            player_name: "Player".into(),
            player_avatar: 2,
            player_id: player_id.map(str::to_owned),
        })
    }

    fn lobby_ref(lobby_id: &str) -> LobbyRef {
        LobbyRef {
            lobby_id: lobby_id.into(),
        }
    }

    fn error_message(event: &ServerEvent) -> &str {
        match event {
            ServerEvent::JoinError(err) | ServerEvent::StartError(err) | ServerEvent::Error(err) => {
                &err.message
            }
            other => panic!("expected an error event, got {}", other.name()),
        }
    }

    async fn lobby_with_guest(state: &SharedState) -> (Client, Client) {
        let mut host = Client::connect(state);
        let mut guest = Client::connect(state);
        handle_event(state, host.id, create("q1", "host")).await;
        handle_event(state, guest.id, join("q1", Some("guest"))).await;
        host.drain();
        guest.drain();
        (host, guest)
    }

    #[test]
    fn generated_player_ids_have_expected_shape() {
        let id = generate_player_id();
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "player");
        assert!(parts[1].parse::<u128>().is_ok());
        assert_eq!(parts[2].len(), 9);
        assert!(
            parts[2]
                .chars()
                .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase())
        );
        assert_ne!(generate_player_id(), id);
    }

    #[tokio::test]
    async fn create_replies_with_snapshot_and_rejects_duplicates() {
        let state = AppState::new(AppConfig::default());
        let mut host = Client::connect(&state);

        handle_event(&state, host.id, create("q1", "host")).await;
        let events = host.drain();
        let ServerEvent::LobbyCreated(welcome) = &events[0] else {
            panic!("expected lobby-created");
        };
        assert_eq!(welcome.player_id, "host");
        assert_eq!(welcome.lobby.status, LobbyStatus::Waiting);
        assert_eq!(welcome.lobby.participants.len(), 1);
        assert!(welcome.lobby.participants[0].is_host);
        assert!(welcome.reconnected.is_none());

        let mut other = Client::connect(&state);
        handle_event(&state, other.id, create("q1", "someone")).await;
        let events = other.drain();
        assert_eq!(error_message(&events[0]), "Lobby already exists");
        assert_eq!(state.sessions().lock().await.lobby("q1").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn create_without_player_id_generates_one() {
        let state = AppState::new(AppConfig::default());
        let mut host = Client::connect(&state);
        let mut event = create("q1", "unused");
        if let ClientEvent::CreateLobby(payload) = &mut event {
            payload.player_id = None;
        }

        handle_event(&state, host.id, event).await;
        let events = host.drain();
        let ServerEvent::LobbyCreated(welcome) = &events[0] else {
            panic!("expected lobby-created");
        };
        assert!(welcome.player_id.starts_with("player_"));
        assert_eq!(state.connections().resolve(host.id).unwrap().player_id, welcome.player_id);
    }

    #[tokio::test]
    async fn join_broadcasts_to_everyone() {
        let state = AppState::new(AppConfig::default());
        let mut host = Client::connect(&state);
        let mut guest = Client::connect(&state);
        handle_event(&state, host.id, create("q1", "host")).await;
        host.drain();

        handle_event(&state, guest.id, join("q1", Some("guest"))).await;

        let guest_events = guest.drain();
        let ServerEvent::LobbyJoined(welcome) = &guest_events[0] else {
            panic!("expected lobby-joined");
        };
        assert_eq!(welcome.reconnected, Some(false));
        assert_eq!(welcome.lobby.participants.len(), 2);
        assert!(matches!(&guest_events[1], ServerEvent::PlayerJoined(_)));

        let host_events = host.drain();
        assert_eq!(host_events.len(), 1);
        let ServerEvent::PlayerJoined(joined) = &host_events[0] else {
            panic!("expected player-joined");
        };
        assert_eq!(joined.player.id, "guest");
        assert!(!joined.player.is_host);
        assert_eq!(joined.participants.len(), 2);
    }

    #[tokio::test]
    async fn join_errors_go_to_the_sender_only() {
        let state = AppState::new(AppConfig {
            max_participants: 2,
            ..AppConfig::default()
        });
        let (mut host, _guest) = lobby_with_guest(&state).await;

        let mut stranger = Client::connect(&state);
        handle_event(&state, stranger.id, join("missing", None)).await;
        handle_event(&state, stranger.id, join("q1", None)).await;
        let events = stranger.drain();
        assert!(matches!(events[0], ServerEvent::JoinError(_)));
        assert_eq!(error_message(&events[0]), "Lobby not found");
        assert_eq!(error_message(&events[1]), "Lobby is full");
        assert!(host.drain().is_empty());
        assert!(state.connections().resolve(stranger.id).is_none());
    }

    #[tokio::test]
    async fn only_the_host_may_start() {
        let state = AppState::new(AppConfig::default());
        let (mut host, mut guest) = lobby_with_guest(&state).await;

        handle_event(&state, guest.id, ClientEvent::StartQuiz(lobby_ref("q1"))).await;
        let events = guest.drain();
        assert!(matches!(events[0], ServerEvent::StartError(_)));
        assert_eq!(error_message(&events[0]), "Only the host can do this");
        assert!(host.drain().is_empty());
        assert_eq!(
            state.sessions().lock().await.lobby("q1").unwrap().status,
            LobbyStatus::Waiting
        );
    }

    #[tokio::test]
    async fn start_requires_enough_active_players() {
        let state = AppState::new(AppConfig {
            min_participants_to_start: 2,
            ..AppConfig::default()
        });
        let mut host = Client::connect(&state);
        handle_event(&state, host.id, create("q1", "host")).await;
        host.drain();

        handle_event(&state, host.id, ClientEvent::StartQuiz(lobby_ref("q1"))).await;
        let events = host.drain();
        assert_eq!(
            error_message(&events[0]),
            "At least 2 active player(s) are required"
        );
        assert!(!state.countdowns().is_running("q1"));
    }

    #[tokio::test]
    async fn start_moves_to_starting_and_rejects_late_joins() {
        let state = AppState::new(AppConfig::default());
        let (mut host, _guest) = lobby_with_guest(&state).await;

        handle_event(&state, host.id, ClientEvent::StartQuiz(lobby_ref("q1"))).await;
        assert_eq!(
            state.sessions().lock().await.lobby("q1").unwrap().status,
            LobbyStatus::Starting
        );
        assert!(state.countdowns().is_running("q1"));

        handle_event(&state, host.id, ClientEvent::StartQuiz(lobby_ref("q1"))).await;
        let errors: Vec<String> = host
            .drain()
            .iter()
            .filter(|event| matches!(event, ServerEvent::StartError(_)))
            .map(|event| error_message(event).to_owned())
            .collect();
        assert_eq!(errors, vec!["Quiz already started".to_owned()]);

        let mut late = Client::connect(&state);
        handle_event(&state, late.id, join("q1", None)).await;
        let events = late.drain();
        assert_eq!(error_message(&events[0]), "Quiz already started");
        state.countdowns().cancel("q1");
    }

    #[tokio::test]
    async fn ready_and_score_updates_are_broadcast() {
        let state = AppState::new(AppConfig::default());
        let (mut host, mut guest) = lobby_with_guest(&state).await;

        handle_event(
            &state,
            guest.id,
            ClientEvent::PlayerReady(PlayerReadyPayload {
                lobby_id: "q1".into(),
                is_ready: true,
            }),
        )
        .await;
        let ServerEvent::PlayerReadyUpdated(update) = &host.drain()[0] else {
            panic!("expected player-ready-updated");
        };
        assert_eq!(update.player_id, "guest");
        assert!(update.is_ready);
        assert_eq!(guest.names(), vec!["player-ready-updated"]);

        let score = ClientEvent::UpdateScore(UpdateScorePayload {
            lobby_id: "q1".into(),
            player_id: "guest".into(),
            score: 30,
            correct_answers: 3,
            wrong_answers: 1,
            question_index: 4,
        });
        handle_event(&state, guest.id, score.clone()).await;
        handle_event(&state, guest.id, score).await;
        assert_eq!(host.names(), vec!["score-updated", "score-updated"]);

        let sessions = state.sessions().lock().await;
        let guest_state = sessions.find_participant_by_player_id("q1", "guest").unwrap();
        assert_eq!(guest_state.score, 30);
        assert_eq!(guest_state.correct_answers, 3);
        assert_eq!(guest_state.current_question, Some(4));
    }

    #[tokio::test]
    async fn events_for_another_lobby_are_rejected() {
        let state = AppState::new(AppConfig::default());
        let (_host, mut guest) = lobby_with_guest(&state).await;
        let mut loner = Client::connect(&state);

        handle_event(&state, guest.id, ClientEvent::LeaveLobby(lobby_ref("q2"))).await;
        handle_event(
            &state,
            loner.id,
            ClientEvent::PlayerReady(PlayerReadyPayload {
                lobby_id: "q1".into(),
                is_ready: true,
            }),
        )
        .await;

        assert_eq!(error_message(&guest.drain()[0]), "You are not in this lobby");
        assert_eq!(error_message(&loner.drain()[0]), "You are not in this lobby");
        assert_eq!(state.sessions().lock().await.lobby("q1").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn host_leaving_hands_over_and_last_leave_deletes() {
        let state = AppState::new(AppConfig::default());
        let (host, mut guest) = lobby_with_guest(&state).await;

        handle_event(&state, host.id, ClientEvent::LeaveLobby(lobby_ref("q1"))).await;
        let events = guest.drain();
        assert_eq!(
            events.iter().map(ServerEvent::name).collect::<Vec<_>>(),
            vec!["player-left", "new-host"]
        );
        let ServerEvent::NewHost(new_host) = &events[1] else {
            panic!("expected new-host");
        };
        assert_eq!(new_host.new_host, "guest");
        assert!(state.connections().resolve(host.id).is_none());

        handle_event(&state, guest.id, ClientEvent::LeaveLobby(lobby_ref("q1"))).await;
        assert!(guest.drain().is_empty());
        assert!(state.sessions().lock().await.get("q1").is_none());

        let mut late = Client::connect(&state);
        handle_event(&state, late.id, join("q1", None)).await;
        assert_eq!(error_message(&late.drain()[0]), "Lobby not found");
    }

    #[tokio::test]
    async fn disconnect_keeps_progress_and_reconnect_restores_it() {
        let state = AppState::new(AppConfig::default());
        let (mut host, guest) = lobby_with_guest(&state).await;
        state
            .sessions()
            .lock()
            .await
            .update_score(
                "q1",
                "guest",
                ScoreUpdate {
                    score: 20,
                    correct_answers: 2,
                    wrong_answers: 0,
                    question_index: 2,
                },
            )
            .unwrap();

        handle_disconnect(&state, guest.id).await;
        let events = host.drain();
        let ServerEvent::PlayerDisconnected(PlayerChange {
            player_id,
            participants,
        }) = &events[0]
        else {
            panic!("expected player-disconnected");
        };
        assert_eq!(player_id, "guest");
        assert_eq!(participants.len(), 2);
        assert!(
            participants
                .iter()
                .any(|p| p.id == "guest" && p.status == ParticipantStatus::Disconnected)
        );

        let mut resumed = Client::connect(&state);
        handle_event(&state, resumed.id, join("q1", Some("guest"))).await;
        let events = resumed.drain();
        let ServerEvent::LobbyJoined(welcome) = &events[0] else {
            panic!("expected lobby-joined");
        };
        assert_eq!(welcome.reconnected, Some(true));
        assert_eq!(welcome.lobby.participants.len(), 2);
        let restored = welcome
            .lobby
            .participants
            .iter()
            .find(|p| p.id == "guest")
            .unwrap();
        assert_eq!(restored.score, 20);
        assert_eq!(restored.status, ParticipantStatus::Active);
        assert_eq!(host.names(), vec!["player-reconnected"]);
    }

    #[tokio::test]
    async fn stale_connection_close_does_not_disconnect_resumed_player() {
        let state = AppState::new(AppConfig::default());
        let (_host, guest) = lobby_with_guest(&state).await;

        let resumed = Client::connect(&state);
        handle_event(&state, resumed.id, join("q1", Some("guest"))).await;
        handle_disconnect(&state, guest.id).await;

        let sessions = state.sessions().lock().await;
        let participant = sessions.find_participant_by_player_id("q1", "guest").unwrap();
        assert_eq!(participant.status, ParticipantStatus::Active);
        assert_eq!(participant.connection_id, Some(resumed.id));
    }

    #[tokio::test]
    async fn host_disconnect_promotes_next_active_player() {
        let state = AppState::new(AppConfig::default());
        let (host, mut guest) = lobby_with_guest(&state).await;

        handle_disconnect(&state, host.id).await;
        assert_eq!(guest.names(), vec!["player-disconnected", "new-host"]);
        let sessions = state.sessions().lock().await;
        assert_eq!(sessions.lobby("q1").unwrap().host_id, "guest");
    }

    #[tokio::test]
    async fn switching_lobbies_releases_previous_binding() {
        let state = AppState::new(AppConfig::default());
        let (mut host, guest) = lobby_with_guest(&state).await;

        handle_event(&state, guest.id, create("q2", "guest-host")).await;

        assert_eq!(host.names(), vec!["player-disconnected"]);
        assert_eq!(state.connections().resolve(guest.id).unwrap().lobby_id, "q2");
        let sessions = state.sessions().lock().await;
        assert_eq!(
            sessions
                .find_participant_by_player_id("q1", "guest")
                .unwrap()
                .status,
            ParticipantStatus::Disconnected
        );
    }

    #[tokio::test]
    async fn end_quiz_requires_an_active_quiz() {
        let state = AppState::new(AppConfig::default());
        let (mut host, _guest) = lobby_with_guest(&state).await;

        handle_event(&state, host.id, ClientEvent::EndQuiz(lobby_ref("q1"))).await;
        assert_eq!(
            error_message(&host.drain()[0]),
            "Quiz cannot move from waiting to finished"
        );
    }

    #[tokio::test]
    async fn end_quiz_broadcasts_ranked_leaderboard() {
        let state = AppState::new(AppConfig::default());
        let (mut host, mut guest) = lobby_with_guest(&state).await;
        {
            let mut sessions = state.sessions().lock().await;
            sessions.set_status("q1", LobbyStatus::Starting).unwrap();
            sessions.set_status("q1", LobbyStatus::Active).unwrap();
        }
        handle_event(
            &state,
            guest.id,
            ClientEvent::UpdateScore(UpdateScorePayload {
                lobby_id: "q1".into(),
                player_id: "guest".into(),
                score: 50,
                correct_answers: 5,
                wrong_answers: 0,
                question_index: 5,
            }),
        )
        .await;
        host.drain();
        guest.drain();

        handle_event(&state, guest.id, ClientEvent::EndQuiz(lobby_ref("q1"))).await;
        assert_eq!(error_message(&guest.drain()[0]), "Only the host can do this");

        handle_event(&state, host.id, ClientEvent::EndQuiz(lobby_ref("q1"))).await;
        let events = guest.drain();
        let ServerEvent::QuizFinished(finished) = &events[0] else {
            panic!("expected quiz-finished");
        };
        let ranking: Vec<&str> = finished.leaderboard.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ranking, vec!["guest", "host"]);
        assert_eq!(host.names(), vec!["quiz-finished"]);
    }
}
