use std::sync::Weak;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::{
    dao::{
        mirror_store::MirrorStore,
        models::{LobbyEntity, ParticipantEntity},
        storage::StorageResult,
    },
    state::{
        AppState,
        lobby::{Lobby, Participant},
    },
};

/// A single write handed to the background mirror worker.
#[derive(Debug)]
pub enum MirrorCommand {
    /// Merge the lobby record into the mirror.
    UpsertLobby(LobbyEntity),
    /// Merge one participant record into the mirror.
    UpsertParticipant(ParticipantEntity),
    /// Remove one participant record.
    DeleteParticipant { lobby_id: String, player_id: String },
    /// Remove the lobby record and all of its participants.
    DeleteLobby { lobby_id: String },
    /// Resolved once every command queued before it has been applied.
    Flush(oneshot::Sender<()>),
}

impl MirrorCommand {
    async fn apply(self, store: &dyn MirrorStore) -> StorageResult<()> {
        match self {
            Self::UpsertLobby(lobby) => store.upsert_lobby(lobby).await,
            Self::UpsertParticipant(participant) => store.upsert_participant(participant).await,
            Self::DeleteParticipant {
                lobby_id,
                player_id,
            } => store.delete_participant(lobby_id, player_id).await,
            Self::DeleteLobby { lobby_id } => store.delete_lobby(lobby_id).await,
            Self::Flush(_) => Ok(()),
        }
    }

    fn target(&self) -> (Option<&str>, Option<&str>) {
        match self {
            Self::UpsertLobby(lobby) => (Some(&lobby.lobby_id), None),
            Self::UpsertParticipant(p) => (Some(&p.lobby_id), Some(&p.player_id)),
            Self::DeleteParticipant {
                lobby_id,
                player_id,
            } => (Some(lobby_id), Some(player_id)),
            Self::DeleteLobby { lobby_id } => (Some(lobby_id), None),
            Self::Flush(_) => (None, None),
        }
    }
}

/// Fire-and-forget front of the durable mirror.
///
/// Writes are queued in order and applied one at a time by a single worker,
/// so writes for the same record land in the order they were issued. Failed
/// writes are logged and dropped. Writes reaching the worker while the
/// application is degraded, or before any store is installed, are dropped too.
#[derive(Debug, Clone)]
pub struct MirrorWriter {
    tx: mpsc::UnboundedSender<MirrorCommand>,
}

impl MirrorWriter {
    /// Start the worker. It stops once `state` is dropped.
    pub fn spawn(state: Weak<AppState>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(state, rx));
        Self { tx }
    }

    fn enqueue(&self, command: MirrorCommand) {
        if self.tx.send(command).is_err() {
            debug!("mirror worker stopped; dropping write");
        }
    }

    /// Mirror the lobby record only.
    pub fn upsert_lobby(&self, lobby: &Lobby) {
        self.enqueue(MirrorCommand::UpsertLobby(LobbyEntity::from(lobby)));
    }

    /// Mirror one participant of `lobby_id`.
    pub fn upsert_participant(&self, lobby_id: &str, participant: &Participant) {
        self.enqueue(MirrorCommand::UpsertParticipant(
            ParticipantEntity::from_participant(lobby_id, participant),
        ));
    }

    /// Mirror the lobby record and every participant, e.g. after a host change.
    pub fn upsert_all(&self, lobby: &Lobby) {
        self.upsert_lobby(lobby);
        for participant in ParticipantEntity::all_from(lobby) {
            self.enqueue(MirrorCommand::UpsertParticipant(participant));
        }
    }

    /// Remove one participant from the mirror.
    pub fn delete_participant(&self, lobby_id: &str, player_id: &str) {
        self.enqueue(MirrorCommand::DeleteParticipant {
            lobby_id: lobby_id.to_owned(),
            player_id: player_id.to_owned(),
        });
    }

    /// Remove a lobby and its participants from the mirror.
    pub fn delete_lobby(&self, lobby_id: &str) {
        self.enqueue(MirrorCommand::DeleteLobby {
            lobby_id: lobby_id.to_owned(),
        });
    }

    /// Wait until every write queued so far has been attempted.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(MirrorCommand::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }
}

async fn run_worker(state: Weak<AppState>, mut rx: mpsc::UnboundedReceiver<MirrorCommand>) {
    while let Some(command) = rx.recv().await {
        if let MirrorCommand::Flush(done) = command {
            let _ = done.send(());
            continue;
        }

        let Some(state) = state.upgrade() else {
            break;
        };

        let (lobby_id, player_id) = command.target();
        let (lobby_id, player_id) = (lobby_id.map(str::to_owned), player_id.map(str::to_owned));

        if state.is_degraded().await {
            debug!(?lobby_id, ?player_id, "degraded mode; dropping mirror write");
            continue;
        }
        let Some(store) = state.mirror_store().await else {
            debug!(?lobby_id, ?player_id, "no mirror store installed; dropping write");
            continue;
        };
        drop(state);

        if let Err(err) = command.apply(store.as_ref()).await {
            warn!(?lobby_id, ?player_id, error = %err, "mirror write failed");
        }
    }
    debug!("mirror worker stopped");
}
