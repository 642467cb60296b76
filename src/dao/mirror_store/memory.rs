use std::{sync::Arc, time::SystemTime};

use dashmap::DashMap;
use futures::future::BoxFuture;

use super::MirrorStore;
use crate::dao::{
    models::{LobbyEntity, ParticipantEntity},
    storage::StorageResult,
};

/// Process-local mirror used by the `memory` backend and by tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMirrorStore {
    lobbies: Arc<DashMap<String, LobbyEntity>>,
    participants: Arc<DashMap<(String, String), ParticipantEntity>>,
}

impl InMemoryMirrorStore {
    /// Empty mirror.
    pub fn new() -> Self {
        Self::default()
    }

    fn upsert_lobby_now(&self, mut lobby: LobbyEntity) {
        lobby.updated_at = Some(SystemTime::now());
        self.lobbies.insert(lobby.lobby_id.clone(), lobby);
    }

    fn upsert_participant_now(&self, mut participant: ParticipantEntity) {
        participant.updated_at = Some(SystemTime::now());
        let key = (participant.lobby_id.clone(), participant.player_id.clone());
        self.participants.insert(key, participant);
    }

    fn delete_lobby_now(&self, lobby_id: &str) {
        self.lobbies.remove(lobby_id);
        self.participants.retain(|(lobby, _), _| lobby != lobby_id);
    }

    fn list_participants_now(&self, lobby_id: &str) -> Vec<ParticipantEntity> {
        let mut participants: Vec<ParticipantEntity> = self
            .participants
            .iter()
            .filter(|entry| entry.key().0 == lobby_id)
            .map(|entry| entry.value().clone())
            .collect();
        participants.sort_by(|a, b| {
            a.joined_at
                .cmp(&b.joined_at)
                .then_with(|| a.player_id.cmp(&b.player_id))
        });
        participants
    }
}

impl MirrorStore for InMemoryMirrorStore {
    fn upsert_lobby(&self, lobby: LobbyEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.upsert_lobby_now(lobby);
            Ok(())
        })
    }

    fn upsert_participant(
        &self,
        participant: ParticipantEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.upsert_participant_now(participant);
            Ok(())
        })
    }

    fn delete_lobby(&self, lobby_id: String) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.delete_lobby_now(&lobby_id);
            Ok(())
        })
    }

    fn delete_participant(
        &self,
        lobby_id: String,
        player_id: String,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.participants.remove(&(lobby_id, player_id));
            Ok(())
        })
    }

    fn find_lobby(
        &self,
        lobby_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<LobbyEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .lobbies
                .get(&lobby_id)
                .map(|entry| entry.value().clone()))
        })
    }

    fn list_participants(
        &self,
        lobby_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.list_participants_now(&lobby_id)) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}
