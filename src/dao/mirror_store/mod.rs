#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use futures::future::BoxFuture;

use crate::dao::{
    models::{LobbyEntity, ParticipantEntity},
    storage::StorageResult,
};

pub use memory::InMemoryMirrorStore;

/// Durable, best-effort copy of lobby and participant state.
///
/// Upserts merge into any existing record and stamp `updated_at` on the
/// store side. Deleting a lobby also deletes its participants.
pub trait MirrorStore: Send + Sync {
    /// Merge the lobby record, creating it when missing.
    fn upsert_lobby(&self, lobby: LobbyEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Merge one participant record, creating it when missing.
    fn upsert_participant(
        &self,
        participant: ParticipantEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Remove the lobby record and every participant record of the lobby.
    fn delete_lobby(&self, lobby_id: String) -> BoxFuture<'static, StorageResult<()>>;
    /// Remove one participant record. Missing records are not an error.
    fn delete_participant(
        &self,
        lobby_id: String,
        player_id: String,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Load the lobby record, if mirrored.
    fn find_lobby(&self, lobby_id: String)
    -> BoxFuture<'static, StorageResult<Option<LobbyEntity>>>;
    /// Participants of a lobby ordered by join time.
    fn list_participants(
        &self,
        lobby_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantEntity>>>;
    /// Cheap round trip to the backend.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Rebuild the backend connection after a failed health check.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
