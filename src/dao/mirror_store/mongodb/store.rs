use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Collection, Database, IndexModel,
    bson::{Document, doc},
    options::IndexOptions,
};
use tokio::sync::RwLock;

use super::{
    config::MongoConfig,
    connection,
    error::{MongoDaoError, MongoResult},
    models::{
        LOBBY_COLLECTION_NAME, MongoLobbyDocument, MongoParticipantDocument,
        PARTICIPANT_COLLECTION_NAME, lobby_filter, lobby_update, participant_filter,
        participant_update,
    },
};
use crate::dao::{
    mirror_store::MirrorStore,
    models::{LobbyEntity, ParticipantEntity},
    storage::StorageResult,
};

/// MongoDB-backed mirror: one `lobbies` document per lobby and one
/// `participants` document per `(lobby_id, player_id)`.
#[derive(Clone)]
pub struct MongoMirrorStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    database: RwLock<Database>,
    config: MongoConfig,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = self.database.read().await.clone();
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let database = connection::connect(&self.config).await?;
        *self.database.write().await = database;
        Ok(())
    }
}

impl MongoMirrorStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let database = connection::connect(&config).await?;
        let inner = Arc::new(MongoInner {
            database: RwLock::new(database),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let collection = self.raw_participants().await;
        let index = IndexModel::builder()
            .keys(doc! {"lobby_id": 1, "player_id": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("participant_lobby_idx".to_owned()))
                    .unique(Some(true))
                    .build(),
            )
            .build();

        collection
            .create_index(index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: PARTICIPANT_COLLECTION_NAME,
                index: "lobby_id,player_id",
                source,
            })?;

        Ok(())
    }

    async fn database(&self) -> Database {
        self.inner.database.read().await.clone()
    }

    async fn lobbies(&self) -> Collection<MongoLobbyDocument> {
        self.database().await.collection(LOBBY_COLLECTION_NAME)
    }

    async fn participants(&self) -> Collection<MongoParticipantDocument> {
        self.database().await.collection(PARTICIPANT_COLLECTION_NAME)
    }

    async fn raw_lobbies(&self) -> Collection<Document> {
        self.database().await.collection(LOBBY_COLLECTION_NAME)
    }

    async fn raw_participants(&self) -> Collection<Document> {
        self.database().await.collection(PARTICIPANT_COLLECTION_NAME)
    }

    async fn upsert_lobby(&self, lobby: LobbyEntity) -> MongoResult<()> {
        let update = lobby_update(&lobby).map_err(|source| MongoDaoError::EncodePayload {
            lobby_id: lobby.lobby_id.clone(),
            source,
        })?;

        self.raw_lobbies()
            .await
            .update_one(lobby_filter(&lobby.lobby_id), update)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::UpsertLobby {
                lobby_id: lobby.lobby_id,
                source,
            })?;
        Ok(())
    }

    async fn upsert_participant(&self, participant: ParticipantEntity) -> MongoResult<()> {
        self.raw_participants()
            .await
            .update_one(
                participant_filter(&participant.lobby_id, &participant.player_id),
                participant_update(&participant),
            )
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::UpsertParticipant {
                lobby_id: participant.lobby_id,
                player_id: participant.player_id,
                source,
            })?;
        Ok(())
    }

    async fn delete_lobby(&self, lobby_id: String) -> MongoResult<()> {
        self.raw_participants()
            .await
            .delete_many(doc! { "lobby_id": lobby_id.as_str() })
            .await
            .map_err(|source| MongoDaoError::DeleteLobby {
                lobby_id: lobby_id.clone(),
                source,
            })?;

        self.raw_lobbies()
            .await
            .delete_one(lobby_filter(&lobby_id))
            .await
            .map_err(|source| MongoDaoError::DeleteLobby { lobby_id, source })?;
        Ok(())
    }

    async fn delete_participant(&self, lobby_id: String, player_id: String) -> MongoResult<()> {
        self.raw_participants()
            .await
            .delete_one(participant_filter(&lobby_id, &player_id))
            .await
            .map_err(|source| MongoDaoError::DeleteParticipant {
                lobby_id,
                player_id,
                source,
            })?;
        Ok(())
    }

    async fn find_lobby(&self, lobby_id: String) -> MongoResult<Option<LobbyEntity>> {
        let document = self
            .lobbies()
            .await
            .find_one(lobby_filter(&lobby_id))
            .await
            .map_err(|source| MongoDaoError::LoadLobby {
                lobby_id: lobby_id.clone(),
                source,
            })?;

        let Some(document) = document else {
            return Ok(None);
        };

        let lobby_id = document.lobby_id().to_owned();
        LobbyEntity::try_from(document)
            .map(Some)
            .map_err(|source| MongoDaoError::DecodePayload { lobby_id, source })
    }

    async fn list_participants(&self, lobby_id: String) -> MongoResult<Vec<ParticipantEntity>> {
        let documents: Vec<MongoParticipantDocument> = self
            .participants()
            .await
            .find(doc! { "lobby_id": lobby_id.as_str() })
            .sort(doc! { "joined_at": 1, "player_id": 1 })
            .await
            .map_err(|source| MongoDaoError::ListParticipants {
                lobby_id: lobby_id.clone(),
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListParticipants { lobby_id, source })?;

        Ok(documents.into_iter().map(ParticipantEntity::from).collect())
    }
}

impl MirrorStore for MongoMirrorStore {
    fn upsert_lobby(&self, lobby: LobbyEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.upsert_lobby(lobby).await.map_err(Into::into) })
    }

    fn upsert_participant(
        &self,
        participant: ParticipantEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .upsert_participant(participant)
                .await
                .map_err(Into::into)
        })
    }

    fn delete_lobby(&self, lobby_id: String) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.delete_lobby(lobby_id).await.map_err(Into::into) })
    }

    fn delete_participant(
        &self,
        lobby_id: String,
        player_id: String,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .delete_participant(lobby_id, player_id)
                .await
                .map_err(Into::into)
        })
    }

    fn find_lobby(
        &self,
        lobby_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<LobbyEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_lobby(lobby_id).await.map_err(Into::into) })
    }

    fn list_participants(
        &self,
        lobby_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_participants(lobby_id).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
