use std::{convert::identity, sync::Arc, time::SystemTime};

use futures::future::BoxFuture;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, from_value};

use crate::dao::{
    mirror_store::MirrorStore,
    models::{LobbyEntity, ParticipantEntity},
    storage::StorageResult,
};

use super::{
    config::{CouchConfig, CouchCredentials},
    error::{CouchDaoError, CouchResult},
    models::{
        AllDocsResponse, CouchLobbyDocument, CouchParticipantDocument, END_SUFFIX, RevisionOnly,
        lobby_doc_id, participant_doc_id, participant_prefix,
    },
};

const ALL_DOCS: &str = "_all_docs";

/// CouchDB-backed mirror. Documents are keyed `lobby::<id>` and
/// `participant::<lobby>::<player>`, with `%` and `:` escaped inside each
/// segment. Writes read the current `_rev` first.
#[derive(Clone)]
pub struct CouchMirrorStore {
    client: Client,
    database_url: Arc<Url>,
    database: Arc<str>,
    credentials: Option<Arc<CouchCredentials>>,
}

impl CouchMirrorStore {
    /// Establish a connection to CouchDB and ensure the database exists.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let store = Self {
            client,
            database_url: Arc::new(config.database_url),
            database: Arc::from(config.database),
            credentials: config.credentials.map(Arc::new),
        };

        store.ensure_database().await?;
        Ok(store)
    }

    /// URL of `segments` below the database, each segment percent-encoded.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = (*self.database_url).clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.extend(segments.iter().copied());
        }
        url
    }

    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        let builder = self.client.request(method, self.url(segments));
        match self.credentials.as_deref() {
            Some(CouchCredentials { username, password }) => {
                builder.basic_auth(username, Some(password))
            }
            None => builder,
        }
    }

    /// Name of the target in error messages: the document path, or the database.
    fn target(&self, segments: &[&str]) -> String {
        match segments {
            [] => self.database.to_string(),
            _ => segments.join("/"),
        }
    }

    async fn send(
        &self,
        method: Method,
        segments: &[&str],
        build: impl FnOnce(RequestBuilder) -> RequestBuilder,
    ) -> CouchResult<Response> {
        build(self.request(method.clone(), segments))
            .send()
            .await
            .map_err(|source| CouchDaoError::Transport {
                method,
                path: self.target(segments),
                source,
            })
    }

    fn unexpected(&self, method: Method, segments: &[&str], status: StatusCode) -> CouchDaoError {
        CouchDaoError::UnexpectedStatus {
            method,
            path: self.target(segments),
            status,
        }
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let response = self.send(Method::GET, &[], identity).await?;
        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let created = self.send(Method::PUT, &[], identity).await?;
                if created.status().is_success() {
                    Ok(())
                } else {
                    Err(self.unexpected(Method::PUT, &[], created.status()))
                }
            }
            other => Err(self.unexpected(Method::GET, &[], other)),
        }
    }

    async fn get_document<T>(&self, doc_id: &str) -> CouchResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let response = self.send(Method::GET, &[doc_id], identity).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                response.json::<T>().await.map(Some).map_err(|source| {
                    CouchDaoError::Decode {
                        path: doc_id.to_owned(),
                        source,
                    }
                })
            }
            other => Err(self.unexpected(Method::GET, &[doc_id], other)),
        }
    }

    async fn current_rev(&self, doc_id: &str) -> CouchResult<Option<String>> {
        Ok(self
            .get_document::<RevisionOnly>(doc_id)
            .await?
            .map(|doc| doc.rev))
    }

    async fn put_document<T>(&self, doc_id: &str, document: &T) -> CouchResult<()>
    where
        T: ?Sized + Serialize,
    {
        let response = self
            .send(Method::PUT, &[doc_id], |request| request.json(document))
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(self.unexpected(Method::PUT, &[doc_id], response.status()))
        }
    }

    /// Delete a document if it exists. Missing documents are not an error.
    async fn delete_document(&self, doc_id: &str) -> CouchResult<()> {
        let Some(rev) = self.current_rev(doc_id).await? else {
            return Ok(());
        };

        let response = self
            .send(Method::DELETE, &[doc_id], |request| {
                request.query(&[("rev", rev)])
            })
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(()),
            status if status.is_success() => Ok(()),
            other => Err(self.unexpected(Method::DELETE, &[doc_id], other)),
        }
    }

    /// Every document whose id starts with `prefix`, in id order.
    async fn list_documents<T>(&self, prefix: &str) -> CouchResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let query = [
            ("include_docs", "true".to_string()),
            ("startkey", Value::from(prefix).to_string()),
            ("endkey", Value::from(format!("{prefix}{END_SUFFIX}")).to_string()),
        ];

        let response = self
            .send(Method::GET, &[ALL_DOCS], |request| request.query(&query))
            .await?;
        if !response.status().is_success() {
            return Err(self.unexpected(Method::GET, &[ALL_DOCS], response.status()));
        }

        let payload =
            response
                .json::<AllDocsResponse>()
                .await
                .map_err(|source| CouchDaoError::Decode {
                    path: ALL_DOCS.to_owned(),
                    source,
                })?;

        let mut documents = Vec::new();
        for row in payload.rows {
            if let Some(doc) = row.doc {
                let parsed = from_value(doc).map_err(|source| CouchDaoError::Document {
                    path: row.id,
                    source,
                })?;
                documents.push(parsed);
            }
        }

        Ok(documents)
    }

    async fn upsert_lobby(&self, mut lobby: LobbyEntity) -> CouchResult<()> {
        let doc_id = lobby_doc_id(&lobby.lobby_id);
        lobby.updated_at = Some(SystemTime::now());
        let rev = self.current_rev(&doc_id).await?;
        let doc = CouchLobbyDocument::from((lobby, rev));
        self.put_document(&doc_id, &doc).await
    }

    async fn upsert_participant(&self, mut participant: ParticipantEntity) -> CouchResult<()> {
        let doc_id = participant_doc_id(&participant.lobby_id, &participant.player_id);
        participant.updated_at = Some(SystemTime::now());
        let rev = self.current_rev(&doc_id).await?;
        let doc = CouchParticipantDocument::from((participant, rev));
        self.put_document(&doc_id, &doc).await
    }

    async fn list_participants(&self, lobby_id: &str) -> CouchResult<Vec<ParticipantEntity>> {
        let mut participants: Vec<ParticipantEntity> = self
            .list_documents::<CouchParticipantDocument>(&participant_prefix(lobby_id))
            .await?
            .into_iter()
            .map(|doc| doc.participant)
            .collect();
        participants.sort_by(|a, b| {
            a.joined_at
                .cmp(&b.joined_at)
                .then_with(|| a.player_id.cmp(&b.player_id))
        });
        Ok(participants)
    }

    async fn delete_lobby(&self, lobby_id: &str) -> CouchResult<()> {
        for participant in self.list_participants(lobby_id).await? {
            self.delete_document(&participant_doc_id(lobby_id, &participant.player_id))
                .await?;
        }
        self.delete_document(&lobby_doc_id(lobby_id)).await
    }
}

impl MirrorStore for CouchMirrorStore {
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
        Box::pin(async move { store.delete_lobby(&lobby_id).await.map_err(Into::into) })
    }

    fn delete_participant(
        &self,
        lobby_id: String,
        player_id: String,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .delete_document(&participant_doc_id(&lobby_id, &player_id))
                .await
                .map_err(Into::into)
        })
    }

    fn find_lobby(
        &self,
        lobby_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<LobbyEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let maybe_doc = store
                .get_document::<CouchLobbyDocument>(&lobby_doc_id(&lobby_id))
                .await?;
            Ok(maybe_doc.map(|doc| doc.lobby))
        })
    }

    fn list_participants(
        &self,
        lobby_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_participants(&lobby_id).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let response = store.send(Method::GET, &[], identity).await?;
            if response.status().is_success() {
                Ok(())
            } else {
                Err(store.unexpected(Method::GET, &[], response.status()).into())
            }
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_database().await.map_err(Into::into) })
    }
}
