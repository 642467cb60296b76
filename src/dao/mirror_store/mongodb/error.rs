use mongodb::error::Error as MongoError;
use thiserror::Error;

/// Result alias for MongoDB mirror operations.
pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

/// Failures of the MongoDB mirror backend.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    /// Required environment variable is missing.
    #[error("missing MongoDB environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    /// The connection string does not parse.
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    /// The driver rejected the client options.
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    /// The database never answered during startup.
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    /// A periodic health ping failed.
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    /// Creating a required index failed.
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    /// The quiz payload could not be converted for storage.
    #[error("failed to encode quiz payload of lobby `{lobby_id}`")]
    EncodePayload {
        lobby_id: String,
        #[source]
        source: serde_json::Error,
    },
    /// A stored quiz payload is not valid JSON.
    #[error("failed to decode quiz payload of lobby `{lobby_id}`")]
    DecodePayload {
        lobby_id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to upsert lobby `{lobby_id}`")]
    UpsertLobby {
        lobby_id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to upsert participant `{player_id}` of lobby `{lobby_id}`")]
    UpsertParticipant {
        lobby_id: String,
        player_id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to delete lobby `{lobby_id}`")]
    DeleteLobby {
        lobby_id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to delete participant `{player_id}` of lobby `{lobby_id}`")]
    DeleteParticipant {
        lobby_id: String,
        player_id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to load lobby `{lobby_id}`")]
    LoadLobby {
        lobby_id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to list participants of lobby `{lobby_id}`")]
    ListParticipants {
        lobby_id: String,
        #[source]
        source: MongoError,
    },
}
