use mongodb::options::ClientOptions;

use super::{
    connection::ConnectBackoff,
    error::{MongoDaoError, MongoResult},
};

const DEFAULT_DATABASE: &str = "quiz_lobby";

/// Where the MongoDB mirror lives and how hard to try reaching it at startup.
#[derive(Clone)]
pub struct MongoConfig {
    pub options: ClientOptions,
    pub database_name: String,
    /// Retry schedule of the initial ping.
    pub backoff: ConnectBackoff,
}

impl MongoConfig {
    /// Parse `uri`, falling back to the `quiz_lobby` database.
    pub async fn from_uri(uri: &str, db_name: Option<&str>) -> MongoResult<Self> {
        let database_name = db_name.unwrap_or(DEFAULT_DATABASE).to_owned();
        let options =
            ClientOptions::parse(uri)
                .await
                .map_err(|source| MongoDaoError::InvalidUri {
                    uri: uri.to_owned(),
                    source,
                })?;

        Ok(Self {
            options,
            database_name,
            backoff: ConnectBackoff::default(),
        })
    }

    /// Read `MONGO_URI` (required) and `MONGO_DB` (optional).
    pub async fn from_env() -> MongoResult<Self> {
        let uri = std::env::var("MONGO_URI")
            .map_err(|_| MongoDaoError::MissingEnvVar { var: "MONGO_URI" })?;
        let db = std::env::var("MONGO_DB").ok();
        Self::from_uri(&uri, db.as_deref()).await
    }
}
