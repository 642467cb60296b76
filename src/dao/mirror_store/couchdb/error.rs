//! Failures of the CouchDB mirror backend.

use reqwest::{Method, StatusCode};
use thiserror::Error;

/// Result alias for CouchDB mirror operations.
pub type CouchResult<T> = Result<T, CouchDaoError>;

/// Failures that can occur while mirroring into CouchDB.
#[derive(Debug, Error)]
pub enum CouchDaoError {
    /// Required environment variable is missing.
    #[error("missing CouchDB environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    /// The configured base URL cannot address a database.
    #[error("invalid CouchDB base URL `{url}`")]
    InvalidBaseUrl { url: String },
    /// The HTTP client could not be built.
    #[error("failed to build CouchDB client")]
    ClientBuilder {
        #[source]
        source: reqwest::Error,
    },
    /// The request never got a response.
    #[error("CouchDB {method} `{path}` could not be sent")]
    Transport {
        method: Method,
        path: String,
        #[source]
        source: reqwest::Error,
    },
    /// CouchDB answered with a status the mirror does not handle.
    #[error("CouchDB {method} `{path}` answered {status}")]
    UnexpectedStatus {
        method: Method,
        path: String,
        status: StatusCode,
    },
    /// The response body is not the expected JSON.
    #[error("failed to decode CouchDB response for `{path}`")]
    Decode {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    /// A listed document does not match the mirrored record shape.
    #[error("CouchDB document `{path}` is not a mirrored record")]
    Document {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}
