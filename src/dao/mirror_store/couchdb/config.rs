use reqwest::Url;

use super::error::{CouchDaoError, CouchResult};

const DEFAULT_DATABASE: &str = "quiz_lobby";

/// Basic-auth credentials sent with every CouchDB request.
#[derive(Debug, Clone)]
pub struct CouchCredentials {
    pub username: String,
    pub password: String,
}

/// Where the CouchDB mirror lives.
#[derive(Debug, Clone)]
pub struct CouchConfig {
    /// URL of the mirror database itself, e.g. `http://couch:5984/quiz_lobby`.
    pub database_url: Url,
    /// Database name, kept for error messages.
    pub database: String,
    pub credentials: Option<CouchCredentials>,
}

impl CouchConfig {
    /// Resolve `database` below `base_url`. Fails when the URL cannot carry a path.
    pub fn new(base_url: &str, database: impl Into<String>) -> CouchResult<Self> {
        let database = database.into();
        let invalid = || CouchDaoError::InvalidBaseUrl {
            url: base_url.to_owned(),
        };

        let mut database_url = Url::parse(base_url).map_err(|_| invalid())?;
        database_url
            .path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .push(&database);

        Ok(Self {
            database_url,
            database,
            credentials: None,
        })
    }

    /// Attach basic-auth credentials.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some(CouchCredentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    /// Read `COUCH_BASE_URL` (required), `COUCH_DB` and the optional
    /// `COUCH_USERNAME`/`COUCH_PASSWORD` pair.
    pub fn from_env() -> CouchResult<Self> {
        let base_url = std::env::var("COUCH_BASE_URL").map_err(|_| {
            CouchDaoError::MissingEnvVar {
                var: "COUCH_BASE_URL",
            }
        })?;
        let database = std::env::var("COUCH_DB").unwrap_or_else(|_| DEFAULT_DATABASE.to_owned());
        let config = Self::new(&base_url, database)?;

        match (
            std::env::var("COUCH_USERNAME").ok(),
            std::env::var("COUCH_PASSWORD").ok(),
        ) {
            (Some(username), Some(password)) => Ok(config.with_credentials(username, password)),
            _ => Ok(config),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_is_appended_to_the_base_path() {
        let config = CouchConfig::new("http://couch:5984/", "quiz_lobby").unwrap();
        assert_eq!(config.database_url.as_str(), "http://couch:5984/quiz_lobby");

        let nested = CouchConfig::new("http://proxy/couch", "mirror").unwrap();
        assert_eq!(nested.database_url.as_str(), "http://proxy/couch/mirror");
    }

    #[test]
    fn base_url_must_carry_a_path() {
        assert!(matches!(
            CouchConfig::new("mailto:admin@example.com", "quiz_lobby"),
            Err(CouchDaoError::InvalidBaseUrl { .. })
        ));
        assert!(matches!(
            CouchConfig::new("not a url", "quiz_lobby"),
            Err(CouchDaoError::InvalidBaseUrl { .. })
        ));
    }
}
