//! Application-level configuration loading: lobby limits and housekeeping intervals.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "QUIZ_LOBBY_CONFIG_PATH";

const DEFAULT_MAX_PARTICIPANTS: usize = 50;
const DEFAULT_MIN_PARTICIPANTS_TO_START: usize = 1;
const DEFAULT_ABANDONED_LOBBY_TTL_SECS: u64 = 600;
const DEFAULT_REAPER_INTERVAL_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Capacity of a lobby, disconnected participants included.
    pub max_participants: usize,
    /// Active participants required before the host may start.
    pub min_participants_to_start: usize,
    /// How long a lobby whose participants all disconnected is kept.
    pub abandoned_lobby_ttl: Duration,
    /// Period of the abandoned lobby sweep.
    pub reaper_interval: Duration,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to baked-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        max_participants = app_config.max_participants,
                        min_participants_to_start = app_config.min_participants_to_start,
                        "loaded lobby settings from config"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    max_participants: usize,
    min_participants_to_start: usize,
    abandoned_lobby_ttl_secs: u64,
    reaper_interval_secs: u64,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            max_participants: DEFAULT_MAX_PARTICIPANTS,
            min_participants_to_start: DEFAULT_MIN_PARTICIPANTS_TO_START,
            abandoned_lobby_ttl_secs: DEFAULT_ABANDONED_LOBBY_TTL_SECS,
            reaper_interval_secs: DEFAULT_REAPER_INTERVAL_SECS,
        }
    }
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            max_participants: value.max_participants.max(1),
            min_participants_to_start: value.min_participants_to_start.max(1),
            abandoned_lobby_ttl: Duration::from_secs(value.abandoned_lobby_ttl_secs),
            reaper_interval: Duration::from_secs(value.reaper_interval_secs.max(1)),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
