use tokio::time::{Instant, interval_at};
use tokio_stream::{StreamExt, wrappers::IntervalStream};
use tracing::{debug, info};

use crate::state::SharedState;

/// Periodically drop lobbies whose participants have all been gone for longer than the configured TTL.
pub async fn run(state: SharedState) {
    let period = state.config().reaper_interval;
    let mut ticks = IntervalStream::new(interval_at(Instant::now() + period, period));

    while ticks.next().await.is_some() {
        let removed = sweep(&state, Instant::now()).await;
        if removed > 0 {
            debug!(removed, "abandoned lobby sweep done");
        }
    }
}

/// Remove every lobby abandoned for at least the TTL at `now`, returning how many were dropped.
pub async fn sweep(state: &SharedState, now: Instant) -> usize {
    let ttl = state.config().abandoned_lobby_ttl;
    let mut sessions = state.sessions().lock().await;
    let expired = sessions.remove_abandoned(ttl, now);

    for lobby in &expired {
        state.countdowns().cancel(&lobby.id);
        for connection_id in state.connections().connections_in_lobby(&lobby.id) {
            state.connections().unbind(connection_id);
        }
        state.mirror().delete_lobby(&lobby.id);
        info!(lobby_id = %lobby.id, participants = lobby.len(), "abandoned lobby removed");
    }
    expired.len()
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use serde_json::json;
    use uuid::Uuid;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::mirror_store::{InMemoryMirrorStore, MirrorStore},
        state::{AppState, lobby::Participant},
    };

    #[tokio::test(start_paused = true)]
    async fn abandoned_lobbies_are_dropped_after_ttl() {
        let state = AppState::new(AppConfig {
            abandoned_lobby_ttl: Duration::from_secs(60),
            ..AppConfig::default()
        });
        let store = InMemoryMirrorStore::new();
        state.set_mirror_store(Arc::new(store.clone())).await;

        {
            let mut sessions = state.sessions().lock().await;
            for id in ["gone", "alive"] {
                let lobby = sessions
                    .create_lobby(id, json!({}), Participant::host("host", "Host", 0, Uuid::new_v4()))
                    .unwrap();
                state.mirror().upsert_all(lobby);
            }
            sessions.mark_disconnected("gone", "host").unwrap();
        }

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(sweep(&state, Instant::now()).await, 0);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(sweep(&state, Instant::now()).await, 1);
        state.mirror().flush().await;

        let sessions = state.sessions().lock().await;
        assert!(sessions.get("gone").is_none());
        assert!(sessions.get("alive").is_some());
        assert!(store.find_lobby("gone".into()).await.unwrap().is_none());
        assert!(store.find_lobby("alive".into()).await.unwrap().is_some());
    }
}
