//! Read-only projections of the mirrored lobby records for HTTP pollers.

use std::sync::Arc;

use crate::{
    dao::{mirror_store::MirrorStore, models::LobbyEntity},
    dto::public::{LeaderboardEntry, LeaderboardResponse, LobbyStatusResponse},
    error::ServiceError,
    state::{SharedState, lobby::LobbyError},
};

/// Return the mirrored lobby record with its participants in join order.
pub async fn get_lobby_status(
    state: &SharedState,
    lobby_id: &str,
) -> Result<LobbyStatusResponse, ServiceError> {
    let store = require_mirror_store(state).await?;
    let lobby = find_lobby(store.as_ref(), lobby_id).await?;
    let participants = store.list_participants(lobby_id.to_owned()).await?;
    Ok(LobbyStatusResponse::from_entities(lobby, participants))
}

/// Return the mirrored participants ranked by score, highest first.
///
/// Ties are broken by join time, then by player id.
pub async fn get_leaderboard(
    state: &SharedState,
    lobby_id: &str,
) -> Result<LeaderboardResponse, ServiceError> {
    let store = require_mirror_store(state).await?;
    find_lobby(store.as_ref(), lobby_id).await?;

    let mut participants = store.list_participants(lobby_id.to_owned()).await?;
    participants.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.joined_at.cmp(&b.joined_at))
            .then_with(|| a.player_id.cmp(&b.player_id))
    });

    Ok(LeaderboardResponse {
        leaderboard: participants
            .into_iter()
            .map(LeaderboardEntry::from)
            .collect(),
    })
}

async fn require_mirror_store(state: &SharedState) -> Result<Arc<dyn MirrorStore>, ServiceError> {
    if state.is_degraded().await {
        return Err(ServiceError::Degraded);
    }
    state.mirror_store().await.ok_or(ServiceError::Degraded)
}

async fn find_lobby(store: &dyn MirrorStore, lobby_id: &str) -> Result<LobbyEntity, ServiceError> {
    store
        .find_lobby(lobby_id.to_owned())
        .await?
        .ok_or_else(|| {
            ServiceError::NotFound(LobbyError::LobbyNotFound(lobby_id.to_owned()).to_string())
        })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use uuid::Uuid;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{mirror_store::InMemoryMirrorStore, models::ParticipantEntity},
        state::{
            AppState,
            lobby::{Lobby, LobbyStatus, Participant},
        },
    };

    async fn mirrored_state() -> (SharedState, InMemoryMirrorStore) {
        let state = AppState::new(AppConfig::default());
        let store = InMemoryMirrorStore::new();
        state.set_mirror_store(Arc::new(store.clone())).await;

        let lobby = Lobby::new(
            "q1",
            json!({ "title": "Rivers" }),
            Participant::host("host", "Host", 3, Uuid::new_v4()),
        );
        store.upsert_lobby(LobbyEntity::from(&lobby)).await.unwrap();

        let host = ParticipantEntity::from_participant("q1", lobby.participant("host").unwrap());
        let players = [("ann", 40, 1), ("bob", 40, 2), ("cid", 70, 3)];
        for (player_id, score, offset) in players {
            let mut participant = Participant::new(player_id, player_id, 0, Uuid::new_v4());
            participant.score = score;
            participant.joined_at = host.joined_at + Duration::from_secs(offset);
            store
                .upsert_participant(ParticipantEntity::from_participant("q1", &participant))
                .await
                .unwrap();
        }
        store.upsert_participant(host).await.unwrap();
        (state, store)
    }

    #[tokio::test]
    async fn status_lists_participants_in_join_order() {
        let (state, _store) = mirrored_state().await;
        let status = get_lobby_status(&state, "q1").await.unwrap();

        assert_eq!(status.lobby_id, "q1");
        assert_eq!(status.status, LobbyStatus::Waiting);
        assert_eq!(status.host_id, "host");
        assert_eq!(status.participants, 4);
        let ids: Vec<&str> = status
            .participants_list
            .iter()
            .map(|p| p.id.as_str())
            .collect();
        assert_eq!(ids, vec!["host", "ann", "bob", "cid"]);
        assert!(status.updated_at.is_some());
    }

    #[tokio::test]
    async fn leaderboard_ranks_by_score_then_join_time() {
        let (state, _store) = mirrored_state().await;
        let leaderboard = get_leaderboard(&state, "q1").await.unwrap().leaderboard;
        let ids: Vec<&str> = leaderboard.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["cid", "ann", "bob", "host"]);
        assert!(leaderboard[3].is_host);
        assert_eq!(leaderboard[3].avatar, 3);
    }

    #[tokio::test]
    async fn unknown_lobby_is_not_found() {
        let (state, _store) = mirrored_state().await;
        assert!(matches!(
            get_lobby_status(&state, "missing").await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            get_leaderboard(&state, "missing").await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn degraded_mode_is_reported() {
        let state = AppState::new(AppConfig::default());
        assert!(matches!(
            get_lobby_status(&state, "q1").await,
            Err(ServiceError::Degraded)
        ));

        let (state, _store) = mirrored_state().await;
        state.update_degraded(true).await;
        assert!(matches!(
            get_leaderboard(&state, "q1").await,
            Err(ServiceError::Degraded)
        ));
    }
}
