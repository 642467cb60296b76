use std::time::Duration;

use dashmap::DashMap;
use tokio::{task::AbortHandle, time::interval};
use tokio_stream::{StreamExt, wrappers::IntervalStream};
use tracing::{debug, info, warn};

use crate::{
    dto::{
        format_system_time,
        lobby::participant_summaries,
        ws::{CountdownTick, QuizStarted, ServerEvent},
    },
    state::{SharedState, lobby::LobbyStatus},
};

/// First value broadcast by a countdown; the last one is always 0.
pub const COUNTDOWN_FROM: u8 = 5;
/// Delay between two countdown ticks.
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Per-lobby countdown tasks that can be cancelled.
#[derive(Debug, Default)]
pub struct CountdownScheduler {
    tasks: DashMap<String, AbortHandle>,
}

impl CountdownScheduler {
    /// Scheduler with no countdown running.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the countdown of `lobby_id`, replacing any countdown already running for it.
    pub fn schedule(&self, state: &SharedState, lobby_id: &str) {
        let handle = tokio::spawn(run_countdown(state.clone(), lobby_id.to_owned()));
        if let Some(previous) = self
            .tasks
            .insert(lobby_id.to_owned(), handle.abort_handle())
        {
            previous.abort();
        }
    }

    /// Stop the countdown of `lobby_id`. Returns whether one was running.
    pub fn cancel(&self, lobby_id: &str) -> bool {
        match self.tasks.remove(lobby_id) {
            Some((_, handle)) => {
                handle.abort();
                debug!(lobby_id, "countdown cancelled");
                true
            }
            None => false,
        }
    }

    /// Whether a countdown is still running for `lobby_id`.
    pub fn is_running(&self, lobby_id: &str) -> bool {
        self.tasks
            .get(lobby_id)
            .is_some_and(|handle| !handle.is_finished())
    }

    fn finished(&self, lobby_id: &str) {
        self.tasks.remove(lobby_id);
    }
}

/// Broadcast `5..=0` one second apart, then flip the lobby to active and
/// broadcast `quiz-started`.
///
/// The lobby is re-checked under the session lock before every emission; the
/// countdown stops silently once the lobby is gone or no longer starting.
pub async fn run_countdown(state: SharedState, lobby_id: String) {
    let mut ticks = IntervalStream::new(interval(TICK_PERIOD));

    for countdown in (0..=COUNTDOWN_FROM).rev() {
        if ticks.next().await.is_none() {
            break;
        }

        let sessions = state.sessions().lock().await;
        let still_starting = sessions
            .get(&lobby_id)
            .is_some_and(|lobby| lobby.status == LobbyStatus::Starting);
        if !still_starting {
            debug!(lobby_id, countdown, "lobby left the starting status; stopping countdown");
            state.countdowns().finished(&lobby_id);
            return;
        }

        state.connections().broadcast(
            &lobby_id,
            &ServerEvent::Countdown(CountdownTick { countdown }),
        );
    }

    let mut sessions = state.sessions().lock().await;
    if let Err(err) = sessions.set_status(&lobby_id, LobbyStatus::Active) {
        warn!(lobby_id, error = %err, "countdown finished but quiz could not start");
        state.countdowns().finished(&lobby_id);
        return;
    }

    if let Some(lobby) = sessions.get(&lobby_id) {
        let event = ServerEvent::QuizStarted(QuizStarted {
            lobby_id: lobby.id.clone(),
            participants: participant_summaries(lobby),
            started_at: lobby
                .started_at
                .map(format_system_time)
                .unwrap_or_default(),
        });
        let delivered = state.connections().broadcast(&lobby_id, &event);
        state.mirror().upsert_lobby(lobby);
        info!(lobby_id, delivered, "quiz started");
    }
    state.countdowns().finished(&lobby_id);
}
