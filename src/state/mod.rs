pub mod connections;
pub mod lobby;
pub mod session_store;

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock, watch};

use crate::{
    config::AppConfig,
    dao::mirror_store::MirrorStore,
    services::{countdown::CountdownScheduler, mirror::MirrorWriter},
};

use self::{connections::ConnectionRegistry, session_store::SessionStore};

pub type SharedState = Arc<AppState>;

/// Central application state: the authoritative lobby table, live connections
/// and the handle on the durable mirror.
pub struct AppState {
    config: AppConfig,
    mirror_store: RwLock<Option<Arc<dyn MirrorStore>>>,
    degraded: watch::Sender<bool>,
    sessions: Mutex<SessionStore>,
    connections: ConnectionRegistry,
    mirror: MirrorWriter,
    countdowns: CountdownScheduler,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// Spawns the mirror write worker, so it must be called inside a Tokio runtime.
    /// The application starts in degraded mode until a mirror store is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new_cyclic(|weak| Self {
            sessions: Mutex::new(SessionStore::new(config.max_participants)),
            config,
            mirror_store: RwLock::new(None),
            degraded: degraded_tx,
            connections: ConnectionRegistry::new(),
            mirror: MirrorWriter::spawn(weak.clone()),
            countdowns: CountdownScheduler::new(),
        })
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The authoritative lobby table. Hold the guard only for synchronous work.
    pub fn sessions(&self) -> &Mutex<SessionStore> {
        &self.sessions
    }

    /// Live WebSocket connections and their lobby bindings.
    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    /// Queue of pending mirror writes.
    pub fn mirror(&self) -> &MirrorWriter {
        &self.mirror
    }

    /// Running lobby countdowns.
    pub fn countdowns(&self) -> &CountdownScheduler {
        &self.countdowns
    }

    /// Obtain a handle to the current mirror store, if one is installed.
    pub async fn mirror_store(&self) -> Option<Arc<dyn MirrorStore>> {
        let guard = self.mirror_store.read().await;
        guard.as_ref().cloned()
    }

    /// Install a new mirror store implementation and leave degraded mode.
    pub async fn set_mirror_store(&self, store: Arc<dyn MirrorStore>) {
        {
            let mut guard = self.mirror_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub async fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }
}
