pub mod catalog;
pub mod play_field;
pub mod scoreboard;
pub mod session;
mod sse;
pub mod state_machine;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock, broadcast, watch};

use crate::{
    config::AppConfig,
    dao::user_store::{ObservedUserStore, UserChange, UserStore},
    error::ServiceError,
    identity::IdentityProvider,
    state::{scoreboard::Scoreboard, session::SessionHandle},
};

pub use self::sse::SseHub;
pub use self::state_machine::{AbortError, ApplyError, Plan, PlanError, PlanId, Snapshot};
use self::sse::SseState;

pub type SharedState = Arc<AppState>;

const USER_CHANGES_CAPACITY: usize = 256;

/// Central application state: store handle, live sessions, scoreboard mirror and SSE hubs.
pub struct AppState {
    user_store: RwLock<Option<Arc<dyn UserStore>>>,
    user_changes: broadcast::Sender<UserChange>,
    degraded: watch::Sender<bool>,
    identity: Arc<dyn IdentityProvider>,
    sessions: DashMap<String, Arc<SessionHandle>>,
    scoreboard: RwLock<Scoreboard>,
    sse: SseState,
    config: AppConfig,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig, identity: Arc<dyn IdentityProvider>) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        let (changes_tx, _rx) = broadcast::channel(USER_CHANGES_CAPACITY);
        Arc::new(Self {
            user_store: RwLock::new(None),
            user_changes: changes_tx,
            degraded: degraded_tx,
            identity,
            sessions: DashMap::new(),
            scoreboard: RwLock::new(Scoreboard::new()),
            sse: SseState::new(),
            config,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn identity(&self) -> &Arc<dyn IdentityProvider> {
        &self.identity
    }

    /// Obtain a handle to the current user store, if one is installed.
    pub async fn user_store(&self) -> Option<Arc<dyn UserStore>> {
        let guard = self.user_store.read().await;
        guard.as_ref().cloned()
    }

    /// Current user store or [`ServiceError::Degraded`].
    pub async fn require_user_store(&self) -> Result<Arc<dyn UserStore>, ServiceError> {
        self.user_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a backend, wrapped so its writes reach [`AppState::subscribe_user_changes`],
    /// and leave degraded mode.
    pub async fn install_user_store(&self, store: Arc<dyn UserStore>) {
        let observed: Arc<dyn UserStore> =
            Arc::new(ObservedUserStore::new(store, self.user_changes.clone()));
        {
            let mut guard = self.user_store.write().await;
            *guard = Some(observed);
        }
        self.update_degraded(false);
    }

    /// Remove the current user store and enter degraded mode.
    pub async fn clear_user_store(&self) {
        {
            let mut guard = self.user_store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Subscribe to writes performed through the installed store.
    pub fn subscribe_user_changes(&self) -> broadcast::Receiver<UserChange> {
        self.user_changes.subscribe()
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }

    /// Registry of live sessions keyed by their identity.
    pub fn sessions(&self) -> &DashMap<String, Arc<SessionHandle>> {
        &self.sessions
    }

    pub fn session(&self, id: &str) -> Option<Arc<SessionHandle>> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    pub fn scoreboard(&self) -> &RwLock<Scoreboard> {
        &self.scoreboard
    }

    /// Broadcast hub used for the public SSE stream.
    pub fn public_sse(&self) -> &SseHub {
        self.sse.public()
    }

    /// Broadcast hub used for the admin SSE stream.
    pub fn admin_sse(&self) -> &SseHub {
        self.sse.admin()
    }

    /// Token guard that ensures a single admin SSE subscriber at a time.
    pub fn admin_token(&self) -> &Mutex<Option<String>> {
        self.sse.admin_token()
    }
}
