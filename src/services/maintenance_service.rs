use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use futures::{StreamExt, stream};
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::{
    config::MaintenanceSettings,
    dao::{models::UserEntity, user_store::UserStore},
    dto::maintenance::MaintenanceReport,
    error::ServiceError,
    services::sse_events,
    state::{SharedState, session::SessionHandle},
};

/// Deletions running at the same time during a bulk removal.
const DELETE_CONCURRENCY: usize = 8;

/// Rule deciding which user records count as inactive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InactivityPolicy {
    /// Records idle for strictly longer than this are expired.
    pub threshold: Duration,
    pub anonymous_only: bool,
}

impl InactivityPolicy {
    /// Policy of the console's "remove inactive users" action: every user, one hour by default.
    pub fn console(settings: &MaintenanceSettings) -> Self {
        Self {
            threshold: settings.console_inactivity,
            anonymous_only: false,
        }
    }

    /// Policy of the janitor: anonymous users only, one day by default.
    pub fn anonymous_sweep(settings: &MaintenanceSettings) -> Self {
        Self {
            threshold: settings.anonymous_sweep_inactivity,
            anonymous_only: true,
        }
    }

    /// Records without `lastActive`, or with one in the future, never expire.
    pub fn is_expired(&self, user: &UserEntity, now: SystemTime) -> bool {
        if self.anonymous_only && !user.is_anonymous {
            return false;
        }
        let Some(last_active) = user.last_active else {
            return false;
        };
        match now.duration_since(last_active) {
            Ok(age) => age > self.threshold,
            Err(_) => false,
        }
    }
}

/// Count the stored user records and push the figure to the console.
pub async fn user_count(state: &SharedState) -> Result<usize, ServiceError> {
    let store = state.require_user_store().await?;
    let count = store.list_users().await?.len();
    sse_events::broadcast_maintenance_count(state, count);
    Ok(count)
}

/// Delete every user record. Individual failures are counted and the run goes on.
pub async fn remove_all_users(state: &SharedState) -> Result<MaintenanceReport, ServiceError> {
    let store = state.require_user_store().await?;
    announce(state, "Starting removal of all users...");

    let users = match store.list_users().await {
        Ok(users) => users,
        Err(err) => {
            warn!(error = %err, "failed to list users for removal");
            return Ok(finish(state, "Error fetching users. Check logs for details.", 0, 0, None));
        }
    };
    if users.is_empty() {
        return Ok(finish(state, "No users found in the database.", 0, 0, Some(0)));
    }

    let ids = users.into_iter().map(|user| user.id).collect();
    let (removed, failed) = delete_all(state, &store, ids).await;
    let remaining = remaining_count(&store).await;
    let status = completion_message("Removal complete.", removed, failed);
    info!(removed, failed, "bulk user removal finished");
    Ok(finish(state, &status, removed, failed, remaining))
}

/// Delete the records the console policy considers inactive and leave the others alone.
pub async fn remove_inactive_users(state: &SharedState) -> Result<MaintenanceReport, ServiceError> {
    let store = state.require_user_store().await?;
    announce(state, "Starting removal of inactive users...");

    let users = match store.list_users().await {
        Ok(users) => users,
        Err(err) => {
            warn!(error = %err, "failed to list users for inactive removal");
            return Ok(finish(state, "Error fetching users. Check logs for details.", 0, 0, None));
        }
    };
    if users.is_empty() {
        return Ok(finish(state, "No users found in the database.", 0, 0, Some(0)));
    }

    let policy = InactivityPolicy::console(&state.config().maintenance);
    let expired = expired_ids(&policy, users, SystemTime::now());
    let (removed, failed) = delete_all(state, &store, expired).await;
    let remaining = remaining_count(&store).await;
    let status = completion_message("Inactive user cleanup complete.", removed, failed);
    info!(removed, failed, "inactive user removal finished");
    Ok(finish(state, &status, removed, failed, remaining))
}

/// Periodically sweep stale anonymous records and idle in-memory sessions.
pub async fn run_janitor(state: SharedState) {
    let period = state.config().maintenance.janitor_interval;
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // skip the immediate first tick
    ticker.tick().await;

    loop {
        ticker.tick().await;
        evict_idle_sessions(&state).await;
        match sweep_anonymous_users(&state).await {
            Ok(removed) if removed > 0 => info!(removed, "janitor swept anonymous users"),
            Ok(_) => debug!("janitor found nothing to sweep"),
            Err(err) => debug!(error = %err, "janitor sweep skipped"),
        }
    }
}

/// Delete anonymous records past the sweep threshold and forget their identities.
pub async fn sweep_anonymous_users(state: &SharedState) -> Result<usize, ServiceError> {
    let store = state.require_user_store().await?;
    let users = store.list_users().await?;
    let policy = InactivityPolicy::anonymous_sweep(&state.config().maintenance);

    let mut removed = 0;
    for id in expired_ids(&policy, users, SystemTime::now()) {
        match store.delete_user(id.clone()).await {
            Ok(_) => {
                state.identity().forget(&id);
                removed += 1;
            }
            Err(err) => warn!(user = %id, error = %err, "janitor failed to delete user"),
        }
    }
    Ok(removed)
}

/// Drop sessions with no client request for longer than the sweep threshold.
pub async fn evict_idle_sessions(state: &SharedState) -> usize {
    let threshold = state.config().maintenance.anonymous_sweep_inactivity;
    let handles: Vec<Arc<SessionHandle>> = state
        .sessions()
        .iter()
        .map(|entry| entry.value().clone())
        .collect();

    let mut evicted = 0;
    for handle in handles {
        let mut runtime = handle.runtime().lock().await;
        if Instant::now().duration_since(runtime.last_seen) <= threshold {
            continue;
        }
        runtime.stop_tasks();
        state.sessions().remove(handle.id());
        evicted += 1;
        info!(session = %handle.id(), "evicted idle session");
    }
    evicted
}

fn expired_ids(policy: &InactivityPolicy, users: Vec<UserEntity>, now: SystemTime) -> Vec<String> {
    users
        .into_iter()
        .filter(|user| policy.is_expired(user, now))
        .map(|user| user.id)
        .collect()
}

/// Delete `ids` concurrently, pushing the live remaining count after each success.
async fn delete_all(
    state: &SharedState,
    store: &Arc<dyn UserStore>,
    ids: Vec<String>,
) -> (usize, usize) {
    let total = store.list_users().await.map(|users| users.len()).ok();
    let mut deletions = stream::iter(ids)
        .map(|id| {
            let store = store.clone();
            async move {
                let result = store.delete_user(id.clone()).await;
                (id, result)
            }
        })
        .buffer_unordered(DELETE_CONCURRENCY);

    let (mut removed, mut failed) = (0, 0);
    while let Some((id, result)) = deletions.next().await {
        match result {
            Ok(_) => {
                removed += 1;
                debug!(user = %id, "removed user");
                if let Some(total) = total {
                    sse_events::broadcast_maintenance_count(state, total.saturating_sub(removed));
                }
            }
            Err(err) => {
                failed += 1;
                warn!(user = %id, error = %err, "failed to remove user");
            }
        }
    }
    (removed, failed)
}

async fn remaining_count(store: &Arc<dyn UserStore>) -> Option<usize> {
    match store.list_users().await {
        Ok(users) => Some(users.len()),
        Err(err) => {
            warn!(error = %err, "failed to count remaining users");
            None
        }
    }
}

fn completion_message(prefix: &str, removed: usize, failed: usize) -> String {
    if failed == 0 {
        format!("{prefix} Removed {removed} users.")
    } else {
        format!("{prefix} Removed {removed} users, {failed} could not be removed.")
    }
}

fn announce(state: &SharedState, message: &str) {
    info!(status = message, "maintenance");
    sse_events::broadcast_maintenance_status(state, message);
}

fn finish(
    state: &SharedState,
    status: &str,
    removed: usize,
    failed: usize,
    remaining: Option<usize>,
) -> MaintenanceReport {
    announce(state, status);
    if let Some(count) = remaining {
        sse_events::broadcast_maintenance_count(state, count);
    }
    MaintenanceReport {
        status: status.to_owned(),
        removed,
        failed,
        remaining,
    }
}

#[cfg(test)]
mod tests {
    use futures::future::BoxFuture;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            models::UserPatch,
            storage::{StorageError, StorageResult},
            user_store::MemoryUserStore,
        },
        identity::AnonymousIdentityProvider,
        services::session_service,
        state::{AppState, test_support::memory_state},
    };

    const HOUR: Duration = Duration::from_secs(60 * 60);

    fn user_active(id: &str, ago: Option<Duration>, now: SystemTime) -> UserEntity {
        let mut user = UserEntity::new_anonymous(id);
        user.last_active = ago.map(|ago| now - ago);
        user
    }

    /// Memory store whose deletions fail for one id.
    #[derive(Clone)]
    struct StubbornStore {
        inner: MemoryUserStore,
        stuck: String,
    }

    impl UserStore for StubbornStore {
        fn find_user(&self, id: String) -> BoxFuture<'static, StorageResult<Option<UserEntity>>> {
            self.inner.find_user(id)
        }

        fn save_user(&self, user: UserEntity) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.save_user(user)
        }

        fn update_user(
            &self,
            id: String,
            patch: UserPatch,
        ) -> BoxFuture<'static, StorageResult<UserEntity>> {
            self.inner.update_user(id, patch)
        }

        fn delete_user(&self, id: String) -> BoxFuture<'static, StorageResult<bool>> {
            if id == self.stuck {
                Box::pin(async { Err(StorageError::simulated("delete")) })
            } else {
                self.inner.delete_user(id)
            }
        }

        fn list_users(&self) -> BoxFuture<'static, StorageResult<Vec<UserEntity>>> {
            self.inner.list_users()
        }

        fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.health_check()
        }

        fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.try_reconnect()
        }
    }

    #[test]
    fn console_policy_uses_a_strict_threshold() {
        let now = SystemTime::now();
        let policy = InactivityPolicy::console(&MaintenanceSettings::default());

        assert!(policy.is_expired(&user_active("a", Some(2 * HOUR), now), now));
        assert!(!policy.is_expired(&user_active("b", Some(HOUR), now), now));
        assert!(!policy.is_expired(&user_active("c", Some(HOUR / 2), now), now));
        assert!(!policy.is_expired(&user_active("d", None, now), now));

        let mut future = UserEntity::new_anonymous("e");
        future.last_active = Some(now + HOUR);
        assert!(!policy.is_expired(&future, now));
    }

    #[test]
    fn sweep_policy_only_targets_anonymous_users() {
        let now = SystemTime::now();
        let policy = InactivityPolicy::anonymous_sweep(&MaintenanceSettings::default());

        let stale = user_active("a", Some(25 * HOUR), now);
        assert!(policy.is_expired(&stale, now));

        let mut registered = user_active("b", Some(25 * HOUR), now);
        registered.is_anonymous = false;
        assert!(!policy.is_expired(&registered, now));

        assert!(!policy.is_expired(&user_active("c", Some(2 * HOUR), now), now));
    }

    #[tokio::test]
    async fn inactive_removal_leaves_recent_users() {
        let (state, store) = memory_state(AppConfig::default()).await;
        let now = SystemTime::now();
        store
            .save_user(user_active("old", Some(2 * HOUR), now))
            .await
            .unwrap();
        store
            .save_user(user_active("fresh", Some(HOUR / 4), now))
            .await
            .unwrap();
        store.save_user(user_active("never", None, now)).await.unwrap();

        let report = remove_inactive_users(&state).await.unwrap();
        assert_eq!(report.removed, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(report.remaining, Some(2));
        assert_eq!(
            report.status,
            "Inactive user cleanup complete. Removed 1 users."
        );
        assert!(store.find_user("old".into()).await.unwrap().is_none());
        assert!(store.find_user("fresh".into()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn remove_all_reports_progress_on_the_admin_stream() {
        let (state, store) = memory_state(AppConfig::default()).await;
        let now = SystemTime::now();
        for id in ["a", "b", "c"] {
            store.save_user(user_active(id, None, now)).await.unwrap();
        }
        let mut admin = state.admin_sse().subscribe();

        let report = remove_all_users(&state).await.unwrap();
        assert_eq!(report.removed, 3);
        assert_eq!(report.remaining, Some(0));
        assert_eq!(user_count(&state).await.unwrap(), 0);

        let first = admin.recv().await.unwrap();
        assert_eq!(first.event.as_deref(), Some("maintenance.status"));
        assert!(first.data.contains("Starting removal of all users..."));
        let mut counts = Vec::new();
        while let Ok(event) = admin.try_recv() {
            if event.event.as_deref() == Some("maintenance.count") {
                counts.push(event.data);
            }
        }
        assert_eq!(counts.first().map(String::as_str), Some(r#"{"count":2}"#));
        assert_eq!(counts.last().map(String::as_str), Some(r#"{"count":0}"#));
    }

    #[tokio::test]
    async fn empty_store_reports_no_users() {
        let (state, _store) = memory_state(AppConfig::default()).await;
        let report = remove_all_users(&state).await.unwrap();
        assert_eq!(report.status, "No users found in the database.");
        assert_eq!(report.removed, 0);
    }

    #[tokio::test]
    async fn failed_deletions_are_counted_and_skipped() {
        let state = AppState::new(
            AppConfig::default(),
            Arc::new(AnonymousIdentityProvider::new()),
        );
        let inner = MemoryUserStore::new();
        let now = SystemTime::now();
        for id in ["a", "b", "c"] {
            inner.save_user(user_active(id, None, now)).await.unwrap();
        }
        state
            .install_user_store(Arc::new(StubbornStore {
                inner: inner.clone(),
                stuck: "b".into(),
            }))
            .await;

        let report = remove_all_users(&state).await.unwrap();
        assert_eq!(report.removed, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.remaining, Some(1));
        assert!(report.status.contains("1 could not be removed"));
    }

    #[tokio::test]
    async fn degraded_mode_rejects_maintenance() {
        let (state, _store) = memory_state(AppConfig::default()).await;
        state.clear_user_store().await;
        assert!(matches!(
            remove_all_users(&state).await,
            Err(ServiceError::Degraded)
        ));
    }

    #[tokio::test]
    async fn sweep_forgets_stale_anonymous_identities() {
        let (state, store) = memory_state(AppConfig::default()).await;
        let id = session_service::start_session(&state, None).await.unwrap().id;
        session_service::end_session(&state, &id).await.unwrap();
        store
            .save_user(user_active(&id, Some(25 * HOUR), SystemTime::now()))
            .await
            .unwrap();

        assert_eq!(sweep_anonymous_users(&state).await.unwrap(), 1);
        assert!(store.find_user(id.clone()).await.unwrap().is_none());
        assert_eq!(state.identity().current_identity(&id), None);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_sessions_are_evicted() {
        let (state, _store) = memory_state(AppConfig::default()).await;
        let id = session_service::start_session(&state, None).await.unwrap().id;

        assert_eq!(evict_idle_sessions(&state).await, 0);
        tokio::time::advance(25 * HOUR).await;
        assert_eq!(evict_idle_sessions(&state).await, 1);
        assert!(state.session(&id).is_none());
    }
}
