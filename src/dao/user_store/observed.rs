use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::broadcast;

use crate::dao::{
    models::{UserEntity, UserPatch},
    storage::StorageResult,
    user_store::UserStore,
};

/// Change notification emitted after a successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserChange {
    Upserted(UserEntity),
    Removed(String),
}

/// Decorator publishing every successful write of the wrapped store on a broadcast channel.
#[derive(Clone)]
pub struct ObservedUserStore {
    inner: Arc<dyn UserStore>,
    changes: broadcast::Sender<UserChange>,
}

impl ObservedUserStore {
    pub fn new(inner: Arc<dyn UserStore>, changes: broadcast::Sender<UserChange>) -> Self {
        Self { inner, changes }
    }

    fn publish(&self, change: UserChange) {
        let _ = self.changes.send(change);
    }
}

impl UserStore for ObservedUserStore {
    fn find_user(&self, id: String) -> BoxFuture<'static, StorageResult<Option<UserEntity>>> {
        self.inner.find_user(id)
    }

    fn save_user(&self, user: UserEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.inner.save_user(user.clone()).await?;
            store.publish(UserChange::Upserted(user));
            Ok(())
        })
    }

    fn update_user(
        &self,
        id: String,
        patch: UserPatch,
    ) -> BoxFuture<'static, StorageResult<UserEntity>> {
        let store = self.clone();
        Box::pin(async move {
            let user = store.inner.update_user(id, patch).await?;
            store.publish(UserChange::Upserted(user.clone()));
            Ok(user)
        })
    }

    fn delete_user(&self, id: String) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            let removed = store.inner.delete_user(id.clone()).await?;
            if removed {
                store.publish(UserChange::Removed(id));
            }
            Ok(removed)
        })
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::user_store::MemoryUserStore;

    #[tokio::test]
    async fn writes_are_published() {
        let (tx, mut rx) = broadcast::channel(8);
        let store = ObservedUserStore::new(Arc::new(MemoryUserStore::new()), tx);

        store
            .update_user("a".into(), UserPatch::touch())
            .await
            .unwrap();
        match rx.recv().await.unwrap() {
            UserChange::Upserted(user) => assert_eq!(user.id, "a"),
            other => panic!("unexpected change: {other:?}"),
        }

        assert!(!store.delete_user("missing".into()).await.unwrap());
        assert!(store.delete_user("a".into()).await.unwrap());
        assert_eq!(rx.recv().await.unwrap(), UserChange::Removed("a".into()));
        assert!(rx.try_recv().is_err());
    }
}
