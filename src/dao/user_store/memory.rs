use std::{sync::Arc, time::SystemTime};

use futures::future::BoxFuture;
use indexmap::IndexMap;
use tokio::sync::RwLock;

use crate::dao::{
    models::{UserEntity, UserPatch},
    storage::StorageResult,
    user_store::UserStore,
};

/// Process-local store keeping records in insertion order.
///
/// Used when no database backend is configured and by the service tests.
#[derive(Clone, Default)]
pub struct MemoryUserStore {
    users: Arc<RwLock<IndexMap<String, UserEntity>>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UserStore for MemoryUserStore {
    fn find_user(&self, id: String) -> BoxFuture<'static, StorageResult<Option<UserEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.users.read().await.get(&id).cloned()) })
    }

    fn save_user(&self, user: UserEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.users.write().await.insert(user.id.clone(), user);
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
            let mut users = store.users.write().await;
            let user = users
                .entry(id.clone())
                .or_insert_with(|| UserEntity::new_anonymous(id));
            user.apply(patch, SystemTime::now());
            Ok(user.clone())
        })
    }

    fn delete_user(&self, id: String) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.users.write().await.shift_remove(&id).is_some()) })
    }

    fn list_users(&self) -> BoxFuture<'static, StorageResult<Vec<UserEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.users.read().await.values().cloned().collect()) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn update_creates_missing_record() {
        let store = MemoryUserStore::new();
        let user = store
            .update_user("ghost".into(), UserPatch::touch())
            .await
            .unwrap();

        assert_eq!(user.id, "ghost");
        assert!(user.is_anonymous);
        assert_eq!(user.display_name, "");
        assert!(user.last_active.is_some());
        assert_eq!(store.list_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn list_keeps_insertion_order_after_delete() {
        let store = MemoryUserStore::new();
        for id in ["a", "b", "c"] {
            store.save_user(UserEntity::new_anonymous(id)).await.unwrap();
        }
        assert!(store.delete_user("b".into()).await.unwrap());
        assert!(!store.delete_user("b".into()).await.unwrap());

        let ids: Vec<_> = store
            .list_users()
            .await
            .unwrap()
            .into_iter()
            .map(|user| user.id)
            .collect();
        assert_eq!(ids, ["a", "c"]);
    }
}
