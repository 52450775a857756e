#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;
mod observed;

pub use self::memory::MemoryUserStore;
pub use self::observed::{ObservedUserStore, UserChange};

use crate::dao::models::{UserEntity, UserPatch};
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;

/// Abstraction over the remote collection of user records.
pub trait UserStore: Send + Sync {
    fn find_user(&self, id: String) -> BoxFuture<'static, StorageResult<Option<UserEntity>>>;
    /// Overwrite the record stored under `user.id`.
    fn save_user(&self, user: UserEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Shallow-merge `patch` into the record, creating it when absent, and return the result.
    fn update_user(
        &self,
        id: String,
        patch: UserPatch,
    ) -> BoxFuture<'static, StorageResult<UserEntity>>;
    /// Returns whether a record was actually removed.
    fn delete_user(&self, id: String) -> BoxFuture<'static, StorageResult<bool>>;
    /// Every record, in store order.
    fn list_users(&self) -> BoxFuture<'static, StorageResult<Vec<UserEntity>>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
