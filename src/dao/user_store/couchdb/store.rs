use std::{convert::identity, sync::Arc, time::SystemTime};

use futures::future::BoxFuture;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::from_value;

use crate::dao::{
    models::{UserEntity, UserPatch},
    storage::StorageResult,
    user_store::UserStore,
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{AllDocsResponse, CouchUserDocument, END_SUFFIX, USER_PREFIX, user_doc_id},
};

/// CouchDB backend storing one document per user under the `user::` prefix.
///
/// Merge updates are a read followed by a revisioned write; a concurrent
/// writer makes the second step fail with a conflict status.
#[derive(Clone)]
pub struct CouchUserStore {
    client: Client,
    base_url: Arc<str>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
}

impl CouchUserStore {
    /// Establish a connection to CouchDB and ensure the database exists.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let base_url = Arc::<str>::from(config.base_url.trim_end_matches('/'));
        let database = Arc::<str>::from(config.database);
        let auth = config
            .username
            .zip(config.password)
            .map(|(u, p)| (Arc::<str>::from(u), Arc::<str>::from(p)));

        let store = Self {
            client,
            base_url,
            database,
            auth,
        };

        store.ensure_database().await?;
        Ok(store)
    }

    fn database_url(&self) -> String {
        format!("{}/{}", self.base_url, self.database)
    }

    /// Send a request to `path` under the database; an empty path targets the database itself.
    async fn send(
        &self,
        method: Method,
        path: &str,
        customize: impl FnOnce(RequestBuilder) -> RequestBuilder,
    ) -> CouchResult<Response> {
        let url = if path.is_empty() {
            self.database_url()
        } else {
            format!("{}/{}", self.database_url(), path)
        };
        let mut builder = self.client.request(method.clone(), url);
        if let Some((user, pass)) = &self.auth {
            builder = builder.basic_auth(user.as_ref(), Some(pass.as_ref()));
        }
        customize(builder)
            .send()
            .await
            .map_err(|source| CouchDaoError::Transport {
                method,
                path: path.to_owned(),
                source,
            })
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let probe = self.send(Method::GET, "", identity).await?;
        match probe.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => {
                let created = self.send(Method::PUT, "", identity).await?;
                match created.status() {
                    status if status.is_success() => Ok(()),
                    other => Err(unexpected(Method::PUT, "", other)),
                }
            }
            other => Err(unexpected(Method::GET, "", other)),
        }
    }

    async fn get_document<T>(&self, doc_id: &str) -> CouchResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let response = self.send(Method::GET, doc_id, identity).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                response.json::<T>().await.map(Some).map_err(|source| {
                    CouchDaoError::DecodeResponse {
                        path: doc_id.to_owned(),
                        source,
                    }
                })
            }
            other => Err(unexpected(Method::GET, doc_id, other)),
        }
    }

    async fn put_document<T>(&self, doc_id: &str, document: &T) -> CouchResult<()>
    where
        T: ?Sized + Serialize,
    {
        let response = self
            .send(Method::PUT, doc_id, |builder| builder.json(document))
            .await?;
        match response.status() {
            status if status.is_success() => Ok(()),
            other => Err(unexpected(Method::PUT, doc_id, other)),
        }
    }

    async fn delete_document(&self, doc_id: &str, rev: &str) -> CouchResult<bool> {
        let response = self
            .send(Method::DELETE, doc_id, |builder| builder.query(&[("rev", rev)]))
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            other => Err(unexpected(Method::DELETE, doc_id, other)),
        }
    }

    /// Every document whose id starts with `prefix`, via `_all_docs`.
    async fn list_documents<T>(&self, prefix: &str) -> CouchResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        const ALL_DOCS: &str = "_all_docs";
        let query = [
            ("include_docs", "true".to_owned()),
            ("startkey", format!("\"{prefix}\"")),
            ("endkey", format!("\"{prefix}{END_SUFFIX}\"")),
        ];

        let response = self
            .send(Method::GET, ALL_DOCS, |builder| builder.query(&query))
            .await?;
        if !response.status().is_success() {
            return Err(unexpected(Method::GET, ALL_DOCS, response.status()));
        }

        let payload = response.json::<AllDocsResponse>().await.map_err(|source| {
            CouchDaoError::DecodeResponse {
                path: ALL_DOCS.to_owned(),
                source,
            }
        })?;

        payload
            .rows
            .into_iter()
            .filter_map(|row| row.doc)
            .map(|doc| {
                from_value(doc).map_err(|source| CouchDaoError::DeserializeValue {
                    path: ALL_DOCS.to_owned(),
                    source,
                })
            })
            .collect()
    }

    async fn upsert(&self, user: UserEntity) -> CouchResult<()> {
        let doc_id = user_doc_id(&user.id);
        let rev = self
            .get_document::<CouchUserDocument>(&doc_id)
            .await?
            .and_then(|existing| existing.rev);
        let doc = CouchUserDocument::from((user, rev));
        self.put_document(&doc_id, &doc).await
    }

    async fn merge(&self, id: String, patch: UserPatch) -> CouchResult<UserEntity> {
        let doc_id = user_doc_id(&id);
        let (mut user, rev) = match self.get_document::<CouchUserDocument>(&doc_id).await? {
            Some(existing) => {
                let rev = existing.rev.clone();
                (UserEntity::try_from(existing)?, rev)
            }
            None => (UserEntity::new_anonymous(id), None),
        };

        user.apply(patch, SystemTime::now());
        let doc = CouchUserDocument::from((user.clone(), rev));
        self.put_document(&doc_id, &doc).await?;
        Ok(user)
    }

    async fn remove(&self, id: String) -> CouchResult<bool> {
        let doc_id = user_doc_id(&id);
        let Some(existing) = self.get_document::<CouchUserDocument>(&doc_id).await? else {
            return Ok(false);
        };
        let Some(rev) = existing.rev else {
            return Ok(false);
        };
        self.delete_document(&doc_id, &rev).await
    }
}

fn unexpected(method: Method, path: &str, status: StatusCode) -> CouchDaoError {
    CouchDaoError::UnexpectedStatus {
        method,
        path: path.to_owned(),
        status,
    }
}

impl UserStore for CouchUserStore {
    fn find_user(&self, id: String) -> BoxFuture<'static, StorageResult<Option<UserEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let maybe_doc = store
                .get_document::<CouchUserDocument>(&user_doc_id(&id))
                .await?;
            let user = maybe_doc.map(UserEntity::try_from).transpose()?;
            Ok(user)
        })
    }

    fn save_user(&self, user: UserEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.upsert(user).await.map_err(Into::into) })
    }

    fn update_user(
        &self,
        id: String,
        patch: UserPatch,
    ) -> BoxFuture<'static, StorageResult<UserEntity>> {
        let store = self.clone();
        Box::pin(async move { store.merge(id, patch).await.map_err(Into::into) })
    }

    fn delete_user(&self, id: String) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.remove(id).await.map_err(Into::into) })
    }

    fn list_users(&self) -> BoxFuture<'static, StorageResult<Vec<UserEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let docs = store
                .list_documents::<CouchUserDocument>(USER_PREFIX)
                .await?;
            let users = docs
                .into_iter()
                .map(UserEntity::try_from)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(users)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let response = store.send(Method::GET, "", identity).await?;
            match response.status() {
                status if status.is_success() => Ok(()),
                other => Err(unexpected(Method::GET, "", other).into()),
            }
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_database().await.map_err(Into::into) })
    }
}
