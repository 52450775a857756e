//! Anonymous session identities, the only kind of account the game knows about.

use std::time::SystemTime;

use dashmap::DashMap;
use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

/// Opaque identifier of a player, also used as the key of its user record.
pub type SessionId = String;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

/// Identity changes observed by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityEvent {
    /// `created` is false when an existing identity was presented again.
    SignedIn { id: SessionId, created: bool },
    SignedOut { id: SessionId },
}

/// Source of session identifiers.
pub trait IdentityProvider: Send + Sync {
    /// Resolve a previously issued identifier, if the provider still knows it.
    fn current_identity(&self, presented: &str) -> Option<SessionId>;
    fn create_anonymous_identity(&self) -> BoxFuture<'static, Result<SessionId, IdentityError>>;
    /// Forget an identifier so it can no longer be resumed.
    fn forget(&self, id: &str);
    fn subscribe(&self) -> broadcast::Receiver<IdentityEvent>;
}

/// In-process provider minting random identifiers.
pub struct AnonymousIdentityProvider {
    issued: DashMap<SessionId, SystemTime>,
    events: broadcast::Sender<IdentityEvent>,
}

impl AnonymousIdentityProvider {
    pub fn new() -> Self {
        let (events, _rx) = broadcast::channel(32);
        Self {
            issued: DashMap::new(),
            events,
        }
    }

    fn publish(&self, event: IdentityEvent) {
        let _ = self.events.send(event);
    }
}

impl Default for AnonymousIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityProvider for AnonymousIdentityProvider {
    fn current_identity(&self, presented: &str) -> Option<SessionId> {
        let id = self.issued.get(presented).map(|entry| entry.key().clone())?;
        self.publish(IdentityEvent::SignedIn {
            id: id.clone(),
            created: false,
        });
        Some(id)
    }

    fn create_anonymous_identity(&self) -> BoxFuture<'static, Result<SessionId, IdentityError>> {
        let id = Uuid::new_v4().simple().to_string();
        self.issued.insert(id.clone(), SystemTime::now());
        debug!(identity = %id, "issued anonymous identity");
        self.publish(IdentityEvent::SignedIn {
            id: id.clone(),
            created: true,
        });
        Box::pin(async move { Ok(id) })
    }

    fn forget(&self, id: &str) {
        if self.issued.remove(id).is_some() {
            self.publish(IdentityEvent::SignedOut { id: id.to_owned() });
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<IdentityEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn issued_identity_can_be_resumed_until_forgotten() {
        let provider = AnonymousIdentityProvider::new();
        let mut events = provider.subscribe();

        let id = provider.create_anonymous_identity().await.unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            IdentityEvent::SignedIn {
                id: id.clone(),
                created: true
            }
        );

        assert_eq!(provider.current_identity(&id), Some(id.clone()));
        assert_eq!(provider.current_identity("unknown"), None);

        provider.forget(&id);
        assert_eq!(provider.current_identity(&id), None);
    }

    #[tokio::test]
    async fn identities_are_unique() {
        let provider = AnonymousIdentityProvider::new();
        let a = provider.create_anonymous_identity().await.unwrap();
        let b = provider.create_anonymous_identity().await.unwrap();
        assert_ne!(a, b);
    }
}
