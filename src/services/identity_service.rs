use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};

use crate::{identity::IdentityEvent, services::sse_events, state::SharedState};

/// Relay sign-in and sign-out notifications from the identity provider to the admin stream.
pub async fn forward_events(state: SharedState) {
    let mut events = state.identity().subscribe();
    loop {
        match events.recv().await {
            Ok(event) => {
                match &event {
                    IdentityEvent::SignedIn { id, created } => {
                        info!(identity = %id, created, "identity signed in")
                    }
                    IdentityEvent::SignedOut { id } => info!(identity = %id, "identity signed out"),
                }
                sse_events::broadcast_identity_event(&state, &event);
            }
            Err(RecvError::Lagged(skipped)) => {
                debug!(skipped, "identity forwarder lagged; dropping events");
            }
            Err(RecvError::Closed) => break,
        }
    }
}
