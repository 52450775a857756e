use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    dto::sse::{Handshake, ServerEvent},
    error::ServiceError,
    services::session_service,
    state::{SharedState, SseHub, session::SessionHandle},
};

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

const EVENT_HANDSHAKE: &str = "handshake";

/// Subscribe to the shared public SSE stream.
pub fn subscribe_public(state: &SharedState) -> broadcast::Receiver<ServerEvent> {
    state.public_sse().subscribe()
}

/// Subscribe to the admin-only SSE stream.
pub async fn subscribe_admin(
    state: &SharedState,
) -> Result<(broadcast::Receiver<ServerEvent>, String), ServiceError> {
    let token = claim_admin_token(state).await?;
    let receiver = state.admin_sse().subscribe();
    Ok((receiver, token))
}

/// Subscribe to the event stream of one live session.
pub fn subscribe_session(
    state: &SharedState,
    id: &str,
) -> Result<(broadcast::Receiver<ServerEvent>, Arc<SessionHandle>), ServiceError> {
    let handle = session_service::lookup(state, id)?;
    let receiver = handle.events().subscribe();
    Ok((receiver, handle))
}

/// Identifies the target SSE stream so we can perform stream-specific
/// bookkeeping when the connection is torn down.
#[derive(Clone)]
pub enum StreamKind {
    Public,
    /// Carries the shared state so teardown can release the admin token.
    Admin(SharedState),
    Session(String),
}

/// Convert a broadcast receiver into an SSE response, forwarding events and
/// cleaning up once the client disconnects.
pub fn to_sse_stream(
    mut receiver: broadcast::Receiver<ServerEvent>,
    kind: StreamKind,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(payload) => {
                            let mut event = Event::default().data(payload.data);
                            if let Some(name) = payload.event {
                                event = event.event(name);
                            }

                            if tx.send(Ok(event)).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(skipped)) => {
                            debug!(skipped, "SSE subscriber lagged; dropping events");
                            continue;
                        }
                    }
                }
            }
        }

        match kind {
            StreamKind::Public => info!("Public SSE stream disconnected"),
            StreamKind::Admin(state) => {
                reset_admin_token(state).await;
                info!("Admin SSE stream disconnected")
            }
            StreamKind::Session(id) => info!(session = %id, "Session SSE stream disconnected"),
        }
    });

    // axum drops this stream when the client disconnects, which closes `tx`
    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    )
}

/// Reserve the admin token for a new stream, generating one when none exists
/// and failing if another connection already holds it.
async fn claim_admin_token(state: &SharedState) -> Result<String, ServiceError> {
    let mut guard = state.admin_token().lock().await;
    match &mut *guard {
        slot @ None => {
            let token = Uuid::new_v4().simple().to_string();
            slot.replace(token.clone());
            Ok(token)
        }
        Some(_) => Err(ServiceError::Unauthorized(
            "Another admin SSE stream is already active".into(),
        )),
    }
}

/// Send the opening handshake of a stream, carrying the admin token when there is one.
pub fn broadcast_handshake(hub: &SseHub, stream: &str, degraded: bool, token: Option<&str>) {
    let handshake = Handshake {
        stream: stream.to_owned(),
        message: format!("{stream} stream connected"),
        degraded,
        token: token.map(str::to_owned),
    };
    if let Ok(event) = ServerEvent::json(Some(EVENT_HANDSHAKE.to_string()), &handshake) {
        hub.broadcast(event);
    }
}

/// Clear any stored admin token so the next admin connection negotiates a
/// fresh credential.
async fn reset_admin_token(state: SharedState) {
    let mut guard = state.admin_token().lock().await;
    guard.take();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::AppConfig, state::test_support::memory_state};

    #[tokio::test]
    async fn only_one_admin_stream_at_a_time() {
        let (state, _store) = memory_state(AppConfig::default()).await;

        let (_rx, token) = subscribe_admin(&state).await.unwrap();
        assert_eq!(token.len(), 32);
        assert!(matches!(
            subscribe_admin(&state).await,
            Err(ServiceError::Unauthorized(_))
        ));

        reset_admin_token(state.clone()).await;
        let (_rx, second) = subscribe_admin(&state).await.unwrap();
        assert_ne!(token, second);
    }

    #[tokio::test]
    async fn unknown_session_stream_is_not_found() {
        let (state, _store) = memory_state(AppConfig::default()).await;
        assert!(matches!(
            subscribe_session(&state, "nope"),
            Err(ServiceError::NotFound(_))
        ));
    }

    #[test]
    fn handshake_carries_token() {
        let hub = SseHub::new(4);
        let mut rx = hub.subscribe();
        broadcast_handshake(&hub, "admin", false, Some("abc"));

        let event = rx.try_recv().unwrap();
        assert_eq!(event.event.as_deref(), Some("handshake"));
        assert!(event.data.contains(r#""token":"abc""#));
    }
}
