use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    dto::{
        session::FieldSnapshot,
        ws::{PlayInboundMessage, PlayOutboundMessage},
    },
    error::ServiceError,
    services::{
        play_service::{apply_move, apply_serve},
        session_service::publish_state,
    },
    state::{SharedState, session::SessionHandle},
};

/// Handle the keyboard socket of one session: arrow keys move, space serves.
pub async fn handle_socket(state: SharedState, handle: Arc<SessionHandle>, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    info!(session = %handle.id(), "play socket connected");

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                let reply = match PlayInboundMessage::from_json_str(&text) {
                    Ok(PlayInboundMessage::Unknown) => {
                        debug!(session = %handle.id(), payload = %text, "ignoring unknown play message");
                        continue;
                    }
                    Ok(inbound) => match handle_input(&state, &handle, inbound).await {
                        Ok(reply) => reply,
                        Err(err) => PlayOutboundMessage::Error {
                            message: err.to_string(),
                        },
                    },
                    Err(err) => {
                        warn!(session = %handle.id(), error = %err, "failed to parse play message");
                        PlayOutboundMessage::Error {
                            message: "malformed message".into(),
                        }
                    }
                };

                if send_reply(&outbound_tx, &reply).is_err() {
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                warn!(session = %handle.id(), error = %err, "websocket receive error");
                break;
            }
        }
    }

    info!(session = %handle.id(), "play socket disconnected");
    finalize(writer_task, outbound_tx).await;
}

async fn handle_input(
    state: &SharedState,
    handle: &Arc<SessionHandle>,
    inbound: PlayInboundMessage,
) -> Result<PlayOutboundMessage, ServiceError> {
    let mut runtime = handle.runtime().lock().await;
    match inbound {
        PlayInboundMessage::Move { direction } => {
            apply_move(&mut runtime, direction)?;
            publish_state(state, handle, &runtime).await;
        }
        PlayInboundMessage::Serve => {
            apply_serve(state, handle, &mut runtime).await?;
        }
        PlayInboundMessage::Unknown => {}
    }

    Ok(PlayOutboundMessage::Field {
        field: FieldSnapshot::from(&runtime.game.field),
        score: runtime.game.score,
        time_left: runtime.game.time_left,
    })
}

fn send_reply(
    tx: &mpsc::UnboundedSender<Message>,
    reply: &PlayOutboundMessage,
) -> Result<(), mpsc::error::SendError<Message>> {
    match serde_json::to_string(reply) {
        Ok(payload) => tx.send(Message::Text(payload.into())),
        Err(err) => {
            warn!(error = %err, "failed to serialize play reply");
            Ok(())
        }
    }
}

async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
