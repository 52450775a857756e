use serde::Serialize;
use utoipa::ToSchema;

use crate::state::{catalog::FoodItem, play_field::GridPos};

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    pub event: Option<String>,
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// First event of every stream.
pub struct Handshake {
    /// Identifier of the SSE stream (`public`, `admin` or `session`).
    pub stream: String,
    pub message: String,
    /// Whether the backend is running without a user store.
    pub degraded: bool,
    /// Admin token returned when the stream is privileged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the backend enters or leaves degraded mode.
pub struct SystemStatus {
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// `session.served` payload.
pub struct ServedEvent {
    pub position: GridPos,
    pub food: FoodItem,
    pub points: u32,
    /// Round score after this serve.
    pub score: u32,
}

#[derive(Debug, Serialize, ToSchema)]
/// `session.marker_cleared` payload.
pub struct MarkerClearedEvent {
    pub position: GridPos,
}

#[derive(Debug, Serialize, ToSchema)]
/// `identity.signed_in` / `identity.signed_out` payload on the admin stream.
pub struct IdentityChangedEvent {
    pub id: String,
    /// True when a brand new anonymous identity was issued.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<bool>,
    pub at: String,
}
