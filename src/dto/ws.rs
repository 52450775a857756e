use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{dto::session::FieldSnapshot, state::play_field::Direction};

#[derive(Debug, Deserialize, Serialize, ToSchema)]
/// Keyboard input accepted from the play WebSocket.
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlayInboundMessage {
    /// Arrow keys.
    Move { direction: Direction },
    /// Space bar.
    Serve,
    #[serde(other)]
    Unknown,
}

impl PlayInboundMessage {
    pub fn from_json_str(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Reply sent after every processed input.
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlayOutboundMessage {
    Field {
        field: FieldSnapshot,
        score: u32,
        time_left: u32,
    },
    Error {
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_keyboard_messages() {
        assert!(matches!(
            PlayInboundMessage::from_json_str(r#"{"type":"move","direction":"left"}"#).unwrap(),
            PlayInboundMessage::Move {
                direction: Direction::Left
            }
        ));
        assert!(matches!(
            PlayInboundMessage::from_json_str(r#"{"type":"serve"}"#).unwrap(),
            PlayInboundMessage::Serve
        ));
        assert!(matches!(
            PlayInboundMessage::from_json_str(r#"{"type":"jump"}"#).unwrap(),
            PlayInboundMessage::Unknown
        ));
        assert!(PlayInboundMessage::from_json_str("not json").is_err());
    }
}
