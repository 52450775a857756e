use std::time::SystemTime;

use serde::Serialize;
use tracing::warn;

use crate::{
    dto::{
        format_system_time,
        maintenance::{MaintenanceCountEvent, MaintenanceStatusEvent},
        scoreboard::ScoreboardSnapshot,
        session::SessionSnapshot,
        sse::{IdentityChangedEvent, MarkerClearedEvent, ServedEvent, ServerEvent, SystemStatus},
    },
    identity::IdentityEvent,
    state::{SharedState, SseHub, play_field::ServeOutcome},
};

const EVENT_SCOREBOARD: &str = "scoreboard";
const EVENT_SYSTEM_STATUS: &str = "system_status";
const EVENT_SESSION_STATE: &str = "session.state";
const EVENT_SESSION_SERVED: &str = "session.served";
const EVENT_SESSION_MARKER_CLEARED: &str = "session.marker_cleared";
const EVENT_MAINTENANCE_STATUS: &str = "maintenance.status";
const EVENT_MAINTENANCE_COUNT: &str = "maintenance.count";
const EVENT_IDENTITY_SIGNED_IN: &str = "identity.signed_in";
const EVENT_IDENTITY_SIGNED_OUT: &str = "identity.signed_out";

/// Broadcast the recomputed scoreboard to every player page.
pub fn broadcast_scoreboard(state: &SharedState, snapshot: &ScoreboardSnapshot) {
    send_event(state.public_sse(), EVENT_SCOREBOARD, snapshot);
}

/// Broadcast a degraded-mode flip on both shared streams.
pub fn broadcast_system_status(state: &SharedState, degraded: bool) {
    let payload = SystemStatus { degraded };
    send_event(state.public_sse(), EVENT_SYSTEM_STATUS, &payload);
    send_event(state.admin_sse(), EVENT_SYSTEM_STATUS, &payload);
}

/// Push the current session projection to its own stream.
pub fn broadcast_session_state(hub: &SseHub, snapshot: &SessionSnapshot) {
    send_event(hub, EVENT_SESSION_STATE, snapshot);
}

pub fn broadcast_served(hub: &SseHub, outcome: &ServeOutcome, score: u32) {
    let payload = ServedEvent {
        position: outcome.position,
        food: outcome.food,
        points: outcome.points,
        score,
    };
    send_event(hub, EVENT_SESSION_SERVED, &payload);
}

pub fn broadcast_marker_cleared(hub: &SseHub, outcome: &ServeOutcome) {
    let payload = MarkerClearedEvent {
        position: outcome.position,
    };
    send_event(hub, EVENT_SESSION_MARKER_CLEARED, &payload);
}

/// Running status line of the maintenance console.
pub fn broadcast_maintenance_status(state: &SharedState, message: &str) {
    let payload = MaintenanceStatusEvent {
        message: message.to_owned(),
    };
    send_event(state.admin_sse(), EVENT_MAINTENANCE_STATUS, &payload);
}

/// Live count of remaining user records.
pub fn broadcast_maintenance_count(state: &SharedState, count: usize) {
    let payload = MaintenanceCountEvent { count };
    send_event(state.admin_sse(), EVENT_MAINTENANCE_COUNT, &payload);
}

pub fn broadcast_identity_event(state: &SharedState, event: &IdentityEvent) {
    let at = format_system_time(SystemTime::now());
    let (name, payload) = match event {
        IdentityEvent::SignedIn { id, created } => (
            EVENT_IDENTITY_SIGNED_IN,
            IdentityChangedEvent {
                id: id.clone(),
                created: Some(*created),
                at,
            },
        ),
        IdentityEvent::SignedOut { id } => (
            EVENT_IDENTITY_SIGNED_OUT,
            IdentityChangedEvent {
                id: id.clone(),
                created: None,
                at,
            },
        ),
    };
    send_event(state.admin_sse(), name, &payload);
}

fn send_event(hub: &SseHub, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => hub.broadcast(event),
        Err(err) => warn!(event, error = %err, "failed to serialize SSE payload"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        state::{catalog::FoodItem, play_field::GridPos, test_support::memory_state},
    };

    #[tokio::test]
    async fn maintenance_events_reach_admin_stream_only() {
        let (state, _store) = memory_state(AppConfig::default()).await;
        let mut admin = state.admin_sse().subscribe();
        let mut public = state.public_sse().subscribe();

        broadcast_maintenance_status(&state, "Removing users...");
        broadcast_maintenance_count(&state, 3);

        let status = admin.recv().await.unwrap();
        assert_eq!(status.event.as_deref(), Some("maintenance.status"));
        assert!(status.data.contains("Removing users..."));
        let count = admin.recv().await.unwrap();
        assert_eq!(count.event.as_deref(), Some("maintenance.count"));
        assert_eq!(count.data, r#"{"count":3}"#);
        assert!(public.try_recv().is_err());
    }

    #[test]
    fn served_event_payload() {
        let hub = SseHub::new(4);
        let mut rx = hub.subscribe();
        let outcome = ServeOutcome {
            position: GridPos::new(2, 0),
            food: FoodItem::Roti,
            points: 5,
        };
        broadcast_served(&hub, &outcome, 15);

        let event = rx.try_recv().unwrap();
        assert_eq!(event.event.as_deref(), Some("session.served"));
        let value: serde_json::Value = serde_json::from_str(&event.data).unwrap();
        assert_eq!(value["points"], 5);
        assert_eq!(value["score"], 15);
        assert_eq!(value["food"], "Roti");
    }
}
