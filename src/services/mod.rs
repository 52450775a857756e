/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Relays identity provider notifications to the admin stream.
pub mod identity_service;
/// Bulk user removal and the periodic janitor.
pub mod maintenance_service;
/// Player movement, serving and the play timers.
pub mod play_service;
/// In-memory scoreboard kept in line with the user store.
pub mod scoreboard_service;
/// Game flow operations of a player session.
pub mod session_service;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// User store connection supervisor and degraded mode handling.
pub mod storage_supervisor;
/// Keyboard WebSocket of a playing session.
pub mod websocket_service;
