use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct UserCountResponse {
    pub count: usize,
}

/// Outcome of a bulk deletion run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct MaintenanceReport {
    /// Final status message, as shown on the console.
    pub status: String,
    pub removed: usize,
    /// Records whose deletion failed; the run went on without them.
    pub failed: usize,
    /// Records left in the store after the run, when it could be counted.
    pub remaining: Option<usize>,
}

/// `maintenance.status` SSE payload.
#[derive(Debug, Serialize, ToSchema)]
pub struct MaintenanceStatusEvent {
    pub message: String,
}

/// `maintenance.count` SSE payload.
#[derive(Debug, Serialize, ToSchema)]
pub struct MaintenanceCountEvent {
    pub count: usize,
}
