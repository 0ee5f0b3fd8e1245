use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DriverStatus {
    Available,
    Busy,
    Offline,
}

/// A registered driver. Reachability (a live socket) is not part of the
/// record; the notification channel owns the driver-to-connection map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub mobile: String,
    pub vehicle_number: String,
    pub status: DriverStatus,
    /// Invariant: `true` implies `status == Available`.
    pub is_available: bool,
    /// Candidate ordering key: most recently seen first.
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
