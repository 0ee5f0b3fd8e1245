use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    DriverPending,
    DriverAssigned,
    NoDriverAvailable,
    Ongoing,
    Finished,
    Cancelled,
}

impl BookingStatus {
    /// Terminal bookings never transition further.
    pub fn is_terminal(self) -> bool {
        matches!(self, BookingStatus::Finished | BookingStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Paid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub rider_id: Uuid,
    /// Route/fare snapshot, computed by the routing collaborator at creation
    /// and immutable afterwards.
    pub pickup: String,
    pub dropoff: String,
    pub distance_km: f64,
    pub duration_min: f64,
    pub estimated_fare: f64,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    /// Set whenever status is DriverAssigned/Ongoing/Finished; kept on a
    /// cancelled booking for the audit trail.
    pub assigned_driver: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Creation payload for the booking store.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub rider_id: Uuid,
    pub pickup: String,
    pub dropoff: String,
    pub distance_km: f64,
    pub duration_min: f64,
    pub estimated_fare: f64,
}
