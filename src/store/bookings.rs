use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::booking::{Booking, BookingStatus, NewBooking, PaymentStatus};

/// Owns all booking records. Assignment and status are only ever written
/// together (`set_assignment`) so a booking can never reference a driver
/// under a status that forbids one. Bookings are never deleted.
pub struct BookingStore {
    bookings: DashMap<Uuid, Booking>,
}

impl BookingStore {
    pub fn new() -> Self {
        Self {
            bookings: DashMap::new(),
        }
    }

    pub fn create(&self, spec: NewBooking) -> Booking {
        let booking = Booking {
            id: Uuid::new_v4(),
            rider_id: spec.rider_id,
            pickup: spec.pickup,
            dropoff: spec.dropoff,
            distance_km: spec.distance_km,
            duration_min: spec.duration_min,
            estimated_fare: spec.estimated_fare,
            status: BookingStatus::DriverPending,
            payment_status: PaymentStatus::Pending,
            assigned_driver: None,
            created_at: Utc::now(),
        };

        self.bookings.insert(booking.id, booking.clone());
        booking
    }

    pub fn get(&self, id: Uuid) -> Result<Booking, AppError> {
        self.bookings
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("booking {id} not found")))
    }

    pub fn list_by_rider(&self, rider_id: Uuid) -> Vec<Booking> {
        let mut bookings: Vec<Booking> = self
            .bookings
            .iter()
            .filter(|entry| entry.value().rider_id == rider_id)
            .map(|entry| entry.value().clone())
            .collect();

        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        bookings
    }

    pub fn list_all(&self) -> Vec<Booking> {
        let mut bookings: Vec<Booking> = self
            .bookings
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        bookings
    }

    pub fn len(&self) -> usize {
        self.bookings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bookings.is_empty()
    }

    /// Driver reference and status move together under one entry guard.
    pub fn set_assignment(
        &self,
        id: Uuid,
        driver: Option<Uuid>,
        status: BookingStatus,
    ) -> Result<Booking, AppError> {
        let mut booking = self
            .bookings
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("booking {id} not found")))?;

        booking.assigned_driver = driver;
        booking.status = status;
        Ok(booking.clone())
    }

    pub fn set_status(&self, id: Uuid, status: BookingStatus) -> Result<Booking, AppError> {
        let mut booking = self
            .bookings
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("booking {id} not found")))?;

        booking.status = status;
        Ok(booking.clone())
    }

    pub fn set_payment_status(
        &self,
        id: Uuid,
        payment_status: PaymentStatus,
    ) -> Result<Booking, AppError> {
        let mut booking = self
            .bookings
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("booking {id} not found")))?;

        booking.payment_status = payment_status;
        Ok(booking.clone())
    }
}

impl Default for BookingStore {
    fn default() -> Self {
        Self::new()
    }
}
