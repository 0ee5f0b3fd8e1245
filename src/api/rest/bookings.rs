use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::{dispatch, status};
use crate::error::AppError;
use crate::models::actor::{Actor, Role};
use crate::models::booking::{Booking, BookingStatus, NewBooking, PaymentStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/bookings", post(create_booking))
        .route("/bookings/history/all", get(rider_bookings))
        .route("/bookings/admin/all", get(all_bookings))
        .route("/bookings/:id", get(get_booking))
        .route("/bookings/:id/cancel", patch(cancel_booking))
        .route("/bookings/:id/status", patch(update_status))
        .route("/bookings/:id/payment", patch(update_payment_status))
}

#[derive(Deserialize)]
pub struct CreateBookingRequest {
    pub pickup: String,
    pub dropoff: String,
    pub distance_km: f64,
    pub duration_min: f64,
    pub estimated_fare: f64,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: BookingStatus,
}

#[derive(Deserialize)]
pub struct UpdatePaymentRequest {
    pub payment_status: PaymentStatus,
}

/// Create the booking and run dispatch before answering, so the caller sees
/// the post-dispatch snapshot (offered to a driver, or no driver available).
async fn create_booking(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(payload): Json<CreateBookingRequest>,
) -> Result<Json<Booking>, AppError> {
    if actor.role != Role::Rider {
        return Err(AppError::Forbidden(
            "only riders may create bookings".to_string(),
        ));
    }

    if payload.pickup.trim().is_empty() || payload.dropoff.trim().is_empty() {
        return Err(AppError::BadRequest(
            "pickup and dropoff are required".to_string(),
        ));
    }

    for (field, value) in [
        ("distance_km", payload.distance_km),
        ("duration_min", payload.duration_min),
        ("estimated_fare", payload.estimated_fare),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(AppError::BadRequest(format!("{field} must be >= 0")));
        }
    }

    let booking = state.bookings.create(NewBooking {
        rider_id: actor.id,
        pickup: payload.pickup,
        dropoff: payload.dropoff,
        distance_km: payload.distance_km,
        duration_min: payload.duration_min,
        estimated_fare: payload.estimated_fare,
    });

    let booking = dispatch::dispatch_new(&state, booking.id).await?;
    Ok(Json(booking))
}

async fn get_booking(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    let booking = state.bookings.get(id)?;

    let is_owning_rider = actor.role == Role::Rider && booking.rider_id == actor.id;
    let is_assigned_driver =
        actor.role == Role::Driver && booking.assigned_driver == Some(actor.id);

    if !actor.is_admin() && !is_owning_rider && !is_assigned_driver {
        return Err(AppError::Forbidden(format!("no access to booking {id}")));
    }

    Ok(Json(booking))
}

async fn rider_bookings(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<Vec<Booking>>, AppError> {
    if actor.role != Role::Rider {
        return Err(AppError::Forbidden(
            "booking history is per rider".to_string(),
        ));
    }

    Ok(Json(state.bookings.list_by_rider(actor.id)))
}

async fn all_bookings(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<Vec<Booking>>, AppError> {
    if !actor.is_admin() {
        return Err(AppError::Forbidden("admins only".to_string()));
    }

    Ok(Json(state.bookings.list_all()))
}

async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    let booking = status::cancel(&state, id, actor).await?;
    Ok(Json(booking))
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Booking>, AppError> {
    let booking = status::update_status(&state, id, payload.status, actor).await?;
    Ok(Json(booking))
}

async fn update_payment_status(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePaymentRequest>,
) -> Result<Json<Booking>, AppError> {
    let booking = status::update_payment_status(&state, id, payload.payment_status, actor).await?;
    Ok(Json(booking))
}
