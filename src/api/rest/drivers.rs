use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::actor::{Actor, Role};
use crate::models::driver::{Driver, DriverStatus};
use crate::notify::Event;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers", post(register_driver).get(list_drivers))
        .route("/drivers/:id", get(get_driver))
        .route("/drivers/:id/availability", patch(update_availability))
}

#[derive(Deserialize)]
pub struct RegisterDriverRequest {
    pub name: String,
    pub email: String,
    pub mobile: String,
    pub vehicle_number: String,
}

#[derive(Deserialize)]
pub struct UpdateAvailabilityRequest {
    pub is_available: bool,
}

/// Registration keeps only the dispatch-relevant fields; credential handling
/// lives upstream. New drivers start offline until they connect and announce
/// themselves.
async fn register_driver(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterDriverRequest>,
) -> Result<Json<Driver>, AppError> {
    for (field, value) in [
        ("name", &payload.name),
        ("email", &payload.email),
        ("mobile", &payload.mobile),
        ("vehicle_number", &payload.vehicle_number),
    ] {
        if value.trim().is_empty() {
            return Err(AppError::BadRequest(format!("{field} cannot be empty")));
        }
    }

    if state.drivers.email_taken(&payload.email) {
        return Err(AppError::Conflict(format!(
            "email {} is already registered",
            payload.email
        )));
    }

    let driver = Driver {
        id: Uuid::new_v4(),
        name: payload.name,
        email: payload.email,
        mobile: payload.mobile,
        vehicle_number: payload.vehicle_number,
        status: DriverStatus::Offline,
        is_available: false,
        last_seen: Utc::now(),
        created_at: Utc::now(),
    };

    state.drivers.insert(driver.clone());
    Ok(Json(driver))
}

async fn list_drivers(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<Vec<Driver>>, AppError> {
    if !actor.is_admin() {
        return Err(AppError::Forbidden("admins only".to_string()));
    }

    Ok(Json(state.drivers.list()))
}

async fn get_driver(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Driver>, AppError> {
    if !actor.is_admin() && actor.id != id {
        return Err(AppError::Forbidden(format!("no access to driver {id}")));
    }

    Ok(Json(state.drivers.get(id)?))
}

async fn update_availability(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateAvailabilityRequest>,
) -> Result<Json<Driver>, AppError> {
    if actor.role != Role::Driver || actor.id != id {
        return Err(AppError::Forbidden(
            "drivers may only change their own availability".to_string(),
        ));
    }

    let driver = state.drivers.set_availability(id, payload.is_available)?;
    state.notifier.broadcast(Event::DriverStatusUpdate {
        driver_id: driver.id,
        status: driver.status,
        is_available: driver.is_available,
    });

    Ok(Json(driver))
}
