use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::booking::{Booking, BookingStatus};
use crate::models::driver::{Driver, DriverStatus};
use crate::notify::Event;
use crate::state::AppState;

/// Entry point for a freshly created booking: one candidate search over the
/// whole pool, reserve-or-terminal.
pub async fn dispatch_new(state: &Arc<AppState>, booking_id: Uuid) -> Result<Booking, AppError> {
    offer_to_candidate(state, booking_id, HashSet::new()).await
}

/// Driver confirms the ride it was offered. Precondition: the booking's
/// provisional hold must name this driver, otherwise nothing changes and
/// nothing is emitted.
pub async fn accept(
    state: &Arc<AppState>,
    booking_id: Uuid,
    driver_id: Uuid,
) -> Result<Booking, AppError> {
    let booking = state.bookings.get(booking_id)?;

    if booking.assigned_driver != Some(driver_id) {
        return Err(AppError::Forbidden(format!(
            "booking {booking_id} is not offered to driver {driver_id}"
        )));
    }

    cancel_offer_timer(state, booking_id);

    let booking =
        state
            .bookings
            .set_assignment(booking_id, Some(driver_id), BookingStatus::DriverAssigned)?;
    // Reserved since the offer; the lookup failing here means the registry
    // lost a held driver.
    let driver = assigned_driver(state, driver_id)?;

    state.notifier.send_to_user(
        booking.rider_id,
        Event::BookingConfirmed {
            booking: booking.clone(),
            driver: driver.clone(),
        },
    );
    state.notifier.broadcast(Event::BookingStatusUpdate {
        booking_id: booking.id,
        status: booking.status,
    });
    state.notifier.broadcast(Event::DriverStatusUpdate {
        driver_id: driver.id,
        status: DriverStatus::Busy,
        is_available: false,
    });

    info!(booking_id = %booking.id, driver_id = %driver.id, "booking confirmed");
    Ok(booking)
}

/// Driver turns the offer down: release it, then make exactly one
/// replacement attempt. A second rejection arrives as its own call.
pub async fn reject(
    state: &Arc<AppState>,
    booking_id: Uuid,
    driver_id: Uuid,
) -> Result<Booking, AppError> {
    let booking = state.bookings.get(booking_id)?;

    if booking.assigned_driver != Some(driver_id) {
        return Err(AppError::Forbidden(format!(
            "booking {booking_id} is not offered to driver {driver_id}"
        )));
    }

    cancel_offer_timer(state, booking_id);

    if let Err(err) = state.drivers.release(driver_id) {
        error!(error = %err, driver_id = %driver_id, "rejecting driver missing from registry");
        return Err(AppError::Internal(format!(
            "driver {driver_id} missing from registry"
        )));
    }
    info!(booking_id = %booking_id, driver_id = %driver_id, "driver rejected ride");

    let mut excluding = HashSet::new();
    excluding.insert(driver_id);
    let booking = offer_to_candidate(state, booking_id, excluding).await?;

    state.notifier.broadcast(Event::BookingStatusUpdate {
        booking_id: booking.id,
        status: booking.status,
    });

    Ok(booking)
}

/// Find the most-recently-seen eligible driver not in `excluding`, place a
/// provisional hold on it and offer it the ride; with nobody eligible the
/// booking terminates in NoDriverAvailable. Losing the reservation race to a
/// concurrent dispatch just widens the exclusion set and rescans, so the
/// loop is bounded by the pool size.
pub(crate) async fn offer_to_candidate(
    state: &Arc<AppState>,
    booking_id: Uuid,
    mut excluding: HashSet<Uuid>,
) -> Result<Booking, AppError> {
    let start = Instant::now();

    loop {
        let candidate = state
            .drivers
            .find_candidate(&excluding, |id| state.notifier.is_driver_connected(id));

        let Some(candidate) = candidate else {
            let booking =
                state
                    .bookings
                    .set_assignment(booking_id, None, BookingStatus::NoDriverAvailable)?;
            record_dispatch(state, "no_driver", start);
            info!(booking_id = %booking_id, "no driver available");
            return Ok(booking);
        };

        match state.drivers.try_reserve(candidate.id) {
            Ok(driver) => {
                let booking = state.bookings.set_assignment(
                    booking_id,
                    Some(driver.id),
                    BookingStatus::DriverPending,
                )?;

                schedule_offer_timer(state, booking_id, driver.id);
                state.notifier.send_to_driver(
                    driver.id,
                    Event::NewRideRequest {
                        booking: booking.clone(),
                    },
                );
                record_dispatch(state, "assigned", start);
                info!(booking_id = %booking_id, driver_id = %driver.id, "ride offered to driver");
                return Ok(booking);
            }
            Err(AppError::Conflict(_)) => {
                // Lost the hold to a concurrent dispatch; drop this
                // candidate and rescan.
                excluding.insert(candidate.id);
            }
            Err(err) => {
                error!(error = %err, driver_id = %candidate.id, "candidate vanished during reservation");
                record_dispatch(state, "error", start);
                return Err(AppError::Internal(format!(
                    "driver {} missing from registry",
                    candidate.id
                )));
            }
        }
    }
}

/// Abort the pending-offer timer for a booking, if one is armed.
pub(crate) fn cancel_offer_timer(state: &AppState, booking_id: Uuid) {
    if let Some((_, handle)) = state.offer_timers.remove(&booking_id) {
        handle.abort();
        state.metrics.offers_pending.dec();
    }
}

fn schedule_offer_timer(state: &Arc<AppState>, booking_id: Uuid, driver_id: Uuid) {
    let Some(timeout) = state.offer_timeout else {
        return;
    };

    state.metrics.offers_pending.inc();
    let task_state = state.clone();
    let handle = tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        expire_offer(task_state, booking_id, driver_id).await;
    });

    if let Some(previous) = state.offer_timers.insert(booking_id, handle) {
        previous.abort();
    }
}

async fn expire_offer(state: Arc<AppState>, booking_id: Uuid, driver_id: Uuid) {
    // Accept/reject/cancel already claimed the timer if the entry is gone.
    if state.offer_timers.remove(&booking_id).is_none() {
        return;
    }
    state.metrics.offers_pending.dec();

    let Ok(booking) = state.bookings.get(booking_id) else {
        return;
    };
    if booking.status != BookingStatus::DriverPending
        || booking.assigned_driver != Some(driver_id)
    {
        return;
    }

    warn!(booking_id = %booking_id, driver_id = %driver_id, "offer timed out, releasing driver");
    if let Err(err) = state.drivers.release(driver_id) {
        error!(error = %err, driver_id = %driver_id, "failed to release driver after timeout");
        return;
    }

    let mut excluding = HashSet::new();
    excluding.insert(driver_id);

    let replacement: Pin<Box<dyn Future<Output = Result<Booking, AppError>> + Send + '_>> =
        Box::pin(offer_to_candidate(&state, booking_id, excluding));
    match replacement.await {
        Ok(booking) => {
            state.notifier.broadcast(Event::BookingStatusUpdate {
                booking_id: booking.id,
                status: booking.status,
            });
        }
        Err(err) => {
            error!(error = %err, booking_id = %booking_id, "re-dispatch after timeout failed");
        }
    }
}

fn assigned_driver(state: &AppState, driver_id: Uuid) -> Result<Driver, AppError> {
    state.drivers.get(driver_id).map_err(|_| {
        error!(driver_id = %driver_id, "assigned driver missing from registry");
        AppError::Internal(format!("driver {driver_id} missing from registry"))
    })
}

fn record_dispatch(state: &AppState, outcome: &str, start: Instant) {
    state
        .metrics
        .dispatch_latency_seconds
        .with_label_values(&[outcome])
        .observe(start.elapsed().as_secs_f64());
    state
        .metrics
        .dispatch_total
        .with_label_values(&[outcome])
        .inc();
}
