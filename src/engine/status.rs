use std::sync::Arc;

use tracing::{error, info};
use uuid::Uuid;

use crate::engine::dispatch::cancel_offer_timer;
use crate::error::AppError;
use crate::models::actor::{Actor, Role};
use crate::models::booking::{Booking, BookingStatus, PaymentStatus};
use crate::notify::Event;
use crate::state::AppState;

/// Apply a booking-status update on behalf of the assigned driver or an
/// admin. By default any enumerated status is accepted, regressions
/// included; with `strict_transitions` the transition table below is
/// enforced and violations are conflicts.
pub async fn update_status(
    state: &Arc<AppState>,
    booking_id: Uuid,
    new_status: BookingStatus,
    actor: Actor,
) -> Result<Booking, AppError> {
    let booking = state.bookings.get(booking_id)?;
    authorize_driver_or_admin(&booking, actor)?;

    if state.strict_transitions && !transition_allowed(booking.status, new_status) {
        return Err(AppError::Conflict(format!(
            "booking {booking_id} cannot move from {:?} to {new_status:?}",
            booking.status
        )));
    }

    let booking = state.bookings.set_status(booking_id, new_status)?;
    state.notifier.broadcast(Event::BookingStatusUpdate {
        booking_id: booking.id,
        status: booking.status,
    });

    info!(booking_id = %booking.id, status = ?booking.status, "booking status updated");
    Ok(booking)
}

/// Payment flag update, assigned driver or admin only. Re-applying the same
/// value succeeds and broadcasts again; the stream is not deduplicated.
pub async fn update_payment_status(
    state: &Arc<AppState>,
    booking_id: Uuid,
    new_status: PaymentStatus,
    actor: Actor,
) -> Result<Booking, AppError> {
    let booking = state.bookings.get(booking_id)?;
    authorize_driver_or_admin(&booking, actor)?;

    let booking = state.bookings.set_payment_status(booking_id, new_status)?;
    state.notifier.broadcast(Event::PaymentStatusUpdate {
        booking_id: booking.id,
        payment_status: booking.payment_status,
    });

    info!(booking_id = %booking.id, payment_status = ?booking.payment_status, "payment status updated");
    Ok(booking)
}

/// Cancel a booking on behalf of its rider or an admin. The assigned driver
/// reference stays on the record for the audit trail; the driver itself goes
/// back to the available pool and is told the ride is gone.
pub async fn cancel(
    state: &Arc<AppState>,
    booking_id: Uuid,
    actor: Actor,
) -> Result<Booking, AppError> {
    let booking = state.bookings.get(booking_id)?;

    let is_owning_rider = actor.role == Role::Rider && booking.rider_id == actor.id;
    if !actor.is_admin() && !is_owning_rider {
        return Err(AppError::Forbidden(format!(
            "only the booking's rider or an admin may cancel booking {booking_id}"
        )));
    }

    if booking.status.is_terminal() {
        return Err(AppError::Conflict(format!(
            "booking {booking_id} is already {:?}",
            booking.status
        )));
    }

    cancel_offer_timer(state, booking_id);
    let booking = state.bookings.set_status(booking_id, BookingStatus::Cancelled)?;

    if let Some(driver_id) = booking.assigned_driver {
        if let Err(err) = state.drivers.release(driver_id) {
            error!(error = %err, driver_id = %driver_id, "assigned driver missing during cancel");
            return Err(AppError::Internal(format!(
                "driver {driver_id} missing from registry"
            )));
        }

        let reason = match actor.role {
            Role::Admin => "ride cancelled by admin".to_string(),
            _ => "ride cancelled by rider".to_string(),
        };
        state.notifier.send_to_driver(
            driver_id,
            Event::RideCancelled {
                booking_id: booking.id,
                reason,
            },
        );
    }

    info!(booking_id = %booking.id, "booking cancelled");
    Ok(booking)
}

fn authorize_driver_or_admin(booking: &Booking, actor: Actor) -> Result<(), AppError> {
    let is_assigned_driver =
        actor.role == Role::Driver && booking.assigned_driver == Some(actor.id);

    if actor.is_admin() || is_assigned_driver {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "only the assigned driver or an admin may update booking {}",
            booking.id
        )))
    }
}

fn transition_allowed(from: BookingStatus, to: BookingStatus) -> bool {
    use BookingStatus::*;

    match from {
        DriverPending => matches!(to, DriverAssigned | NoDriverAvailable | Cancelled),
        DriverAssigned => matches!(to, Ongoing | Cancelled),
        NoDriverAvailable => matches!(to, DriverPending | Cancelled),
        Ongoing => matches!(to, Finished | Cancelled),
        Finished | Cancelled => false,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use uuid::Uuid;

    use super::{cancel, update_payment_status, update_status};
    use crate::config::Config;
    use crate::engine::dispatch::{accept, dispatch_new};
    use crate::error::AppError;
    use crate::models::actor::{Actor, Role};
    use crate::models::booking::{BookingStatus, NewBooking, PaymentStatus};
    use crate::models::driver::{Driver, DriverStatus};
    use crate::notify::{Envelope, Event, Target};
    use crate::state::AppState;

    fn test_state(strict: bool) -> Arc<AppState> {
        Arc::new(AppState::new(&Config {
            http_port: 0,
            log_level: "info".to_string(),
            event_buffer_size: 64,
            offer_timeout: None,
            strict_transitions: strict,
        }))
    }

    fn admin() -> Actor {
        Actor {
            id: Uuid::from_u128(1000),
            role: Role::Admin,
        }
    }

    fn add_driver(state: &AppState, id_seed: u128) -> Uuid {
        let id = Uuid::from_u128(id_seed);
        state.drivers.insert(Driver {
            id,
            name: format!("driver-{id_seed}"),
            email: format!("driver-{id_seed}@example.com"),
            mobile: "5550100".to_string(),
            vehicle_number: format!("KA-{id_seed:04}"),
            status: DriverStatus::Available,
            is_available: true,
            last_seen: Utc::now(),
            created_at: Utc::now(),
        });
        state.notifier.bind_driver(id, Uuid::new_v4());
        id
    }

    fn new_booking(state: &AppState, rider_seed: u128) -> Uuid {
        state
            .bookings
            .create(NewBooking {
                rider_id: Uuid::from_u128(rider_seed),
                pickup: "Central Station".to_string(),
                dropoff: "Airport T2".to_string(),
                distance_km: 18.4,
                duration_min: 27.0,
                estimated_fare: 342.5,
            })
            .id
    }

    /// Dispatch + accept so the booking has a confirmed driver.
    async fn assigned_booking(state: &Arc<AppState>, rider_seed: u128, driver_seed: u128) -> (Uuid, Uuid) {
        let driver_id = add_driver(state, driver_seed);
        let booking_id = new_booking(state, rider_seed);
        dispatch_new(state, booking_id).await.unwrap();
        accept(state, booking_id, driver_id).await.unwrap();
        (booking_id, driver_id)
    }

    fn drain(rx: &mut tokio::sync::broadcast::Receiver<Envelope>) -> Vec<Envelope> {
        let mut out = Vec::new();
        while let Ok(envelope) = rx.try_recv() {
            out.push(envelope);
        }
        out
    }

    #[tokio::test]
    async fn assigned_driver_may_update_status() {
        let state = test_state(false);
        let (booking_id, driver_id) = assigned_booking(&state, 1, 2).await;

        let actor = Actor {
            id: driver_id,
            role: Role::Driver,
        };
        let booking = update_status(&state, booking_id, BookingStatus::Ongoing, actor)
            .await
            .unwrap();
        assert_eq!(booking.status, BookingStatus::Ongoing);
    }

    #[tokio::test]
    async fn unrelated_driver_is_forbidden() {
        let state = test_state(false);
        let (booking_id, _) = assigned_booking(&state, 1, 2).await;

        let stranger = Actor {
            id: Uuid::from_u128(99),
            role: Role::Driver,
        };
        let result = update_status(&state, booking_id, BookingStatus::Ongoing, stranger).await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn rider_may_not_update_status() {
        let state = test_state(false);
        let (booking_id, _) = assigned_booking(&state, 1, 2).await;

        let rider = Actor {
            id: Uuid::from_u128(1),
            role: Role::Rider,
        };
        let result = update_status(&state, booking_id, BookingStatus::Finished, rider).await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn permissive_mode_accepts_regressions() {
        let state = test_state(false);
        let (booking_id, _) = assigned_booking(&state, 1, 2).await;

        update_status(&state, booking_id, BookingStatus::Finished, admin())
            .await
            .unwrap();
        // The upstream behavior: any enumerated value goes, even backward.
        let booking = update_status(&state, booking_id, BookingStatus::DriverPending, admin())
            .await
            .unwrap();
        assert_eq!(booking.status, BookingStatus::DriverPending);
    }

    #[tokio::test]
    async fn strict_mode_rejects_regressions() {
        let state = test_state(true);
        let (booking_id, driver_id) = assigned_booking(&state, 1, 2).await;
        let actor = Actor {
            id: driver_id,
            role: Role::Driver,
        };

        let booking = update_status(&state, booking_id, BookingStatus::Ongoing, actor)
            .await
            .unwrap();
        assert_eq!(booking.status, BookingStatus::Ongoing);

        let result = update_status(&state, booking_id, BookingStatus::DriverPending, actor).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));

        let booking = update_status(&state, booking_id, BookingStatus::Finished, actor)
            .await
            .unwrap();
        assert_eq!(booking.status, BookingStatus::Finished);

        // Terminal states accept nothing further.
        let result = update_status(&state, booking_id, BookingStatus::Ongoing, admin()).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn status_update_broadcasts() {
        let state = test_state(false);
        let (booking_id, _) = assigned_booking(&state, 1, 2).await;

        let mut rx = state.notifier.subscribe();
        update_status(&state, booking_id, BookingStatus::Ongoing, admin())
            .await
            .unwrap();

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].target, Target::All);
        assert!(matches!(
            events[0].event,
            Event::BookingStatusUpdate {
                status: BookingStatus::Ongoing,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn payment_update_is_idempotent_but_always_broadcast() {
        let state = test_state(false);
        let (booking_id, driver_id) = assigned_booking(&state, 1, 2).await;
        let actor = Actor {
            id: driver_id,
            role: Role::Driver,
        };

        let mut rx = state.notifier.subscribe();
        let first = update_payment_status(&state, booking_id, PaymentStatus::Paid, actor)
            .await
            .unwrap();
        let second = update_payment_status(&state, booking_id, PaymentStatus::Paid, actor)
            .await
            .unwrap();

        assert_eq!(first.payment_status, PaymentStatus::Paid);
        assert_eq!(second.payment_status, PaymentStatus::Paid);

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|envelope| matches!(
            envelope.event,
            Event::PaymentStatusUpdate {
                payment_status: PaymentStatus::Paid,
                ..
            }
        )));
    }

    #[tokio::test]
    async fn rider_may_not_update_payment() {
        let state = test_state(false);
        let (booking_id, _) = assigned_booking(&state, 1, 2).await;

        let rider = Actor {
            id: Uuid::from_u128(1),
            role: Role::Rider,
        };
        let result = update_payment_status(&state, booking_id, PaymentStatus::Paid, rider).await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn cancel_releases_driver_and_keeps_payment() {
        // Scenario D: accept, then the rider cancels.
        let state = test_state(false);
        let (booking_id, driver_id) = assigned_booking(&state, 1, 2).await;

        let mut rx = state.notifier.subscribe();
        let rider = Actor {
            id: Uuid::from_u128(1),
            role: Role::Rider,
        };
        let booking = cancel(&state, booking_id, rider).await.unwrap();

        assert_eq!(booking.status, BookingStatus::Cancelled);
        assert_eq!(booking.payment_status, PaymentStatus::Pending);
        assert_eq!(booking.assigned_driver, Some(driver_id));

        let driver = state.drivers.get(driver_id).unwrap();
        assert!(driver.is_available);
        assert_eq!(driver.status, DriverStatus::Available);

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0].target, Target::Connection(_)));
        assert!(matches!(events[0].event, Event::RideCancelled { .. }));
    }

    #[tokio::test]
    async fn cancel_by_another_rider_is_forbidden() {
        let state = test_state(false);
        let (booking_id, _) = assigned_booking(&state, 1, 2).await;

        let other = Actor {
            id: Uuid::from_u128(77),
            role: Role::Rider,
        };
        let result = cancel(&state, booking_id, other).await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn cancel_on_terminal_booking_conflicts() {
        let state = test_state(false);
        let (booking_id, _) = assigned_booking(&state, 1, 2).await;

        update_status(&state, booking_id, BookingStatus::Finished, admin())
            .await
            .unwrap();
        let result = cancel(&state, booking_id, admin()).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn cancel_without_driver_sends_no_driver_event() {
        let state = test_state(false);
        let booking_id = new_booking(&state, 1);

        let mut rx = state.notifier.subscribe();
        let rider = Actor {
            id: Uuid::from_u128(1),
            role: Role::Rider,
        };
        let booking = cancel(&state, booking_id, rider).await.unwrap();
        assert_eq!(booking.status, BookingStatus::Cancelled);
        assert!(drain(&mut rx).is_empty());
    }
}
