use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::models::booking::{Booking, BookingStatus, PaymentStatus};
use crate::models::driver::{Driver, DriverStatus};
use crate::observability::metrics::Metrics;

/// Opaque handle for one live socket session.
pub type ConnectionId = Uuid;

/// Server-to-client realtime events.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum Event {
    NewRideRequest {
        booking: Booking,
    },
    BookingConfirmed {
        booking: Booking,
        driver: Driver,
    },
    RideCancelled {
        booking_id: Uuid,
        reason: String,
    },
    BookingStatusUpdate {
        booking_id: Uuid,
        status: BookingStatus,
    },
    DriverStatusUpdate {
        driver_id: Uuid,
        status: DriverStatus,
        is_available: bool,
    },
    PaymentStatusUpdate {
        booking_id: Uuid,
        payment_status: PaymentStatus,
    },
    /// Directed reply to a socket accept/reject so the driver client learns
    /// whether its action applied.
    ActionAck {
        booking_id: Uuid,
        action: &'static str,
        ok: bool,
        error: Option<String>,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::NewRideRequest { .. } => "new_ride_request",
            Event::BookingConfirmed { .. } => "booking_confirmed",
            Event::RideCancelled { .. } => "ride_cancelled",
            Event::BookingStatusUpdate { .. } => "booking_status_update",
            Event::DriverStatusUpdate { .. } => "driver_status_update",
            Event::PaymentStatusUpdate { .. } => "payment_status_update",
            Event::ActionAck { .. } => "action_ack",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    All,
    Connection(ConnectionId),
}

#[derive(Debug, Clone)]
pub struct Envelope {
    pub target: Target,
    pub event: Event,
}

impl Envelope {
    pub fn is_for(&self, connection: ConnectionId) -> bool {
        match self.target {
            Target::All => true,
            Target::Connection(id) => id == connection,
        }
    }
}

/// The realtime channel. Owns the identity-to-connection maps (transport
/// state stays out of the domain records) and a broadcast bus that every
/// socket task subscribes to, forwarding only envelopes addressed to it.
pub struct Notifier {
    events_tx: broadcast::Sender<Envelope>,
    driver_conns: DashMap<Uuid, ConnectionId>,
    user_conns: DashMap<Uuid, ConnectionId>,
    metrics: Metrics,
}

impl Notifier {
    pub fn new(event_buffer_size: usize, metrics: Metrics) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(event_buffer_size);

        Self {
            events_tx,
            driver_conns: DashMap::new(),
            user_conns: DashMap::new(),
            metrics,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.events_tx.subscribe()
    }

    pub fn bind_driver(&self, driver_id: Uuid, connection: ConnectionId) {
        self.driver_conns.insert(driver_id, connection);
    }

    pub fn bind_user(&self, user_id: Uuid, connection: ConnectionId) {
        self.user_conns.insert(user_id, connection);
    }

    /// Socket teardown: drop every binding held by this connection. An
    /// unbound driver is no longer a dispatch candidate.
    pub fn unbind(&self, connection: ConnectionId) {
        self.driver_conns.retain(|_, conn| *conn != connection);
        self.user_conns.retain(|_, conn| *conn != connection);
    }

    pub fn is_driver_connected(&self, driver_id: Uuid) -> bool {
        self.driver_conns.contains_key(&driver_id)
    }

    pub fn driver_connection(&self, driver_id: Uuid) -> Option<ConnectionId> {
        self.driver_conns.get(&driver_id).map(|entry| *entry.value())
    }

    pub fn user_connection(&self, user_id: Uuid) -> Option<ConnectionId> {
        self.user_conns.get(&user_id).map(|entry| *entry.value())
    }

    /// Returns false if the driver has no live connection; the event is
    /// dropped in that case.
    pub fn send_to_driver(&self, driver_id: Uuid, event: Event) -> bool {
        match self.driver_connection(driver_id) {
            Some(connection) => {
                self.send_to_connection(connection, event);
                true
            }
            None => {
                debug!(driver_id = %driver_id, event = event.name(), "driver not connected, event dropped");
                false
            }
        }
    }

    pub fn send_to_user(&self, user_id: Uuid, event: Event) -> bool {
        match self.user_connection(user_id) {
            Some(connection) => {
                self.send_to_connection(connection, event);
                true
            }
            None => {
                debug!(user_id = %user_id, event = event.name(), "user not connected, event dropped");
                false
            }
        }
    }

    pub fn send_to_connection(&self, connection: ConnectionId, event: Event) {
        self.publish(Envelope {
            target: Target::Connection(connection),
            event,
        });
    }

    pub fn broadcast(&self, event: Event) {
        self.publish(Envelope {
            target: Target::All,
            event,
        });
    }

    fn publish(&self, envelope: Envelope) {
        self.metrics
            .events_sent_total
            .with_label_values(&[envelope.event.name()])
            .inc();

        // Send only fails when no socket is subscribed.
        let _ = self.events_tx.send(envelope);
    }
}
