use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::Config;
use crate::notify::Notifier;
use crate::observability::metrics::Metrics;
use crate::store::bookings::BookingStore;
use crate::store::drivers::DriverRegistry;

pub struct AppState {
    pub drivers: DriverRegistry,
    pub bookings: BookingStore,
    pub notifier: Notifier,
    /// Pending-offer timers keyed by booking id; aborted on accept/reject/cancel.
    pub offer_timers: DashMap<Uuid, JoinHandle<()>>,
    pub offer_timeout: Option<Duration>,
    pub strict_transitions: bool,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        let metrics = Metrics::new();

        Self {
            drivers: DriverRegistry::new(),
            bookings: BookingStore::new(),
            notifier: Notifier::new(config.event_buffer_size, metrics.clone()),
            offer_timers: DashMap::new(),
            offer_timeout: config.offer_timeout,
            strict_transitions: config.strict_transitions,
            metrics,
        }
    }
}
