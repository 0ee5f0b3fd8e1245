use std::collections::HashSet;

use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::driver::{Driver, DriverStatus};

/// Owns all driver records. Availability transitions go through here so the
/// `is_available == true => status == Available` invariant holds on every
/// write, and reservation is a compare-and-set under the record's entry
/// guard: two concurrent dispatch attempts can both see a driver as
/// available, but only the first `try_reserve` wins.
pub struct DriverRegistry {
    drivers: DashMap<Uuid, Driver>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self {
            drivers: DashMap::new(),
        }
    }

    pub fn insert(&self, driver: Driver) {
        self.drivers.insert(driver.id, driver);
    }

    pub fn get(&self, id: Uuid) -> Result<Driver, AppError> {
        self.drivers
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))
    }

    pub fn email_taken(&self, email: &str) -> bool {
        self.drivers.iter().any(|entry| entry.value().email == email)
    }

    pub fn list(&self) -> Vec<Driver> {
        self.drivers
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }

    /// Most-recently-seen eligible driver: available, reachable, not excluded.
    /// Tie-break on equal `last_seen` is arbitrary but stable per map state.
    pub fn find_candidate(
        &self,
        excluding: &HashSet<Uuid>,
        reachable: impl Fn(Uuid) -> bool,
    ) -> Option<Driver> {
        self.drivers
            .iter()
            .filter_map(|entry| {
                let driver = entry.value();
                let eligible = driver.is_available
                    && driver.status == DriverStatus::Available
                    && !excluding.contains(&driver.id)
                    && reachable(driver.id);

                if eligible {
                    Some(driver.clone())
                } else {
                    None
                }
            })
            .max_by_key(|driver| driver.last_seen)
    }

    /// Provisional hold: only succeeds if the record is still available at
    /// write time, otherwise `Conflict` (a concurrent reservation won).
    pub fn try_reserve(&self, id: Uuid) -> Result<Driver, AppError> {
        let mut driver = self
            .drivers
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))?;

        if !driver.is_available || driver.status != DriverStatus::Available {
            return Err(AppError::Conflict(format!("driver {id} is not available")));
        }

        driver.is_available = false;
        driver.status = DriverStatus::Busy;
        Ok(driver.clone())
    }

    pub fn release(&self, id: Uuid) -> Result<Driver, AppError> {
        let mut driver = self
            .drivers
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))?;

        driver.is_available = true;
        driver.status = DriverStatus::Available;
        Ok(driver.clone())
    }

    /// Socket `driver_online`: the driver announces itself ready for offers.
    pub fn mark_online(&self, id: Uuid) -> Result<Driver, AppError> {
        let mut driver = self
            .drivers
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))?;

        driver.is_available = true;
        driver.status = DriverStatus::Available;
        driver.last_seen = Utc::now();
        Ok(driver.clone())
    }

    /// Caller-initiated toggle; status follows the flag.
    pub fn set_availability(&self, id: Uuid, is_available: bool) -> Result<Driver, AppError> {
        let mut driver = self
            .drivers
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))?;

        driver.is_available = is_available;
        driver.status = if is_available {
            DriverStatus::Available
        } else {
            DriverStatus::Offline
        };
        driver.last_seen = Utc::now();
        Ok(driver.clone())
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}
