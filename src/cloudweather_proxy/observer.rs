// cloudweather_proxy - Local receiver and forwarder for weather station uploads
//
// Copyright 2024 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

//! Notification of parsed readings to interested parties.

use crate::station::WeatherStation;
use std::error;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

pub type ObserverError = Box<dyn error::Error + Send + Sync>;

/// Something that wants to know about each reading a listener accepts.
///
/// Observers are called one at a time, in registration order, after a reading
/// has been parsed and stamped. An error from one observer is logged and does
/// not stop the others from being called.
pub trait Observer: Send + Sync {
    fn on_reading(&self, reading: &WeatherStation) -> Result<(), ObserverError>;
}

impl<F> Observer for F
where
    F: Fn(&WeatherStation) -> Result<(), ObserverError> + Send + Sync,
{
    fn on_reading(&self, reading: &WeatherStation) -> Result<(), ObserverError> {
        self(reading)
    }
}

type Entries = Mutex<Vec<(u64, Arc<dyn Observer>)>>;

/// Ordered collection of registered observers.
#[derive(Default)]
pub struct ObserverList {
    next_id: AtomicU64,
    entries: Arc<Entries>,
}

impl ObserverList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer. Registering the same observer twice means it is
    /// called twice.
    pub fn subscribe(&self, observer: Arc<dyn Observer>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, observer));

        Subscription {
            id,
            entries: Arc::downgrade(&self.entries),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call every observer with `reading`, returning the number that failed.
    pub fn notify(&self, reading: &WeatherStation) -> usize {
        // Snapshot so observers may subscribe or cancel without deadlocking.
        let observers: Vec<Arc<dyn Observer>> = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, o)| Arc::clone(o))
            .collect();

        let mut failed = 0;
        for observer in observers {
            if let Err(e) = observer.on_reading(reading) {
                failed += 1;
                tracing::warn!(
                    message = "observer failed to handle reading",
                    station = %reading.station_id,
                    error = %e,
                );
            }
        }

        failed
    }
}

/// Handle returned by `ObserverList::subscribe` used to remove the observer.
///
/// Dropping the handle leaves the observer registered.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    entries: Weak<Entries>,
}

impl Subscription {
    /// Remove the observer, returning false if it was already gone.
    pub fn cancel(self) -> bool {
        let entries = match self.entries.upgrade() {
            Some(e) => e,
            None => return false,
        };

        let mut entries = entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|(id, _)| *id != self.id);
        entries.len() != before
    }
}
