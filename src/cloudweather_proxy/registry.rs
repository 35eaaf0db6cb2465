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

use crate::station::WeatherStation;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

#[derive(Debug, Clone)]
struct StationRecord {
    last_update: Instant,
    reading: Option<WeatherStation>,
}

/// Stations seen by a listener along with the most recent reading from each.
///
/// Entries are never evicted. Concurrent updates for the same station are last
/// write wins.
#[derive(Debug, Default)]
pub struct StationRegistry {
    stations: Mutex<HashMap<String, StationRecord>>,
}

impl StationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, StationRecord>> {
        self.stations.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record that `station_id` reported at `now`, returning true if the station
    /// hasn't been seen before.
    pub fn touch(&self, station_id: &str, now: Instant) -> bool {
        let mut stations = self.lock();
        match stations.get_mut(station_id) {
            Some(record) => {
                record.last_update = now;
                false
            }
            None => {
                stations.insert(
                    station_id.to_owned(),
                    StationRecord {
                        last_update: now,
                        reading: None,
                    },
                );
                true
            }
        }
    }

    /// Replace the cached reading for the station the reading belongs to.
    pub fn store(&self, reading: WeatherStation) {
        let mut stations = self.lock();
        let last_update = reading.update_time.unwrap_or_else(Instant::now);
        stations.insert(
            reading.station_id.clone(),
            StationRecord {
                last_update,
                reading: Some(reading),
            },
        );
    }

    pub fn last_reading(&self, station_id: &str) -> Option<WeatherStation> {
        self.lock().get(station_id).and_then(|r| r.reading.clone())
    }

    pub fn last_update(&self, station_id: &str) -> Option<Instant> {
        self.lock().get(station_id).map(|r| r.last_update)
    }

    /// Known station IDs, sorted.
    pub fn stations(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Last reading of every station that has one, sorted by station ID.
    pub fn readings(&self) -> Vec<WeatherStation> {
        let mut readings: Vec<WeatherStation> =
            self.lock().values().filter_map(|r| r.reading.clone()).collect();
        readings.sort_by(|a, b| a.station_id.cmp(&b.station_id));
        readings
    }
}
