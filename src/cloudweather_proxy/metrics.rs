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

use crate::observer::{Observer, ObserverError};
use crate::station::WeatherStation;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use std::sync::atomic::AtomicU64;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct SensorLabels {
    station: String,
    vendor: String,
    sensor: String,
    unit: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct StationLabels {
    station: String,
    vendor: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct UpdateLabels {
    station: String,
}

/// Holder for metrics that can be set from a `WeatherStation` reading.
///
/// All metrics are created and registered upon call to `StationMetrics::new()` and share
/// the prefix "cloudweather_". Each has a "station" label set to the station ID from the
/// upload. Sensors a reading doesn't include keep whatever value they last had.
#[derive(Debug, Clone)]
pub struct StationMetrics {
    sensor: Family<SensorLabels, Gauge<f64, AtomicU64>>,
    updates: Family<StationLabels, Counter>,
    last_update: Family<UpdateLabels, Gauge<f64, AtomicU64>>,
}

impl StationMetrics {
    pub fn new(reg: &mut Registry) -> Self {
        let sensor = Family::<SensorLabels, Gauge<f64, AtomicU64>>::default();
        let updates = Family::<StationLabels, Counter>::default();
        let last_update = Family::<UpdateLabels, Gauge<f64, AtomicU64>>::default();

        reg.register(
            "cloudweather_sensor",
            "Latest normalized value of a station sensor",
            sensor.clone(),
        );
        reg.register(
            "cloudweather_station_updates",
            "Number of uploads accepted from a station",
            updates.clone(),
        );
        reg.register(
            "cloudweather_station_last_update_timestamp_seconds",
            "Time of the most recent upload from a station as a UNIX timestamp",
            last_update.clone(),
        );

        Self {
            sensor,
            updates,
            last_update,
        }
    }

    /// Set metrics from the provided reading.
    pub fn reading(&self, reading: &WeatherStation) {
        let station = &reading.station_id;
        let vendor = reading.vendor.as_str();

        for (kind, sensor) in reading.sensors() {
            self.sensor
                .get_or_create(&SensorLabels {
                    station: station.clone(),
                    vendor: vendor.to_owned(),
                    sensor: kind.key().to_owned(),
                    unit: sensor.unit.as_str().to_owned(),
                })
                .set(sensor.value);
        }

        self.updates
            .get_or_create(&StationLabels {
                station: station.clone(),
                vendor: vendor.to_owned(),
            })
            .inc();

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        self.last_update
            .get_or_create(&UpdateLabels {
                station: station.clone(),
            })
            .set(now);
    }
}

impl Observer for StationMetrics {
    fn on_reading(&self, reading: &WeatherStation) -> Result<(), ObserverError> {
        self.reading(reading);
        Ok(())
    }
}
