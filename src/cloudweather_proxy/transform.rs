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

//! Vendor specific normalization of raw values into a `WeatherStation`.

use crate::schema::{RawSensors, Slot};
use crate::station::{Sensor, WeatherStation};
use crate::units::Unit;
use std::collections::BTreeMap;

/// Normalize an imperial upload: apply any scale factor and convert to metric
/// where a converter for the reported unit exists.
///
/// Several fields may target the same sensor. They're applied in field table
/// order so the newest argument name wins. A value that fails conversion is
/// logged and dropped from the reading.
pub fn imperial(raw: RawSensors) -> WeatherStation {
    let mut sensors = BTreeMap::new();

    for (field, value) in &raw.values {
        let kind = match field.slot {
            Slot::Sensor(k) => k,
            _ => continue,
        };

        let value = value.as_f64() * field.factor.unwrap_or(1.0);
        let unit = match field.unit {
            Some(u) => u,
            None => continue,
        };

        let sensor = match unit.to_metric() {
            Some(conversion) => match conversion.apply(value) {
                Ok(converted) => Sensor::new(kind, converted, conversion.to),
                Err(e) => {
                    tracing::warn!(
                        message = "failed to convert field",
                        station = %raw.station_id,
                        field = field.name,
                        from = %conversion.from,
                        to = %conversion.to,
                        value = value,
                        raw_type = ?field.kind,
                        error = %e,
                    );
                    continue;
                }
            },
            None => Sensor::new(kind, value, unit),
        };

        sensors.insert(kind, sensor);
    }

    WeatherStation::new(raw.station_id, raw.station_key, raw.schema.vendor, raw.date_utc, sensors)
}

/// Normalize a fixed point upload: every value except percentages and angles is
/// sent as tenths of its unit. Units are already metric.
pub fn fixed_point(raw: RawSensors) -> WeatherStation {
    let mut sensors = BTreeMap::new();

    for (field, value) in &raw.values {
        let (kind, unit) = match (field.slot, field.unit) {
            (Slot::Sensor(k), Some(u)) => (k, u),
            _ => continue,
        };

        let value = match unit {
            Unit::Percent | Unit::Degrees => value.as_f64(),
            _ => value.as_f64() / 10.0,
        };

        sensors.insert(kind, Sensor::new(kind, value, unit));
    }

    WeatherStation::new(raw.station_id, raw.station_key, raw.schema.vendor, raw.date_utc, sensors)
}

#[cfg(test)]
mod tests {
    use super::{fixed_point, imperial};
    use crate::schema::{RawSensors, RawValue, WEATHERCLOUD, WUNDERGROUND};
    use crate::station::{SensorKind, Vendor};
    use crate::units::Unit;

    fn wunderground(values: &[(&str, RawValue)]) -> RawSensors {
        RawSensors::from_fields(&WUNDERGROUND, "12345", "12345", values)
    }

    #[test]
    fn test_imperial_converts_to_metric() {
        let station = imperial(wunderground(&[
            ("barometer", RawValue::Float(29.92)),
            ("temperature", RawValue::Float(72.5)),
            ("humidity", RawValue::Float(44.0)),
            ("dewpoint", RawValue::Float(49.2)),
            ("rain", RawValue::Float(0.0)),
            ("winddirection", RawValue::Float(249.0)),
            ("windspeed", RawValue::Float(2.0)),
            ("uv", RawValue::Integer(2)),
            ("solarradiation", RawValue::Float(289.2)),
        ]));

        assert_eq!("12345", station.station_id);
        assert_eq!("12345", station.station_key);
        assert_eq!(Vendor::Wunderground, station.vendor);

        let barometer = station.sensor(SensorKind::Barometer).unwrap();
        assert!((barometer.value - 1013.21).abs() < 0.01);
        assert_eq!(Unit::Hectopascals, barometer.unit);

        let temperature = station.sensor(SensorKind::Temperature).unwrap();
        assert_eq!(22.5, temperature.value);
        assert_eq!(Unit::Celsius, temperature.unit);

        let humidity = station.sensor(SensorKind::Humidity).unwrap();
        assert_eq!(44.0, humidity.value);
        assert_eq!(Unit::Percent, humidity.unit);

        let solar = station.sensor(SensorKind::SolarRadiation).unwrap();
        assert_eq!(289200.0, solar.value);
        assert_eq!(Unit::Lux, solar.unit);
        assert_eq!("solarradiation", solar.name);

        let wind = station.sensor(SensorKind::WindDirection).unwrap();
        assert_eq!(249.0, wind.value);
        assert_eq!(Unit::Degrees, wind.unit);

        assert_eq!(Unit::MetersPerSecond, station.sensor(SensorKind::WindSpeed).unwrap().unit);
        assert_eq!(Unit::Millimeters, station.sensor(SensorKind::Rain).unwrap().unit);
        assert_eq!(2.0, station.sensor(SensorKind::Uv).unwrap().value);
        assert!(station.sensor(SensorKind::Visibility).is_none());
    }

    #[test]
    fn test_imperial_new_solar_radiation_wins() {
        let station = imperial(wunderground(&[
            ("solarradiation", RawValue::Float(289.2)),
            ("solarradiation_new", RawValue::Float(9.57)),
        ]));

        let solar = station.sensor(SensorKind::SolarRadiation).unwrap();
        assert_eq!(9.57, solar.value);
        assert_eq!(Unit::WattsPerSquareMeter, solar.unit);
    }

    #[test]
    fn test_imperial_drops_unconvertible_value() {
        let station = imperial(wunderground(&[
            ("temperature", RawValue::Float(f64::NAN)),
            ("humidity", RawValue::Float(50.0)),
        ]));

        assert!(station.sensor(SensorKind::Temperature).is_none());
        assert_eq!(50.0, station.sensor(SensorKind::Humidity).unwrap().value);
        assert_eq!(1, station.len());
    }

    #[test]
    fn test_fixed_point_descales() {
        let raw = RawSensors::from_fields(
            &WEATHERCLOUD,
            "12345",
            "12345",
            &[
                ("barometer", RawValue::Integer(10130)),
                ("temperature", RawValue::Integer(160)),
                ("humidity", RawValue::Integer(80)),
                ("dewpoint", RawValue::Integer(129)),
                ("rain", RawValue::Integer(109)),
                ("dailyrain", RawValue::Integer(25)),
                ("winddirection", RawValue::Integer(288)),
                ("windspeed", RawValue::Integer(0)),
                ("solarradiation", RawValue::Integer(470)),
            ],
        );
        let station = fixed_point(raw);

        assert_eq!(Vendor::Weathercloud, station.vendor);

        let barometer = station.sensor(SensorKind::Barometer).unwrap();
        assert_eq!(1013.0, barometer.value);
        assert_eq!(Unit::Hectopascals, barometer.unit);

        let temperature = station.sensor(SensorKind::Temperature).unwrap();
        assert_eq!(16.0, temperature.value);
        assert_eq!(Unit::Celsius, temperature.unit);

        let humidity = station.sensor(SensorKind::Humidity).unwrap();
        assert_eq!(80.0, humidity.value);
        assert_eq!(Unit::Percent, humidity.unit);

        let rain = station.sensor(SensorKind::Rain).unwrap();
        assert_eq!(10.9, rain.value);
        assert_eq!(Unit::MillimetersPerHour, rain.unit);

        let daily = station.sensor(SensorKind::DailyRain).unwrap();
        assert_eq!(2.5, daily.value);
        assert_eq!(Unit::Millimeters, daily.unit);

        let direction = station.sensor(SensorKind::WindDirection).unwrap();
        assert_eq!(288.0, direction.value);
        assert_eq!(Unit::Degrees, direction.unit);

        assert_eq!(47.0, station.sensor(SensorKind::SolarRadiation).unwrap().value);
    }
}
