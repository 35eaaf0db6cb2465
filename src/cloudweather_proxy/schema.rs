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

//! Wire-level field tables for each upload dialect.
//!
//! Each dialect is described by an ordered list of fields: the argument name used
//! on the wire, the type its value is cast to, the slot in a reading it fills, and
//! the unit (and optional scale factor) the station reports it in. Both the parser
//! and the vendor transforms work from these tables.

use crate::station::{SensorKind, Vendor};
use crate::units::Unit;

/// Type a raw argument value is cast to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Float,
    Integer,
}

/// Where a parsed argument ends up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    StationId,
    StationKey,
    DateUtc,
    Sensor(SensorKind),
}

#[derive(Debug)]
pub struct FieldSpec {
    /// Name of the raw field, unique within a dialect.
    pub name: &'static str,
    /// Argument name as sent by the station.
    pub arg: &'static str,
    pub kind: FieldKind,
    pub slot: Slot,
    pub unit: Option<Unit>,
    pub factor: Option<f64>,
}

impl FieldSpec {
    const fn identity(name: &'static str, arg: &'static str, slot: Slot) -> Self {
        FieldSpec {
            name,
            arg,
            kind: FieldKind::Text,
            slot,
            unit: None,
            factor: None,
        }
    }

    const fn sensor(
        name: &'static str,
        arg: &'static str,
        kind: FieldKind,
        sensor: SensorKind,
        unit: Unit,
    ) -> Self {
        FieldSpec {
            name,
            arg,
            kind,
            slot: Slot::Sensor(sensor),
            unit: Some(unit),
            factor: None,
        }
    }

    const fn scaled(mut self, factor: f64) -> Self {
        self.factor = Some(factor);
        self
    }
}

#[derive(Debug)]
pub struct Schema {
    pub vendor: Vendor,
    pub fields: &'static [FieldSpec],
}

impl Schema {
    pub fn is_declared_arg(&self, arg: &str) -> bool {
        self.fields.iter().any(|f| f.arg == arg)
    }
}

/// A successfully cast numeric value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawValue {
    Float(f64),
    Integer(i64),
}

impl RawValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Float(v) => *v,
            Self::Integer(v) => *v as f64,
        }
    }
}

/// Typed values extracted from one upload, before any unit handling.
///
/// Sensor values are kept in field table order so that later fields (newer
/// argument names for the same quantity) are applied after earlier ones.
#[derive(Debug, Clone)]
pub struct RawSensors {
    pub schema: &'static Schema,
    pub station_id: String,
    pub station_key: String,
    pub date_utc: Option<String>,
    pub values: Vec<(&'static FieldSpec, RawValue)>,
}

impl RawSensors {
    /// Build a raw reading directly from `(field name, value)` pairs.
    ///
    /// Unknown field names are ignored. Pairs are re-ordered to follow the
    /// field table of the schema.
    pub fn from_fields(
        schema: &'static Schema,
        station_id: &str,
        station_key: &str,
        values: &[(&str, RawValue)],
    ) -> Self {
        let values = schema
            .fields
            .iter()
            .filter_map(|field| {
                values
                    .iter()
                    .rev()
                    .find(|(name, _)| *name == field.name)
                    .map(|(_, v)| (field, *v))
            })
            .collect();

        RawSensors {
            schema,
            station_id: station_id.to_owned(),
            station_key: station_key.to_owned(),
            date_utc: None,
            values,
        }
    }
}

use FieldKind::{Float, Integer};

/// Query string uploads, `/weatherstation/updateweatherstation.php?ID=...&PASSWORD=...&tempf=...`
pub static WUNDERGROUND: Schema = Schema {
    vendor: Vendor::Wunderground,
    fields: &[
        FieldSpec::identity("station_id", "ID", Slot::StationId),
        FieldSpec::identity("station_key", "PASSWORD", Slot::StationKey),
        FieldSpec::identity("date_utc", "dateutc", Slot::DateUtc),
        FieldSpec::sensor("barometer", "baromin", Float, SensorKind::Barometer, Unit::InchesOfMercury),
        FieldSpec::sensor("temperature", "tempf", Float, SensorKind::Temperature, Unit::Fahrenheit),
        FieldSpec::sensor("humidity", "humidity", Float, SensorKind::Humidity, Unit::Percent),
        FieldSpec::sensor(
            "indoortemperature",
            "indoortempf",
            Float,
            SensorKind::IndoorTemperature,
            Unit::Fahrenheit,
        ),
        FieldSpec::sensor(
            "indoorhumidity",
            "indoorhumidity",
            Float,
            SensorKind::IndoorHumidity,
            Unit::Percent,
        ),
        FieldSpec::sensor("dewpoint", "dewptf", Float, SensorKind::Dewpoint, Unit::Fahrenheit),
        FieldSpec::sensor("rain", "rainin", Float, SensorKind::Rain, Unit::Inches),
        FieldSpec::sensor("dailyrain", "dailyrainin", Float, SensorKind::DailyRain, Unit::Inches),
        FieldSpec::sensor("winddirection", "winddir", Float, SensorKind::WindDirection, Unit::Degrees),
        FieldSpec::sensor("windspeed", "windspeedmph", Float, SensorKind::WindSpeed, Unit::MilesPerHour),
        FieldSpec::sensor(
            "windgustspeed",
            "windgustmph",
            Float,
            SensorKind::WindGustSpeed,
            Unit::MilesPerHour,
        ),
        FieldSpec::sensor(
            "windgustdirection",
            "windgustdir",
            Float,
            SensorKind::WindGustDirection,
            Unit::Degrees,
        ),
        FieldSpec::sensor(
            "windspeedavg",
            "windspdmph_avg2m",
            Float,
            SensorKind::WindSpeedAvg,
            Unit::MilesPerHour,
        ),
        FieldSpec::sensor(
            "winddirectionavg",
            "winddir_avg2m",
            Float,
            SensorKind::WindDirectionAvg,
            Unit::Degrees,
        ),
        FieldSpec::sensor(
            "windgustspeed10m",
            "windgustmph_10m",
            Float,
            SensorKind::WindGustSpeed10m,
            Unit::MilesPerHour,
        ),
        FieldSpec::sensor(
            "windgustdirection10m",
            "windgustdir_10m",
            Float,
            SensorKind::WindGustDirection10m,
            Unit::Degrees,
        ),
        FieldSpec::sensor("windchill", "windchillf", Float, SensorKind::WindChill, Unit::Fahrenheit),
        FieldSpec::sensor(
            "absbarometer",
            "absbaromin",
            Float,
            SensorKind::AbsBarometer,
            Unit::InchesOfMercury,
        ),
        FieldSpec::sensor("weeklyrain", "weeklyrainin", Float, SensorKind::WeeklyRain, Unit::Inches),
        FieldSpec::sensor("monthlyrain", "monthlyrainin", Float, SensorKind::MonthlyRain, Unit::Inches),
        FieldSpec::sensor("uv", "UV", Integer, SensorKind::Uv, Unit::UvIndex),
        // Older firmware sends kilolux under this name.
        FieldSpec::sensor(
            "solarradiation",
            "solarRadiation",
            Float,
            SensorKind::SolarRadiation,
            Unit::Lux).scaled(1000.0,
        ),
        // Newer firmware sends irradiance for the same slot. Must stay after the
        // legacy field so it takes precedence when both are present.
        FieldSpec::sensor(
            "solarradiation_new",
            "solarradiation",
            Float,
            SensorKind::SolarRadiation,
            Unit::WattsPerSquareMeter,
        ),
    ],
};

/// Path segment uploads, `/v01/set/wid/.../key/.../temp/164/...`. Values other
/// than percentages and angles are tenths of the unit.
pub static WEATHERCLOUD: Schema = Schema {
    vendor: Vendor::Weathercloud,
    fields: &[
        FieldSpec::identity("station_id", "wid", Slot::StationId),
        FieldSpec::identity("station_key", "key", Slot::StationKey),
        FieldSpec::sensor("barometer", "bar", Integer, SensorKind::Barometer, Unit::Hectopascals),
        FieldSpec::sensor("temperature", "temp", Integer, SensorKind::Temperature, Unit::Celsius),
        FieldSpec::sensor("temperature2", "temp02", Integer, SensorKind::Temperature2, Unit::Celsius),
        FieldSpec::sensor("humidity", "hum", Integer, SensorKind::Humidity, Unit::Percent),
        FieldSpec::sensor("humidity2", "hum02", Integer, SensorKind::Humidity2, Unit::Percent),
        FieldSpec::sensor(
            "indoortemperature",
            "tempin",
            Integer,
            SensorKind::IndoorTemperature,
            Unit::Celsius,
        ),
        FieldSpec::sensor("indoorhumidity", "humin", Integer, SensorKind::IndoorHumidity, Unit::Percent),
        FieldSpec::sensor("dewpoint", "dew", Integer, SensorKind::Dewpoint, Unit::Celsius),
        FieldSpec::sensor("dewpointindoor", "dewin", Integer, SensorKind::DewpointIndoor, Unit::Celsius),
        FieldSpec::sensor("dailyrain", "rain", Integer, SensorKind::DailyRain, Unit::Millimeters),
        FieldSpec::sensor("rain", "rainrate", Integer, SensorKind::Rain, Unit::MillimetersPerHour),
        FieldSpec::sensor("heatindex", "heat", Integer, SensorKind::HeatIndex, Unit::Celsius),
        FieldSpec::sensor("heatindexindoor", "heatin", Integer, SensorKind::HeatIndexIndoor, Unit::Celsius),
        FieldSpec::sensor("temphumiditywind", "thw", Integer, SensorKind::TempHumidityWind, Unit::Celsius),
        FieldSpec::sensor("winddirection", "wdir", Integer, SensorKind::WindDirection, Unit::Degrees),
        FieldSpec::sensor("windspeed", "wspd", Integer, SensorKind::WindSpeed, Unit::MetersPerSecond),
        FieldSpec::sensor(
            "windgustspeed",
            "wspdhi",
            Integer,
            SensorKind::WindGustSpeed,
            Unit::MetersPerSecond,
        ),
        FieldSpec::sensor("windchill", "chill", Integer, SensorKind::WindChill, Unit::Celsius),
        FieldSpec::sensor(
            "windspeedavg",
            "wspdavg",
            Integer,
            SensorKind::WindSpeedAvg,
            Unit::MetersPerSecond,
        ),
        FieldSpec::sensor("uv", "uvi", Integer, SensorKind::Uv, Unit::UvIndex),
        FieldSpec::sensor(
            "solarradiation",
            "solarrad",
            Integer,
            SensorKind::SolarRadiation,
            Unit::WattsPerSquareMeter,
        ),
        FieldSpec::sensor("visibility", "vis", Integer, SensorKind::Visibility, Unit::Kilometers),
    ],
};

#[cfg(test)]
mod tests {
    use super::{RawSensors, RawValue, Schema, Slot, WEATHERCLOUD, WUNDERGROUND};
    use std::collections::HashSet;

    fn assert_unique(schema: &Schema) {
        let names: HashSet<&str> = schema.fields.iter().map(|f| f.name).collect();
        let args: HashSet<&str> = schema.fields.iter().map(|f| f.arg).collect();
        assert_eq!(schema.fields.len(), names.len(), "duplicate field name in {:?}", schema.vendor);
        assert_eq!(schema.fields.len(), args.len(), "duplicate argument in {:?}", schema.vendor);
    }

    fn assert_identity(schema: &Schema) {
        assert!(schema.fields.iter().any(|f| f.slot == Slot::StationId));
        assert!(schema.fields.iter().any(|f| f.slot == Slot::StationKey));
    }

    #[test]
    fn test_wunderground_table() {
        assert_unique(&WUNDERGROUND);
        assert_identity(&WUNDERGROUND);
        assert!(WUNDERGROUND.is_declared_arg("solarRadiation"));
        assert!(WUNDERGROUND.is_declared_arg("solarradiation"));
        assert!(!WUNDERGROUND.is_declared_arg("SOLARRADIATION"));
    }

    #[test]
    fn test_weathercloud_table() {
        assert_unique(&WEATHERCLOUD);
        assert_identity(&WEATHERCLOUD);
        assert!(WEATHERCLOUD.fields.iter().all(|f| f.factor.is_none()));
    }

    #[test]
    fn test_legacy_solar_radiation_precedes_new() {
        let legacy = WUNDERGROUND.fields.iter().position(|f| f.name == "solarradiation").unwrap();
        let new = WUNDERGROUND.fields.iter().position(|f| f.name == "solarradiation_new").unwrap();
        assert!(legacy < new);
        assert_eq!(WUNDERGROUND.fields[legacy].slot, WUNDERGROUND.fields[new].slot);
    }

    #[test]
    fn test_from_fields_follows_table_order() {
        let raw = RawSensors::from_fields(
            &WUNDERGROUND,
            "12345",
            "secret",
            &[
                ("solarradiation_new", RawValue::Float(9.57)),
                ("temperature", RawValue::Float(72.5)),
                ("not_a_field", RawValue::Float(1.0)),
                ("solarradiation", RawValue::Float(289.2)),
            ],
        );

        let names: Vec<&str> = raw.values.iter().map(|(f, _)| f.name).collect();
        assert_eq!(vec!["temperature", "solarradiation", "solarradiation_new"], names);
    }
}
