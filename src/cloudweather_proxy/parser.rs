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

//! Extraction of typed values from the two upload dialects.
//!
//! A single bad argument never fails a whole upload: the value is logged and
//! skipped. Only missing station identity is fatal.

use crate::schema::{FieldKind, FieldSpec, RawSensors, RawValue, Schema, Slot, WEATHERCLOUD, WUNDERGROUND};
use crate::station::{Vendor, WeatherStation};
use crate::transform;
use percent_encoding::percent_decode_str;
use std::collections::HashMap;
use std::error;
use std::fmt;
use std::num::{ParseFloatError, ParseIntError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    MissingIdentity { vendor: Vendor, arg: &'static str },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingIdentity { vendor, arg } => {
                write!(f, "{} upload missing required argument {}", vendor, arg)
            }
        }
    }
}

impl error::Error for ParseError {}

#[derive(Debug, Clone, PartialEq)]
pub enum CastError {
    Float(ParseFloatError),
    Integer(ParseIntError),
}

impl fmt::Display for CastError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float(e) => write!(f, "{}", e),
            Self::Integer(e) => write!(f, "{}", e),
        }
    }
}

impl error::Error for CastError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Float(e) => Some(e),
            Self::Integer(e) => Some(e),
        }
    }
}

/// A single argument that couldn't be cast to the type of its field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldError {
    pub field: &'static str,
    pub arg: &'static str,
    pub value: String,
    pub kind: FieldKind,
    pub source: CastError,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to cast field {} (arg: {}) value '{}' to {:?}: {}",
            self.field, self.arg, self.value, self.kind, self.source
        )
    }
}

impl error::Error for FieldError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        Some(&self.source)
    }
}

enum Cast {
    Text(String),
    Number(RawValue),
}

fn cast(field: &'static FieldSpec, value: &str) -> Result<Cast, FieldError> {
    let res = match field.kind {
        FieldKind::Text => return Ok(Cast::Text(value.to_owned())),
        FieldKind::Float => value.trim().parse::<f64>().map(RawValue::Float).map_err(CastError::Float),
        FieldKind::Integer => value.trim().parse::<i64>().map(RawValue::Integer).map_err(CastError::Integer),
    };

    res.map(Cast::Number).map_err(|source| FieldError {
        field: field.name,
        arg: field.arg,
        value: value.to_owned(),
        kind: field.kind,
        source,
    })
}

/// Cast every field of `schema` found by `lookup`, skipping any that fail.
fn extract<'a, F>(schema: &'static Schema, lookup: F) -> Result<RawSensors, ParseError>
where
    F: Fn(&'static FieldSpec) -> Option<&'a str>,
{
    let mut station_id = None;
    let mut station_key = None;
    let mut date_utc = None;
    let mut values = Vec::new();

    for field in schema.fields {
        let raw = match lookup(field) {
            Some(v) => v,
            None => continue,
        };

        let parsed = match cast(field, raw) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(
                    message = "skipping malformed field",
                    vendor = %schema.vendor,
                    field = e.field,
                    arg = e.arg,
                    value = %e.value,
                    target = ?e.kind,
                    error = %e.source,
                );
                continue;
            }
        };

        match (field.slot, parsed) {
            (Slot::StationId, Cast::Text(v)) => station_id = Some(v),
            (Slot::StationKey, Cast::Text(v)) => station_key = Some(v),
            (Slot::DateUtc, Cast::Text(v)) => date_utc = Some(v),
            (Slot::Sensor(_), Cast::Number(v)) => values.push((field, v)),
            (slot, _) => {
                tracing::debug!(
                    message = "ignoring field with mismatched slot",
                    field = field.name,
                    slot = ?slot,
                );
            }
        }
    }

    let station_id = require(schema, Slot::StationId, station_id)?;
    let station_key = require(schema, Slot::StationKey, station_key)?;

    Ok(RawSensors {
        schema,
        station_id,
        station_key,
        date_utc,
        values,
    })
}

fn require(schema: &'static Schema, slot: Slot, value: Option<String>) -> Result<String, ParseError> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ParseError::MissingIdentity {
            vendor: schema.vendor,
            arg: schema
                .fields
                .iter()
                .find(|f| f.slot == slot)
                .map(|f| f.arg)
                .unwrap_or("identity"),
        }),
    }
}

/// Extract raw values from decoded query string pairs.
///
/// Arguments are matched by exact name first. Failing that, they're matched
/// case-insensitively against any inbound key that isn't itself the exact name
/// of another declared argument, so `solarRadiation` and `solarradiation` stay
/// distinct while `id` or `uv` still resolve to `ID` and `UV`. Repeated keys
/// keep their last value.
pub fn parse_query<K, V>(pairs: &[(K, V)]) -> Result<RawSensors, ParseError>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let schema = &WUNDERGROUND;
    let mut exact: HashMap<&str, &str> = HashMap::with_capacity(pairs.len());
    let mut shadow: HashMap<String, &str> = HashMap::with_capacity(pairs.len());

    for (k, v) in pairs {
        let (k, v) = (k.as_ref(), v.as_ref());
        exact.insert(k, v);
        if !schema.is_declared_arg(k) {
            shadow.insert(k.to_lowercase(), v);
        }
    }

    extract(schema, |field| {
        exact
            .get(field.arg)
            .or_else(|| shadow.get(&field.arg.to_lowercase()))
            .copied()
    })
}

/// Extract raw values from `key/value/key/value/...` path segments.
///
/// Segments are percent-decoded and paired positionally; a trailing unpaired
/// segment is dropped and repeated keys keep their last value.
pub fn parse_segments<S: AsRef<str>>(segments: &[S]) -> Result<RawSensors, ParseError> {
    let data: HashMap<String, String> = segments
        .chunks_exact(2)
        .map(|pair| (decode(pair[0].as_ref()), decode(pair[1].as_ref())))
        .collect();

    extract(&WEATHERCLOUD, |field| data.get(field.arg).map(String::as_str))
}

fn decode(segment: &str) -> String {
    percent_decode_str(segment).decode_utf8_lossy().into_owned()
}

/// Parse and normalize a query string upload.
pub fn wunderground<K, V>(pairs: &[(K, V)]) -> Result<WeatherStation, ParseError>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    parse_query(pairs).map(transform::imperial)
}

/// Parse and normalize a path segment upload.
pub fn weathercloud<S: AsRef<str>>(segments: &[S]) -> Result<WeatherStation, ParseError> {
    parse_segments(segments).map(transform::fixed_point)
}

#[cfg(test)]
mod tests {
    use super::{parse_query, parse_segments, ParseError};
    use crate::schema::RawValue;
    use crate::station::Vendor;

    fn value(raw: &crate::schema::RawSensors, name: &str) -> Option<RawValue> {
        raw.values.iter().rev().find(|(f, _)| f.name == name).map(|(_, v)| *v)
    }

    #[test]
    fn test_parse_query_identity() {
        let raw = parse_query(&[("ID", "KMAB0001"), ("PASSWORD", "hunter2"), ("tempf", "72.5")]).unwrap();
        assert_eq!("KMAB0001", raw.station_id);
        assert_eq!("hunter2", raw.station_key);
        assert_eq!(Some(RawValue::Float(72.5)), value(&raw, "temperature"));
    }

    #[test]
    fn test_parse_query_case_insensitive() {
        let raw = parse_query(&[("id", "abc"), ("password", "key"), ("uv", "3"), ("TEMPF", "50")]).unwrap();
        assert_eq!("abc", raw.station_id);
        assert_eq!("key", raw.station_key);
        assert_eq!(Some(RawValue::Integer(3)), value(&raw, "uv"));
        assert_eq!(Some(RawValue::Float(50.0)), value(&raw, "temperature"));
    }

    #[test]
    fn test_parse_query_exact_case_disambiguates() {
        let legacy = parse_query(&[("ID", "a"), ("PASSWORD", "b"), ("solarRadiation", "1.5")]).unwrap();
        assert_eq!(Some(RawValue::Float(1.5)), value(&legacy, "solarradiation"));
        assert_eq!(None, value(&legacy, "solarradiation_new"));

        let new = parse_query(&[("ID", "a"), ("PASSWORD", "b"), ("solarradiation", "9.57")]).unwrap();
        assert_eq!(None, value(&new, "solarradiation"));
        assert_eq!(Some(RawValue::Float(9.57)), value(&new, "solarradiation_new"));
    }

    #[test]
    fn test_parse_query_malformed_field_skipped() {
        let raw = parse_query(&[
            ("ID", "a"),
            ("PASSWORD", "b"),
            ("tempf", "warm"),
            ("humidity", "44"),
            ("UV", "2.5"),
        ])
        .unwrap();

        assert_eq!(None, value(&raw, "temperature"));
        assert_eq!(None, value(&raw, "uv"));
        assert_eq!(Some(RawValue::Float(44.0)), value(&raw, "humidity"));
    }

    #[test]
    fn test_parse_query_date_kept_as_text() {
        let raw = parse_query(&[("ID", "a"), ("PASSWORD", "b"), ("dateutc", "2024-5-18 16:42:43")]).unwrap();
        assert_eq!(Some("2024-5-18 16:42:43"), raw.date_utc.as_deref());
    }

    #[test]
    fn test_parse_query_missing_identity() {
        let err = parse_query(&[("tempf", "72.5")]).unwrap_err();
        assert_eq!(
            ParseError::MissingIdentity {
                vendor: Vendor::Wunderground,
                arg: "ID"
            },
            err
        );

        let err = parse_query(&[("ID", "abc"), ("PASSWORD", "")]).unwrap_err();
        assert_eq!(
            ParseError::MissingIdentity {
                vendor: Vendor::Wunderground,
                arg: "PASSWORD"
            },
            err
        );
    }

    #[test]
    fn test_parse_segments_pairs() {
        let segments = ["wid", "12345", "key", "abc", "bar", "10130", "temp", "-12", "hum"];
        let raw = parse_segments(&segments).unwrap();
        assert_eq!("12345", raw.station_id);
        assert_eq!("abc", raw.station_key);
        assert_eq!(Some(RawValue::Integer(10130)), value(&raw, "barometer"));
        assert_eq!(Some(RawValue::Integer(-12)), value(&raw, "temperature"));
        assert_eq!(None, value(&raw, "humidity"));
    }

    #[test]
    fn test_parse_segments_last_duplicate_wins() {
        let raw = parse_segments(&["wid", "1", "key", "2", "temp", "100", "temp", "120"]).unwrap();
        assert_eq!(Some(RawValue::Integer(120)), value(&raw, "temperature"));
    }

    #[test]
    fn test_parse_segments_decodes_and_skips_malformed() {
        let raw = parse_segments(&["wid", "my%20station", "key", "k", "temp", "16.4", "hum", "80"]).unwrap();
        assert_eq!("my station", raw.station_id);
        assert_eq!(None, value(&raw, "temperature"));
        assert_eq!(Some(RawValue::Integer(80)), value(&raw, "humidity"));
    }

    #[test]
    fn test_parse_segments_missing_identity() {
        let err = parse_segments(&["key", "abc", "temp", "160"]).unwrap_err();
        assert_eq!(
            ParseError::MissingIdentity {
                vendor: Vendor::Weathercloud,
                arg: "wid"
            },
            err
        );
    }
}
