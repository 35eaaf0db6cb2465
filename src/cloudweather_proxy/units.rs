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

use serde::{Serialize, Serializer};
use std::error;
use std::fmt;

/// Units of measure that appear on the wire or in normalized readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Unit {
    InchesOfMercury,
    Hectopascals,
    Fahrenheit,
    Celsius,
    Inches,
    Millimeters,
    MillimetersPerHour,
    MilesPerHour,
    MetersPerSecond,
    Kilometers,
    Percent,
    Degrees,
    UvIndex,
    Lux,
    WattsPerSquareMeter,
}

impl Unit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InchesOfMercury => "inHg",
            Self::Hectopascals => "hPa",
            Self::Fahrenheit => "°F",
            Self::Celsius => "°C",
            Self::Inches => "in",
            Self::Millimeters => "mm",
            Self::MillimetersPerHour => "mm/h",
            Self::MilesPerHour => "mph",
            Self::MetersPerSecond => "m/s",
            Self::Kilometers => "km",
            Self::Percent => "%",
            Self::Degrees => "°",
            Self::UvIndex => "UV index",
            Self::Lux => "lx",
            Self::WattsPerSquareMeter => "W/m²",
        }
    }

    /// Converter from this (imperial) unit to its metric counterpart, if one exists.
    pub fn to_metric(&self) -> Option<Conversion> {
        match self {
            Self::InchesOfMercury => Some(INHG_TO_HPA),
            Self::Fahrenheit => Some(FAHRENHEIT_TO_CELSIUS),
            Self::Inches => Some(IN_TO_MM),
            Self::MilesPerHour => Some(MPH_TO_MS),
            _ => None,
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Unit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversionError {
    pub from: Unit,
    pub to: Unit,
    pub value: f64,
}

impl fmt::Display for ConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot convert non-finite value {} from {} to {}", self.value, self.from, self.to)
    }
}

impl error::Error for ConversionError {}

/// A pure unit conversion tagged with the unit it produces.
#[derive(Clone, Copy)]
pub struct Conversion {
    pub from: Unit,
    pub to: Unit,
    func: fn(f64) -> f64,
}

impl Conversion {
    /// Apply the conversion. Non-finite input (`NaN`, `inf`) is rejected rather
    /// than silently carried into a reading.
    pub fn apply(&self, value: f64) -> Result<f64, ConversionError> {
        let out = (self.func)(value);
        if value.is_finite() && out.is_finite() {
            Ok(out)
        } else {
            Err(ConversionError {
                from: self.from,
                to: self.to,
                value,
            })
        }
    }
}

impl fmt::Debug for Conversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conversion")
            .field("from", &self.from)
            .field("to", &self.to)
            .finish()
    }
}

pub const FAHRENHEIT_TO_CELSIUS: Conversion = Conversion {
    from: Unit::Fahrenheit,
    to: Unit::Celsius,
    func: fahrenheit_to_celsius,
};

pub const INHG_TO_HPA: Conversion = Conversion {
    from: Unit::InchesOfMercury,
    to: Unit::Hectopascals,
    func: inhg_to_hpa,
};

pub const IN_TO_MM: Conversion = Conversion {
    from: Unit::Inches,
    to: Unit::Millimeters,
    func: in_to_mm,
};

pub const MPH_TO_MS: Conversion = Conversion {
    from: Unit::MilesPerHour,
    to: Unit::MetersPerSecond,
    func: mph_to_ms,
};

pub fn fahrenheit_to_celsius(temp: f64) -> f64 {
    (temp - 32.0) * 5.0 / 9.0
}

/// Approximation, 1 inHg is 33.864 hPa to three decimals.
pub fn inhg_to_hpa(pressure: f64) -> f64 {
    pressure * 33.864
}

pub fn in_to_mm(length: f64) -> f64 {
    length * 25.4
}

pub fn mph_to_ms(speed: f64) -> f64 {
    speed * 0.44704
}
