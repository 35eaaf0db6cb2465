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

use crate::units::Unit;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

/// The cloud vendor whose upload format a reading arrived in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    Wunderground,
    Weathercloud,
}

impl Vendor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wunderground => "wunderground",
            Self::Weathercloud => "weathercloud",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Wunderground => "Weather Underground",
            Self::Weathercloud => "Weathercloud.net",
        }
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Physical quantities a station may report. Every reading carries at most one
/// value for each of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    Barometer,
    AbsBarometer,
    Temperature,
    Temperature2,
    TempHumidityWind,
    Humidity,
    Humidity2,
    IndoorTemperature,
    IndoorHumidity,
    Dewpoint,
    DewpointIndoor,
    Rain,
    DailyRain,
    WeeklyRain,
    MonthlyRain,
    WindDirection,
    WindSpeed,
    WindGustSpeed,
    WindGustDirection,
    WindSpeedAvg,
    WindDirectionAvg,
    WindGustSpeed10m,
    WindGustDirection10m,
    WindChill,
    Uv,
    SolarRadiation,
    Visibility,
    HeatIndex,
    HeatIndexIndoor,
}

impl SensorKind {
    pub const ALL: [SensorKind; 29] = [
        Self::Barometer,
        Self::AbsBarometer,
        Self::Temperature,
        Self::Temperature2,
        Self::TempHumidityWind,
        Self::Humidity,
        Self::Humidity2,
        Self::IndoorTemperature,
        Self::IndoorHumidity,
        Self::Dewpoint,
        Self::DewpointIndoor,
        Self::Rain,
        Self::DailyRain,
        Self::WeeklyRain,
        Self::MonthlyRain,
        Self::WindDirection,
        Self::WindSpeed,
        Self::WindGustSpeed,
        Self::WindGustDirection,
        Self::WindSpeedAvg,
        Self::WindDirectionAvg,
        Self::WindGustSpeed10m,
        Self::WindGustDirection10m,
        Self::WindChill,
        Self::Uv,
        Self::SolarRadiation,
        Self::Visibility,
        Self::HeatIndex,
        Self::HeatIndexIndoor,
    ];

    /// Stable identifier, used as the sensor name and as a metrics label.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Barometer => "barometer",
            Self::AbsBarometer => "absbarometer",
            Self::Temperature => "temperature",
            Self::Temperature2 => "temperature2",
            Self::TempHumidityWind => "temphumiditywind",
            Self::Humidity => "humidity",
            Self::Humidity2 => "humidity2",
            Self::IndoorTemperature => "indoortemperature",
            Self::IndoorHumidity => "indoorhumidity",
            Self::Dewpoint => "dewpoint",
            Self::DewpointIndoor => "dewpointindoor",
            Self::Rain => "rain",
            Self::DailyRain => "dailyrain",
            Self::WeeklyRain => "weeklyrain",
            Self::MonthlyRain => "monthlyrain",
            Self::WindDirection => "winddirection",
            Self::WindSpeed => "windspeed",
            Self::WindGustSpeed => "windgustspeed",
            Self::WindGustDirection => "windgustdirection",
            Self::WindSpeedAvg => "windspeedavg",
            Self::WindDirectionAvg => "winddirectionavg",
            Self::WindGustSpeed10m => "windgustspeed10m",
            Self::WindGustDirection10m => "windgustdirection10m",
            Self::WindChill => "windchill",
            Self::Uv => "uv",
            Self::SolarRadiation => "solarradiation",
            Self::Visibility => "visibility",
            Self::HeatIndex => "heatindex",
            Self::HeatIndexIndoor => "heatindexindoor",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Barometer => "Barometric Pressure",
            Self::AbsBarometer => "Absolute Pressure",
            Self::Temperature => "Outdoor Temperature",
            Self::Temperature2 => "Outdoor Temperature #2",
            Self::TempHumidityWind => "Temperature-Humidity-Wind Index",
            Self::Humidity => "Outdoor Humidity",
            Self::Humidity2 => "Outdoor Humidity #2",
            Self::IndoorTemperature => "Indoor Temperature",
            Self::IndoorHumidity => "Indoor Humidity",
            Self::Dewpoint => "Outdoor Dewpoint",
            Self::DewpointIndoor => "Indoor Dewpoint",
            Self::Rain => "Rain Rate",
            Self::DailyRain => "Daily Rain",
            Self::WeeklyRain => "Weekly Rain",
            Self::MonthlyRain => "Monthly Rain",
            Self::WindDirection => "Wind Direction",
            Self::WindSpeed => "Wind Speed",
            Self::WindGustSpeed => "Wind Gust",
            Self::WindGustDirection => "Wind Gust Direction",
            Self::WindSpeedAvg => "Wind Speed Average",
            Self::WindDirectionAvg => "Wind Direction Average",
            Self::WindGustSpeed10m => "Wind Gust Speed (10m)",
            Self::WindGustDirection10m => "Wind Gust Direction (10m)",
            Self::WindChill => "Wind Chill",
            Self::Uv => "UV Index",
            Self::SolarRadiation => "Solar Radiation",
            Self::Visibility => "Visibility",
            Self::HeatIndex => "Heat Index",
            Self::HeatIndexIndoor => "Indoor Heat Index",
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A single normalized value along with the unit it is expressed in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sensor {
    pub name: &'static str,
    pub value: f64,
    pub unit: Unit,
}

impl Sensor {
    pub fn new(kind: SensorKind, value: f64, unit: Unit) -> Self {
        Sensor {
            name: kind.key(),
            value,
            unit,
        }
    }
}

/// Information about the request a reading arrived on, stamped by the listener.
#[derive(Debug, Clone)]
pub struct Arrival {
    pub time: Instant,
    pub software_version: Option<String>,
    pub client_ip: Option<String>,
}

/// Vendor agnostic snapshot of one station's sensors at one point in time.
///
/// Readings are built in one step by a vendor transform and are replaced, not
/// updated, when a station reports again. Only the station ID and key are
/// guaranteed to be present; any sensor the upload didn't include is absent.
#[derive(Debug, Clone, Serialize)]
pub struct WeatherStation {
    pub station_id: String,
    pub station_key: String,
    pub vendor: Vendor,
    pub client_software_version: Option<String>,
    pub client_ip: Option<String>,
    #[serde(skip)]
    pub update_time: Option<Instant>,
    pub date_utc: Option<String>,
    sensors: BTreeMap<SensorKind, Sensor>,
}

impl WeatherStation {
    pub fn new(
        station_id: String,
        station_key: String,
        vendor: Vendor,
        date_utc: Option<String>,
        sensors: BTreeMap<SensorKind, Sensor>,
    ) -> Self {
        WeatherStation {
            station_id,
            station_key,
            vendor,
            client_software_version: None,
            client_ip: None,
            update_time: None,
            date_utc,
            sensors,
        }
    }

    /// Return this reading with arrival metadata attached.
    pub fn stamped(self, arrival: Arrival) -> Self {
        WeatherStation {
            update_time: Some(arrival.time),
            client_software_version: arrival.software_version,
            client_ip: arrival.client_ip,
            ..self
        }
    }

    pub fn sensor(&self, kind: SensorKind) -> Option<&Sensor> {
        self.sensors.get(&kind)
    }

    /// Present sensors, ordered by kind.
    pub fn sensors(&self) -> impl Iterator<Item = (SensorKind, &Sensor)> {
        self.sensors.iter().map(|(k, s)| (*k, s))
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }
}
