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

//! Local receiver and forwarder for weather station uploads
//!
//! ## Features
//!
//! Many consumer weather stations can only report to a fixed set of cloud services. `cloudweather_proxy`
//! accepts those uploads on the local network instead, normalizes them into metric units, and hands each
//! reading to registered observers. Optionally, the original upload is forwarded to the vendor cloud it
//! was meant for so the station keeps reporting there as well.
//!
//! Two upload dialects are supported.
//!
//! * Weather Underground: `GET .../weatherstation/updateweatherstation.php?ID=...&PASSWORD=...&tempf=...`
//!   with imperial values in the query string.
//! * Weathercloud: `GET .../v01/set/wid/.../key/.../temp/...` with fixed-point metric values (tenths) as
//!   alternating key and value path segments.
//!
//! When the daemon is run with metrics enabled, the following are emitted.
//!
//! * `cloudweather_sensor{station=$STATION, vendor=$VENDOR, sensor=$SENSOR, unit=$UNIT}` - Latest value of
//!   each sensor, in metric units.
//! * `cloudweather_station_updates_total{station=$STATION, vendor=$VENDOR}` - Uploads accepted per station.
//! * `cloudweather_station_last_update_timestamp_seconds{station=$STATION}` - Time of the last upload.
//!
//! ## Build
//!
//! `cloudweather_proxy` is a Rust program and must be built from source using a
//! [Rust toolchain](https://rustup.rs/).
//!
//! ```text
//! git clone git@github.com:56quarters/cloudweather_proxy.git && cd cloudweather_proxy
//! cargo build --release
//! ```
//!
//! ## Usage
//!
//! ### Pointing a station at the proxy
//!
//! Stations upload to hard coded hostnames, so the local DNS server has to answer for the vendor hosts
//! (`rtupdate.wunderground.com` and `api.weathercloud.net`) with the address of the machine running
//! `cloudweather_proxy`, and port 80 has to reach the port it listens on. Because of this override,
//! forwarded uploads are resolved using the nameservers given by `--dns-servers` instead of the
//! system resolver.
//!
//! ```text
//! ./cloudweather_proxy --bind 0.0.0.0:49199 --forward wunderground,weathercloud
//! ```
//!
//! ### Endpoints
//!
//! * `/metrics` - Prometheus metrics for every station that has reported.
//! * `/stations` - JSON array with the last reading of every station that has reported.
//!
//! Any other path is treated as a station upload.
//!

pub mod dns;
pub mod http;
pub mod listener;
pub mod metrics;
pub mod observer;
pub mod parser;
pub mod proxy;
pub mod registry;
pub mod schema;
pub mod station;
pub mod transform;
pub mod units;

pub use listener::{CloudWeatherListener, ForwardMode, ListenerConfig, ListenerError, ListenerState};
pub use proxy::{DataSink, ProxyConfig};
pub use station::{Sensor, SensorKind, Vendor, WeatherStation};
