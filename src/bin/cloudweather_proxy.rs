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

use clap::Parser;
use cloudweather_proxy::listener::{CloudWeatherListener, ForwardMode, ListenerConfig, DEFAULT_PORT};
use cloudweather_proxy::metrics::StationMetrics;
use cloudweather_proxy::observer::ObserverError;
use cloudweather_proxy::proxy::{DataSink, ProxyConfig};
use cloudweather_proxy::station::WeatherStation;
use prometheus_client::registry::Registry;
use std::error::Error;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::process;
use std::sync::Arc;
use tokio::signal::unix::{self, SignalKind};
use tracing::Level;

const DEFAULT_LOG_LEVEL: Level = Level::INFO;
const DEFAULT_BIND_ADDR: ([u8; 4], u16) = ([0, 0, 0, 0], DEFAULT_PORT);
const DEFAULT_DNS_SERVERS: &str = "9.9.9.9";

#[derive(Debug, Parser)]
#[clap(name = "cloudweather_proxy", version = clap::crate_version!())]
struct CloudWeatherProxyApplication {
    /// Address to bind to. Stations must be able to reach this address, usually via a
    /// local DNS override of the vendor hostnames and a port forward from port 80.
    #[clap(long, default_value_t = DEFAULT_BIND_ADDR.into())]
    bind: SocketAddr,

    /// Logging verbosity. Allowed values are 'trace', 'debug', 'info', 'warn', and 'error'
    /// (case insensitive)
    #[clap(long, default_value_t = DEFAULT_LOG_LEVEL)]
    log_level: Level,

    /// Vendor clouds to forward uploads to, comma separated. Allowed values are
    /// 'wunderground' and 'weathercloud'. Nothing is forwarded by default.
    #[clap(long, value_delimiter = ',')]
    forward: Vec<DataSink>,

    /// Nameservers used to resolve vendor hostnames when forwarding, comma separated.
    #[clap(long, value_delimiter = ',', default_value = DEFAULT_DNS_SERVERS)]
    dns_servers: Vec<IpAddr>,

    /// Wait for forwarding to finish before responding to the station.
    #[clap(long)]
    await_forward: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let opts = CloudWeatherProxyApplication::parse();
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(opts.log_level)
            .finish(),
    )
    .expect("failed to set tracing subscriber");

    let config = ListenerConfig {
        bind: opts.bind,
        forward_mode: if opts.await_forward {
            ForwardMode::Inline
        } else {
            ForwardMode::Detached
        },
        ..ListenerConfig::default()
    };

    let mut registry = Registry::default();
    let metrics = StationMetrics::new(&mut registry);

    let proxy = ProxyConfig::new(opts.forward.iter().copied(), opts.dns_servers.clone());
    let listener = CloudWeatherListener::new(config, proxy)
        .unwrap_or_else(|e| {
            tracing::error!(message = "unable to initialize forwarding proxy", error = %e);
            process::exit(1)
        })
        .with_metrics(Arc::new(registry));

    listener.subscribe(Arc::new(metrics));
    listener.subscribe(Arc::new(|r: &WeatherStation| -> Result<(), ObserverError> {
        tracing::info!(
            message = "received station update",
            station = %r.station_id,
            vendor = r.vendor.display_name(),
            sensors = r.len(),
            client_ip = ?r.client_ip,
        );

        for (kind, sensor) in r.sensors() {
            tracing::debug!(
                message = "sensor reading",
                station = %r.station_id,
                sensor = kind.display_name(),
                value = sensor.value,
                unit = %sensor.unit,
            );
        }
        Ok(())
    }));

    let addr = listener.start().await.unwrap_or_else(|e| {
        tracing::error!(message = "error binding to address", address = %opts.bind, error = %e);
        process::exit(1)
    });

    tracing::info!(
        message = "server started",
        address = %addr,
        forward = ?listener.active_sinks(),
        dns_servers = ?listener.dns_servers(),
    );

    // Wait for either SIGTERM or SIGINT to shutdown
    tokio::select! {
        _ = sigterm() => {}
        _ = sigint() => {}
    }

    listener.stop().await;
    tracing::info!("server shutdown");
    Ok(())
}

/// Return after the first SIGTERM signal received by this process
async fn sigterm() -> io::Result<()> {
    unix::signal(SignalKind::terminate())?.recv().await;
    Ok(())
}

/// Return after the first SIGINT signal received by this process
async fn sigint() -> io::Result<()> {
    unix::signal(SignalKind::interrupt())?.recv().await;
    Ok(())
}
