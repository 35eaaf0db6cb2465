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

use axum::http::Uri;
use axum::Router;
use cloudweather_proxy::listener::{
    CloudWeatherListener, ForwardMode, ListenerConfig, ListenerError, ListenerState,
};
use cloudweather_proxy::proxy::{DataSink, ProxyConfig};
use cloudweather_proxy::station::SensorKind;
use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn local_config() -> ListenerConfig {
    ListenerConfig {
        bind: "127.0.0.1:0".parse().unwrap(),
        forward_mode: ForwardMode::Inline,
        ..ListenerConfig::default()
    }
}

/// Stand-in for a vendor cloud that records the path and query of each request.
async fn fake_vendor() -> (SocketAddr, Arc<Mutex<Vec<String>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    let app = Router::new().fallback(move |uri: Uri| {
        let log = Arc::clone(&log);
        async move {
            log.lock().unwrap().push(uri.to_string());
            "success"
        }
    });

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let addr = listener.local_addr().unwrap();
    let server = axum::Server::from_tcp(listener).unwrap().serve(app.into_make_service());
    tokio::spawn(server);

    (addr, seen)
}

#[tokio::test]
async fn test_start_serves_uploads_over_http() {
    let listener = CloudWeatherListener::new(local_config(), ProxyConfig::disabled()).unwrap();
    let addr = listener.start().await.unwrap();
    assert_eq!(ListenerState::Listening, listener.state());
    assert_eq!(Some(addr), listener.local_addr());

    let res = reqwest::Client::new()
        .get(format!(
            "http://{}/weatherstation/updateweatherstation.php?ID=KMA1&PASSWORD=pw&tempf=72.5&humidity=44",
            addr
        ))
        .header("User-Agent", "EasyWeather/1.6")
        .send()
        .await
        .unwrap();

    assert_eq!(200, res.status().as_u16());
    assert_eq!("OK", res.text().await.unwrap());

    let reading = listener.last_reading("KMA1").unwrap();
    assert_eq!(22.5, reading.sensor(SensorKind::Temperature).unwrap().value);
    assert_eq!(Some("EasyWeather/1.6"), reading.client_software_version.as_deref());
    assert_eq!(Some("127.0.0.1"), reading.client_ip.as_deref());

    listener.stop().await;
    assert_eq!(ListenerState::Stopped, listener.state());
    assert_eq!(None, listener.local_addr());
}

#[tokio::test]
async fn test_start_bind_failure() {
    let taken = TcpListener::bind("127.0.0.1:0").unwrap();
    let config = ListenerConfig {
        bind: taken.local_addr().unwrap(),
        ..local_config()
    };

    let listener = CloudWeatherListener::new(config, ProxyConfig::disabled()).unwrap();
    let res = listener.start().await;

    assert!(matches!(res, Err(ListenerError::Bind(_, _))));
    assert_eq!(ListenerState::Stopped, listener.state());
}

#[tokio::test]
async fn test_start_twice() {
    let listener = CloudWeatherListener::new(local_config(), ProxyConfig::disabled()).unwrap();
    listener.start().await.unwrap();

    assert!(matches!(listener.start().await, Err(ListenerError::AlreadyStarted)));
    listener.stop().await;
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let listener = CloudWeatherListener::new(local_config(), ProxyConfig::disabled()).unwrap();
    listener.stop().await;
    assert_eq!(ListenerState::Stopped, listener.state());

    listener.start().await.unwrap();
    listener.stop().await;
    listener.stop().await;
    assert_eq!(ListenerState::Stopped, listener.state());

    // Stopped listeners may be started again.
    listener.start().await.unwrap();
    listener.stop().await;
}

#[tokio::test]
async fn test_concurrent_stations_are_isolated() {
    let listener = CloudWeatherListener::new(local_config(), ProxyConfig::disabled()).unwrap();
    let addr = listener.start().await.unwrap();
    let client = reqwest::Client::new();

    let mut requests = Vec::new();
    for i in 0..10 {
        let client = client.clone();
        let url = if i % 2 == 0 {
            format!("http://{}/weathercloud/v01/set/wid/even/key/k/temp/{}", addr, 100 + i)
        } else {
            format!(
                "http://{}/weatherstation/updateweatherstation.php?ID=odd&PASSWORD=k&humidity={}",
                addr, i
            )
        };
        requests.push(tokio::spawn(async move { client.get(url).send().await.unwrap().status().as_u16() }));
    }

    for r in requests {
        assert_eq!(200, r.await.unwrap());
    }

    assert_eq!(vec!["even".to_owned(), "odd".to_owned()], listener.stations());

    let even = listener.last_reading("even").unwrap();
    assert!(even.sensor(SensorKind::Temperature).is_some());
    assert!(even.sensor(SensorKind::Humidity).is_none());

    let odd = listener.last_reading("odd").unwrap();
    assert!(odd.sensor(SensorKind::Humidity).is_some());
    assert!(odd.sensor(SensorKind::Temperature).is_none());

    listener.stop().await;
}

#[tokio::test]
async fn test_forward_to_enabled_sinks() {
    let (vendor, seen) = fake_vendor().await;
    let mut config = local_config();
    config.endpoints.wunderground = format!("http://{}/weatherstation/updateweatherstation.php", vendor);
    config.endpoints.weathercloud = format!("http://{}", vendor);

    let proxy = ProxyConfig::new([DataSink::Wunderground, DataSink::Weathercloud], Vec::new());
    let listener = CloudWeatherListener::new(config, proxy).unwrap();
    let addr = listener.start().await.unwrap();
    let client = reqwest::Client::new();

    let res = client
        .get(format!(
            "http://{}/wunderground/weatherstation/updateweatherstation.php?ID=a&PASSWORD=b&tempf=50",
            addr
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(200, res.status().as_u16());

    let res = client
        .get(format!("http://{}/weathercloud/v01/set/wid/c/key/d/temp/100", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(200, res.status().as_u16());

    assert_eq!(
        vec![
            "/weatherstation/updateweatherstation.php?ID=a&PASSWORD=b&tempf=50".to_owned(),
            "/v01/set/wid/c/key/d/temp/100".to_owned(),
        ],
        *seen.lock().unwrap()
    );

    listener.stop().await;
}

#[tokio::test]
async fn test_forward_only_matching_sink() {
    let (vendor, seen) = fake_vendor().await;
    let mut config = local_config();
    config.endpoints.wunderground = format!("http://{}/weatherstation/updateweatherstation.php", vendor);
    config.endpoints.weathercloud = format!("http://{}", vendor);

    let proxy = ProxyConfig::new([DataSink::Weathercloud], Vec::new());
    let listener = CloudWeatherListener::new(config, proxy).unwrap();
    let addr = listener.start().await.unwrap();
    let client = reqwest::Client::new();

    client
        .get(format!("http://{}/weatherstation/updateweatherstation.php?ID=a&PASSWORD=b", addr))
        .send()
        .await
        .unwrap();
    assert!(seen.lock().unwrap().is_empty());

    listener.update_proxy_config(BTreeSet::new(), Vec::new()).unwrap();
    client
        .get(format!("http://{}/weathercloud/v01/set/wid/c/key/d/temp/100", addr))
        .send()
        .await
        .unwrap();
    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(vec!["a".to_owned(), "c".to_owned()], listener.stations());

    listener.stop().await;
}

#[tokio::test]
async fn test_detached_forward_reaches_vendor() {
    let (vendor, seen) = fake_vendor().await;
    let mut config = ListenerConfig {
        forward_mode: ForwardMode::Detached,
        ..local_config()
    };
    config.endpoints.weathercloud = format!("http://{}", vendor);

    let proxy = ProxyConfig::new([DataSink::Weathercloud], Vec::new());
    let listener = CloudWeatherListener::new(config, proxy).unwrap();
    let addr = listener.start().await.unwrap();

    let res = reqwest::Client::new()
        .get(format!("http://{}/weathercloud/v01/set/wid/a/key/b/temp/10", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(200, res.status().as_u16());
    assert!(listener.last_reading("a").is_some());

    // The forward runs on its own task, wait for it to land.
    for _ in 0..100 {
        if !seen.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(vec!["/v01/set/wid/a/key/b/temp/10".to_owned()], *seen.lock().unwrap());
    listener.stop().await;
}

#[tokio::test]
async fn test_forward_resolves_hostname_with_configured_nameservers() {
    let (vendor, seen) = fake_vendor().await;
    let mut config = local_config();
    config.endpoints.weathercloud = format!("http://localhost:{}", vendor.port());

    let dns = vec![IpAddr::V4(Ipv4Addr::LOCALHOST)];
    let proxy = ProxyConfig::new([DataSink::Weathercloud], dns);
    let listener = CloudWeatherListener::new(config, proxy).unwrap();
    let addr = listener.start().await.unwrap();

    let res = reqwest::Client::new()
        .get(format!("http://{}/weathercloud/v01/set/wid/a/key/b/temp/10", addr))
        .send()
        .await
        .unwrap();

    assert_eq!(200, res.status().as_u16());
    assert_eq!(vec!["/v01/set/wid/a/key/b/temp/10".to_owned()], *seen.lock().unwrap());
    listener.stop().await;
}

#[tokio::test]
async fn test_unresolvable_vendor_is_not_fatal() {
    let mut config = local_config();
    config.endpoints.wunderground = "http://vendor.invalid/weatherstation/updateweatherstation.php".into();

    // Nothing answers DNS on loopback.
    let dns = vec![IpAddr::V4(Ipv4Addr::LOCALHOST)];
    let proxy = ProxyConfig::new([DataSink::Wunderground], dns);
    let listener = CloudWeatherListener::new(config, proxy).unwrap();
    let addr = listener.start().await.unwrap();

    let res = reqwest::Client::new()
        .get(format!(
            "http://{}/weatherstation/updateweatherstation.php?ID=a&PASSWORD=b&tempf=50",
            addr
        ))
        .send()
        .await
        .unwrap();

    assert_eq!(200, res.status().as_u16());
    assert_eq!("OK", res.text().await.unwrap());
    assert!(listener.last_reading("a").is_some());
    listener.stop().await;
}
