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

//! Request handling pipeline and server lifecycle.

use crate::http::{self, HttpContext, RequestGuard};
use crate::observer::{Observer, ObserverList, Subscription};
use crate::parser::{self, ParseError};
use crate::proxy::{
    CloudWeatherProxy, DataSink, ForwardRequest, ProxyConfig, ProxyEndpoints, ProxyError,
    WEATHERCLOUD_MARKER,
};
use crate::registry::StationRegistry;
use crate::station::{Arrival, WeatherStation};
use axum::Router;
use prometheus_client::registry::Registry;
use std::collections::BTreeSet;
use std::error;
use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use url::form_urlencoded;

pub const DEFAULT_PORT: u16 = 49199;

/// Path suffix of query string uploads.
pub const WUNDERGROUND_PATH: &str = "/weatherstation/updateweatherstation.php";

/// Whether the station's response waits for forwarding to finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForwardMode {
    /// Forward on a separate task and respond right away.
    #[default]
    Detached,
    /// Forward before responding.
    Inline,
}

#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub bind: SocketAddr,
    pub forward_mode: ForwardMode,
    pub endpoints: ProxyEndpoints,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        ListenerConfig {
            bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
            forward_mode: ForwardMode::default(),
            endpoints: ProxyEndpoints::default(),
        }
    }
}

#[derive(Debug)]
pub enum IngestError {
    NotFound(String),
    MethodNotAllowed(String),
    Parse(ParseError),
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(p) => write!(f, "no upload endpoint at {}", p),
            Self::MethodNotAllowed(m) => write!(f, "unsupported method {}", m),
            Self::Parse(e) => write!(f, "{}", e),
        }
    }
}

impl error::Error for IngestError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Parse(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ParseError> for IngestError {
    fn from(e: ParseError) -> Self {
        Self::Parse(e)
    }
}

#[derive(Debug)]
pub enum ListenerError {
    Bind(SocketAddr, io::Error),
    AlreadyStarted,
    Proxy(ProxyError),
}

impl fmt::Display for ListenerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bind(addr, e) => write!(f, "unable to bind to {}: {}", addr, e),
            Self::AlreadyStarted => write!(f, "listener already started"),
            Self::Proxy(e) => write!(f, "{}", e),
        }
    }
}

impl error::Error for ListenerError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Bind(_, e) => Some(e),
            Self::Proxy(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ProxyError> for ListenerError {
    fn from(e: ProxyError) -> Self {
        Self::Proxy(e)
    }
}

/// An inbound upload, independent of the HTTP server that received it.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub user_agent: Option<String>,
    pub real_ip: Option<String>,
    pub peer: Option<SocketAddr>,
}

impl InboundRequest {
    /// A GET for `path_and_query` with no headers or peer, mostly for tests.
    pub fn get(path_and_query: &str) -> Self {
        let (path, query) = match path_and_query.split_once('?') {
            Some((p, q)) => (p, Some(q.to_owned())),
            None => (path_and_query, None),
        };

        InboundRequest {
            method: "GET".to_owned(),
            path: path.to_owned(),
            query,
            user_agent: None,
            real_ip: None,
            peer: None,
        }
    }

    fn client_ip(&self) -> Option<String> {
        self.real_ip
            .clone()
            .or_else(|| self.peer.map(|p| p.ip().to_string()))
    }
}

/// Which dialect an upload path belongs to, if any.
pub fn route(path: &str) -> Option<DataSink> {
    if path.ends_with(WUNDERGROUND_PATH) {
        Some(DataSink::Wunderground)
    } else if path.contains(WEATHERCLOUD_MARKER) {
        Some(DataSink::Weathercloud)
    } else {
        None
    }
}

fn parse(sink: DataSink, req: &InboundRequest) -> Result<WeatherStation, ParseError> {
    match sink {
        DataSink::Wunderground => {
            let pairs: Vec<(String, String)> = req
                .query
                .as_deref()
                .map(|q| form_urlencoded::parse(q.as_bytes()).into_owned().collect())
                .unwrap_or_default();
            parser::wunderground(&pairs)
        }
        DataSink::Weathercloud => {
            let payload = req
                .path
                .find(WEATHERCLOUD_MARKER)
                .map(|i| &req.path[i + WEATHERCLOUD_MARKER.len()..])
                .unwrap_or("");
            let payload = payload.strip_prefix('/').unwrap_or(payload);
            let segments: Vec<&str> = if payload.is_empty() {
                Vec::new()
            } else {
                payload.split('/').collect()
            };
            parser::weathercloud(&segments)
        }
    }
}

/// State shared by every request a listener handles.
pub struct IngestCore {
    registry: StationRegistry,
    observers: ObserverList,
    proxy: CloudWeatherProxy,
    forward_mode: ForwardMode,
}

impl IngestCore {
    pub fn new(proxy: CloudWeatherProxy, forward_mode: ForwardMode) -> Self {
        IngestCore {
            registry: StationRegistry::new(),
            observers: ObserverList::new(),
            proxy,
            forward_mode,
        }
    }

    pub fn registry(&self) -> &StationRegistry {
        &self.registry
    }

    /// Parse, record, and publish a single upload, forwarding it upstream if
    /// enabled for its vendor.
    ///
    /// Nothing is recorded or forwarded when the upload can't be parsed.
    /// Observer and forwarding failures are logged and never change the result.
    pub async fn handle(&self, req: InboundRequest) -> Result<WeatherStation, IngestError> {
        if !req.method.eq_ignore_ascii_case("GET") {
            return Err(IngestError::MethodNotAllowed(req.method));
        }

        let sink = route(&req.path).ok_or_else(|| IngestError::NotFound(req.path.clone()))?;
        let parsed = parse(sink, &req)?;

        let now = Instant::now();
        if self.registry.touch(&parsed.station_id, now) {
            tracing::debug!(
                message = "found new station",
                station = %parsed.station_id,
                vendor = %parsed.vendor,
            );
        }

        let reading = parsed.stamped(Arrival {
            time: now,
            software_version: req.user_agent.clone(),
            client_ip: req.client_ip(),
        });

        self.observers.notify(&reading);

        let session = self.proxy.session();
        if session.is_enabled(sink) {
            let forward = ForwardRequest::new(req.path.clone(), req.query.as_deref());
            let station = reading.station_id.clone();
            let task = async move {
                match session.forward(sink, &forward).await {
                    Ok(res) => {
                        tracing::debug!(
                            message = "forwarded upload",
                            sink = %sink,
                            station = %station,
                            status = %res.status,
                            body = %res.body,
                        );
                    }
                    Err(e) => {
                        tracing::warn!(
                            message = "failed to forward upload",
                            sink = %sink,
                            station = %station,
                            error = %e,
                        );
                    }
                }
            };

            match self.forward_mode {
                ForwardMode::Inline => task.await,
                ForwardMode::Detached => {
                    tokio::spawn(task);
                }
            }
        }

        self.registry.store(reading.clone());
        Ok(reading)
    }
}

/// Lifecycle of the HTTP server owned by a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Stopped,
    Starting,
    Listening,
    Stopping,
}

enum ServerState {
    Stopped,
    Starting,
    Listening(RunningServer),
    Stopping,
}

struct RunningServer {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Receives station uploads over HTTP, normalizes them, and hands them to
/// observers and (optionally) the vendor clouds.
pub struct CloudWeatherListener {
    config: ListenerConfig,
    core: Arc<IngestCore>,
    metrics: Option<Arc<Registry>>,
    guard: Option<Arc<dyn RequestGuard>>,
    server: Mutex<ServerState>,
}

impl CloudWeatherListener {
    pub fn new(config: ListenerConfig, proxy: ProxyConfig) -> Result<Self, ListenerError> {
        let proxy = CloudWeatherProxy::new(proxy, config.endpoints.clone())?;
        let core = Arc::new(IngestCore::new(proxy, config.forward_mode));

        Ok(CloudWeatherListener {
            config,
            core,
            metrics: None,
            guard: None,
            server: Mutex::new(ServerState::Stopped),
        })
    }

    /// Serve the given registry at `/metrics`.
    pub fn with_metrics(mut self, registry: Arc<Registry>) -> Self {
        self.metrics = Some(registry);
        self
    }

    /// Reject requests the guard doesn't authorize with a 401.
    pub fn with_guard(mut self, guard: Arc<dyn RequestGuard>) -> Self {
        self.guard = Some(guard);
        self
    }

    fn server(&self) -> MutexGuard<'_, ServerState> {
        self.server.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn core(&self) -> &Arc<IngestCore> {
        &self.core
    }

    /// Router serving the upload endpoints, for embedding in another server.
    pub fn router(&self) -> Router {
        http::router(Arc::new(HttpContext {
            core: Arc::clone(&self.core),
            metrics: self.metrics.clone(),
            guard: self.guard.clone(),
        }))
    }

    /// Bind the configured address and start serving, returning the bound address.
    pub async fn start(&self) -> Result<SocketAddr, ListenerError> {
        {
            let mut server = self.server();
            match *server {
                ServerState::Stopped => *server = ServerState::Starting,
                _ => return Err(ListenerError::AlreadyStarted),
            }
        }

        let bound = TcpListener::bind(self.config.bind)
            .and_then(|l| l.set_nonblocking(true).map(|_| l))
            .and_then(|l| l.local_addr().map(|a| (l, a)))
            .map_err(|e| ListenerError::Bind(self.config.bind, e))
            .and_then(|(l, addr)| {
                axum::Server::from_tcp(l)
                    .map(|b| (b, addr))
                    .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
                    .map_err(|e| ListenerError::Bind(self.config.bind, e))
            });

        let (builder, addr) = match bound {
            Ok(v) => v,
            Err(e) => {
                *self.server() = ServerState::Stopped;
                return Err(e);
            }
        };

        let (tx, rx) = oneshot::channel::<()>();
        let server = builder
            .serve(self.router().into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(async move {
                let _ = rx.await;
            });

        let handle = tokio::spawn(async move {
            if let Err(e) = server.await {
                tracing::error!(message = "server error", error = %e);
            }
        });

        tracing::info!(message = "listener started", address = %addr);
        *self.server() = ServerState::Listening(RunningServer {
            addr,
            shutdown: tx,
            handle,
        });

        Ok(addr)
    }

    /// Stop serving, letting in-flight requests finish. Safe to call when the
    /// listener isn't running.
    pub async fn stop(&self) {
        let running = {
            let mut server = self.server();
            match std::mem::replace(&mut *server, ServerState::Stopping) {
                ServerState::Listening(r) => r,
                other => {
                    *server = other;
                    return;
                }
            }
        };

        let _ = running.shutdown.send(());
        if let Err(e) = running.handle.await {
            tracing::warn!(message = "server task did not shut down cleanly", error = %e);
        }

        *self.server() = ServerState::Stopped;
        tracing::info!(message = "listener stopped", address = %running.addr);
    }

    pub fn state(&self) -> ListenerState {
        match *self.server() {
            ServerState::Stopped => ListenerState::Stopped,
            ServerState::Starting => ListenerState::Starting,
            ServerState::Listening(_) => ListenerState::Listening,
            ServerState::Stopping => ListenerState::Stopping,
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        match *self.server() {
            ServerState::Listening(ref r) => Some(r.addr),
            _ => None,
        }
    }

    pub fn subscribe(&self, observer: Arc<dyn Observer>) -> Subscription {
        self.core.observers.subscribe(observer)
    }

    pub async fn handle(&self, req: InboundRequest) -> Result<WeatherStation, IngestError> {
        self.core.handle(req).await
    }

    pub fn stations(&self) -> Vec<String> {
        self.core.registry.stations()
    }

    pub fn last_reading(&self, station_id: &str) -> Option<WeatherStation> {
        self.core.registry.last_reading(station_id)
    }

    pub fn last_update(&self, station_id: &str) -> Option<Instant> {
        self.core.registry.last_update(station_id)
    }

    pub fn proxy_config(&self) -> ProxyConfig {
        self.core.proxy.config()
    }

    pub fn active_sinks(&self) -> BTreeSet<DataSink> {
        self.core.proxy.config().sinks
    }

    pub fn dns_servers(&self) -> Vec<IpAddr> {
        self.core.proxy.config().dns_servers
    }

    pub fn update_proxy_config(
        &self,
        sinks: BTreeSet<DataSink>,
        dns_servers: Vec<IpAddr>,
    ) -> Result<(), ListenerError> {
        Ok(self.core.proxy.update_config(sinks, dns_servers)?)
    }
}
