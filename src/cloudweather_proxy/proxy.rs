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

//! Relaying of uploads to the vendor clouds they were meant for.

use crate::dns::{NameserverResolver, DEFAULT_DNS_SERVER};
use crate::station::Vendor;
use reqwest::{Client, StatusCode, Url};
use serde::Serialize;
use std::collections::BTreeSet;
use std::error;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};
use url::form_urlencoded;

pub const WUNDERGROUND_URL: &str =
    "https://rtupdate.wunderground.com/weatherstation/updateweatherstation.php";
pub const WEATHERCLOUD_URL: &str = "https://api.weathercloud.net";

/// Marker in Weathercloud upload paths after which the payload starts.
pub const WEATHERCLOUD_MARKER: &str = "/v01/set";

/// A vendor cloud uploads may be forwarded to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSink {
    Wunderground,
    Weathercloud,
}

impl DataSink {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wunderground => "wunderground",
            Self::Weathercloud => "weathercloud",
        }
    }
}

impl From<Vendor> for DataSink {
    fn from(v: Vendor) -> Self {
        match v {
            Vendor::Wunderground => Self::Wunderground,
            Vendor::Weathercloud => Self::Weathercloud,
        }
    }
}

impl fmt::Display for DataSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseSinkError(String);

impl fmt::Display for ParseSinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown sink '{}', expected 'wunderground' or 'weathercloud'", self.0)
    }
}

impl error::Error for ParseSinkError {}

impl FromStr for DataSink {
    type Err = ParseSinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "wunderground" => Ok(Self::Wunderground),
            "weathercloud" => Ok(Self::Weathercloud),
            _ => Err(ParseSinkError(s.to_owned())),
        }
    }
}

#[derive(Debug)]
pub enum ProxyError {
    MissingPayload(DataSink),
    SinkDisabled(DataSink),
    InvalidUrl(url::ParseError),
    Client(reqwest::Error),
    Upstream(reqwest::Error),
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingPayload(s) => write!(f, "nothing to forward to {}", s),
            Self::SinkDisabled(s) => write!(f, "sink {} is not enabled", s),
            Self::InvalidUrl(e) => write!(f, "invalid forwarding URL: {}", e),
            Self::Client(e) => write!(f, "unable to build HTTP client: {}", e),
            Self::Upstream(e) => write!(f, "{}", e),
        }
    }
}

impl error::Error for ProxyError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::InvalidUrl(e) => Some(e),
            Self::Client(e) => Some(e),
            Self::Upstream(e) => Some(e),
            _ => None,
        }
    }
}

/// Which sinks are enabled and which nameservers to resolve them with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub sinks: BTreeSet<DataSink>,
    pub dns_servers: Vec<IpAddr>,
}

impl ProxyConfig {
    pub fn new<I: IntoIterator<Item = DataSink>>(sinks: I, dns_servers: Vec<IpAddr>) -> Self {
        let dns_servers = if dns_servers.is_empty() {
            vec![DEFAULT_DNS_SERVER]
        } else {
            dns_servers
        };

        ProxyConfig {
            sinks: sinks.into_iter().collect(),
            dns_servers,
        }
    }

    pub fn disabled() -> Self {
        Self::new([], Vec::new())
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Base URLs of the vendor clouds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyEndpoints {
    pub wunderground: String,
    pub weathercloud: String,
}

impl Default for ProxyEndpoints {
    fn default() -> Self {
        ProxyEndpoints {
            wunderground: WUNDERGROUND_URL.to_owned(),
            weathercloud: WEATHERCLOUD_URL.to_owned(),
        }
    }
}

/// The parts of an inbound upload needed to replay it upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardRequest {
    pub path: String,
    pub query: Option<String>,
}

impl ForwardRequest {
    pub fn new<P: Into<String>>(path: P, query: Option<&str>) -> Self {
        ForwardRequest {
            path: path.into(),
            query: query.filter(|q| !q.is_empty()).map(str::to_owned),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ForwardResponse {
    pub status: StatusCode,
    pub body: String,
}

/// Decode and re-encode a query string to normalize its escaping.
pub fn normalize_query(query: &str) -> String {
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(form_urlencoded::parse(query.as_bytes()))
        .finish()
}

/// A fixed configuration along with the HTTP client built for it.
///
/// Sessions are never modified. Reconfiguring the proxy swaps in a new session
/// while requests holding the old one finish against the old client.
#[derive(Debug)]
pub struct ProxySession {
    config: ProxyConfig,
    endpoints: Arc<ProxyEndpoints>,
    client: Option<Client>,
}

impl ProxySession {
    fn new(config: ProxyConfig, endpoints: Arc<ProxyEndpoints>) -> Result<Self, ProxyError> {
        let client = if config.sinks.is_empty() {
            None
        } else {
            let resolver = NameserverResolver::new(&config.dns_servers);
            Some(
                Client::builder()
                    .dns_resolver(Arc::new(resolver))
                    .build()
                    .map_err(ProxyError::Client)?,
            )
        };

        Ok(ProxySession {
            config,
            endpoints,
            client,
        })
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn is_enabled(&self, sink: DataSink) -> bool {
        self.config.sinks.contains(&sink)
    }

    pub fn has_client(&self) -> bool {
        self.client.is_some()
    }

    /// Build the vendor URL an inbound upload should be replayed against.
    pub fn target_url(&self, sink: DataSink, req: &ForwardRequest) -> Result<Url, ProxyError> {
        let query = req.query.as_deref().filter(|q| !q.is_empty());

        match sink {
            DataSink::Wunderground => {
                let query = query.ok_or(ProxyError::MissingPayload(sink))?;
                let mut url = Url::parse(&self.endpoints.wunderground).map_err(ProxyError::InvalidUrl)?;
                url.set_query(Some(&normalize_query(query)));
                Ok(url)
            }
            DataSink::Weathercloud => {
                let start = req.path.find(WEATHERCLOUD_MARKER).ok_or(ProxyError::MissingPayload(sink))?;
                let path = &req.path[start..];
                let payload = &path[WEATHERCLOUD_MARKER.len()..];
                if (payload.is_empty() || payload == "/") && query.is_none() {
                    return Err(ProxyError::MissingPayload(sink));
                }

                let base = self.endpoints.weathercloud.trim_end_matches('/');
                let mut url = Url::parse(&format!("{}{}", base, path)).map_err(ProxyError::InvalidUrl)?;
                if let Some(q) = query {
                    url.set_query(Some(&normalize_query(q)));
                }
                Ok(url)
            }
        }
    }

    /// Replay an upload against the vendor cloud for `sink`.
    ///
    /// Callers are expected to check `is_enabled` first, forwarding to a sink
    /// that isn't enabled is an error.
    pub async fn forward(
        &self,
        sink: DataSink,
        req: &ForwardRequest,
    ) -> Result<ForwardResponse, ProxyError> {
        let client = match (&self.client, self.is_enabled(sink)) {
            (Some(c), true) => c,
            _ => return Err(ProxyError::SinkDisabled(sink)),
        };

        let url = self.target_url(sink, req)?;
        tracing::debug!(message = "forwarding upload", sink = %sink, url = %url);

        let res = client.get(url).send().await.map_err(ProxyError::Upstream)?;
        let status = res.status();
        let body = res.text().await.map_err(ProxyError::Upstream)?;
        Ok(ForwardResponse { status, body })
    }
}

/// Forwards uploads to the vendor clouds that are enabled.
#[derive(Debug)]
pub struct CloudWeatherProxy {
    endpoints: Arc<ProxyEndpoints>,
    current: RwLock<Arc<ProxySession>>,
}

impl CloudWeatherProxy {
    pub fn new(config: ProxyConfig, endpoints: ProxyEndpoints) -> Result<Self, ProxyError> {
        let endpoints = Arc::new(endpoints);
        let session = ProxySession::new(config, Arc::clone(&endpoints))?;

        Ok(CloudWeatherProxy {
            endpoints,
            current: RwLock::new(Arc::new(session)),
        })
    }

    /// The current session. It stays usable even if the proxy is reconfigured.
    pub fn session(&self) -> Arc<ProxySession> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn config(&self) -> ProxyConfig {
        self.session().config().clone()
    }

    pub fn is_enabled(&self, sink: DataSink) -> bool {
        self.session().is_enabled(sink)
    }

    /// Replace enabled sinks and nameservers. An empty nameserver list keeps the
    /// current servers. A new client is built if any sink is enabled, otherwise
    /// the client is released once in-flight requests finish.
    pub fn update_config(
        &self,
        sinks: BTreeSet<DataSink>,
        dns_servers: Vec<IpAddr>,
    ) -> Result<(), ProxyError> {
        let dns_servers = if dns_servers.is_empty() {
            self.session().config().dns_servers.clone()
        } else {
            dns_servers
        };

        let config = ProxyConfig::new(sinks, dns_servers);
        let session = Arc::new(ProxySession::new(config, Arc::clone(&self.endpoints))?);
        tracing::info!(
            message = "updated proxy configuration",
            sinks = ?session.config().sinks,
            dns_servers = ?session.config().dns_servers,
        );

        *self.current.write().unwrap_or_else(PoisonError::into_inner) = session;
        Ok(())
    }

    pub async fn forward(
        &self,
        sink: DataSink,
        req: &ForwardRequest,
    ) -> Result<ForwardResponse, ProxyError> {
        self.session().forward(sink, req).await
    }
}
