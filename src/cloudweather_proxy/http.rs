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

use crate::listener::{InboundRequest, IngestCore, IngestError};
use crate::station::WeatherStation;
use axum::extract::{ConnectInfo, State};
use axum::http::header::{HeaderMap, CONTENT_TYPE, USER_AGENT};
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use prometheus_client::encoding::text::encode;
use prometheus_client::registry::Registry;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

const OPENMETRICS_FORMAT: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";
const REAL_IP: &str = "x-real-ip";

/// Authentication check of the host embedding the listener.
pub trait RequestGuard: Send + Sync {
    fn authorize(&self, headers: &HeaderMap) -> bool;
}

impl<F> RequestGuard for F
where
    F: Fn(&HeaderMap) -> bool + Send + Sync,
{
    fn authorize(&self, headers: &HeaderMap) -> bool {
        self(headers)
    }
}

pub struct HttpContext {
    pub core: Arc<IngestCore>,
    pub metrics: Option<Arc<Registry>>,
    pub guard: Option<Arc<dyn RequestGuard>>,
}

impl HttpContext {
    fn authorized(&self, headers: &HeaderMap) -> bool {
        self.guard.as_ref().map(|g| g.authorize(headers)).unwrap_or(true)
    }
}

pub fn router(context: Arc<HttpContext>) -> Router {
    Router::new()
        .route("/metrics", get(text_metrics))
        .route("/stations", get(stations))
        .fallback(ingest)
        .layer(TraceLayer::new_for_http())
        .with_state(context)
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

async fn ingest(
    State(context): State<Arc<HttpContext>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    if !context.authorized(&headers) {
        return http_status_no_body(StatusCode::UNAUTHORIZED);
    }

    let req = InboundRequest {
        method: method.as_str().to_owned(),
        path: uri.path().to_owned(),
        query: uri.query().map(str::to_owned),
        user_agent: header(&headers, USER_AGENT.as_str()),
        real_ip: header(&headers, REAL_IP),
        peer: connect_info.map(|ConnectInfo(addr)| addr),
    };

    match context.core.handle(req).await {
        Ok(_) => (StatusCode::OK, "OK").into_response(),
        Err(IngestError::NotFound(path)) => {
            tracing::debug!(message = "no upload endpoint", path = %path);
            (StatusCode::NOT_FOUND, "Not Found").into_response()
        }
        Err(e) => {
            tracing::warn!(message = "rejected upload", error = %e);
            http_status_no_body(StatusCode::BAD_REQUEST)
        }
    }
}

async fn stations(
    State(context): State<Arc<HttpContext>>,
    headers: HeaderMap,
) -> Result<Json<Vec<WeatherStation>>, StatusCode> {
    if !context.authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(Json(context.core.registry().readings()))
}

async fn text_metrics(State(context): State<Arc<HttpContext>>) -> Response {
    let registry = match context.metrics.as_ref() {
        Some(r) => r,
        None => return http_status_no_body(StatusCode::NOT_FOUND),
    };

    let mut buf = String::new();
    match encode(&mut buf, registry) {
        Ok(_) => {
            tracing::debug!(message = "encoded metrics to text format", num_bytes = buf.len());
            ([(CONTENT_TYPE, OPENMETRICS_FORMAT)], buf).into_response()
        }
        Err(e) => {
            tracing::error!(message = "error encoding metrics", error = %e);
            http_status_no_body(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}

fn http_status_no_body(code: StatusCode) -> Response {
    code.into_response()
}
