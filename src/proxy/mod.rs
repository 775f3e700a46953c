//! Forwarding proxy
//!
//! Pass-through reverse proxy in front of the user service. Requests whose
//! path starts with a configured prefix are replayed against the upstream and
//! the upstream response is copied back unchanged. Cookies and custom headers
//! travel in both directions untouched; the proxy only adds an `X-Proxy`
//! marker and the `X-Forwarded-*` headers.
//!
//! Authentication is not decided here. The upstream's session gate does that.

use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{
        header::{self, HeaderName},
        HeaderMap, HeaderValue, Method,
    },
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use reqwest::Url;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::api::ApiError;
use crate::config::ProxyConfig;

/// Largest request body buffered before forwarding
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

static X_PROXY: HeaderName = HeaderName::from_static("x-proxy");
static X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
static X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");

/// Headers scoped to a single connection; never forwarded
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Shared state of the forwarding layer
#[derive(Clone)]
pub struct ProxyState {
    pub client: reqwest::Client,
    pub upstream: Url,
    pub marker: HeaderValue,
    pub prefixes: Arc<Vec<String>>,
}

impl ProxyState {
    /// Build the proxy state from configuration
    pub fn new(config: &ProxyConfig) -> Result<Self> {
        let upstream = Url::parse(&config.upstream_url)
            .with_context(|| format!("Invalid upstream URL: {}", config.upstream_url))?;
        let marker = HeaderValue::from_str(&config.marker)
            .with_context(|| format!("Invalid proxy marker: {}", config.marker))?;

        // Redirects and cookies belong to the client, not to the proxy
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_seconds))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            upstream,
            marker,
            prefixes: Arc::new(config.forwarded_prefixes.clone()),
        })
    }

    /// Whether `path` belongs to the upstream
    pub fn forwards(&self, path: &str) -> bool {
        self.prefixes.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }

    /// Upstream URL for a request path and query
    pub fn upstream_url(&self, path: &str, query: Option<&str>) -> Url {
        let mut url = self.upstream.clone();
        let base = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{}{}", base, path));
        url.set_query(query);
        url
    }
}

/// Build the proxy router with CORS and request tracing
pub fn build_proxy_router(state: ProxyState, cors_origin: &str) -> Result<Router> {
    let allow_origin = if cors_origin == "*" {
        AllowOrigin::any()
    } else {
        let origin = cors_origin
            .parse::<HeaderValue>()
            .with_context(|| format!("Invalid CORS origin: {}", cors_origin))?;
        AllowOrigin::exact(origin)
    };

    let cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Ok(Router::new()
        .route("/health", get(health))
        .fallback(forward)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state))
}

/// GET /health
async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "message": "proxy service is running",
    }))
}

async fn forward(State(state): State<ProxyState>, request: Request) -> Response {
    match forward_request(&state, request).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn forward_request(state: &ProxyState, request: Request) -> Result<Response, ApiError> {
    let path = request.uri().path().to_string();
    if !state.forwards(&path) {
        return Err(ApiError::not_found("Not found"));
    }

    let url = state.upstream_url(&path, request.uri().query());
    let client_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| ApiError::validation_error("Request body too large"))?;

    let mut headers = parts.headers;
    let original_host = headers.get(header::HOST).cloned();
    strip_hop_by_hop(&mut headers);
    headers.remove(header::HOST);
    headers.remove(header::CONTENT_LENGTH);

    headers.insert(X_PROXY.clone(), state.marker.clone());
    if let Some(ip) = client_addr {
        append_forwarded_for(&mut headers, &ip.to_string());
    }
    if let Some(host) = original_host {
        headers.insert(X_FORWARDED_HOST.clone(), host);
    }

    let sent = request_cookie_names(&headers);
    if !sent.is_empty() {
        tracing::debug!(path = %path, cookies = ?sent, "Proxying cookies");
    }

    let upstream = state
        .client
        .request(parts.method, url)
        .headers(headers)
        .body(body)
        .send()
        .await
        .map_err(|e| {
            tracing::error!(path = %path, "Upstream request failed: {}", e);
            ApiError::bad_gateway("Upstream service unavailable")
        })?;

    let status = upstream.status();
    let mut response_headers = upstream.headers().clone();
    strip_hop_by_hop(&mut response_headers);
    response_headers.remove(header::CONTENT_LENGTH);

    let set = response_cookie_names(&response_headers);
    if !set.is_empty() {
        tracing::debug!(path = %path, cookies = ?set, "Response setting cookies");
    }

    let bytes = upstream.bytes().await.map_err(|e| {
        tracing::error!(path = %path, "Failed to read upstream response: {}", e);
        ApiError::bad_gateway("Upstream service unavailable")
    })?;

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    *response.headers_mut() = response_headers;
    Ok(response)
}

/// Remove hop-by-hop headers, including any named by `Connection`
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<String> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect();

    for name in HOP_BY_HOP.iter().copied().chain(named.iter().map(String::as_str)) {
        headers.remove(name);
    }
}

/// Names of the cookies sent by the client. Values are session secrets and
/// stay out of logs.
fn request_cookie_names(headers: &HeaderMap) -> Vec<String> {
    header_strs(headers, header::COOKIE)
        .flat_map(|value| value.split(';'))
        .filter_map(cookie_name)
        .collect()
}

/// Names of the cookies set by the upstream; attributes follow the first `;`
fn response_cookie_names(headers: &HeaderMap) -> Vec<String> {
    header_strs(headers, header::SET_COOKIE)
        .filter_map(|value| value.split(';').next())
        .filter_map(cookie_name)
        .collect()
}

fn header_strs(headers: &HeaderMap, name: HeaderName) -> impl Iterator<Item = &str> {
    headers
        .get_all(name)
        .into_iter()
        .filter_map(|value| value.to_str().ok())
}

fn cookie_name(pair: &str) -> Option<String> {
    let (name, _) = pair.split_once('=')?;
    let name = name.trim();
    (!name.is_empty()).then(|| name.to_string())
}

fn append_forwarded_for(headers: &mut HeaderMap, ip: &str) {
    let value = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(existing) if !existing.is_empty() => format!("{}, {}", existing, ip),
        _ => ip.to_string(),
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR.clone(), value);
    }
}
