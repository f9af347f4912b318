//! HTTP client for forwarding recorded requests to the real service

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderName, HeaderValue};
use hyper::{Method, Request, Uri};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tracing::{debug, warn};

use super::http::{headers_from_map, read_body};
use crate::config::{LimitsConfig, UpstreamConfig};
use crate::proxy::ProxyResponse;
use crate::recording::Headers;
use crate::{RecplayError, Result};

/// Request sent to the real service
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    /// HTTP method
    pub method: String,
    /// Absolute URI
    pub uri: String,
    /// Headers to send
    pub headers: Headers,
    /// Request body
    pub body: Bytes,
}

/// Something that can answer a forwarded request.
///
/// Record mode talks to the network through this seam only.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Send the request and return the complete response
    ///
    /// # Errors
    ///
    /// Returns `UpstreamTimeout` or `UpstreamConnectionFailure`.
    async fn send(&self, request: UpstreamRequest) -> Result<ProxyResponse>;
}

/// Pooled hyper client with http and https support
pub struct HttpClient {
    client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    timeout: Duration,
    max_response_size: usize,
}

impl HttpClient {
    /// Create a client from the upstream and limit settings
    #[must_use]
    pub fn new(upstream: &UpstreamConfig, limits: &LimitsConfig) -> Self {
        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .build();

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(upstream.pool_idle_timeout_secs))
            .pool_max_idle_per_host(upstream.max_idle_per_host)
            .build(connector);

        Self {
            client,
            timeout: upstream.timeout(),
            max_response_size: limits.max_response_size,
        }
    }

    async fn exchange(&self, request: Request<Full<Bytes>>, uri: &str) -> Result<ProxyResponse> {
        let response = self.client.request(request).await.map_err(|e| {
            RecplayError::UpstreamConnectionFailure {
                uri: uri.to_string(),
                reason: e.to_string(),
            }
        })?;

        let status = response.status().as_u16();
        let headers = headers_from_map(response.headers()).map_err(|e| {
            RecplayError::UpstreamConnectionFailure {
                uri: uri.to_string(),
                reason: e.to_string(),
            }
        })?;
        let body = read_body(response.into_body(), self.max_response_size)
            .await
            .map_err(|e| match e {
                RecplayError::DataTooLarge { .. } => e,
                other => RecplayError::UpstreamConnectionFailure {
                    uri: uri.to_string(),
                    reason: other.to_string(),
                },
            })?;

        Ok(ProxyResponse::new(status, headers, body))
    }
}

#[async_trait]
impl Upstream for HttpClient {
    async fn send(&self, request: UpstreamRequest) -> Result<ProxyResponse> {
        let uri = request.uri.clone();
        debug!(method = %request.method, uri = %uri, "forwarding upstream");

        let http_request = build_request(request)?;
        match tokio::time::timeout(self.timeout, self.exchange(http_request, &uri)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(uri = %uri, timeout_ms = self.timeout.as_millis() as u64, "upstream timed out");
                Err(RecplayError::UpstreamTimeout {
                    uri,
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            }
        }
    }
}

/// Build the hyper request for an upstream call
fn build_request(request: UpstreamRequest) -> Result<Request<Full<Bytes>>> {
    let method = Method::from_bytes(request.method.as_bytes()).map_err(|e| {
        RecplayError::InvalidRequest(format!("invalid HTTP method '{}': {e}", request.method))
    })?;
    let uri = request
        .uri
        .parse::<Uri>()
        .map_err(|e| RecplayError::InvalidRequest(format!("invalid URI '{}': {e}", request.uri)))?;

    let mut http_request = Request::new(Full::new(request.body));
    *http_request.method_mut() = method;
    *http_request.uri_mut() = uri;

    let map = http_request.headers_mut();
    for (name, values) in request.headers.iter() {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| RecplayError::InvalidRequest(format!("invalid header name '{name}': {e}")))?;
        for value in values {
            let value = HeaderValue::from_str(value).map_err(|e| {
                RecplayError::InvalidRequest(format!("invalid value for header '{name}': {e}"))
            })?;
            map.append(name.clone(), value);
        }
    }

    Ok(http_request)
}
