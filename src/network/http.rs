//! Conversions between hyper messages and proxy values

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use hyper::{Request, Response, StatusCode};
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use crate::proxy::{ProxyRequest, ProxyResponse};
use crate::recording::Headers;
use crate::{RecplayError, Result};

// Recomputed by hyper for the body actually sent
const FRAMING_HEADERS: [&str; 3] = ["content-length", "transfer-encoding", "connection"];

/// Copy a hyper header map into an ordered `Headers`.
///
/// Values are stored as text, so a value that is not valid UTF-8 is
/// rejected rather than rewritten.
///
/// # Errors
///
/// Returns `InvalidRequest` naming the first header whose value is not
/// valid UTF-8.
pub fn headers_from_map(map: &HeaderMap) -> Result<Headers> {
    let mut headers = Headers::new();
    for (name, value) in map {
        let value = std::str::from_utf8(value.as_bytes()).map_err(|_| {
            RecplayError::InvalidRequest(format!("header '{name}' is not valid UTF-8"))
        })?;
        headers.append(name.as_str(), value);
    }
    Ok(headers)
}

/// Reject requests that declare a body larger than `max_size`
///
/// # Errors
///
/// Returns `DataTooLarge` when `Content-Length` exceeds the limit.
pub fn validate_request<B>(request: &Request<B>, max_size: usize) -> Result<()> {
    let declared = request
        .headers()
        .get(hyper::header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok());

    match declared {
        Some(size) if size > max_size => Err(RecplayError::DataTooLarge {
            size,
            limit: max_size,
        }),
        _ => Ok(()),
    }
}

/// Read a body with size limit
///
/// # Errors
///
/// Returns error if body is too large or read fails
pub async fn read_body<B>(body: B, max_size: usize) -> Result<Bytes>
where
    B: hyper::body::Body,
    B::Error: std::fmt::Display,
{
    let collected = body
        .collect()
        .await
        .map_err(|e| RecplayError::InvalidRequest(format!("failed to read body: {e}")))?;

    let bytes = collected.to_bytes();

    if bytes.len() > max_size {
        return Err(RecplayError::DataTooLarge {
            size: bytes.len(),
            limit: max_size,
        });
    }

    Ok(bytes)
}

/// Split an incoming hyper request into a `ProxyRequest`
///
/// # Errors
///
/// Returns `DataTooLarge`, `InvalidRequest` for a non-UTF-8 header value,
/// or a body read failure.
pub async fn into_proxy_request<B>(request: Request<B>, max_size: usize) -> Result<ProxyRequest>
where
    B: hyper::body::Body,
    B::Error: std::fmt::Display,
{
    validate_request(&request, max_size)?;
    let (parts, body) = request.into_parts();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map_or_else(|| "/".to_string(), ToString::to_string);
    let headers = headers_from_map(&parts.headers)?;
    let body = read_body(body, max_size).await?;

    Ok(ProxyRequest::new(parts.method.as_str(), path_and_query, headers, body))
}

/// Turn a proxy response into a hyper response.
///
/// Framing headers are dropped; header values hyper cannot carry are
/// skipped with a debug log.
#[must_use]
pub fn from_proxy_response(response: ProxyResponse) -> Response<Full<Bytes>> {
    let mut http_response = Response::new(Full::new(response.body));
    *http_response.status_mut() =
        StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let map = http_response.headers_mut();
    for (name, values) in response.headers.iter() {
        if FRAMING_HEADERS
            .iter()
            .any(|framing| framing.eq_ignore_ascii_case(name))
        {
            continue;
        }
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            debug!(header = name, "skipping invalid response header name");
            continue;
        };
        for value in values {
            match HeaderValue::from_str(value) {
                Ok(value) => {
                    map.append(name.clone(), value);
                }
                Err(_) => debug!(header = %name, "skipping invalid response header value"),
            }
        }
    }
    http_response
}

/// A JSON response with the given status
#[must_use]
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let bytes = serde_json::to_vec(body).unwrap_or_default();
    let mut response = Response::new(Full::new(Bytes::from(bytes)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// An empty response with the given status
#[must_use]
pub fn empty_response(status: StatusCode) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}

/// Create an error response with a JSON diagnostic body
#[must_use]
pub fn error_response(error: &RecplayError) -> Response<Full<Bytes>> {
    let status = error.status_code();
    let mut body = json!({
        "error": error.to_string(),
        "status": status.as_u16(),
    });
    if let RecplayError::NoMatchFound { diagnostic, .. } = error {
        body["diagnostic"] = serde_json::to_value(diagnostic).unwrap_or_default();
    }
    json_response(status, &body)
}
