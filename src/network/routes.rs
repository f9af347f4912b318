//! Control routes and proxied-request dispatch

use std::fmt::Display;
use std::time::Duration;

use http_body_util::Full;
use hyper::body::{Body, Bytes};
use hyper::header::HeaderValue;
use hyper::{Method, Request, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::http::{empty_response, error_response, from_proxy_response, into_proxy_request, json_response};
use crate::proxy::{
    ProxyRequest, RecordingHandler, ABSTRACTION_IDENTIFIER_HEADER, PURGE_IN_MEMORY_HEADER,
    RECORDING_FILE_HEADER, RECORDING_ID_HEADER, RECORDING_MODE_HEADER, RECORDING_SKIP_HEADER,
};
use crate::recording::Variables;
use crate::store::PlaybackSource;
use crate::{RecplayError, Result};

type HttpResponse = Response<Full<Bytes>>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SanitizerRegistration {
    name: String,
    #[serde(default)]
    body: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RemoveSanitizersBody {
    sanitizers: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LatencyBody {
    latency_ms: u64,
}

/// Route one HTTP request.
///
/// Requests carrying `x-recording-mode` are proxied; everything else must be
/// a control route. Errors become JSON diagnostics with the mapped status.
pub async fn route<B>(
    handler: &RecordingHandler,
    request: Request<B>,
    cancel: &CancellationToken,
) -> HttpResponse
where
    B: Body,
    B::Error: Display,
{
    let method = request.method().clone();
    let path = request
        .uri()
        .path()
        .trim_end_matches('/')
        .to_ascii_lowercase();

    let result = match into_proxy_request(request, handler.config().limits.max_request_size).await {
        Ok(request) => dispatch(handler, &method, &path, request, cancel).await,
        Err(e) => Err(e),
    };

    result.unwrap_or_else(|e| {
        debug!(method = %method, path = %path, status = e.status_code().as_u16(), error = %e, "request failed");
        error_response(&e)
    })
}

async fn dispatch(
    handler: &RecordingHandler,
    method: &Method,
    path: &str,
    request: ProxyRequest,
    cancel: &CancellationToken,
) -> Result<HttpResponse> {
    if let Some(mode) = request.header(RECORDING_MODE_HEADER) {
        let mode = mode.trim().to_ascii_lowercase();
        let id = required_header(&request, RECORDING_ID_HEADER)?;
        let response = match mode.as_str() {
            "record" => handler.handle_record_request(&id, request).await?,
            "playback" => handler.handle_playback_request(&id, request, cancel).await?,
            other => {
                return Err(RecplayError::InvalidRequest(format!(
                    "'{RECORDING_MODE_HEADER}' must be 'record' or 'playback', got '{other}'"
                )))
            }
        };
        return Ok(from_proxy_response(response));
    }

    if *method != Method::POST {
        return Err(RecplayError::InvalidRequest(format!(
            "{method} {path}: proxied requests need '{RECORDING_MODE_HEADER}'"
        )));
    }

    match path {
        "/record/start" => record_start(handler, &request),
        "/record/stop" => record_stop(handler, &request),
        "/playback/start" => playback_start(handler, &request),
        "/playback/stop" => playback_stop(handler, &request),
        "/admin/addsanitizer" => add_sanitizer(handler, &request),
        "/admin/addsanitizers" => add_sanitizers(handler, &request),
        "/admin/removesanitizers" => remove_sanitizers(handler, &request),
        "/admin/addtransform" => add_transform(handler, &request),
        "/admin/setmatcher" => set_matcher(handler, &request),
        "/admin/setplaybacklatency" => set_playback_latency(handler, &request),
        "/admin/reset" => reset(handler, &request),
        _ => Err(RecplayError::InvalidRequest(format!(
            "unknown route '{path}'; proxied requests need '{RECORDING_MODE_HEADER}'"
        ))),
    }
}

fn record_start(handler: &RecordingHandler, request: &ProxyRequest) -> Result<HttpResponse> {
    let file = recording_file(request)?;
    let id = handler.start_recording(file.as_deref())?;
    with_recording_id(empty_response(StatusCode::OK), &id)
}

fn record_stop(handler: &RecordingHandler, request: &ProxyRequest) -> Result<HttpResponse> {
    let id = required_header(request, RECORDING_ID_HEADER)?;
    let variables = match json_body(request)? {
        Value::Null => Variables::new(),
        value => serde_json::from_value(value).map_err(|e| {
            RecplayError::InvalidRequest(format!("variables must be a string map: {e}"))
        })?,
    };
    handler.stop_recording(&id, variables, request.header(RECORDING_SKIP_HEADER))?;
    Ok(empty_response(StatusCode::OK))
}

fn playback_start(handler: &RecordingHandler, request: &ProxyRequest) -> Result<HttpResponse> {
    let source = match (recording_file(request)?, request.header(RECORDING_ID_HEADER)) {
        (Some(file), _) => PlaybackSource::File(file),
        (None, Some(id)) => PlaybackSource::RecordingId(id.to_string()),
        (None, None) => {
            return Err(RecplayError::InvalidRequest(format!(
                "playback needs '{RECORDING_FILE_HEADER}' or '{RECORDING_ID_HEADER}'"
            )))
        }
    };
    let (id, variables) = handler.start_playback(source)?;
    with_recording_id(json_response(StatusCode::OK, &variables), &id)
}

fn playback_stop(handler: &RecordingHandler, request: &ProxyRequest) -> Result<HttpResponse> {
    let id = required_header(request, RECORDING_ID_HEADER)?;
    let purge = request
        .header(PURGE_IN_MEMORY_HEADER)
        .is_some_and(|value| value.trim().eq_ignore_ascii_case("true"));
    handler.stop_playback(&id, purge)?;
    Ok(empty_response(StatusCode::OK))
}

fn add_sanitizer(handler: &RecordingHandler, request: &ProxyRequest) -> Result<HttpResponse> {
    let name = required_header(request, ABSTRACTION_IDENTIFIER_HEADER)?;
    let id = handler.add_sanitizer(&name, &json_body(request)?, request.header(RECORDING_ID_HEADER))?;
    Ok(json_response(StatusCode::OK, &json!({ "Sanitizer": id })))
}

fn add_sanitizers(handler: &RecordingHandler, request: &ProxyRequest) -> Result<HttpResponse> {
    let registrations: Vec<SanitizerRegistration> = parse_body(request)?;
    let recording_id = request.header(RECORDING_ID_HEADER);
    let ids = registrations
        .iter()
        .map(|entry| handler.add_sanitizer(&entry.name, &entry.body, recording_id))
        .collect::<Result<Vec<_>>>()?;
    Ok(json_response(StatusCode::OK, &json!({ "Sanitizers": ids })))
}

fn remove_sanitizers(handler: &RecordingHandler, request: &ProxyRequest) -> Result<HttpResponse> {
    let body: RemoveSanitizersBody = parse_body(request)?;
    let removed = handler.remove_sanitizers(&body.sanitizers, request.header(RECORDING_ID_HEADER))?;
    Ok(json_response(StatusCode::OK, &json!({ "Removed": removed })))
}

fn add_transform(handler: &RecordingHandler, request: &ProxyRequest) -> Result<HttpResponse> {
    let name = required_header(request, ABSTRACTION_IDENTIFIER_HEADER)?;
    let id = handler.add_transform(&name, &json_body(request)?, request.header(RECORDING_ID_HEADER))?;
    Ok(json_response(StatusCode::OK, &json!({ "Transform": id })))
}

fn set_matcher(handler: &RecordingHandler, request: &ProxyRequest) -> Result<HttpResponse> {
    let name = required_header(request, ABSTRACTION_IDENTIFIER_HEADER)?;
    handler.set_matcher(&name, &json_body(request)?, request.header(RECORDING_ID_HEADER))?;
    Ok(empty_response(StatusCode::OK))
}

fn set_playback_latency(handler: &RecordingHandler, request: &ProxyRequest) -> Result<HttpResponse> {
    let id = required_header(request, RECORDING_ID_HEADER)?;
    let body: LatencyBody = parse_body(request)?;
    handler.set_playback_latency(&id, Duration::from_millis(body.latency_ms))?;
    Ok(empty_response(StatusCode::OK))
}

fn reset(handler: &RecordingHandler, request: &ProxyRequest) -> Result<HttpResponse> {
    handler.reset(request.header(RECORDING_ID_HEADER))?;
    Ok(empty_response(StatusCode::OK))
}

fn required_header(request: &ProxyRequest, name: &str) -> Result<String> {
    request
        .header(name)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
        .ok_or_else(|| RecplayError::InvalidRequest(format!("missing required header '{name}'")))
}

/// Recording file from the header, or from a JSON body keyed by the header name
fn recording_file(request: &ProxyRequest) -> Result<Option<String>> {
    if let Some(file) = request.header(RECORDING_FILE_HEADER) {
        return Ok(Some(file.to_string()));
    }
    match json_body(request)? {
        Value::Object(map) => match map.get(RECORDING_FILE_HEADER) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(file)) => Ok(Some(file.clone())),
            Some(_) => Err(RecplayError::InvalidRequest(format!(
                "'{RECORDING_FILE_HEADER}' must be a string"
            ))),
        },
        _ => Ok(None),
    }
}

/// Body as JSON; an empty body is `null`
fn json_body(request: &ProxyRequest) -> Result<Value> {
    if request.body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(&request.body)
        .map_err(|e| RecplayError::InvalidRequest(format!("request body is not valid JSON: {e}")))
}

fn parse_body<T: serde::de::DeserializeOwned>(request: &ProxyRequest) -> Result<T> {
    serde_json::from_value(json_body(request)?)
        .map_err(|e| RecplayError::InvalidRequest(format!("unexpected request body: {e}")))
}

fn with_recording_id(mut response: HttpResponse, id: &str) -> Result<HttpResponse> {
    let value = HeaderValue::from_str(id)
        .map_err(|e| RecplayError::InvalidRequest(format!("invalid recording id: {e}")))?;
    response.headers_mut().insert(RECORDING_ID_HEADER, value);
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::network::{Upstream, UpstreamRequest};
    use crate::proxy::{ProxyResponse, UPSTREAM_BASE_URI_HEADER};
    use async_trait::async_trait;
    use http_body_util::BodyExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Answers every request with the call count as the body
    #[derive(Debug, Default)]
    struct Counter {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Upstream for Counter {
        async fn send(&self, _request: UpstreamRequest) -> Result<ProxyResponse> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let headers = [("Content-Type", "text/plain")].into_iter().collect();
            Ok(ProxyResponse::new(200, headers, format!("call-{call}")))
        }
    }

    fn handler(dir: &tempfile::TempDir) -> RecordingHandler {
        let mut config = Config::default();
        config.storage_location = dir.path().to_path_buf();
        RecordingHandler::with_upstream(config, Arc::new(Counter::default())).unwrap()
    }

    fn post(path: &str, headers: &[(&str, &str)], body: &str) -> Request<Full<Bytes>> {
        let mut builder = Request::builder().method("POST").uri(path);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Full::new(Bytes::from(body.to_string()))).unwrap()
    }

    async fn send(handler: &RecordingHandler, request: Request<Full<Bytes>>) -> (StatusCode, Option<String>, String) {
        let response = route(handler, request, &CancellationToken::new()).await;
        let status = response.status();
        let id = response
            .headers()
            .get(RECORDING_ID_HEADER)
            .map(|value| value.to_str().unwrap().to_string());
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, id, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_record_then_playback_over_routes() {
        let dir = tempfile::tempdir().unwrap();
        let handler = handler(&dir);

        let (status, id, _) = send(
            &handler,
            post("/Record/Start", &[], r#"{"x-recording-file": "routes.json"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let id = id.unwrap();

        let proxied = [
            (RECORDING_MODE_HEADER, "record"),
            (RECORDING_ID_HEADER, id.as_str()),
            (UPSTREAM_BASE_URI_HEADER, "https://example.com"),
        ];
        let (status, _, body) = send(&handler, post("/a", &proxied, "")).await;
        assert_eq!((status, body.as_str()), (StatusCode::OK, "call-0"));

        let (status, _, _) = send(
            &handler,
            post("/record/stop", &[(RECORDING_ID_HEADER, id.as_str())], r#"{"Token": "t"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, playback_id, variables) = send(
            &handler,
            post("/playback/start", &[(RECORDING_FILE_HEADER, "routes.json")], ""),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(variables, r#"{"Token":"t"}"#);
        let playback_id = playback_id.unwrap();

        let replayed = [
            (RECORDING_MODE_HEADER, "playback"),
            (RECORDING_ID_HEADER, playback_id.as_str()),
            (UPSTREAM_BASE_URI_HEADER, "https://example.com"),
        ];
        let (status, _, body) = send(&handler, post("/a", &replayed, "")).await;
        assert_eq!((status, body.as_str()), (StatusCode::OK, "call-0"));

        let (status, _, body) = send(&handler, post("/a", &replayed, "")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.contains("diagnostic"));
    }

    #[tokio::test]
    async fn test_control_route_errors() {
        let dir = tempfile::tempdir().unwrap();
        let handler = handler(&dir);

        let (status, _, _) = send(&handler, post("/record/stop", &[], "")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _, _) = send(
            &handler,
            post("/record/stop", &[(RECORDING_ID_HEADER, "nope")], ""),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _, _) = send(&handler, post("/unknown", &[], "")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _, _) = send(
            &handler,
            post(
                "/admin/addsanitizer",
                &[(ABSTRACTION_IDENTIFIER_HEADER, "UriRegexSanitizer")],
                r#"{"regex": "["}"#,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let id = handler.start_recording(None).unwrap();
        handler.stop_recording(&id, Variables::new(), None).unwrap();
        let (status, _, _) = send(
            &handler,
            post("/record/stop", &[(RECORDING_ID_HEADER, id.as_str())], ""),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_admin_routes() {
        let dir = tempfile::tempdir().unwrap();
        let handler = handler(&dir);

        let (status, _, body) = send(
            &handler,
            post(
                "/admin/addsanitizers",
                &[],
                r#"[{"Name": "HeaderRegexSanitizer", "Body": {"key": "x-a"}},
                    {"Name": "OAuthResponseSanitizer"}]"#,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let ids: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(ids["Sanitizers"].as_array().unwrap().len(), 2);

        let first = ids["Sanitizers"][0].as_str().unwrap().to_string();
        let (status, _, body) = send(
            &handler,
            post("/admin/removesanitizers", &[], &format!(r#"{{"Sanitizers": ["{first}"]}}"#)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains(&first));

        let (status, _, _) = send(
            &handler,
            post(
                "/admin/setmatcher",
                &[(ABSTRACTION_IDENTIFIER_HEADER, "CustomDefaultMatcher")],
                r#"{"compareBodies": false}"#,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(handler.matcher().name(), "CustomDefaultMatcher");

        let (status, _, _) = send(&handler, post("/admin/reset", &[], "")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(handler.matcher().name(), "DefaultMatcher");
    }
}
