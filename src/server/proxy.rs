use axum::Json;
use axum::body::{Body, to_bytes};
use axum::extract::{Request, State};
use axum::http::header::{CONTENT_LENGTH, HOST};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::{info, warn};

use super::{AppState, ErrorResponse, RouteError};
use crate::client::{PROXY_ERROR_HEADER, PROXY_PREFIX, TARGET_BASE_URL_HEADER};

const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Relays `/api-proxy{path}` to `{x-target-base-url}{path}`.
pub(super) async fn forward(State(state): State<AppState>, request: Request) -> Response {
    match relay(&state, request).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn relay(state: &AppState, request: Request) -> Result<Response, RouteError> {
    let (parts, body) = request.into_parts();

    let target = parts
        .headers
        .get(TARGET_BASE_URL_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| RouteError::bad_request("Missing x-target-base-url header"))?;
    let url = target_url(target, parts.uri.path(), parts.uri.query())?;

    let body = to_bytes(body, MAX_BODY_BYTES).await.map_err(|err| RouteError {
        status: StatusCode::PAYLOAD_TOO_LARGE,
        message: format!("request body could not be read: {err}"),
    })?;

    let method = parts.method.clone();
    let upstream = match state
        .relay
        .request(method.clone(), url.as_str())
        .headers(forwarded_headers(&parts.headers))
        .body(body)
        .send()
        .await
    {
        Ok(upstream) => upstream,
        Err(err) => return Ok(unreachable(&url, &err.to_string())),
    };

    let status = upstream.status();
    let headers = relayed_headers(upstream.headers());
    let bytes = match upstream.bytes().await {
        Ok(bytes) => bytes,
        Err(err) => return Ok(unreachable(&url, &err.to_string())),
    };

    info!(method = %method, url = %url, status = status.as_u16(), "relayed request");

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

fn target_url(target: &str, path: &str, query: Option<&str>) -> Result<String, RouteError> {
    let parsed = url::Url::parse(target)
        .map_err(|err| RouteError::bad_request(format!("invalid x-target-base-url header: {err}")))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(RouteError::bad_request(
            "x-target-base-url must be an absolute http or https URL",
        ));
    }

    let rest = path.strip_prefix(PROXY_PREFIX).unwrap_or(path);
    let mut url = format!("{}{rest}", target.trim_end_matches('/'));
    if let Some(query) = query {
        url.push('?');
        url.push_str(query);
    }
    Ok(url)
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

fn forwarded_headers(incoming: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in incoming {
        if name == HOST
            || name == CONTENT_LENGTH
            || name.as_str() == TARGET_BASE_URL_HEADER
            || is_hop_by_hop(name)
        {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers
}

/// Copies the target's response headers. The failure marker is reserved for
/// the relay itself, so a target cannot set it.
fn relayed_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in upstream {
        if name == CONTENT_LENGTH || name.as_str() == PROXY_ERROR_HEADER || is_hop_by_hop(name) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers
}

fn unreachable(url: &str, reason: &str) -> Response {
    warn!(url = %url, error = %reason, "relay could not reach target");
    (
        StatusCode::BAD_GATEWAY,
        [(
            HeaderName::from_static(PROXY_ERROR_HEADER),
            HeaderValue::from_static("upstream-unreachable"),
        )],
        Json(ErrorResponse {
            error: format!("failed to reach {url}: {reason}"),
        }),
    )
        .into_response()
}
