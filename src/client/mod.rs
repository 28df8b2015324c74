mod apps;
mod error;
mod mock;
mod tasks;
mod tools;

use std::borrow::Cow;

use anyhow::{Context, Result, bail};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::config::SessionConfig;
use crate::context::AppContext;
use crate::logging::redact_secret;

pub use error::ApiError;
pub use mock::MockResponses;
pub use tools::ToolKind;

pub const PROXY_PREFIX: &str = "/api-proxy";
pub const TARGET_BASE_URL_HEADER: &str = "x-target-base-url";
pub const TENANT_ID_HEADER: &str = "x-tenant-id";
pub const PROXY_ERROR_HEADER: &str = "x-proxy-error";

#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Value>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self::get()
    }
}

impl RequestOptions {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get() -> Self {
        Self::new(Method::GET)
    }

    pub fn post() -> Self {
        Self::new(Method::POST)
    }

    pub fn put() -> Self {
        Self::new(Method::PUT)
    }

    pub fn delete() -> Self {
        Self::new(Method::DELETE)
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Attaches a body typed by the user. Malformed JSON is rejected before
    /// any network call.
    pub fn raw_json(self, raw: &str) -> Result<Self, ApiError> {
        let body = serde_json::from_str(raw)
            .map_err(|err| ApiError::Validation(format!("request body is not valid JSON: {err}")))?;
        Ok(self.json(body))
    }

    pub fn header(mut self, name: &str, value: &str) -> Result<Self, ApiError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| ApiError::Validation(format!("invalid header name '{name}'")))?;
        let value = header_value(name.as_str(), value)?;
        self.headers.append(name, value);
        Ok(self)
    }
}

/// Console API client. Every call goes through the local relay at
/// `{proxy_origin}/api-proxy`, which forwards to the configured base URL.
#[derive(Clone)]
pub struct ApiClient {
    context: AppContext,
    proxy_origin: String,
    http: Client,
}

impl ApiClient {
    pub fn new(context: AppContext, proxy_origin: impl Into<String>) -> Result<Self> {
        let proxy_origin = proxy_origin.into().trim_end_matches('/').to_string();
        let parsed = url::Url::parse(&proxy_origin)
            .with_context(|| format!("invalid proxy URL '{proxy_origin}'"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            bail!("proxy URL '{proxy_origin}' must use http or https");
        }

        let http = match Client::builder().build() {
            Ok(client) => client,
            Err(err) => {
                warn!(error = %err, "failed to build configured HTTP client; falling back to default reqwest client");
                Client::new()
            }
        };

        Ok(Self {
            context,
            proxy_origin,
            http,
        })
    }

    pub fn context(&self) -> &AppContext {
        &self.context
    }

    pub fn proxy_origin(&self) -> &str {
        &self.proxy_origin
    }

    pub async fn request(&self, endpoint: &str, options: RequestOptions) -> Result<Value, ApiError> {
        let session = self.context.load_session().await;

        if session.mock_mode {
            let fixture = MockResponses::fixture_for(endpoint).unwrap_or("empty");
            info!(method = %options.method, endpoint, fixture, "serving mock response");
            return Ok(MockResponses::resolve(endpoint));
        }

        let headers = assemble_headers(&session, &options.headers)?;
        let url = format!("{}{PROXY_PREFIX}{endpoint}", self.proxy_origin);
        debug!(method = %options.method, endpoint, target = %session.base_url, "dispatching request");

        let mut builder = self.http.request(options.method.clone(), &url).headers(headers);
        if let Some(body) = &options.body {
            builder = builder.body(body.to_string());
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(err) => {
                error!(endpoint, error = %err, "request could not reach the local relay");
                return Err(ApiError::Network {
                    base_url: session.base_url,
                    reason: err.to_string(),
                });
            }
        };

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            let notified = self.context.unauthorized().publish();
            warn!(endpoint, notified, "request rejected as unauthorized");
            return Err(ApiError::Unauthorized);
        }

        // Only the relay's own 502 carries the marker; backend statuses pass through.
        let relay_failed =
            status == StatusCode::BAD_GATEWAY && response.headers().contains_key(PROXY_ERROR_HEADER);
        let body = match response.bytes().await {
            Ok(body) => body,
            Err(err) => {
                error!(endpoint, error = %err, "failed to read response body");
                return Err(ApiError::Network {
                    base_url: session.base_url,
                    reason: err.to_string(),
                });
            }
        };

        if relay_failed {
            let reason = error_message(&body).unwrap_or_else(|| "relay could not forward the request".to_string());
            error!(endpoint, status = status.as_u16(), reason = %reason, "relay failed to reach the target");
            return Err(ApiError::Network {
                base_url: session.base_url,
                reason,
            });
        }

        if !status.is_success() {
            let message = error_message(&body)
                .unwrap_or_else(|| format!("request failed with status {}", status.as_u16()));
            error!(endpoint, status = status.as_u16(), message = %message, "request failed");
            return Err(ApiError::Http {
                status: status.as_u16(),
                message,
            });
        }

        parse_json_body(status.as_u16(), &body).inspect_err(|err| {
            error!(endpoint, error = %err, "response body is not valid JSON");
        })
    }
}

/// Builds the outgoing header set. Later entries override earlier ones and
/// caller-supplied headers always win.
pub fn assemble_headers(session: &SessionConfig, overrides: &HeaderMap) -> Result<HeaderMap, ApiError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(
        HeaderName::from_static(TARGET_BASE_URL_HEADER),
        header_value(TARGET_BASE_URL_HEADER, &session.base_url)?,
    );

    match &session.token {
        Some(token) => {
            debug!(token = %redact_secret(token), "using configured token");
            headers.insert(
                AUTHORIZATION,
                header_value(AUTHORIZATION.as_str(), &format!("Bearer {token}"))?,
            );
        }
        None => warn!("no API token configured; sending request without Authorization"),
    }

    if let Some(tenant_id) = &session.tenant_id {
        debug!(tenant_id = %tenant_id, "using configured tenant");
        headers.insert(
            HeaderName::from_static(TENANT_ID_HEADER),
            header_value(TENANT_ID_HEADER, tenant_id)?,
        );
    }

    for name in overrides.keys() {
        headers.remove(name);
    }
    for (name, value) in overrides {
        headers.append(name.clone(), value.clone());
    }

    Ok(headers)
}

/// Decodes a 2xx body. An empty body is `null`.
pub fn parse_json_body(status: u16, body: &[u8]) -> Result<Value, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body).map_err(|err| ApiError::Http {
        status,
        message: format!("response is not valid JSON: {err}"),
    })
}

fn error_message(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    ["message", "error"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .filter(|message| !message.is_empty())
        .map(str::to_string)
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(value)
        .map_err(|_| ApiError::Validation(format!("value for header '{name}' is not a valid HTTP header value")))
}

/// Percent-encodes an id for use as a single path segment.
pub(crate) fn path_segment(id: &str) -> Cow<'_, str> {
    urlencoding::encode(id)
}

/// Appends percent-encoded query parameters to an endpoint path.
pub(crate) fn with_query(path: &str, params: &[(&str, &str)]) -> String {
    if params.is_empty() {
        return path.to_string();
    }
    let query = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish();
    format!("{path}?{query}")
}
