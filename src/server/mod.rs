mod console;
mod proxy;

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::Json;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::cli::ServeArgs;
use crate::client::PROXY_PREFIX;
use crate::context::AppContext;
use crate::logging::LogBuffer;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct AppState {
    context: AppContext,
    logs: LogBuffer,
    relay: reqwest::Client,
}

impl AppState {
    pub fn new(context: AppContext, logs: LogBuffer) -> Self {
        // Development backends commonly present self-signed certificates.
        let relay = match reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .redirect(reqwest::redirect::Policy::none())
            .build()
        {
            Ok(client) => client,
            Err(err) => {
                warn!(error = %err, "failed to build relay HTTP client; falling back to default reqwest client");
                reqwest::Client::new()
            }
        };
        Self {
            context,
            logs,
            relay,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug)]
struct RouteError {
    status: StatusCode,
    message: String,
}

impl RouteError {
    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(PROXY_PREFIX, any(proxy::forward))
        .route(&format!("{PROXY_PREFIX}/{{*path}}"), any(proxy::forward))
        .route("/health", get(console::health))
        .route(
            "/settings",
            get(console::settings).put(console::update_settings),
        )
        .route("/logs", get(console::logs))
        .with_state(state)
}

pub async fn serve(args: ServeArgs, context: AppContext, logs: LogBuffer) -> Result<()> {
    let addr = SocketAddr::from((args.host, args.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind relay on {addr}"))?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve local address for relay listener")?;
    if let Some(path) = &args.port_file {
        tokio::fs::write(path, format!("{}\n", local_addr.port()))
            .await
            .with_context(|| format!("failed to write relay port to {}", path.display()))?;
    }

    let session = context.load_session().await;
    info!(
        addr = %local_addr,
        base_url = %session.base_url,
        mock_mode = session.mock_mode,
        "relay listening"
    );

    let app = router(AppState::new(context, logs));
    let shutdown = CancellationToken::new();
    let mut server = tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled_owned().await })
                .await
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
        }
        joined = &mut server => {
            return match joined {
                Ok(Ok(())) => {
                    info!("relay exited");
                    Ok(())
                }
                Ok(Err(err)) => {
                    error!(error = %err, "relay failed");
                    Err(err).context("relay server failed")
                }
                Err(err) => Err(err).context("relay task join failed"),
            };
        }
    }

    shutdown.cancel();
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, server).await.is_err() {
        warn!("graceful shutdown timed out, exiting");
    }
    Ok(())
}
