mod support;

use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::{OriginalUri, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::any;
use serde_json::{Value, json};

use support::{config_dir, run_cli, run_cli_with_input, spawn_backend, spawn_relay, stdout_json};

type Seen = Arc<Mutex<Vec<(String, HeaderMap)>>>;

async fn tasks_backend(
    State(seen): State<Seen>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
) -> (StatusCode, axum::Json<Value>) {
    let authorized = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        == Some("Bearer valid-token");
    if let Ok(mut guard) = seen.lock() {
        guard.push((uri.to_string(), headers));
    }
    if !authorized {
        return (
            StatusCode::UNAUTHORIZED,
            axum::Json(json!({ "message": "invalid token" })),
        );
    }
    (
        StatusCode::OK,
        axum::Json(json!({
            "items": [{ "id": "remote-task", "name": "remote" }],
            "total": 1,
            "pages": 1,
            "current_page": 1,
            "per_page": 10,
        })),
    )
}

#[tokio::test]
async fn cli_reaches_backend_through_relay() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    let dir = config_dir(&temp)?;
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let backend = spawn_backend(
        Router::new()
            .route("/console/api/scheduled-tasks", any(tasks_backend))
            .with_state(Arc::clone(&seen)),
    )
    .await?;

    let set = run_cli(
        &dir,
        &[
            "config",
            "set",
            "--base-url",
            &backend.url(),
            "--token",
            "valid-token",
            "--tenant-id",
            "tenant-42",
        ],
    )
    .await?;
    let view = stdout_json(&set)?;
    assert_eq!(view["token"], json!("valid-to..."));

    let relay = spawn_relay(&dir).await?;
    let output = run_cli(
        &dir,
        &[
            "--proxy-url",
            &relay.url(),
            "tasks",
            "list",
            "--name",
            "nightly report",
        ],
    )
    .await?;
    let body = stdout_json(&output)?;
    assert_eq!(body["total"], json!(1));
    assert_eq!(body["items"][0]["id"], json!("remote-task"));

    {
        let seen = seen.lock().map_err(|_| anyhow::anyhow!("seen lock poisoned"))?;
        assert_eq!(seen.len(), 1);
        let (uri, headers) = &seen[0];
        assert_eq!(
            uri,
            "/console/api/scheduled-tasks?page=1&per_page=10&name=nightly+report"
        );
        assert_eq!(headers["x-tenant-id"], "tenant-42");
        assert!(headers.get("x-target-base-url").is_none());
    }

    relay.stop().await?;
    Ok(())
}

#[tokio::test]
async fn rejected_token_prompts_for_credentials() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    let dir = config_dir(&temp)?;
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let backend = spawn_backend(
        Router::new()
            .route("/console/api/scheduled-tasks", any(tasks_backend))
            .with_state(Arc::clone(&seen)),
    )
    .await?;
    stdout_json(&run_cli(&dir, &["config", "set", "--base-url", &backend.url()]).await?)?;
    let relay = spawn_relay(&dir).await?;

    let output = run_cli(&dir, &["--proxy-url", &relay.url(), "tasks", "list"]).await?;
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("credentials were rejected"),
        "unexpected stderr: {stderr}"
    );

    let output = run_cli_with_input(
        &dir,
        &["--proxy-url", &relay.url(), "--reprompt", "tasks", "list"],
        Some("valid-token\n"),
    )
    .await?;
    let body = stdout_json(&output)?;
    assert_eq!(body["total"], json!(1));

    let shown = stdout_json(&run_cli(&dir, &["config", "show"]).await?)?;
    assert_eq!(shown["token"], json!("valid-to..."));

    relay.stop().await?;
    Ok(())
}

#[tokio::test]
async fn unreachable_backend_reports_base_url() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    let dir = config_dir(&temp)?;
    let unused = std::net::TcpListener::bind("127.0.0.1:0")?;
    let dead_url = format!("http://127.0.0.1:{}", unused.local_addr()?.port());
    drop(unused);

    stdout_json(&run_cli(&dir, &["config", "set", "--base-url", &dead_url]).await?)?;
    let relay = spawn_relay(&dir).await?;

    let output = run_cli(&dir, &["--proxy-url", &relay.url(), "apps", "list"]).await?;
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains(&dead_url), "unexpected stderr: {stderr}");

    relay.stop().await?;
    Ok(())
}

#[tokio::test]
async fn relay_requires_target_header() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    let dir = config_dir(&temp)?;
    let relay = spawn_relay(&dir).await?;

    let response = reqwest::Client::new()
        .get(format!("{}/api-proxy/console/api/apps", relay.url()))
        .send()
        .await?;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await?;
    assert_eq!(body, json!({ "error": "Missing x-target-base-url header" }));

    relay.stop().await?;
    Ok(())
}
