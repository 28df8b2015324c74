#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use anyhow::{Result, bail};
use axum::Router;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

pub const BIN: &str = env!("CARGO_BIN_EXE_agent-console");

pub struct Relay {
    pub port: u16,
    child: Child,
}

impl Relay {
    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub async fn stop(mut self) -> Result<()> {
        self.child.kill().await?;
        Ok(())
    }
}

pub struct Backend {
    pub port: u16,
    shutdown: CancellationToken,
}

impl Backend {
    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }
}

impl Drop for Backend {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

pub fn config_dir(temp: &tempfile::TempDir) -> Result<PathBuf> {
    let dir = temp.path().join("agent-console");
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

pub fn write_settings(dir: &Path, contents: &str) -> Result<()> {
    let path = dir.join("settings.json");
    std::fs::write(&path, contents)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

pub async fn spawn_relay(config_dir: &Path) -> Result<Relay> {
    let port_file = config_dir.join("relay-port");
    let child = Command::new(BIN)
        .arg("serve")
        .arg("--port")
        .arg("0")
        .arg("--port-file")
        .arg(&port_file)
        .env("AGENT_CONSOLE_CONFIG_DIR", config_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()?;

    let port = wait_for_port(&port_file).await?;
    wait_for_health(port).await?;
    Ok(Relay { port, child })
}

pub async fn spawn_backend(app: Router) -> Result<Backend> {
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await?;
    let port = listener.local_addr()?.port();
    let shutdown = CancellationToken::new();

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled_owned().await })
                .await;
        }
    });

    Ok(Backend { port, shutdown })
}

/// Runs one CLI invocation against `config_dir` with stdin closed.
pub async fn run_cli(config_dir: &Path, args: &[&str]) -> Result<Output> {
    run_cli_with_input(config_dir, args, None).await
}

pub async fn run_cli_with_input(
    config_dir: &Path,
    args: &[&str],
    input: Option<&str>,
) -> Result<Output> {
    use tokio::io::AsyncWriteExt;

    let mut child = Command::new(BIN)
        .args(args)
        .env("AGENT_CONSOLE_CONFIG_DIR", config_dir)
        .env_remove("AGENT_CONSOLE_PROXY_URL")
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    if let Some(input) = input
        && let Some(mut stdin) = child.stdin.take()
    {
        stdin.write_all(input.as_bytes()).await?;
        drop(stdin);
    }

    let output = tokio::time::timeout(Duration::from_secs(20), child.wait_with_output()).await??;
    Ok(output)
}

pub fn stdout_json(output: &Output) -> Result<serde_json::Value> {
    if !output.status.success() {
        bail!(
            "command failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }
    Ok(serde_json::from_slice(&output.stdout)?)
}

async fn wait_for_port(port_file: &Path) -> Result<u16> {
    for _ in 0..200 {
        match tokio::fs::read_to_string(port_file).await {
            Ok(raw) => {
                if let Ok(port) = raw.trim().parse::<u16>() {
                    return Ok(port);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    bail!("relay port file did not become ready in time")
}

async fn wait_for_health(port: u16) -> Result<()> {
    let http = reqwest::Client::new();
    for _ in 0..50 {
        let response = http
            .get(format!("http://127.0.0.1:{port}/health"))
            .send()
            .await;
        if let Ok(resp) = response
            && resp.status().is_success()
        {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    bail!("relay health endpoint did not become ready in time")
}
