mod support;

use serde_json::json;

use support::{config_dir, run_cli, stdout_json, write_settings};

// Nothing listens on the discard port; mock mode must never dispatch.
const CLOSED_PROXY: &str = "http://127.0.0.1:9";

#[tokio::test]
async fn mock_mode_serves_canned_task_data_offline() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    let dir = config_dir(&temp)?;
    write_settings(&dir, r#"{ "console_mock_mode": "true" }"#)?;

    let tasks = stdout_json(&run_cli(&dir, &["--proxy-url", CLOSED_PROXY, "tasks", "list"]).await?)?;
    assert_eq!(tasks["items"].as_array().map(Vec::len), Some(3));
    assert_eq!(tasks["total"], json!(3));

    let logs = stdout_json(
        &run_cli(
            &dir,
            &["--proxy-url", CLOSED_PROXY, "tasks", "logs", "task-3"],
        )
        .await?,
    )?;
    let entries = logs["logs"].as_array().cloned().unwrap_or_default();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|entry| entry["status"] == json!("success")));

    let providers =
        stdout_json(&run_cli(&dir, &["--proxy-url", CLOSED_PROXY, "tools", "providers"]).await?)?;
    assert_eq!(providers.as_array().map(Vec::len), Some(2));

    let labels =
        stdout_json(&run_cli(&dir, &["--proxy-url", CLOSED_PROXY, "tools", "labels"]).await?)?;
    assert_eq!(labels, json!({}));
    Ok(())
}

#[tokio::test]
async fn mock_export_prints_yaml() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    let dir = config_dir(&temp)?;
    write_settings(&dir, r#"{ "console_mock_mode": "true" }"#)?;

    let output = run_cli(
        &dir,
        &["--proxy-url", CLOSED_PROXY, "apps", "export", "app-1"],
    )
    .await?;
    assert!(output.status.success());
    let yaml = String::from_utf8(output.stdout)?;
    assert!(yaml.starts_with("app:"), "unexpected export: {yaml}");

    let out = temp.path().join("app-1.yml");
    let output = run_cli(
        &dir,
        &[
            "--proxy-url",
            CLOSED_PROXY,
            "apps",
            "export",
            "app-1",
            "--out",
            out.to_str().unwrap_or_default(),
        ],
    )
    .await?;
    assert!(output.status.success());
    assert!(std::fs::read_to_string(&out)?.starts_with("app:"));
    Ok(())
}

#[tokio::test]
async fn only_literal_true_enables_mock_mode() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    let dir = config_dir(&temp)?;
    write_settings(&dir, r#"{ "console_mock_mode": "TRUE" }"#)?;

    let output = run_cli(&dir, &["--proxy-url", CLOSED_PROXY, "apps", "list"]).await?;
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("http://192.168.1.201:5005"), "unexpected stderr: {stderr}");
    Ok(())
}
