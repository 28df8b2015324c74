//! Canned responses served instead of network calls while mock mode is on.

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use serde_json::{Value, json};

const EXPORT_YAML: &str = "app:\n  description: ''\n  icon: '156'\n  icon_background: null\n";
const HEALTHY_RESULT: &str =
    r#"{"status": "healthy", "services": {"db": "up", "cache": "up", "api": "up"}}"#;
// Icons are relative to the configured base URL on purpose, and both locale
// fields of a label or description hold the same English text.
const PROVIDER_ICON_BASE: &str = "/console/api/workspaces/current/tool-provider/builtin";

struct Fixture {
    name: &'static str,
    matches: fn(&str) -> bool,
    generate: fn(&str, DateTime<Utc>) -> Value,
}

// Evaluated top to bottom, first match wins. The export and logs paths also
// contain the broader collection substrings, so they must stay first.
static FIXTURES: &[Fixture] = &[
    Fixture {
        name: "app-export",
        matches: is_app_export,
        generate: app_export,
    },
    Fixture {
        name: "task-logs",
        matches: is_task_logs,
        generate: task_logs,
    },
    Fixture {
        name: "task-list",
        matches: is_task_collection,
        generate: task_list,
    },
    Fixture {
        name: "app-list",
        matches: is_app_collection,
        generate: app_list,
    },
    Fixture {
        name: "tool-providers",
        matches: is_tool_providers,
        generate: tool_providers,
    },
];

pub struct MockResponses;

impl MockResponses {
    pub fn resolve(endpoint: &str) -> Value {
        Self::resolve_at(endpoint, Utc::now())
    }

    /// Same as [`MockResponses::resolve`] with relative timestamps anchored at `now`.
    pub fn resolve_at(endpoint: &str, now: DateTime<Utc>) -> Value {
        let path = strip_query(endpoint);
        FIXTURES
            .iter()
            .find(|fixture| (fixture.matches)(path))
            .map(|fixture| (fixture.generate)(path, now))
            .unwrap_or_else(|| json!({}))
    }

    pub fn fixture_for(endpoint: &str) -> Option<&'static str> {
        let path = strip_query(endpoint);
        FIXTURES
            .iter()
            .find(|fixture| (fixture.matches)(path))
            .map(|fixture| fixture.name)
    }
}

fn strip_query(endpoint: &str) -> &str {
    endpoint
        .split_once('?')
        .map_or(endpoint, |(path, _)| path)
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|segment| !segment.is_empty()).collect()
}

fn is_app_export(path: &str) -> bool {
    segments(path)
        .windows(5)
        .any(|w| w[0] == "console" && w[1] == "api" && w[2] == "apps" && w[4] == "export")
}

fn task_id_of_logs_path(path: &str) -> Option<&str> {
    let parts = segments(path);
    parts
        .windows(3)
        .find(|w| w[0] == "scheduled-tasks" && w[2] == "logs")
        .map(|w| w[1])
}

fn is_task_logs(path: &str) -> bool {
    task_id_of_logs_path(path).is_some()
}

fn is_task_collection(path: &str) -> bool {
    path.contains("/scheduled-tasks")
}

fn is_app_collection(path: &str) -> bool {
    path.contains("/console/api/apps")
}

fn is_tool_providers(path: &str) -> bool {
    path.contains("/tool-providers")
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn app_export(_path: &str, _now: DateTime<Utc>) -> Value {
    json!({ "data": EXPORT_YAML })
}

fn log_entry(
    id: &str,
    task_id: &str,
    start: DateTime<Utc>,
    duration_ms: i64,
    status: &str,
) -> Value {
    json!({
        "id": id,
        "task_id": task_id,
        "start_time": timestamp(start),
        "end_time": timestamp(start + TimeDelta::milliseconds(duration_ms)),
        "status": status,
    })
}

fn with_field(mut entry: Value, key: &str, value: Value) -> Value {
    if let Some(object) = entry.as_object_mut() {
        object.insert(key.to_string(), value);
    }
    entry
}

fn succeeded(entry: Value, result: &str) -> Value {
    with_field(entry, "result", Value::String(result.to_string()))
}

fn failed(entry: Value, message: &str) -> Value {
    with_field(entry, "error_message", Value::String(message.to_string()))
}

fn task_logs(path: &str, now: DateTime<Utc>) -> Value {
    let task_id = task_id_of_logs_path(path).unwrap_or_default();
    let logs = match task_id {
        "task-1" => vec![
            with_field(
                log_entry("log-1-0", "task-1", now, 0, "running"),
                "result",
                Value::Null,
            ),
            succeeded(
                log_entry("log-1-1", "task-1", now - TimeDelta::hours(24), 4500, "success"),
                r#"{"message": "Daily summary completed", "records": 1250}"#,
            ),
            succeeded(
                log_entry("log-1-2", "task-1", now - TimeDelta::hours(48), 5000, "success"),
                r#"{"message": "Daily summary completed", "records": 1100}"#,
            ),
            failed(
                log_entry("log-1-3", "task-1", now - TimeDelta::hours(72), 12000, "failed"),
                "Connection timed out after 10000ms. Remote server did not respond.",
            ),
        ],
        "task-2" => vec![
            succeeded(
                log_entry("log-2-1", "task-2", now - TimeDelta::minutes(30), 800, "success"),
                HEALTHY_RESULT,
            ),
            succeeded(
                log_entry("log-2-2", "task-2", now - TimeDelta::minutes(60), 750, "success"),
                HEALTHY_RESULT,
            ),
            succeeded(
                log_entry("log-2-3", "task-2", now - TimeDelta::minutes(90), 900, "success"),
                HEALTHY_RESULT,
            ),
            failed(
                log_entry("log-2-4", "task-2", now - TimeDelta::minutes(120), 200, "failed"),
                "503 Service Unavailable: Cache service down",
            ),
        ],
        "task-3" => vec![
            succeeded(
                log_entry("log-3-1", "task-3", now - TimeDelta::days(30), 15000, "success"),
                r#"{"sent": 450, "failed": 0, "template": "monthly_report"}"#,
            ),
            succeeded(
                log_entry("log-3-2", "task-3", now - TimeDelta::days(60), 14000, "success"),
                r#"{"sent": 420, "failed": 0, "template": "monthly_report"}"#,
            ),
        ],
        other => vec![succeeded(
            log_entry(&format!("log-{other}-1"), other, now, 0, "success"),
            r#"{"message": "Task executed successfully"}"#,
        )],
    };

    json!({
        "pagination": {
            "total_items": logs.len(),
            "page": 1,
            "per_page": 10,
            "total_pages": 1,
        },
        "logs": logs,
    })
}

fn task_list(_path: &str, now: DateTime<Utc>) -> Value {
    json!({
        "items": [
            {
                "id": "task-1",
                "name": "Daily data summary",
                "description": "Summarizes the previous day's business data every day at 02:00",
                "app_id": "app-1",
                "app_name": "Data analysis app",
                "appType": "internal",
                "api_endpoint": "/api/v1/summary/daily",
                "method": "POST",
                "request_body": { "type": "full" },
                "status": "active",
                "schedule_type": "cron",
                "schedule_expression": "0 2 * * *",
                "created_at": "2023-01-15T10:00:00Z",
                "updated_at": "2023-06-20T14:30:00Z",
                "last_executed_at": timestamp(now - TimeDelta::hours(12)),
            },
            {
                "id": "task-2",
                "name": "System health check",
                "description": "Checks the core services every 30 minutes",
                "app_id": "app-2",
                "app_name": "Operations monitor",
                "appType": "internal",
                "api_endpoint": "/health/check",
                "method": "GET",
                "request_body": {},
                "status": "active",
                "schedule_type": "interval",
                "schedule_expression": "1800",
                "created_at": "2023-03-10T09:15:00Z",
                "updated_at": "2023-03-10T09:15:00Z",
                "last_executed_at": timestamp(now - TimeDelta::minutes(15)),
            },
            {
                "id": "task-3",
                "name": "Monthly report mailing",
                "description": "Sends the monthly report email on the 1st of each month",
                "app_id": null,
                "app_name": "Email service",
                "appType": "external",
                "api_endpoint": "https://api.email-service.com/send",
                "method": "POST",
                "request_body": { "template": "monthly_report" },
                "status": "inactive",
                "schedule_type": "cron",
                "schedule_expression": "0 9 1 * *",
                "created_at": "2023-05-01T08:00:00Z",
                "updated_at": "2023-05-01T08:00:00Z",
                "last_executed_at": "2023-06-01T09:00:00Z",
            },
        ],
        "total": 3,
        "pages": 1,
        "current_page": 1,
        "per_page": 10,
    })
}

fn app_list(_path: &str, _now: DateTime<Utc>) -> Value {
    json!({
        "data": [
            {
                "id": "app-1",
                "name": "Data analysis app",
                "description": "Analyzes business data",
                "mode": "workflow",
                "enable_site": true,
                "enable_api": true,
                "api_rpm": 60,
                "api_rph": 3600,
                "is_demo": false,
                "created_at": "2023-01-01T00:00:00Z",
            },
            {
                "id": "app-2",
                "name": "Operations monitor",
                "description": "Monitors system status",
                "mode": "agent",
                "enable_site": false,
                "enable_api": true,
                "api_rpm": 100,
                "api_rph": 6000,
                "is_demo": false,
                "created_at": "2023-02-01T00:00:00Z",
            },
            {
                "id": "app-3",
                "name": "Customer service assistant",
                "description": "Answers customer questions automatically",
                "mode": "chat",
                "enable_site": true,
                "enable_api": true,
                "api_rpm": 30,
                "api_rph": 1800,
                "is_demo": true,
                "created_at": "2023-03-01T00:00:00Z",
            },
        ],
        "total": 3,
        "page": 1,
        "limit": 20,
        "has_more": false,
    })
}

fn builtin_provider(
    name: &str,
    author: &str,
    label: &str,
    description: &str,
    authorized: bool,
    labels: &[&str],
) -> Value {
    json!({
        "id": name,
        "author": author,
        "name": name,
        "description": { "zh_Hans": description, "en_US": description },
        "icon": format!("{PROVIDER_ICON_BASE}/{name}/icon"),
        "label": { "zh_Hans": label, "en_US": label },
        "type": "builtin",
        "is_team_authorization": authorized,
        "allow_delete": false,
        "tools": [],
        "labels": labels,
    })
}

fn tool_providers(_path: &str, _now: DateTime<Utc>) -> Value {
    Value::Array(vec![
        builtin_provider(
            "serpapi",
            "SerpApi",
            "SerpApi",
            "Google Search, Bing Search, Baidu Search, etc.",
            true,
            &["search"],
        ),
        builtin_provider(
            "google",
            "Google",
            "Google",
            "Google Search, Gmail, Google Calendar, etc.",
            false,
            &["search", "productivity"],
        ),
    ])
}
