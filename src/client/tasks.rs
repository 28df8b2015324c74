use serde_json::Value;

use super::{ApiClient, ApiError, RequestOptions, path_segment, with_query};

const TASKS_PATH: &str = "/console/api/scheduled-tasks";

impl ApiClient {
    pub async fn get_tasks(
        &self,
        page: u32,
        per_page: u32,
        name: Option<&str>,
    ) -> Result<Value, ApiError> {
        let page = page.to_string();
        let per_page = per_page.to_string();
        let mut params = vec![("page", page.as_str()), ("per_page", per_page.as_str())];
        if let Some(name) = name.filter(|name| !name.is_empty()) {
            params.push(("name", name));
        }
        self.request(&with_query(TASKS_PATH, &params), RequestOptions::get())
            .await
    }

    pub async fn create_task(&self, task: Value) -> Result<Value, ApiError> {
        self.request(TASKS_PATH, RequestOptions::post().json(task))
            .await
    }

    pub async fn update_task(&self, id: &str, task: Value) -> Result<Value, ApiError> {
        self.request(&format!("{TASKS_PATH}/{}", path_segment(id)), RequestOptions::put().json(task))
            .await
    }

    pub async fn delete_task(&self, id: &str) -> Result<Value, ApiError> {
        self.request(&format!("{TASKS_PATH}/{}", path_segment(id)), RequestOptions::delete())
            .await
    }

    /// Flips a task between `active` and `inactive`.
    pub async fn toggle_task_status(&self, id: &str) -> Result<Value, ApiError> {
        self.request(&format!("{TASKS_PATH}/{}/toggle", path_segment(id)), RequestOptions::post())
            .await
    }

    pub async fn get_task_logs(
        &self,
        id: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Value, ApiError> {
        let page = page.to_string();
        let per_page = per_page.to_string();
        let endpoint = with_query(
            &format!("{TASKS_PATH}/{}/logs", path_segment(id)),
            &[("page", page.as_str()), ("per_page", per_page.as_str())],
        );
        self.request(&endpoint, RequestOptions::get()).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::Router;
    use axum::extract::{OriginalUri, State};
    use axum::http::Method;
    use axum::routing::any;
    use serde_json::{Value, json};

    use crate::client::ApiClient;
    use crate::config::{MOCK_MODE_KEY, MemoryStore};
    use crate::context::AppContext;
    use crate::test_support::spawn_router;

    type Seen = Arc<Mutex<Vec<(Method, String, String)>>>;

    fn mock_client() -> ApiClient {
        let store = MemoryStore::with_entries([(MOCK_MODE_KEY, "true")]);
        ApiClient::new(AppContext::new(Arc::new(store)), "http://127.0.0.1:9").expect("client")
    }

    async fn record(
        State(seen): State<Seen>,
        method: Method,
        OriginalUri(uri): OriginalUri,
        body: String,
    ) -> axum::Json<Value> {
        if let Ok(mut guard) = seen.lock() {
            guard.push((method, uri.to_string(), body));
        }
        axum::Json(json!({ "ok": true }))
    }

    #[tokio::test]
    async fn task_list_in_mock_mode() {
        let response = mock_client().get_tasks(1, 10, None).await.expect("tasks");
        assert_eq!(response["items"].as_array().map(Vec::len), Some(3));
        assert_eq!(response["total"], json!(3));
    }

    #[tokio::test]
    async fn task_three_logs_in_mock_mode() {
        let response = mock_client()
            .get_task_logs("task-3", 1, 10)
            .await
            .expect("logs");
        let logs = response["logs"].as_array().expect("logs");
        assert_eq!(logs.len(), 2);
        assert!(logs.iter().all(|log| log["status"] == json!("success")));
    }

    #[tokio::test]
    async fn logs_for_an_id_with_a_query_delimiter_in_mock_mode() {
        let response = mock_client()
            .get_task_logs("task?3", 1, 10)
            .await
            .expect("logs");
        assert!(response["logs"].is_array(), "unexpected response {response}");
    }

    #[tokio::test]
    async fn wrappers_hit_the_documented_endpoints() {
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let server = spawn_router(
            Router::new()
                .route("/api-proxy/{*path}", any(record))
                .with_state(Arc::clone(&seen)),
        )
        .await;
        let client = ApiClient::new(AppContext::new(Arc::new(MemoryStore::new())), server.url())
            .expect("client");

        client
            .get_tasks(2, 5, Some("daily summary"))
            .await
            .expect("list");
        client
            .create_task(json!({ "name": "nightly" }))
            .await
            .expect("create");
        client
            .update_task("task-9", json!({ "status": "inactive" }))
            .await
            .expect("update");
        client.toggle_task_status("task 9?").await.expect("toggle");
        client.delete_task("task-9").await.expect("delete");

        let seen = seen.lock().expect("seen lock");
        let calls: Vec<(String, String)> = seen
            .iter()
            .map(|(method, uri, _)| (method.to_string(), uri.clone()))
            .collect();
        assert_eq!(
            calls,
            vec![
                (
                    "GET".to_string(),
                    "/api-proxy/console/api/scheduled-tasks?page=2&per_page=5&name=daily+summary"
                        .to_string()
                ),
                (
                    "POST".to_string(),
                    "/api-proxy/console/api/scheduled-tasks".to_string()
                ),
                (
                    "PUT".to_string(),
                    "/api-proxy/console/api/scheduled-tasks/task-9".to_string()
                ),
                (
                    "POST".to_string(),
                    "/api-proxy/console/api/scheduled-tasks/task%209%3F/toggle".to_string()
                ),
                (
                    "DELETE".to_string(),
                    "/api-proxy/console/api/scheduled-tasks/task-9".to_string()
                ),
            ]
        );
        let created: Value = serde_json::from_str(&seen[1].2).expect("create body");
        assert_eq!(created, json!({ "name": "nightly" }));
    }
}
