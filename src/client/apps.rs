use serde_json::Value;

use super::{ApiClient, ApiError, RequestOptions, path_segment, with_query};

const APPS_PATH: &str = "/console/api/apps";

impl ApiClient {
    pub async fn get_apps(&self, page: u32, limit: u32) -> Result<Value, ApiError> {
        let page = page.to_string();
        let limit = limit.to_string();
        let endpoint = with_query(APPS_PATH, &[("page", page.as_str()), ("limit", limit.as_str())]);
        self.request(&endpoint, RequestOptions::get()).await
    }

    /// Exports an app as YAML DSL under `data`, without secrets.
    pub async fn export_app(&self, app_id: &str) -> Result<Value, ApiError> {
        let endpoint = with_query(
            &format!("{APPS_PATH}/{}/export", path_segment(app_id)),
            &[("include_secret", "false")],
        );
        self.request(&endpoint, RequestOptions::get()).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::client::ApiClient;
    use crate::config::{MOCK_MODE_KEY, MemoryStore};
    use crate::context::AppContext;

    fn mock_client() -> ApiClient {
        let store = MemoryStore::with_entries([(MOCK_MODE_KEY, "true")]);
        ApiClient::new(AppContext::new(Arc::new(store)), "http://127.0.0.1:9").expect("client")
    }

    #[tokio::test]
    async fn export_returns_yaml_dsl() {
        let response = mock_client().export_app("any-id").await.expect("export");
        let data = response["data"].as_str().expect("data string");
        assert!(data.starts_with("app:"));
    }

    #[tokio::test]
    async fn export_ids_with_url_delimiters_stay_exports() {
        let client = mock_client();
        for id in ["draft?v2", "nested/app", "app#1"] {
            let response = client.export_app(id).await.expect("export");
            let data = response["data"].as_str().unwrap_or_default();
            assert!(data.starts_with("app:"), "{id} resolved to {response}");
        }
    }

    #[tokio::test]
    async fn app_list_uses_the_page_envelope() {
        let response = mock_client().get_apps(1, 20).await.expect("apps");
        assert_eq!(response["total"], 3);
        assert_eq!(response["has_more"], false);
    }
}
