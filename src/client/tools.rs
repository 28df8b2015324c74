use std::fmt;
use std::str::FromStr;

use serde_json::{Value, json};

use super::{ApiClient, ApiError, RequestOptions, path_segment, with_query};

const WORKSPACE_PATH: &str = "/console/api/workspaces/current";

/// Tool catalog families exposed by `tools/{kind}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    Builtin,
    Api,
    Workflow,
}

impl ToolKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Builtin => "builtin",
            Self::Api => "api",
            Self::Workflow => "workflow",
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "builtin" => Ok(Self::Builtin),
            "api" | "custom" => Ok(Self::Api),
            "workflow" => Ok(Self::Workflow),
            other => Err(format!(
                "unknown tool kind '{other}' (expected builtin, api or workflow)"
            )),
        }
    }
}

fn workspace(path: &str) -> String {
    format!("{WORKSPACE_PATH}/{path}")
}

fn provider_path(path: &str) -> String {
    workspace(&format!("tool-provider/{path}"))
}

impl ApiClient {
    async fn get_json(&self, endpoint: &str) -> Result<Value, ApiError> {
        self.request(endpoint, RequestOptions::get()).await
    }

    async fn post_json(&self, endpoint: &str, body: Option<Value>) -> Result<Value, ApiError> {
        let options = match body {
            Some(body) => RequestOptions::post().json(body),
            None => RequestOptions::post(),
        };
        self.request(endpoint, options).await
    }

    pub async fn list_tool_providers(&self) -> Result<Value, ApiError> {
        self.get_json(&workspace("tool-providers")).await
    }

    pub async fn get_builtin_tools(&self, collection: &str) -> Result<Value, ApiError> {
        self.get_json(&provider_path(&format!("builtin/{}/tools", path_segment(collection))))
            .await
    }

    pub async fn get_custom_tools(&self, provider: &str) -> Result<Value, ApiError> {
        self.get_json(&with_query(&provider_path("api/tools"), &[("provider", provider)]))
            .await
    }

    pub async fn get_model_tools(&self, provider: &str) -> Result<Value, ApiError> {
        self.get_json(&with_query(&provider_path("model/tools"), &[("provider", provider)]))
            .await
    }

    pub async fn get_workflow_tools(&self, workflow_tool_id: &str) -> Result<Value, ApiError> {
        self.get_json(&with_query(
            &provider_path("workflow/tools"),
            &[("workflow_tool_id", workflow_tool_id)],
        ))
        .await
    }

    pub async fn get_builtin_credentials_schema(&self, collection: &str) -> Result<Value, ApiError> {
        self.get_json(&provider_path(&format!(
            "builtin/{}/credentials_schema",
            path_segment(collection)
        )))
            .await
    }

    pub async fn get_builtin_credentials(&self, collection: &str) -> Result<Value, ApiError> {
        self.get_json(&provider_path(&format!("builtin/{}/credentials", path_segment(collection))))
            .await
    }

    pub async fn update_builtin_credentials(
        &self,
        collection: &str,
        credentials: Value,
    ) -> Result<Value, ApiError> {
        self.post_json(
            &provider_path(&format!("builtin/{}/update", path_segment(collection))),
            Some(json!({ "credentials": credentials })),
        )
        .await
    }

    pub async fn delete_builtin_credentials(&self, collection: &str) -> Result<Value, ApiError> {
        self.post_json(&provider_path(&format!("builtin/{}/delete", path_segment(collection))), None)
            .await
    }

    /// Parses an OpenAPI/Swagger schema into tool definitions server-side.
    pub async fn parse_schema(&self, schema: &str) -> Result<Value, ApiError> {
        self.post_json(&provider_path("api/schema"), Some(json!({ "schema": schema })))
            .await
    }

    pub async fn get_custom_collection(&self, provider: &str) -> Result<Value, ApiError> {
        self.get_json(&with_query(&provider_path("api/get"), &[("provider", provider)]))
            .await
    }

    pub async fn add_custom_collection(&self, collection: Value) -> Result<Value, ApiError> {
        self.post_json(&provider_path("api/add"), Some(collection))
            .await
    }

    pub async fn update_custom_collection(&self, collection: Value) -> Result<Value, ApiError> {
        self.post_json(&provider_path("api/update"), Some(collection))
            .await
    }

    pub async fn delete_custom_collection(&self, provider: &str) -> Result<Value, ApiError> {
        self.post_json(&provider_path("api/delete"), Some(json!({ "provider": provider })))
            .await
    }

    pub async fn import_schema_from_url(&self, url: &str) -> Result<Value, ApiError> {
        self.get_json(&with_query(&provider_path("api/remote"), &[("url", url)]))
            .await
    }

    pub async fn test_api_availability(&self, request: Value) -> Result<Value, ApiError> {
        self.post_json(&provider_path("api/test/pre"), Some(request))
            .await
    }

    pub async fn list_all_tools(&self, kind: ToolKind) -> Result<Value, ApiError> {
        self.get_json(&workspace(&format!("tools/{kind}"))).await
    }

    pub async fn get_tool_labels(&self) -> Result<Value, ApiError> {
        self.get_json(&workspace("tool-labels")).await
    }

    pub async fn create_workflow_tool_provider(&self, provider: Value) -> Result<Value, ApiError> {
        self.post_json(&provider_path("workflow/create"), Some(provider))
            .await
    }

    pub async fn update_workflow_tool_provider(&self, provider: Value) -> Result<Value, ApiError> {
        self.post_json(&provider_path("workflow/update"), Some(provider))
            .await
    }

    pub async fn get_workflow_tool_provider_by_app_id(&self, app_id: &str) -> Result<Value, ApiError> {
        self.get_json(&with_query(
            &provider_path("workflow/get"),
            &[("workflow_app_id", app_id)],
        ))
        .await
    }

    pub async fn get_workflow_tool_provider_by_tool_id(
        &self,
        tool_id: &str,
    ) -> Result<Value, ApiError> {
        self.get_json(&with_query(
            &provider_path("workflow/get"),
            &[("workflow_tool_id", tool_id)],
        ))
        .await
    }

    pub async fn delete_workflow_tool(&self, tool_id: &str) -> Result<Value, ApiError> {
        self.post_json(
            &provider_path("workflow/delete"),
            Some(json!({ "workflow_tool_id": tool_id })),
        )
        .await
    }
}
