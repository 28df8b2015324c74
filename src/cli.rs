use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use reqwest::Method;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use crate::client::{ApiClient, ApiError, RequestOptions, ToolKind};
use crate::config::{ConfigStore, SessionConfig, SettingsUpdate};
use crate::context::AppContext;
use crate::logging::LogBuffer;
use crate::server;

pub const DEFAULT_PROXY_URL: &str = "http://127.0.0.1:3000";

#[derive(Debug, Parser)]
#[command(
    name = "agent-console",
    version,
    about = "Console for AI apps, scheduled tasks and tool extensions"
)]
pub struct Cli {
    /// Origin of the local relay started by `agent-console serve`.
    #[arg(long, global = true, env = "AGENT_CONSOLE_PROXY_URL", default_value = DEFAULT_PROXY_URL)]
    proxy_url: String,
    /// Prompt for a new token on stdin and retry once when credentials are rejected.
    #[arg(long, global = true, default_value_t = false)]
    reprompt: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the local request relay.
    Serve(ServeArgs),
    /// Show or change the stored connection settings.
    #[command(subcommand)]
    Config(ConfigCommand),
    #[command(flatten)]
    View(ViewCommand),
}

#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    /// Loopback address for the relay.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: IpAddr,
    #[arg(long, default_value_t = 3000)]
    pub port: u16,
    /// Optional file path to write the resolved listener port.
    #[arg(long, hide = true)]
    pub port_file: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    Show,
    Set(ConfigSetArgs),
    /// Restore the default base URL and clear token, tenant and mock mode.
    Reset,
}

#[derive(Debug, Args)]
struct ConfigSetArgs {
    #[arg(long)]
    base_url: Option<String>,
    /// Bearer token; pass an empty string to clear it.
    #[arg(long)]
    token: Option<String>,
    #[arg(long)]
    tenant_id: Option<String>,
    #[arg(long)]
    mock_mode: Option<bool>,
}

#[derive(Debug, Subcommand)]
enum ViewCommand {
    #[command(subcommand)]
    Apps(AppsCommand),
    #[command(subcommand)]
    Tasks(TasksCommand),
    #[command(subcommand)]
    Tools(ToolsCommand),
    /// Send an arbitrary request through the relay.
    Request(RequestArgs),
}

#[derive(Debug, Subcommand)]
enum AppsCommand {
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Export an app's DSL (YAML), without secrets.
    Export {
        app_id: String,
        /// Write the YAML to a file instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Debug, Subcommand)]
enum TasksCommand {
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 10)]
        per_page: u32,
        #[arg(long)]
        name: Option<String>,
    },
    Create {
        /// Task definition as a JSON object.
        #[arg(long)]
        body: String,
    },
    Update {
        id: String,
        #[arg(long)]
        body: String,
    },
    Delete {
        id: String,
    },
    /// Switch a task between active and inactive.
    Toggle {
        id: String,
    },
    Logs {
        id: String,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 10)]
        per_page: u32,
    },
}

#[derive(Debug, Subcommand)]
enum ToolsCommand {
    /// List tool collections (providers).
    Providers,
    BuiltinTools {
        collection: String,
    },
    CustomTools {
        provider: String,
    },
    ModelTools {
        provider: String,
    },
    WorkflowTools {
        workflow_tool_id: String,
    },
    /// List every tool of one family: builtin, api or workflow.
    All {
        kind: ToolKind,
    },
    Labels,
    #[command(subcommand)]
    Credentials(CredentialsCommand),
    #[command(subcommand)]
    Custom(CustomCommand),
    #[command(subcommand)]
    Workflow(WorkflowCommand),
}

#[derive(Debug, Subcommand)]
enum CredentialsCommand {
    Schema { collection: String },
    Show { collection: String },
    Update {
        collection: String,
        /// Credential values as a JSON object.
        #[arg(long)]
        body: String,
    },
    Delete { collection: String },
}

#[derive(Debug, Subcommand)]
enum CustomCommand {
    /// Parse an OpenAPI/Swagger schema file into tool definitions.
    ParseSchema { path: PathBuf },
    Get { provider: String },
    Add {
        #[arg(long)]
        body: String,
    },
    Update {
        #[arg(long)]
        body: String,
    },
    Delete { provider: String },
    /// Fetch a schema from a URL.
    Import { url: String },
    Test {
        #[arg(long)]
        body: String,
    },
}

#[derive(Debug, Subcommand)]
enum WorkflowCommand {
    Create {
        #[arg(long)]
        body: String,
    },
    Update {
        #[arg(long)]
        body: String,
    },
    Get {
        #[arg(long, conflicts_with = "tool_id", required_unless_present = "tool_id")]
        app_id: Option<String>,
        #[arg(long)]
        tool_id: Option<String>,
    },
    Delete { tool_id: String },
}

#[derive(Debug, Args)]
struct RequestArgs {
    /// HTTP method, e.g. GET or POST.
    method: String,
    /// Endpoint path relative to the API base URL, e.g. /console/api/apps.
    endpoint: String,
    #[arg(long)]
    body: Option<String>,
    /// Extra header as `Name: value`; may be repeated.
    #[arg(long = "header", short = 'H')]
    headers: Vec<String>,
}

pub async fn run(cli: Cli, store: ConfigStore, logs: LogBuffer) -> Result<()> {
    let Cli {
        proxy_url,
        reprompt,
        command,
    } = cli;

    match command {
        Commands::Serve(args) => {
            if !args.host.is_loopback() {
                bail!("relay host must be loopback-only (127.0.0.1 or ::1)");
            }
            for path in store.weak_permission_paths()? {
                warn!(
                    path = %path.display(),
                    "permissions are weaker than owner-only; expected 0600 files and 0700 dir"
                );
            }
            server::serve(args, AppContext::new(Arc::new(store)), logs).await
        }
        Commands::Config(command) => run_config(command, &AppContext::new(Arc::new(store))).await,
        Commands::View(view) => {
            let client = ApiClient::new(AppContext::new(Arc::new(store)), proxy_url)?;
            let mut stdin = BufReader::new(tokio::io::stdin());
            let value = run_view(&view, &client, reprompt, &mut stdin).await?;
            render(&view, &value)
        }
    }
}

async fn run_config(command: ConfigCommand, context: &AppContext) -> Result<()> {
    let session = match command {
        ConfigCommand::Show => context.load_session().await,
        ConfigCommand::Set(args) => {
            let update = SettingsUpdate {
                base_url: args.base_url,
                token: args.token,
                tenant_id: args.tenant_id,
                mock_mode: args.mock_mode,
            };
            if update.is_empty() {
                bail!("nothing to set; pass --base-url, --token, --tenant-id or --mock-mode");
            }
            let mut session = context.load_session().await;
            update.apply(&mut session);
            context.save_session_async(session.clone()).await?;
            info!(base_url = %session.base_url, mock_mode = session.mock_mode, "settings saved");
            session
        }
        ConfigCommand::Reset => {
            let session = SessionConfig::default();
            context.save_session_async(session.clone()).await?;
            session
        }
    };
    print_json(&serde_json::to_value(session.view()).context("failed to serialize settings")?)
}

/// Runs one view command. When credentials are rejected the unauthorized
/// channel tells the user how to fix them; with `reprompt` a new token is read
/// from `input`, saved, and the command retried once.
async fn run_view<R>(
    view: &ViewCommand,
    client: &ApiClient,
    reprompt: bool,
    input: &mut R,
) -> Result<Value>
where
    R: AsyncBufRead + Unpin,
{
    let rejected = Arc::new(AtomicBool::new(false));
    let _subscription = {
        let rejected = Arc::clone(&rejected);
        client.context().unauthorized().subscribe(move || {
            rejected.store(true, Ordering::SeqCst);
            eprintln!(
                "credentials were rejected; configure a valid token with `agent-console config set --token <TOKEN>`"
            );
        })
    };
    debug!(
        subscribers = client.context().unauthorized().subscriber_count(),
        "watching for rejected credentials"
    );

    match execute(view, client).await {
        Err(err) if reprompt && err.is_unauthorized() && rejected.load(Ordering::SeqCst) => {
            let token = read_token(input).await?;
            let mut session = client.context().load_session().await;
            session.token = Some(token);
            client.context().save_session_async(session).await?;
            info!("token updated; retrying request");
            Ok(execute(view, client).await?)
        }
        outcome => Ok(outcome?),
    }
}

async fn read_token<R>(input: &mut R) -> Result<String>
where
    R: AsyncBufRead + Unpin,
{
    eprint!("new API token: ");
    let mut line = String::new();
    input
        .read_line(&mut line)
        .await
        .context("failed to read token from stdin")?;
    let token = line.trim();
    if token.is_empty() {
        bail!("no token entered; request not retried");
    }
    Ok(token.to_string())
}

async fn execute(view: &ViewCommand, client: &ApiClient) -> Result<Value, ApiError> {
    match view {
        ViewCommand::Apps(command) => match command {
            AppsCommand::List { page, limit } => client.get_apps(*page, *limit).await,
            AppsCommand::Export { app_id, .. } => client.export_app(app_id).await,
        },
        ViewCommand::Tasks(command) => match command {
            TasksCommand::List {
                page,
                per_page,
                name,
            } => client.get_tasks(*page, *per_page, name.as_deref()).await,
            TasksCommand::Create { body } => client.create_task(json_object(body)?).await,
            TasksCommand::Update { id, body } => client.update_task(id, json_object(body)?).await,
            TasksCommand::Delete { id } => client.delete_task(id).await,
            TasksCommand::Toggle { id } => client.toggle_task_status(id).await,
            TasksCommand::Logs { id, page, per_page } => {
                client.get_task_logs(id, *page, *per_page).await
            }
        },
        ViewCommand::Tools(command) => execute_tools(command, client).await,
        ViewCommand::Request(args) => {
            let method = Method::from_bytes(args.method.to_ascii_uppercase().as_bytes())
                .map_err(|_| ApiError::Validation(format!("invalid HTTP method '{}'", args.method)))?;
            if !args.endpoint.starts_with('/') {
                return Err(ApiError::Validation(format!(
                    "endpoint '{}' must start with '/'",
                    args.endpoint
                )));
            }
            let mut options = RequestOptions::new(method);
            if let Some(body) = &args.body {
                options = options.raw_json(body)?;
            }
            for header in &args.headers {
                let (name, value) = header.split_once(':').ok_or_else(|| {
                    ApiError::Validation(format!("header '{header}' must look like 'Name: value'"))
                })?;
                options = options.header(name.trim(), value.trim())?;
            }
            client.request(&args.endpoint, options).await
        }
    }
}

async fn execute_tools(command: &ToolsCommand, client: &ApiClient) -> Result<Value, ApiError> {
    match command {
        ToolsCommand::Providers => client.list_tool_providers().await,
        ToolsCommand::BuiltinTools { collection } => client.get_builtin_tools(collection).await,
        ToolsCommand::CustomTools { provider } => client.get_custom_tools(provider).await,
        ToolsCommand::ModelTools { provider } => client.get_model_tools(provider).await,
        ToolsCommand::WorkflowTools { workflow_tool_id } => {
            client.get_workflow_tools(workflow_tool_id).await
        }
        ToolsCommand::All { kind } => client.list_all_tools(*kind).await,
        ToolsCommand::Labels => client.get_tool_labels().await,
        ToolsCommand::Credentials(command) => match command {
            CredentialsCommand::Schema { collection } => {
                client.get_builtin_credentials_schema(collection).await
            }
            CredentialsCommand::Show { collection } => {
                client.get_builtin_credentials(collection).await
            }
            CredentialsCommand::Update { collection, body } => {
                client
                    .update_builtin_credentials(collection, json_object(body)?)
                    .await
            }
            CredentialsCommand::Delete { collection } => {
                client.delete_builtin_credentials(collection).await
            }
        },
        ToolsCommand::Custom(command) => match command {
            CustomCommand::ParseSchema { path } => {
                let schema = tokio::fs::read_to_string(path).await.map_err(|err| {
                    ApiError::Validation(format!("failed to read {}: {err}", path.display()))
                })?;
                client.parse_schema(&schema).await
            }
            CustomCommand::Get { provider } => client.get_custom_collection(provider).await,
            CustomCommand::Add { body } => client.add_custom_collection(json_object(body)?).await,
            CustomCommand::Update { body } => {
                client.update_custom_collection(json_object(body)?).await
            }
            CustomCommand::Delete { provider } => client.delete_custom_collection(provider).await,
            CustomCommand::Import { url } => client.import_schema_from_url(url).await,
            CustomCommand::Test { body } => client.test_api_availability(json_object(body)?).await,
        },
        ToolsCommand::Workflow(command) => match command {
            WorkflowCommand::Create { body } => {
                client
                    .create_workflow_tool_provider(json_object(body)?)
                    .await
            }
            WorkflowCommand::Update { body } => {
                client
                    .update_workflow_tool_provider(json_object(body)?)
                    .await
            }
            WorkflowCommand::Get { app_id, tool_id } => match (app_id, tool_id) {
                (Some(app_id), _) => client.get_workflow_tool_provider_by_app_id(app_id).await,
                (None, Some(tool_id)) => client.get_workflow_tool_provider_by_tool_id(tool_id).await,
                (None, None) => Err(ApiError::Validation(
                    "pass --app-id or --tool-id".to_string(),
                )),
            },
            WorkflowCommand::Delete { tool_id } => client.delete_workflow_tool(tool_id).await,
        },
    }
}

fn json_object(raw: &str) -> Result<Value, ApiError> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|err| ApiError::Validation(format!("body is not valid JSON: {err}")))?;
    if !value.is_object() {
        return Err(ApiError::Validation("body must be a JSON object".to_string()));
    }
    Ok(value)
}

fn render(view: &ViewCommand, value: &Value) -> Result<()> {
    if let ViewCommand::Apps(AppsCommand::Export { out, .. }) = view
        && let Some(yaml) = value.get("data").and_then(Value::as_str)
    {
        match out {
            Some(path) => {
                std::fs::write(path, yaml)
                    .with_context(|| format!("failed to write export to {}", path.display()))?;
                println!("app exported");
            }
            None => print!("{yaml}"),
        }
        return Ok(());
    }
    print_json(value)
}

fn print_json(value: &Value) -> Result<()> {
    let serialized = serde_json::to_string_pretty(value).context("failed to serialize response")?;
    println!("{serialized}");
    Ok(())
}
