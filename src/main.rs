use agent_console::cli::{self, Cli};
use agent_console::config::ConfigStore;
use agent_console::logging;
use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let logs = logging::init_tracing(logging::DEFAULT_MAX_LOG_LINES);

    let cli = Cli::parse();
    let store = ConfigStore::new_default()?;
    cli::run(cli, store, logs).await
}
