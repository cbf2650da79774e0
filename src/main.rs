use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use node_runtime::{LogLevel, NodeServer, Runtime, RuntimeConfig, init_tracing, plugin_runtime};
use robomotion_nodes::registry;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(
    name = "robomotion-nodes",
    about = "Core Robomotion nodes, served to a robot over JSON-RPC",
    version
)]
struct Cli {
    /// Log level override (trace, debug, info, warn, error, critical)
    #[arg(long)]
    log_level: Option<String>,

    /// Write logs to a daily file in this directory instead of stderr
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = RuntimeConfig::load();
    if let Some(level) = cli.log_level {
        config = config.with_log_level(LogLevel::parse(&level));
    }
    if let Some(dir) = cli.log_dir {
        config = config.with_log_dir(Some(dir));
    }
    init_tracing(config.log_level, config.log_dir.as_deref());
    info!(
        compress = config.compress,
        lmo_limit = config.lmo_limit,
        config_root = %config.config_root.display(),
        "node package starting up"
    );

    let rt = Arc::new(Runtime::new(config));
    let server = Arc::new(NodeServer::new(rt, registry()));
    if let Err(e) = plugin_runtime::serve(server).await {
        error!(error = %e, "node package failed");
        return Err(e.into());
    }
    info!("node package stopped");
    Ok(())
}
