//! xrelay daemon: entry point for running a relayer node.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use xrelay_chain::{HttpChainClientFactory, HttpPluginProbe, PluginEndpoints, PluginServerMonitor};
use xrelay_node::{init_logging, resolve_identity, LogFormat, NodeConfig, Relayer, RelayerDeps};
use xrelay_store_lmdb::LmdbStore;

const PLUGIN_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Parser)]
#[command(name = "xrelay-daemon", about = "Cross-chain relayer node daemon")]
struct Cli {
    /// Path to a TOML configuration file. CLI flags and env vars override it.
    #[arg(long, env = "XRELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory of the shared LMDB store.
    #[arg(long, env = "XRELAY_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Explicit node id (defaults to the host address).
    #[arg(long, env = "XRELAY_NODE_ID")]
    node_id: Option<String>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "XRELAY_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format: "human" or "json".
    #[arg(long, env = "XRELAY_LOG_FORMAT")]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Relayer node commands.
    #[command(name = "node")]
    Node {
        #[command(subcommand)]
        action: NodeAction,
    },
}

#[derive(clap::Subcommand)]
enum NodeAction {
    /// Run the node until SIGINT/SIGTERM.
    Run,
    /// Print the effective configuration as TOML.
    Config,
}

fn load_config(cli: &Cli) -> anyhow::Result<NodeConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            NodeConfig::from_toml_str(&contents)
                .with_context(|| format!("invalid config file {}", path.display()))?
        }
        None => NodeConfig::default(),
    };
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(id) = &cli.node_id {
        config.node_id = Some(id.clone());
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.log_format = format.clone();
    }
    config.validate()?;
    Ok(config)
}

async fn run(config: NodeConfig) -> anyhow::Result<()> {
    let identity = resolve_identity(config.node_id.as_deref())?;
    tracing::info!(
        node_id = %identity.node_id,
        node_ip = identity.node_ip.as_deref().unwrap_or("-"),
        data_dir = %config.data_dir.display(),
        plugin_servers = config.plugin_servers.len(),
        "starting xrelay node"
    );

    let store = Arc::new(
        LmdbStore::open(&config.data_dir, config.map_size)
            .with_context(|| format!("failed to open store at {}", config.data_dir.display()))?,
    );
    let endpoints = PluginEndpoints::new(
        config
            .plugin_servers
            .iter()
            .map(|server| (server.id.clone(), server.url.clone())),
    );
    let factory = Arc::new(HttpChainClientFactory::new(endpoints.clone())?);
    let probe = Arc::new(HttpPluginProbe::new(endpoints.clone(), PLUGIN_PROBE_TIMEOUT)?);
    let monitor = Arc::new(PluginServerMonitor::new(
        probe,
        endpoints.ids().map(str::to_string),
        config.plugin_heartbeat_max_misses,
    ));

    let deps = RelayerDeps::new(store, factory, monitor.clone()).with_plugin_monitor(monitor);
    let relayer = Relayer::new(config, identity, deps)?;
    relayer.run_until_signal().await?;

    tracing::info!("xrelay daemon exited cleanly");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Command::Node { action } => match action {
            NodeAction::Config => {
                print!("{}", config.to_toml_string()?);
            }
            NodeAction::Run => {
                let format: LogFormat = config.log_format.parse()?;
                init_logging(format, &config.log_level)?;
                run(config).await?;
            }
        },
    }

    Ok(())
}
