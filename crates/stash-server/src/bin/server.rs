//! Stash server binary.

use anyhow::Context;
use clap::Parser;
use stash_server::{Server, ServerConfig};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "stash-server", about = "Line-oriented TCP file session server")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "stash.toml")]
    config: PathBuf,

    /// Write a default TOML configuration file and exit
    #[arg(long)]
    init_config: bool,

    /// Validate the configuration and exit (no socket bind)
    #[arg(long)]
    check_config: bool,

    /// Create the store root directory if it does not exist
    #[arg(long)]
    create_root_dir: bool,

    /// Bind address for the server
    #[arg(long)]
    bind: Option<String>,

    /// Port to listen on
    #[arg(long)]
    port: Option<u16>,

    /// Root directory of the file store
    #[arg(long)]
    root_dir: Option<PathBuf>,

    /// Maximum concurrent connections
    #[arg(long)]
    max_connections: Option<usize>,

    /// Idle window in milliseconds before a connection is evicted
    #[arg(long)]
    inactivity_timeout_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    if cli.init_config {
        let config = ServerConfig::default();
        config
            .write_file(&cli.config)
            .with_context(|| format!("writing {:?}", cli.config))?;
        info!("Wrote default configuration to {:?}", cli.config);
        return Ok(());
    }

    let mut config = if cli.config.exists() {
        ServerConfig::from_file(&cli.config).with_context(|| format!("loading {:?}", cli.config))?
    } else {
        ServerConfig::default()
    };

    if let Some(bind) = cli.bind {
        config.bind_address = bind;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(root_dir) = cli.root_dir {
        config.root_dir = root_dir;
    }
    if let Some(max) = cli.max_connections {
        config.max_connections = max;
    }
    if let Some(idle) = cli.inactivity_timeout_ms {
        config.inactivity_timeout_ms = idle;
    }

    if cli.create_root_dir && !config.root_dir.exists() {
        std::fs::create_dir_all(&config.root_dir)
            .with_context(|| format!("creating {:?}", config.root_dir))?;
        info!("Created store root {:?}", config.root_dir);
    }

    if cli.check_config {
        config.validate()?;
        info!("Configuration OK");
        return Ok(());
    }

    let server = Server::bind(config).await?;
    server.run().await?;
    Ok(())
}
