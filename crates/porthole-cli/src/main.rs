use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use porthole_server::Config;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "porthole",
    about = "A browser window onto your CLI coding agent",
    version
)]
struct Cli {
    /// Bind address for the HTTP/WebSocket server
    #[arg(long, env = "PORTHOLE_BIND")]
    bind: Option<SocketAddr>,

    /// Data directory (config + database); default: platform data dir
    #[arg(long, env = "PORTHOLE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Root of the journal tree to watch; default: ~/.claude/projects
    #[arg(long, env = "PORTHOLE_JOURNAL_ROOT")]
    journal_root: Option<PathBuf>,

    /// SQLite database path; default: <data-dir>/porthole.db
    #[arg(long, env = "PORTHOLE_DB")]
    db_path: Option<PathBuf>,

    /// Coding-assistant CLI binary to spawn
    #[arg(long, env = "PORTHOLE_AGENT_BIN")]
    agent_binary: Option<String>,

    /// Log filter (tracing EnvFilter syntax)
    #[arg(long, env = "PORTHOLE_LOG", default_value = "info")]
    log: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the server (default when no subcommand is given)
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&cli.log).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let data_dir = resolve_data_dir(&cli)?;
    let mut config = Config::load(&data_dir)?;

    if let Some(bind) = cli.bind {
        config.bind = bind;
    }
    if let Some(journal_root) = cli.journal_root {
        config.journal_root = journal_root;
    }
    if let Some(db_path) = cli.db_path {
        config.db_path = db_path;
    }
    if let Some(agent_binary) = cli.agent_binary {
        config.agent_binary = agent_binary;
    }

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => porthole_server::run(config).await,
    }
}

fn resolve_data_dir(cli: &Cli) -> Result<PathBuf> {
    let data_dir = porthole_server::resolve_data_dir(cli.data_dir.as_deref())?;
    std::fs::create_dir_all(&data_dir)?;
    Ok(data_dir)
}
