use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Where the model price catalog comes from by default. LiteLLM publishes
/// per-token prices for every vendor; entries are filtered to our vendor
/// prefix at sync time.
const DEFAULT_PRICES_URL: &str =
    "https://raw.githubusercontent.com/BerriAI/litellm/main/model_prices_and_context_window.json";

/// Resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: SocketAddr,
    pub journal_root: PathBuf,
    pub db_path: PathBuf,
    pub agent_binary: String,
    pub prices_url: String,
}

/// Optional overrides read from `config.toml` in the data directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub bind: Option<SocketAddr>,
    #[serde(default)]
    pub journal_root: Option<PathBuf>,
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    #[serde(default)]
    pub agent_binary: Option<String>,
    #[serde(default)]
    pub prices_url: Option<String>,
}

impl FileConfig {
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let config: FileConfig = toml::from_str(&content)
            .with_context(|| format!("parse config {}", path.display()))?;
        Ok(config)
    }
}

/// Resolve the data directory: PORTHOLE_PATH, then the XDG data dir, then
/// ~/.porthole as a last resort.
pub fn resolve_data_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(expand_tilde(path));
    }

    if let Ok(env_path) = std::env::var("PORTHOLE_PATH") {
        return Ok(expand_tilde(Path::new(&env_path)));
    }

    if let Some(data_dir) = dirs::data_dir() {
        return Ok(data_dir.join("porthole"));
    }

    if let Some(home) = dirs::home_dir() {
        return Ok(home.join(".porthole"));
    }

    anyhow::bail!("could not determine a data directory: no HOME or XDG data dir")
}

fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(stripped);
    }
    path.to_path_buf()
}

impl Config {
    /// Merge file config over built-in defaults. Caller-level overrides
    /// (CLI flags) are applied on the returned value.
    pub fn resolve(data_dir: &Path, file: FileConfig) -> Result<Self> {
        let default_journal_root = dirs::home_dir()
            .map(|home| home.join(".claude").join("projects"))
            .unwrap_or_else(|| PathBuf::from(".claude/projects"));

        Ok(Self {
            bind: file
                .bind
                .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8315))),
            journal_root: file.journal_root.unwrap_or(default_journal_root),
            db_path: file.db_path.unwrap_or_else(|| data_dir.join("porthole.db")),
            agent_binary: file.agent_binary.unwrap_or_else(|| "claude".to_string()),
            prices_url: file.prices_url.unwrap_or_else(|| DEFAULT_PRICES_URL.to_string()),
        })
    }

    pub fn load(data_dir: &Path) -> Result<Self> {
        let file = FileConfig::load_from(&data_dir.join("config.toml"))?;
        Self::resolve(data_dir, file)
    }
}
