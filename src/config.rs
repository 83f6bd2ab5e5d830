use crate::engine::DEFAULT_COMPOSE_FILES;
use crate::error::{Error, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory snapshotted as the workspace (defaults to the current directory)
    pub workspace_dir: Option<PathBuf>,

    /// Prompt shown by the interactive shell
    pub prompt: String,

    /// Whether to keep the simulated engine state between runs
    pub persist_session: bool,

    /// Log filter used when RUST_LOG is not set
    pub log_filter: String,

    /// Compose file names tried, in order, by `docker compose up`
    pub compose_files: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace_dir: None,
            prompt: "yard:/project $ ".to_string(),
            persist_session: true,
            log_filter: "warn".to_string(),
            compose_files: DEFAULT_COMPOSE_FILES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Config {
    /// Load config from XDG config directory, or use defaults
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    fn dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("", "", "dockyard")
            .ok_or_else(|| Error::Config("could not determine project directories".to_string()))
    }

    /// Get the config file path
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::dirs()?.config_dir().join("config.toml"))
    }

    /// Get the state directory (for the session file)
    pub fn state_dir() -> Result<PathBuf> {
        let dirs = Self::dirs()?;
        Ok(dirs.state_dir().unwrap_or_else(|| dirs.data_dir()).to_path_buf())
    }

    /// Workspace to snapshot: the override, the configured one, or the current directory
    pub fn workspace(&self, over: Option<PathBuf>) -> Result<PathBuf> {
        match over.or_else(|| self.workspace_dir.clone()) {
            Some(dir) => Ok(dir),
            None => Ok(std::env::current_dir()?),
        }
    }
}
