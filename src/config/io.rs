//! Configuration file loading

use std::path::{Path, PathBuf};

use tracing::debug;

use super::{ConfigError, WorkerConfig};

/// File name looked up in the workspace and the user config directory
pub const CONFIG_FILE_NAME: &str = "worker.toml";

/// Candidate config files in priority order: workspace-local, then
/// `<config dir>/anywork/worker.toml`
pub fn default_config_paths(workspace_dir: &Path) -> Vec<PathBuf> {
    let mut paths = vec![workspace_dir.join(CONFIG_FILE_NAME)];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("anywork").join(CONFIG_FILE_NAME));
    }
    paths
}

impl WorkerConfig {
    /// Load configuration from a TOML file; missing keys keep their defaults
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Resolve the full configuration: file (explicit or discovered), then the
    /// process environment. `workspace_override` wins over both.
    pub fn load(
        config_path: Option<&Path>,
        workspace_override: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let lookup = |name: &str| std::env::var(name).ok();

        let mut config = match config_path {
            Some(path) => Self::from_file(path)?,
            None => {
                let workspace = workspace_override
                    .map(Path::to_path_buf)
                    .or_else(|| lookup("WORKSPACE_DIR").map(PathBuf::from))
                    .unwrap_or_else(|| WorkerConfig::default().workspace_dir);

                match default_config_paths(&workspace).into_iter().find(|p| p.is_file()) {
                    Some(path) => {
                        debug!("Using config file {}", path.display());
                        Self::from_file(&path)?
                    }
                    None => WorkerConfig::default(),
                }
            }
        };

        config.apply_env(lookup)?;

        if let Some(workspace) = workspace_override {
            config.workspace_dir = workspace.to_path_buf();
        }

        Ok(config)
    }
}
