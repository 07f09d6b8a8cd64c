//! Worker configuration.
//!
//! Configuration is resolved once at startup: built-in defaults, then an
//! optional TOML file, then environment overrides. [`WorkerConfig::validate`]
//! turns every unrecoverable misconfiguration into a [`ConfigError`] before the
//! first session is served.

mod io;
pub mod skills;

pub use io::{CONFIG_FILE_NAME, default_config_paths};

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Environment variables accepted as backend credentials
pub const CREDENTIAL_VARS: &[&str] = &["ANTHROPIC_API_KEY", "API_KEY", "CLAUDE_CODE_OAUTH_TOKEN"];

/// Error type for configuration resolution
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Unknown {field} value '{value}' (expected one of: {expected})")]
    InvalidValue {
        field: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("No backend credentials found (set one of {})", CREDENTIAL_VARS.join(", "))]
    MissingCredentials,

    #[error("Engine binary '{0}' not found on PATH")]
    BinaryNotFound(String),
}

/// Which engine adapter serves the sessions of this worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// One CLI subprocess per turn, resumed via a continuation token
    #[default]
    Process,
    /// One persistent connection per session
    Client,
}

impl FromStr for EngineKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "process" | "cli" => Ok(EngineKind::Process),
            "client" | "sdk" => Ok(EngineKind::Client),
            _ => Err(ConfigError::InvalidValue {
                field: "engine",
                value: s.to_string(),
                expected: "process, cli, client, sdk",
            }),
        }
    }
}

/// When a captured continuation token replaces the stored one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResumePolicy {
    /// Store it whatever the outcome of the turn
    #[default]
    Always,
    /// Store it only when the engine process exited successfully
    OnSuccess,
}

impl FromStr for ResumePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "always" => Ok(ResumePolicy::Always),
            "on_success" => Ok(ResumePolicy::OnSuccess),
            _ => Err(ConfigError::InvalidValue {
                field: "resume_policy",
                value: s.to_string(),
                expected: "always, on_success",
            }),
        }
    }
}

/// What happens to a turn submitted while the session is already busy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BusyPolicy {
    /// Wait for the running turn to finish
    #[default]
    Queue,
    /// Answer immediately with an error event
    Reject,
}

impl FromStr for BusyPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "queue" => Ok(BusyPolicy::Queue),
            "reject" => Ok(BusyPolicy::Reject),
            _ => Err(ConfigError::InvalidValue {
                field: "busy_policy",
                value: s.to_string(),
                expected: "queue, reject",
            }),
        }
    }
}

/// Resolved worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Workspace root (sessions/, files/, skills/, persona files)
    pub workspace_dir: PathBuf,

    /// Engine adapter used for every session
    pub engine: EngineKind,

    /// Backend CLI binary (name on PATH or absolute path)
    pub claude_binary: String,

    /// Model override passed to the backend
    pub model: Option<String>,

    /// Skills whose prompts are appended to the system prompt
    pub skills: Vec<String>,

    /// Directory holding `<skill>/prompt.md` bundles
    pub skills_dir: PathBuf,

    pub resume_policy: ResumePolicy,

    pub busy_policy: BusyPolicy,

    /// Refuse to start without backend credentials in the environment
    pub require_credentials: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            workspace_dir: PathBuf::from("/workspace"),
            engine: EngineKind::default(),
            claude_binary: "claude".to_string(),
            model: None,
            skills: Vec::new(),
            skills_dir: PathBuf::from("/skills"),
            resume_policy: ResumePolicy::default(),
            busy_policy: BusyPolicy::default(),
            require_credentials: true,
        }
    }
}

impl WorkerConfig {
    /// Configuration rooted at `workspace_dir` with everything else defaulted
    pub fn for_workspace(workspace_dir: impl Into<PathBuf>) -> Self {
        Self {
            workspace_dir: workspace_dir.into(),
            ..Self::default()
        }
    }

    /// Apply environment overrides through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(dir) = get("WORKSPACE_DIR") {
            self.workspace_dir = PathBuf::from(dir);
        }
        if let Some(engine) = get("ENGINE") {
            self.engine = engine.parse()?;
        }
        if let Some(binary) = get("CLAUDE_BIN") {
            self.claude_binary = binary;
        }
        if let Some(model) = get("MODEL").or_else(|| get("DEFAULT_MODEL")) {
            self.model = Some(model);
        }
        if let Some(skills) = get("SKILLS") {
            self.skills = skills::parse_skill_list(&skills);
        }
        if let Some(dir) = get("SKILLS_DIR") {
            self.skills_dir = PathBuf::from(dir);
        }
        if let Some(policy) = get("RESUME_POLICY") {
            self.resume_policy = policy.parse()?;
        }
        if let Some(policy) = get("BUSY_POLICY") {
            self.busy_policy = policy.parse()?;
        }
        Ok(())
    }

    /// Fail fast on misconfiguration that would only surface on first use
    pub fn validate<F>(&self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.require_credentials
            && !CREDENTIAL_VARS
                .iter()
                .any(|var| lookup(var).is_some_and(|v| !v.trim().is_empty()))
        {
            return Err(ConfigError::MissingCredentials);
        }

        if resolve_binary(&self.claude_binary, lookup("PATH").as_deref()).is_none() {
            return Err(ConfigError::BinaryNotFound(self.claude_binary.clone()));
        }

        Ok(())
    }

    /// Absolute path of the backend binary, falling back to the configured name
    pub fn resolved_binary(&self) -> PathBuf {
        let path = std::env::var("PATH").ok();
        resolve_binary(&self.claude_binary, path.as_deref())
            .unwrap_or_else(|| PathBuf::from(&self.claude_binary))
    }
}

/// Find `binary` the way a shell would: paths are taken as-is, bare names are
/// searched in `path_var`
pub fn resolve_binary(binary: &str, path_var: Option<&str>) -> Option<PathBuf> {
    let candidate = PathBuf::from(binary);
    if candidate.components().count() > 1 || candidate.is_absolute() {
        return candidate.is_file().then_some(candidate);
    }

    std::env::split_paths(path_var?)
        .map(|dir| dir.join(binary))
        .find(|path| path.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_engine_kind_aliases() {
        assert_eq!("cli".parse::<EngineKind>().unwrap(), EngineKind::Process);
        assert_eq!("SDK".parse::<EngineKind>().unwrap(), EngineKind::Client);
        assert!(matches!(
            "nanobot".parse::<EngineKind>(),
            Err(ConfigError::InvalidValue { field: "engine", .. })
        ));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = WorkerConfig::default();
        config
            .apply_env(env(&[
                ("WORKSPACE_DIR", "/tmp/ws"),
                ("ENGINE", "client"),
                ("DEFAULT_MODEL", "sonnet"),
                ("SKILLS", "code-review, sql-expert,,"),
                ("BUSY_POLICY", "reject"),
                ("RESUME_POLICY", "on-success"),
            ]))
            .unwrap();

        assert_eq!(config.workspace_dir, PathBuf::from("/tmp/ws"));
        assert_eq!(config.engine, EngineKind::Client);
        assert_eq!(config.model.as_deref(), Some("sonnet"));
        assert_eq!(config.skills, vec!["code-review", "sql-expert"]);
        assert_eq!(config.busy_policy, BusyPolicy::Reject);
        assert_eq!(config.resume_policy, ResumePolicy::OnSuccess);
    }

    #[test]
    fn test_model_prefers_model_over_default_model() {
        let mut config = WorkerConfig::default();
        config
            .apply_env(env(&[("MODEL", "opus"), ("DEFAULT_MODEL", "sonnet")]))
            .unwrap();
        assert_eq!(config.model.as_deref(), Some("opus"));
    }

    #[test]
    fn test_validate_requires_credentials() {
        let config = WorkerConfig {
            claude_binary: "sh".to_string(),
            ..WorkerConfig::default()
        };
        let err = config.validate(env(&[("PATH", "/bin:/usr/bin")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredentials));

        assert!(
            config
                .validate(env(&[("PATH", "/bin:/usr/bin"), ("ANTHROPIC_API_KEY", "k")]))
                .is_ok()
        );
    }

    #[test]
    fn test_validate_missing_binary() {
        let config = WorkerConfig {
            claude_binary: "definitely-not-a-real-binary-xyz".to_string(),
            require_credentials: false,
            ..WorkerConfig::default()
        };
        let err = config.validate(env(&[("PATH", "/bin:/usr/bin")])).unwrap_err();
        assert!(matches!(err, ConfigError::BinaryNotFound(_)));
    }
}
