//! Init command implementation

use anyhow::{Context, Result};
use tracing::info;

use anywork_bridge::config::{CONFIG_FILE_NAME, WorkerConfig};
use anywork_bridge::workspace::Workspace;

/// Default worker.toml written by `init`
pub const DEFAULT_CONFIG: &str = r#"# AnyWork Worker Configuration
# ============================
#
# Every key is optional. Environment variables override this file:
#   WORKSPACE_DIR, ENGINE, CLAUDE_BIN, MODEL / DEFAULT_MODEL, SKILLS,
#   SKILLS_DIR, RESUME_POLICY, BUSY_POLICY
#
# Credentials are never read from here: set ANTHROPIC_API_KEY, API_KEY or
# CLAUDE_CODE_OAUTH_TOKEN in the environment.

# "process": one claude subprocess per turn, resumed with --resume
# "client":  one persistent claude connection per session
engine = "process"

# Backend binary, a name on PATH or a path
claude_binary = "claude"

# model = "sonnet"

# Skills injected as extra system-prompt text
skills = []
skills_dir = "/skills"

# When a continuation token from a failed turn is kept: "always" or "on_success"
resume_policy = "always"

# A second turn on a busy session: "queue" waits, "reject" answers with an error
busy_policy = "queue"

# Refuse to start without credentials in the environment
require_credentials = true
"#;

/// Initialize the workspace and write a default worker.toml
pub fn init_command(config: &WorkerConfig, force: bool) -> Result<()> {
    let workspace = Workspace::new(&config.workspace_dir);
    workspace.init()?;

    let config_path = workspace.root().join(CONFIG_FILE_NAME);
    if config_path.exists() && !force {
        println!(
            "Config already exists at {} (use --force to overwrite)",
            config_path.display()
        );
    } else {
        std::fs::write(&config_path, DEFAULT_CONFIG)
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
        info!("Created {}", config_path.display());
    }

    println!("Workspace ready: {}", workspace.root().display());
    println!("  sessions/  conversation logs");
    println!("  files/     user and agent files");
    println!("  skills/    prepared skills");

    Ok(())
}
