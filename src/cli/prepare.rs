//! Prepare command implementation

use anyhow::{Context, Result};
use std::path::Path;

use anywork_bridge::config::WorkerConfig;
use anywork_bridge::workspace::{PrepareRequest, Workspace};

/// Apply a prepare request read from `file` ("-" for stdin)
pub async fn prepare_command(config: &WorkerConfig, file: &Path) -> Result<()> {
    let text = if file == Path::new("-") {
        super::read_stdin().await?
    } else {
        tokio::fs::read_to_string(file)
            .await
            .with_context(|| format!("Failed to read {}", file.display()))?
    };
    let request: PrepareRequest =
        serde_json::from_str(&text).context("Invalid prepare request")?;

    let summary = Workspace::new(&config.workspace_dir).prepare(&request)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
