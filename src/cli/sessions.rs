//! Sessions command implementation

use anyhow::Result;

use anywork_bridge::config::WorkerConfig;
use anywork_bridge::workspace::Workspace;

/// List the sessions stored in the workspace
pub async fn sessions_command(config: &WorkerConfig) -> Result<()> {
    let log = Workspace::new(&config.workspace_dir).conversation_log();
    let sessions = log.list_sessions().await?;

    if sessions.is_empty() {
        println!("No sessions found.");
        return Ok(());
    }

    println!("Sessions ({}):\n", sessions.len());
    for session in sessions {
        println!(
            "  {} - {} messages, updated {}",
            session.session_id, session.message_count, session.updated_at
        );
    }

    Ok(())
}
