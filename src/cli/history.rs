//! History command implementation

use anyhow::Result;

use anywork_bridge::config::WorkerConfig;
use anywork_bridge::workspace::Workspace;
use anywork_bridge::{Role, SessionKey};

/// Print the conversation log of a session
pub async fn history_command(config: &WorkerConfig, session: &str, json: bool) -> Result<()> {
    let log = Workspace::new(&config.workspace_dir).conversation_log();
    let records = log.read(&SessionKey::new(session)).await?;

    if json {
        for record in &records {
            println!("{}", serde_json::to_string(record)?);
        }
        return Ok(());
    }

    if records.is_empty() {
        println!("No messages in session {}.", session);
        return Ok(());
    }

    println!("Session {} ({} messages):\n", session, records.len());
    for record in &records {
        let who = match record.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        println!("[{}] {}:", record.timestamp, who);
        for line in record.content.lines() {
            println!("    {}", line);
        }
        if let Some(calls) = &record.tool_calls {
            let names: Vec<_> = calls.iter().map(|c| c.name.as_str()).collect();
            println!("    tools: {}", names.join(", "));
        }
        println!();
    }

    Ok(())
}
