//! Chat command: one turn, events on stdout

use anyhow::{Result, bail};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

use anywork_bridge::config::WorkerConfig;
use anywork_bridge::executor::SessionExecutor;
use anywork_bridge::{ChatEvent, SessionKey};

/// Render one event as a JSON line or an SSE frame
pub fn render_event(event: &ChatEvent, sse: bool) -> Result<String> {
    if sse {
        return Ok(event.to_sse_frame());
    }
    let mut line = serde_json::to_string(event)?;
    line.push('\n');
    Ok(line)
}

pub async fn chat_command(
    config: &WorkerConfig,
    session: &str,
    message: Option<String>,
    sse: bool,
) -> Result<()> {
    let message = match message {
        Some(message) => message,
        None => super::read_stdin().await?,
    };
    let message = message.trim();
    if message.is_empty() {
        bail!("Empty message");
    }

    let executor = Arc::new(SessionExecutor::from_config(config));
    let mut events = executor.spawn_turn(SessionKey::new(session), message);

    let mut stdout = tokio::io::stdout();
    while let Some(event) = events.recv().await {
        stdout.write_all(render_event(&event, sse)?.as_bytes()).await?;
        stdout.flush().await?;
    }

    executor.shutdown().await;
    Ok(())
}
