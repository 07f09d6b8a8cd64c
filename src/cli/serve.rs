//! Serve command: JSON-line requests on stdin, tagged events on stdout
//!
//! ```text
//! {"op":"chat","session_id":"s1","message":"hi","mcp_servers":[...]}
//! {"op":"cancel","session_id":"s1"}
//! {"op":"disconnect","session_id":"s1"}
//! ```
//!
//! Turns on different sessions run concurrently; their events are written as
//! `{"session_id":..., "type":..., "content":..., "metadata":...}` lines.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{info, warn};

use anywork_bridge::agent::Turn;
use anywork_bridge::config::WorkerConfig;
use anywork_bridge::executor::{EVENT_BUFFER, SessionExecutor};
use anywork_bridge::lines::LossyLines;
use anywork_bridge::{ChatEvent, McpServerSpec, SessionKey};

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Chat {
        session_id: String,
        message: String,
        #[serde(default)]
        mcp_servers: Vec<McpServerSpec>,
    },
    Cancel {
        session_id: String,
    },
    Disconnect {
        session_id: String,
    },
}

/// An event of one session's turn
#[derive(Debug, Serialize)]
pub struct EventLine {
    pub session_id: String,
    #[serde(flatten)]
    pub event: ChatEvent,
}

/// One output line
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Response {
    Event(EventLine),
    Ack {
        session_id: String,
        ack: &'static str,
        found: bool,
    },
    Invalid {
        error: String,
    },
}

pub async fn serve_command(config: &WorkerConfig) -> Result<()> {
    let executor = Arc::new(SessionExecutor::from_config(config));
    info!(
        "Serving {} engine on stdin/stdout (workspace {})",
        executor.engine().id(),
        config.workspace_dir.display()
    );

    let (out_tx, out_rx) = mpsc::channel::<Response>(EVENT_BUFFER);
    let writer = tokio::spawn(write_responses(out_rx));

    let mut turns = JoinSet::new();
    let mut lines = LossyLines::new(BufReader::new(tokio::io::stdin()));
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let request = match serde_json::from_str::<Request>(&line) {
            Ok(request) => request,
            Err(e) => {
                warn!("Invalid request: {}", e);
                let _ = out_tx
                    .send(Response::Invalid {
                        error: e.to_string(),
                    })
                    .await;
                continue;
            }
        };
        handle_request(&executor, request, &out_tx, &mut turns).await;
    }

    info!("Input closed, waiting for {} turn(s)", turns.len());
    while turns.join_next().await.is_some() {}
    executor.shutdown().await;

    drop(out_tx);
    writer.await??;
    Ok(())
}

async fn handle_request(
    executor: &Arc<SessionExecutor>,
    request: Request,
    out_tx: &mpsc::Sender<Response>,
    turns: &mut JoinSet<()>,
) {
    match request {
        Request::Chat {
            session_id,
            message,
            mcp_servers,
        } => {
            let turn = Turn::new(message).with_mcp_servers(mcp_servers);
            let mut events = executor.spawn_turn(SessionKey::new(&session_id), turn);
            let out_tx = out_tx.clone();
            turns.spawn(async move {
                while let Some(event) = events.recv().await {
                    let response = Response::Event(EventLine {
                        session_id: session_id.clone(),
                        event,
                    });
                    if out_tx.send(response).await.is_err() {
                        break;
                    }
                }
            });
        }
        Request::Cancel { session_id } => {
            let found = executor.cancel(&SessionKey::new(&session_id)).await;
            let _ = out_tx
                .send(Response::Ack {
                    session_id,
                    ack: "cancel",
                    found,
                })
                .await;
        }
        Request::Disconnect { session_id } => {
            let found = executor.disconnect(&SessionKey::new(&session_id)).await;
            let _ = out_tx
                .send(Response::Ack {
                    session_id,
                    ack: "disconnect",
                    found,
                })
                .await;
        }
    }
}

/// Single writer so lines from concurrent turns never interleave
async fn write_responses(mut rx: mpsc::Receiver<Response>) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    while let Some(response) = rx.recv().await {
        let mut line = serde_json::to_string(&response)?;
        line.push('\n');
        stdout.write_all(line.as_bytes()).await?;
        stdout.flush().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_requests() {
        let chat: Request = serde_json::from_str(
            r#"{"op":"chat","session_id":"s1","message":"hi","mcp_servers":[{"name":"gh","command":"gh-mcp"}]}"#,
        )
        .unwrap();
        assert!(
            matches!(chat, Request::Chat { ref session_id, ref mcp_servers, .. } if session_id == "s1" && mcp_servers.len() == 1)
        );

        let cancel: Request = serde_json::from_str(r#"{"op":"cancel","session_id":"s1"}"#).unwrap();
        assert!(matches!(cancel, Request::Cancel { .. }));

        assert!(serde_json::from_str::<Request>(r#"{"op":"reboot"}"#).is_err());
    }

    #[test]
    fn test_event_line_is_tagged_with_session() {
        let response = Response::Event(EventLine {
            session_id: "s1".to_string(),
            event: ChatEvent::tool_call("Read"),
        });
        let value = serde_json::to_value(&response).unwrap();

        assert_eq!(value["session_id"], "s1");
        assert_eq!(value["type"], "tool_call");
        assert_eq!(value["content"], "Read");
    }

    #[test]
    fn test_ack_line() {
        let response = Response::Ack {
            session_id: "s1".to_string(),
            ack: "cancel",
            found: false,
        };
        assert_eq!(
            serde_json::to_string(&response).unwrap(),
            r#"{"session_id":"s1","ack":"cancel","found":false}"#
        );
    }
}
