//! Persistent Claude CLI connection speaking stream-json on stdin/stdout

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde_json::json;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{AgentConnection, ConnectOptions, Connector};
use crate::agent::NESTED_SESSION_MARKER;
use crate::agent::stream::StreamMessage;
use crate::lines::LossyLines;

/// How long a closed connection gets to exit before it is killed
const DISCONNECT_GRACE: Duration = Duration::from_secs(3);

/// Opens [`CliConnection`]s by spawning the Claude CLI
pub struct CliConnector {
    binary: PathBuf,
}

impl CliConnector {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn build_args(&self, options: &ConnectOptions) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "--print".to_string(),
            "--input-format".to_string(),
            "stream-json".to_string(),
            "--output-format".to_string(),
            "stream-json".to_string(),
            "--verbose".to_string(),
            "--permission-mode".to_string(),
            options.permission_mode.clone(),
        ];

        if let Some(model) = options.model.as_deref() {
            args.push("--model".to_string());
            args.push(model.to_string());
        }

        if let Some(servers) = &options.mcp_servers {
            args.push("--mcp-config".to_string());
            args.push(json!({ "mcpServers": servers }).to_string());
        }

        if !options.system_prompt.trim().is_empty() {
            args.push("--append-system-prompt".to_string());
            args.push(options.system_prompt.clone());
        }

        args
    }
}

#[async_trait]
impl Connector for CliConnector {
    async fn connect(&self, options: &ConnectOptions) -> Result<Arc<dyn AgentConnection>> {
        let args = self.build_args(options);

        let mut child = Command::new(&self.binary)
            .args(&args)
            .current_dir(&options.workspace)
            .env("CLAUDE_WORKSPACE", &options.workspace)
            .env_remove(NESTED_SESSION_MARKER)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn {}", self.binary.display()))?;

        let stdin = child.stdin.take().context("Failed to capture stdin pipe")?;
        let stdout = child
            .stdout
            .take()
            .context("Failed to capture stdout pipe")?;
        let stderr = child
            .stderr
            .take()
            .context("Failed to capture stderr pipe")?;

        let pid = child.id();
        tokio::spawn(async move {
            let mut lines = LossyLines::new(BufReader::new(stderr));
            while let Ok(Some(line)) = lines.next_line().await {
                debug!("claude[{}] stderr: {}", pid.unwrap_or_default(), line);
            }
        });

        info!("Client connection opened (pid {})", pid.unwrap_or_default());

        Ok(Arc::new(CliConnection {
            child: Mutex::new(child),
            stdin: Mutex::new(Some(stdin)),
            stdout: Mutex::new(LossyLines::new(BufReader::new(stdout))),
            connected: AtomicBool::new(true),
        }))
    }
}

/// One long-lived CLI process serving every turn of a session
pub struct CliConnection {
    child: Mutex<Child>,
    stdin: Mutex<Option<ChildStdin>>,
    stdout: Mutex<LossyLines<BufReader<ChildStdout>>>,
    connected: AtomicBool,
}

impl CliConnection {
    async fn write_line(&self, value: serde_json::Value) -> Result<()> {
        let mut guard = self.stdin.lock().await;
        let Some(stdin) = guard.as_mut() else {
            bail!("Connection is closed");
        };

        let mut line = value.to_string();
        line.push('\n');
        if let Err(e) = stdin.write_all(line.as_bytes()).await {
            self.connected.store(false, Ordering::SeqCst);
            return Err(e).context("Failed to write to connection");
        }
        stdin.flush().await.context("Failed to flush connection")?;
        Ok(())
    }
}

#[async_trait]
impl AgentConnection for CliConnection {
    async fn query(&self, message: &str) -> Result<()> {
        self.write_line(json!({
            "type": "user",
            "message": { "role": "user", "content": message },
            "parent_tool_use_id": null,
            "session_id": "default",
        }))
        .await
    }

    async fn next_message(&self) -> Result<Option<StreamMessage>> {
        let mut lines = self.stdout.lock().await;
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if let Some(message) = StreamMessage::parse(&line) {
                        return Ok(Some(message));
                    }
                }
                Ok(None) => {
                    self.connected.store(false, Ordering::SeqCst);
                    return Ok(None);
                }
                Err(e) => {
                    self.connected.store(false, Ordering::SeqCst);
                    return Err(e).context("Failed to read from connection");
                }
            }
        }
    }

    async fn interrupt(&self) -> Result<()> {
        self.write_line(json!({
            "type": "control_request",
            "request_id": uuid::Uuid::new_v4().to_string(),
            "request": { "subtype": "interrupt" },
        }))
        .await
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        // EOF on stdin asks the CLI to finish
        drop(self.stdin.lock().await.take());

        let mut child = self.child.lock().await;
        match tokio::time::timeout(DISCONNECT_GRACE, child.wait()).await {
            Ok(status) => {
                debug!("Client connection exited with {}", status?);
            }
            Err(_) => {
                child.kill().await.context("Failed to kill connection process")?;
            }
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> ConnectOptions {
        ConnectOptions {
            workspace: PathBuf::from("/workspace"),
            model: None,
            permission_mode: "bypassPermissions".to_string(),
            mcp_servers: None,
            system_prompt: String::new(),
        }
    }

    #[test]
    fn test_args_minimal() {
        let args = CliConnector::new("claude").build_args(&options());
        let joined = args.join(" ");

        assert!(joined.contains("--input-format stream-json"));
        assert!(joined.contains("--output-format stream-json"));
        assert!(joined.contains("--permission-mode bypassPermissions"));
        assert!(!joined.contains("--mcp-config"));
        assert!(!joined.contains("--append-system-prompt"));
    }

    #[test]
    fn test_args_with_servers_model_and_skills() {
        let mut opts = options();
        opts.model = Some("opus".to_string());
        opts.mcp_servers = Some(json!({"gh": {"command": "gh-mcp", "args": []}}));
        opts.system_prompt = "## Skill: sql-expert".to_string();

        let args = CliConnector::new("claude").build_args(&opts);

        let idx = args.iter().position(|a| a == "--mcp-config").unwrap();
        let doc: serde_json::Value = serde_json::from_str(&args[idx + 1]).unwrap();
        assert_eq!(doc["mcpServers"]["gh"]["command"], "gh-mcp");
        assert!(args.contains(&"opus".to_string()));
        assert!(args.contains(&"## Skill: sql-expert".to_string()));
    }
}
