//! Process engine: one Claude CLI invocation per turn
//!
//! The only state that survives a turn is the backend's continuation token,
//! passed back with `--resume` on the session's next invocation.

mod parser;

pub use parser::ProcessTurnParser;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;
use tokio::io::{AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{Notify, mpsc};
use tracing::{debug, info, warn};

use super::{AgentEngine, EngineResource, NESTED_SESSION_MARKER, Turn};
use crate::config::ResumePolicy;
use crate::lines::LossyLines;
use crate::{ChatEvent, SessionKey, encode_mcp_config};

/// Per-session state of the process engine
#[derive(Debug, Default)]
pub struct ProcessSession {
    continuation_token: Mutex<Option<String>>,
    interrupt: Mutex<Option<Arc<Notify>>>,
}

impl ProcessSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn continuation_token(&self) -> Option<String> {
        self.continuation_token
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn set_continuation_token(&self, token: impl Into<String>) {
        let mut guard = self
            .continuation_token
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        *guard = Some(token.into());
    }

    /// Whether a turn's child process is currently being driven
    pub fn is_running(&self) -> bool {
        self.interrupt
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Ask the running turn to interrupt its child; false when idle
    fn request_interrupt(&self) -> bool {
        match self
            .interrupt
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
        {
            Some(notify) => {
                notify.notify_one();
                true
            }
            None => false,
        }
    }

    fn set_interrupt(&self, notify: Option<Arc<Notify>>) {
        *self.interrupt.lock().unwrap_or_else(|e| e.into_inner()) = notify;
    }
}

/// Marks the session running until the child is reaped or the turn unwinds
struct RunningGuard<'a> {
    session: &'a ProcessSession,
}

impl<'a> RunningGuard<'a> {
    fn register(session: &'a ProcessSession) -> (Self, Arc<Notify>) {
        let notify = Arc::new(Notify::new());
        session.set_interrupt(Some(notify.clone()));
        (Self { session }, notify)
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.session.set_interrupt(None);
    }
}

/// Engine that spawns `claude --print` for every turn
pub struct ProcessEngine {
    id: String,
    binary: PathBuf,
    workspace: PathBuf,
    model: Option<String>,
    system_prompt: String,
    resume_policy: ResumePolicy,
}

impl ProcessEngine {
    pub fn new(binary: impl Into<PathBuf>, workspace: impl Into<PathBuf>) -> Self {
        Self {
            id: "process".to_string(),
            binary: binary.into(),
            workspace: workspace.into(),
            model: None,
            system_prompt: String::new(),
            resume_policy: ResumePolicy::default(),
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model.filter(|m| !m.trim().is_empty());
        self
    }

    /// Skill text handed to the CLI as a generated system-prompt file
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_resume_policy(mut self, policy: ResumePolicy) -> Self {
        self.resume_policy = policy;
        self
    }

    /// Build command arguments
    fn build_args(
        &self,
        continuation_token: Option<&str>,
        system_prompt_file: Option<&Path>,
        mcp_config_file: Option<&Path>,
        message: &str,
    ) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "--print".to_string(),
            "--output-format".to_string(),
            "stream-json".to_string(),
            "--verbose".to_string(),
        ];

        if let Some(token) = continuation_token {
            args.push("--resume".to_string());
            args.push(token.to_string());
        }

        if let Some(model) = self.model.as_deref() {
            args.push("--model".to_string());
            args.push(model.to_string());
        }

        if let Some(path) = system_prompt_file {
            args.push("--system-prompt-file".to_string());
            args.push(path.display().to_string());
        }

        if let Some(path) = mcp_config_file {
            args.push("--mcp-config".to_string());
            args.push(path.display().to_string());
        }

        // Variadic options would otherwise swallow the message
        args.push("--".to_string());
        args.push(message.to_string());

        args
    }

    fn store_token(&self, session: &ProcessSession, token: Option<&str>, exit_ok: bool) {
        let Some(token) = token else {
            return;
        };
        match self.resume_policy {
            ResumePolicy::Always => session.set_continuation_token(token),
            ResumePolicy::OnSuccess if exit_ok => session.set_continuation_token(token),
            ResumePolicy::OnSuccess => {
                debug!("Not storing continuation token {} from failed turn", token);
            }
        }
    }
}

/// Write `content` to a temp file removed when the handle drops
fn write_temp_file(prefix: &str, suffix: &str, content: &str) -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(suffix)
        .tempfile()
        .context("Failed to create temp file")?;
    file.write_all(content.as_bytes())
        .context("Failed to write temp file")?;
    file.flush()?;
    Ok(file)
}

#[async_trait]
impl AgentEngine for ProcessEngine {
    fn id(&self) -> &str {
        &self.id
    }

    async fn open(&self, key: &SessionKey) -> Result<EngineResource> {
        debug!("Session {} starts with a fresh process on its next turn", key);
        Ok(EngineResource::Process(ProcessSession::new()))
    }

    async fn submit(
        &self,
        key: &SessionKey,
        resource: &EngineResource,
        turn: &Turn,
        event_tx: mpsc::Sender<ChatEvent>,
    ) -> Result<()> {
        let EngineResource::Process(session) = resource else {
            bail!("Process engine cannot drive a client session");
        };

        // Both files live until the end of this function, on every path
        let system_prompt_file = if self.system_prompt.trim().is_empty() {
            None
        } else {
            Some(write_temp_file("anywork-system-", ".md", &self.system_prompt)?)
        };
        let mcp_config_file = if turn.mcp_servers.is_empty() {
            None
        } else {
            let doc = encode_mcp_config(&turn.mcp_servers);
            Some(write_temp_file("anywork-mcp-", ".json", &doc.to_string())?)
        };

        let token = session.continuation_token();
        let args = self.build_args(
            token.as_deref(),
            system_prompt_file.as_ref().map(|f| f.path()),
            mcp_config_file.as_ref().map(|f| f.path()),
            &turn.message,
        );

        info!(
            "Session {} resume={} binary={}",
            key,
            token.as_deref().unwrap_or("new"),
            self.binary.display()
        );

        let mut child = Command::new(&self.binary)
            .args(&args)
            .current_dir(&self.workspace)
            .env("CLAUDE_WORKSPACE", &self.workspace)
            .env_remove(NESTED_SESSION_MARKER)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn {}", self.binary.display()))?;

        let (running, interrupt) = RunningGuard::register(session);

        let stdout = child
            .stdout
            .take()
            .context("Failed to capture stdout pipe")?;
        let mut stderr = child
            .stderr
            .take()
            .context("Failed to capture stderr pipe")?;

        // Drain stderr concurrently so a chatty child cannot block on a full pipe
        let stderr_handle = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf).await;
            String::from_utf8_lossy(&buf).into_owned()
        });

        let mut parser = ProcessTurnParser::new();
        let mut reader = LossyLines::new(BufReader::new(stdout));
        let mut stdout_open = true;
        let status = loop {
            tokio::select! {
                line = reader.next_line(), if stdout_open => match line {
                    Ok(Some(line)) => {
                        for event in parser.feed(&line) {
                            let _ = event_tx.send(event).await;
                        }
                    }
                    Ok(None) => stdout_open = false,
                    Err(e) => {
                        warn!("Session {} stdout read failed: {}", key, e);
                        stdout_open = false;
                    }
                },
                status = child.wait(), if !stdout_open => {
                    break status.context("Failed to wait for process")?;
                }
                _ = interrupt.notified() => {
                    // id() is None once the child has been reaped
                    match child.id() {
                        Some(pid) if interrupt_pid(pid) => {
                            info!("Session {} interrupted (pid {})", key, pid)
                        }
                        Some(pid) => warn!("Failed to interrupt session {} (pid {})", key, pid),
                        None => debug!("Session {} process already exited", key),
                    }
                }
            }
        };
        drop(running);

        let stderr_text = stderr_handle.await.unwrap_or_default();

        self.store_token(session, parser.continuation_token(), status.success());

        if !status.success() {
            warn!("Session {} process exited with {}", key, status);
        }
        if let Some(event) = parser.finish(status.code(), &stderr_text) {
            let _ = event_tx.send(event).await;
        }
        let _ = event_tx.send(ChatEvent::done()).await;

        Ok(())
    }

    async fn cancel(&self, key: &SessionKey, resource: &EngineResource) {
        let EngineResource::Process(session) = resource else {
            return;
        };
        if session.request_interrupt() {
            info!("Session {} interrupt requested", key);
        } else {
            info!("Session {} has no running process to cancel", key);
        }
    }

    async fn release(&self, key: &SessionKey, resource: &EngineResource) {
        // A turn still running gets interrupted; nothing else outlives a turn
        self.cancel(key, resource).await;
        debug!("Released process session {}", key);
    }
}

/// Send SIGINT to a child process that has not been reaped yet
fn interrupt_pid(pid: u32) -> bool {
    #[cfg(unix)]
    {
        let Ok(pid) = i32::try_from(pid) else {
            return false;
        };
        // SAFETY: kill(2) has no memory-safety preconditions
        unsafe { libc::kill(pid, libc::SIGINT) == 0 }
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        false
    }
}
