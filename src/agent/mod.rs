//! Engine adapters
//!
//! Both engines implement [`AgentEngine`]: open a per-session resource, run a
//! turn on it while streaming normalized [`ChatEvent`]s, interrupt it, and
//! release it. The executor holds one engine, chosen at startup.

pub mod client;
pub mod process;
pub mod stream;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

use crate::config::skills::load_skill_prompts;
use crate::config::{EngineKind, WorkerConfig};
use crate::{ChatEvent, McpServerSpec, SessionKey};

pub use client::{ClientEngine, ClientSession, CliConnector};
pub use process::{ProcessEngine, ProcessSession};

/// Environment marker a Claude host sets for its children; a backend that
/// sees it believes it is nested and misbehaves
pub const NESTED_SESSION_MARKER: &str = "CLAUDECODE";

/// One user message and the tool servers offered for it
#[derive(Debug, Clone, Default)]
pub struct Turn {
    pub message: String,
    pub mcp_servers: Vec<McpServerSpec>,
}

impl Turn {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            mcp_servers: Vec::new(),
        }
    }

    pub fn with_mcp_servers(mut self, servers: Vec<McpServerSpec>) -> Self {
        self.mcp_servers = servers;
        self
    }
}

impl From<&str> for Turn {
    fn from(message: &str) -> Self {
        Turn::new(message)
    }
}

impl From<String> for Turn {
    fn from(message: String) -> Self {
        Turn::new(message)
    }
}

/// The live backend state of one session
#[derive(Debug)]
pub enum EngineResource {
    /// Continuation token plus the child of the turn in flight
    Process(ProcessSession),
    /// Connection reused by every turn of the session
    Client(ClientSession),
}

impl EngineResource {
    /// Process sessions are always ready; client sessions while connected
    pub fn is_connected(&self) -> bool {
        match self {
            EngineResource::Process(_) => true,
            EngineResource::Client(session) => session.is_connected(),
        }
    }

    pub fn continuation_token(&self) -> Option<String> {
        match self {
            EngineResource::Process(session) => session.continuation_token(),
            EngineResource::Client(_) => None,
        }
    }
}

/// Trait for engine adapters
#[async_trait]
pub trait AgentEngine: Send + Sync {
    /// Get the engine ID
    fn id(&self) -> &str;

    /// Create the resource of a new session
    async fn open(&self, key: &SessionKey) -> Result<EngineResource>;

    /// Run one turn, sending events to `event_tx` as they are produced.
    ///
    /// An `Err` means the turn broke down before the engine could close it;
    /// the caller is responsible for the closing events then.
    async fn submit(
        &self,
        key: &SessionKey,
        resource: &EngineResource,
        turn: &Turn,
        event_tx: mpsc::Sender<ChatEvent>,
    ) -> Result<()>;

    /// Best-effort interrupt of the turn in flight; never fails
    async fn cancel(&self, key: &SessionKey, resource: &EngineResource);

    /// Tear the resource down; idempotent, never fails
    async fn release(&self, key: &SessionKey, resource: &EngineResource);
}

/// Build the engine selected by `config`
pub fn build_engine(config: &WorkerConfig) -> Arc<dyn AgentEngine> {
    let skill_prompts = load_skill_prompts(&config.skills_dir, &config.skills);
    let binary = config.resolved_binary();
    info!(
        "Engine: {:?} (binary {}, {} skill(s))",
        config.engine,
        binary.display(),
        config.skills.len()
    );

    match config.engine {
        EngineKind::Process => Arc::new(
            ProcessEngine::new(binary, &config.workspace_dir)
                .with_model(config.model.clone())
                .with_system_prompt(skill_prompts)
                .with_resume_policy(config.resume_policy),
        ),
        EngineKind::Client => Arc::new(
            ClientEngine::new(Arc::new(CliConnector::new(binary)), &config.workspace_dir)
                .with_model(config.model.clone())
                .with_system_prompt(skill_prompts),
        ),
    }
}
