//! Client engine: one persistent connection per session
//!
//! Turns are issued as queries on the session's connection and its response
//! stream is drained until the terminal result. The connection itself sits
//! behind [`Connector`] / [`AgentConnection`] so the runtime it talks to can
//! be swapped.

mod connection;
mod translate;

pub use connection::{CliConnection, CliConnector};
pub use translate::{Translation, translate};

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::stream::StreamMessage;
use super::{AgentEngine, EngineResource, Turn};
use crate::{ChatEvent, SessionKey};

/// Permission mode of every client connection: unrestricted inside the workspace
pub const PERMISSION_MODE: &str = "bypassPermissions";

/// A live connection to an agent runtime
#[async_trait]
pub trait AgentConnection: Send + Sync {
    /// Send one user message
    async fn query(&self, message: &str) -> Result<()>;

    /// Next message of the response stream; `None` once the connection closed
    async fn next_message(&self) -> Result<Option<StreamMessage>>;

    /// Ask the runtime to stop the turn in flight
    async fn interrupt(&self) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;

    fn is_connected(&self) -> bool;
}

/// Settings a connection is opened with
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub workspace: PathBuf,
    pub model: Option<String>,
    pub permission_mode: String,
    /// `{name: entry}` from the workspace `.mcp.json`
    pub mcp_servers: Option<Value>,
    pub system_prompt: String,
}

/// Opens connections
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, options: &ConnectOptions) -> Result<Arc<dyn AgentConnection>>;
}

/// Per-session state of the client engine
#[derive(Default)]
pub struct ClientSession {
    connection: RwLock<Option<Arc<dyn AgentConnection>>>,
}

impl ClientSession {
    pub fn new(connection: Arc<dyn AgentConnection>) -> Self {
        Self {
            connection: RwLock::new(Some(connection)),
        }
    }

    pub fn connection(&self) -> Option<Arc<dyn AgentConnection>> {
        self.connection
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn replace(&self, connection: Arc<dyn AgentConnection>) {
        *self.connection.write().unwrap_or_else(|e| e.into_inner()) = Some(connection);
    }

    fn take(&self) -> Option<Arc<dyn AgentConnection>> {
        self.connection
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }

    pub fn is_connected(&self) -> bool {
        self.connection().is_some_and(|c| c.is_connected())
    }
}

impl std::fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSession")
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Engine holding one [`AgentConnection`] per session
pub struct ClientEngine {
    id: String,
    connector: Arc<dyn Connector>,
    workspace: PathBuf,
    model: Option<String>,
    system_prompt: String,
}

impl ClientEngine {
    pub fn new(connector: Arc<dyn Connector>, workspace: impl Into<PathBuf>) -> Self {
        Self {
            id: "client".to_string(),
            connector,
            workspace: workspace.into(),
            model: None,
            system_prompt: String::new(),
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model.filter(|m| !m.trim().is_empty());
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Options for a new connection, re-reading `.mcp.json` every time
    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            workspace: self.workspace.clone(),
            model: self.model.clone(),
            permission_mode: PERMISSION_MODE.to_string(),
            mcp_servers: self.read_mcp_servers(),
            system_prompt: self.system_prompt.clone(),
        }
    }

    fn read_mcp_servers(&self) -> Option<Value> {
        let path = self.workspace.join(".mcp.json");
        let text = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str::<Value>(&text) {
            Ok(doc) => doc
                .get("mcpServers")
                .filter(|servers| servers.as_object().is_some_and(|m| !m.is_empty()))
                .cloned(),
            Err(e) => {
                warn!("Ignoring unreadable {}: {}", path.display(), e);
                None
            }
        }
    }

    /// The session's connection, reconnecting if it dropped
    async fn ensure_connected(
        &self,
        key: &SessionKey,
        session: &ClientSession,
    ) -> Result<Arc<dyn AgentConnection>> {
        if let Some(connection) = session.connection().filter(|c| c.is_connected()) {
            return Ok(connection);
        }

        info!("Connecting session {}", key);
        let connection = self.connector.connect(&self.connect_options()).await?;
        session.replace(connection.clone());
        Ok(connection)
    }
}

#[async_trait]
impl AgentEngine for ClientEngine {
    fn id(&self) -> &str {
        &self.id
    }

    async fn open(&self, key: &SessionKey) -> Result<EngineResource> {
        info!("Connecting session {}", key);
        let connection = self.connector.connect(&self.connect_options()).await?;
        Ok(EngineResource::Client(ClientSession::new(connection)))
    }

    async fn submit(
        &self,
        key: &SessionKey,
        resource: &EngineResource,
        turn: &Turn,
        event_tx: mpsc::Sender<ChatEvent>,
    ) -> Result<()> {
        let EngineResource::Client(session) = resource else {
            bail!("Client engine cannot drive a process session");
        };
        if !turn.mcp_servers.is_empty() {
            debug!(
                "Session {}: per-turn tool servers ignored, the connection uses .mcp.json",
                key
            );
        }

        let connection = self.ensure_connected(key, session).await?;
        connection.query(&turn.message).await?;

        while let Some(message) = connection.next_message().await? {
            let Translation { events, terminal } = translate(message);
            for event in events {
                let _ = event_tx.send(event).await;
            }
            if terminal {
                return Ok(());
            }
        }

        bail!("Connection closed before the turn completed")
    }

    async fn cancel(&self, key: &SessionKey, resource: &EngineResource) {
        let EngineResource::Client(session) = resource else {
            return;
        };
        let Some(connection) = session.connection().filter(|c| c.is_connected()) else {
            info!("Session {} has no live connection to interrupt", key);
            return;
        };
        match connection.interrupt().await {
            Ok(()) => info!("Session {} interrupted", key),
            Err(e) => warn!("Session {} interrupt failed: {:#}", key, e),
        }
    }

    async fn release(&self, key: &SessionKey, resource: &EngineResource) {
        let EngineResource::Client(session) = resource else {
            return;
        };
        let Some(connection) = session.take() else {
            return;
        };
        if let Err(e) = connection.disconnect().await {
            debug!("Session {} disconnect error ignored: {:#}", key, e);
        }
        info!("Session {} disconnected", key);
    }
}
