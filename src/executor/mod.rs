//! Session executor: runs turns and keeps the conversation log
//!
//! Every turn handed to [`SessionExecutor::execute_turn`] ends with exactly one
//! `done` event, whatever happens in the engine.

mod registry;

pub use registry::{SessionEntry, SessionRegistry};

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::agent::{AgentEngine, Turn, build_engine};
use crate::config::{BusyPolicy, WorkerConfig};
use crate::workspace::{ConversationLog, LogError, Workspace};
use crate::{
    ChatEvent, ChatEventKind, ConversationRecord, SessionKey, ToolCallRecord, ToolCallStatus,
};

/// Capacity of the per-turn event channels
pub const EVENT_BUFFER: usize = 64;

/// What the relay saw during one turn
#[derive(Debug, Default)]
struct TurnState {
    texts: Vec<String>,
    tools: Vec<String>,
    failed: bool,
    done_sent: bool,
}

impl TurnState {
    fn observe(&mut self, event: &ChatEvent) {
        match event.kind {
            ChatEventKind::Text => self.texts.push(event.content.clone()),
            ChatEventKind::ToolCall => self.tools.push(event.content.clone()),
            ChatEventKind::Error => self.failed = true,
            ChatEventKind::Done => {}
        }
    }

    /// The assistant record of the turn; `None` when it produced no text
    fn assistant_record(&self) -> Option<ConversationRecord> {
        let content = self
            .texts
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
        if content.is_empty() {
            return None;
        }

        let status = if self.failed {
            ToolCallStatus::Failed
        } else {
            ToolCallStatus::Completed
        };
        let calls = self
            .tools
            .iter()
            .map(|name| ToolCallRecord {
                name: name.clone(),
                status,
            })
            .collect();

        Some(ConversationRecord::assistant(content).with_tool_calls(calls))
    }
}

/// Orchestrates turns over one engine
pub struct SessionExecutor {
    engine: Arc<dyn AgentEngine>,
    registry: SessionRegistry,
    log: ConversationLog,
    busy_policy: BusyPolicy,
}

impl SessionExecutor {
    pub fn new(engine: Arc<dyn AgentEngine>, log: ConversationLog) -> Self {
        Self {
            registry: SessionRegistry::new(engine.clone()),
            engine,
            log,
            busy_policy: BusyPolicy::default(),
        }
    }

    pub fn with_busy_policy(mut self, policy: BusyPolicy) -> Self {
        self.busy_policy = policy;
        self
    }

    /// Executor over the engine and workspace described by `config`
    pub fn from_config(config: &WorkerConfig) -> Self {
        let log = Workspace::new(&config.workspace_dir).conversation_log();
        Self::new(build_engine(config), log).with_busy_policy(config.busy_policy)
    }

    pub fn engine(&self) -> &Arc<dyn AgentEngine> {
        &self.engine
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn log(&self) -> &ConversationLog {
        &self.log
    }

    /// Run one turn, relaying its events to `event_tx` as they are produced.
    ///
    /// Never fails: problems become an `error` event, and the stream always
    /// ends with one `done`.
    pub async fn execute_turn(
        &self,
        key: &SessionKey,
        turn: impl Into<Turn>,
        event_tx: mpsc::Sender<ChatEvent>,
    ) {
        let turn = turn.into();

        let entry = match self.registry.get_or_create(key).await {
            Ok(entry) => entry,
            Err(e) => {
                error!("Session {} could not be opened: {:#}", key, e);
                let _ = event_tx.send(ChatEvent::error(format!("{:#}", e))).await;
                let _ = event_tx.send(ChatEvent::done()).await;
                return;
            }
        };

        let _turn_guard = match self.busy_policy {
            BusyPolicy::Queue => entry.lock_turn().await,
            BusyPolicy::Reject => match entry.try_lock_turn() {
                Ok(guard) => guard,
                Err(_) => {
                    warn!("Session {} is busy, rejecting turn", key);
                    let busy = format!("session {} is busy", key.session_id());
                    let _ = event_tx.send(ChatEvent::error(busy)).await;
                    let _ = event_tx.send(ChatEvent::done()).await;
                    return;
                }
            },
        };

        info!("Session {} turn started", key);
        self.log
            .append(key, &ConversationRecord::user(turn.message.clone()))
            .await;

        let (inner_tx, mut inner_rx) = mpsc::channel::<ChatEvent>(EVENT_BUFFER);
        let submit = self.engine.submit(key, entry.resource(), &turn, inner_tx);
        let relay = async {
            let mut state = TurnState::default();
            while let Some(event) = inner_rx.recv().await {
                if state.done_sent {
                    debug!("Session {} dropped {} event after done", key, event.kind);
                    continue;
                }
                if event.is_done() {
                    self.persist_assistant(key, &state).await;
                    state.done_sent = true;
                } else {
                    state.observe(&event);
                }
                let _ = event_tx.send(event).await;
            }
            state
        };

        let (result, mut state) = tokio::join!(submit, relay);

        if let Err(e) = result {
            if state.done_sent {
                warn!("Session {} engine error after done: {:#}", key, e);
            } else {
                error!("Session {} turn failed: {:#}", key, e);
                state.failed = true;
                let _ = event_tx.send(ChatEvent::error(format!("{:#}", e))).await;
            }
        }

        if !state.done_sent {
            self.persist_assistant(key, &state).await;
            let _ = event_tx.send(ChatEvent::done()).await;
        }

        info!("Session {} turn finished", key);
    }

    /// Run a turn on its own task and return its event stream
    pub fn spawn_turn(
        self: &Arc<Self>,
        key: SessionKey,
        turn: impl Into<Turn>,
    ) -> mpsc::Receiver<ChatEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let executor = Arc::clone(self);
        let turn = turn.into();
        tokio::spawn(async move {
            executor.execute_turn(&key, turn, tx).await;
        });
        rx
    }

    /// Interrupt the session's turn in flight, best-effort.
    ///
    /// Returns whether the session was registered.
    pub async fn cancel(&self, key: &SessionKey) -> bool {
        match self.registry.get(key).await {
            Some(entry) => {
                self.engine.cancel(key, entry.resource()).await;
                true
            }
            None => {
                info!("Cancel for unknown session {} ignored", key);
                false
            }
        }
    }

    /// Release the session's engine resource; idempotent
    pub async fn disconnect(&self, key: &SessionKey) -> bool {
        self.registry.release(key).await
    }

    /// Release every session
    pub async fn shutdown(&self) {
        self.registry.release_all().await;
    }

    /// Persisted conversation of a session
    pub async fn history(&self, key: &SessionKey) -> Result<Vec<ConversationRecord>, LogError> {
        self.log.read(key).await
    }

    pub async fn active_sessions(&self) -> Vec<SessionKey> {
        self.registry.keys().await
    }

    async fn persist_assistant(&self, key: &SessionKey, state: &TurnState) {
        if let Some(record) = state.assistant_record() {
            self.log.append(key, &record).await;
        }
    }
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
