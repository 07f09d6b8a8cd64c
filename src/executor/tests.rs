use super::*;
use crate::Role;
use crate::agent::{EngineResource, ProcessSession};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;
use tokio::sync::Notify;

/// Engine replaying a fixed list of events on every turn
#[derive(Default)]
struct ScriptedEngine {
    events: Vec<ChatEvent>,
    fail_with: Option<&'static str>,
    fail_open: bool,
    gate: Option<Arc<Notify>>,
    opens: AtomicUsize,
    cancels: AtomicUsize,
}

#[async_trait]
impl AgentEngine for ScriptedEngine {
    fn id(&self) -> &str {
        "scripted"
    }

    async fn open(&self, _key: &SessionKey) -> anyhow::Result<EngineResource> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.fail_open {
            anyhow::bail!("cannot reach backend");
        }
        Ok(EngineResource::Process(ProcessSession::new()))
    }

    async fn submit(
        &self,
        _key: &SessionKey,
        _resource: &EngineResource,
        _turn: &Turn,
        event_tx: mpsc::Sender<ChatEvent>,
    ) -> anyhow::Result<()> {
        for event in &self.events {
            let _ = event_tx.send(event.clone()).await;
        }
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        match self.fail_with {
            Some(message) => anyhow::bail!(message),
            None => Ok(()),
        }
    }

    async fn cancel(&self, _key: &SessionKey, _resource: &EngineResource) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
    }

    async fn release(&self, _key: &SessionKey, _resource: &EngineResource) {}
}

fn executor(engine: ScriptedEngine, temp: &TempDir) -> SessionExecutor {
    SessionExecutor::new(Arc::new(engine), ConversationLog::new(temp.path().join("sessions")))
}

async fn run(executor: &SessionExecutor, key: &SessionKey, message: &str) -> Vec<ChatEvent> {
    let (tx, mut rx) = mpsc::channel(EVENT_BUFFER);
    executor.execute_turn(key, message, tx).await;
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

fn kinds(events: &[ChatEvent]) -> Vec<ChatEventKind> {
    events.iter().map(|e| e.kind).collect()
}

#[tokio::test]
async fn test_text_turn_persists_one_assistant_record() {
    let temp = TempDir::new().unwrap();
    let exec = executor(
        ScriptedEngine {
            events: vec![
                ChatEvent::tool_call("Read"),
                ChatEvent::tool_call("Bash"),
                ChatEvent::text("All done"),
                ChatEvent::done(),
            ],
            ..Default::default()
        },
        &temp,
    );
    let key = SessionKey::new("s1");

    let events = run(&exec, &key, "do it").await;

    assert_eq!(
        kinds(&events),
        vec![
            ChatEventKind::ToolCall,
            ChatEventKind::ToolCall,
            ChatEventKind::Text,
            ChatEventKind::Done
        ]
    );

    let history = exec.history(&key).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[0].content, "do it");
    assert_eq!(history[1].role, Role::Assistant);
    assert_eq!(history[1].content, "All done");
    let calls = history[1].tool_calls.as_ref().unwrap();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].name, "Read");
    assert_eq!(calls[1].status, ToolCallStatus::Completed);
}

#[tokio::test]
async fn test_engine_error_becomes_error_and_done() {
    let temp = TempDir::new().unwrap();
    let exec = executor(
        ScriptedEngine {
            fail_with: Some("connection reset"),
            ..Default::default()
        },
        &temp,
    );
    let key = SessionKey::new("s1");

    let events = run(&exec, &key, "hi").await;

    assert_eq!(kinds(&events), vec![ChatEventKind::Error, ChatEventKind::Done]);
    assert_eq!(events[0].content, "connection reset");

    // The resource stays registered after a submit failure
    assert_eq!(exec.active_sessions().await, vec![key.clone()]);
    let history = exec.history(&key).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].role, Role::User);
}

#[tokio::test]
async fn test_missing_done_is_added() {
    let temp = TempDir::new().unwrap();
    let exec = executor(
        ScriptedEngine {
            events: vec![ChatEvent::text("partial"), ChatEvent::error("max turns")],
            ..Default::default()
        },
        &temp,
    );
    let key = SessionKey::new("s1");

    let events = run(&exec, &key, "hi").await;

    assert_eq!(
        kinds(&events),
        vec![ChatEventKind::Text, ChatEventKind::Error, ChatEventKind::Done]
    );
    let history = exec.history(&key).await.unwrap();
    assert_eq!(history[1].content, "partial");
}

#[tokio::test]
async fn test_events_after_done_are_dropped() {
    let temp = TempDir::new().unwrap();
    let exec = executor(
        ScriptedEngine {
            events: vec![ChatEvent::done(), ChatEvent::text("late")],
            fail_with: Some("late failure"),
            ..Default::default()
        },
        &temp,
    );

    let events = run(&exec, &SessionKey::new("s1"), "hi").await;

    assert_eq!(kinds(&events), vec![ChatEventKind::Done]);
}

#[tokio::test]
async fn test_open_failure_leaves_no_session() {
    let temp = TempDir::new().unwrap();
    let exec = executor(
        ScriptedEngine {
            fail_open: true,
            ..Default::default()
        },
        &temp,
    );
    let key = SessionKey::new("s1");

    let events = run(&exec, &key, "hi").await;

    assert_eq!(kinds(&events), vec![ChatEventKind::Error, ChatEventKind::Done]);
    assert!(events[0].content.contains("cannot reach backend"));
    assert!(exec.active_sessions().await.is_empty());
    assert!(matches!(exec.history(&key).await, Err(LogError::SessionNotFound(_))));
}

#[tokio::test]
async fn test_multiple_text_events_make_one_record() {
    let temp = TempDir::new().unwrap();
    let exec = executor(
        ScriptedEngine {
            events: vec![
                ChatEvent::text("first"),
                ChatEvent::tool_call("Grep"),
                ChatEvent::text("second"),
                ChatEvent::done(),
            ],
            ..Default::default()
        },
        &temp,
    );
    let key = SessionKey::new("s1");

    run(&exec, &key, "hi").await;

    let history = exec.history(&key).await.unwrap();
    let assistant: Vec<_> = history.iter().filter(|r| r.role == Role::Assistant).collect();
    assert_eq!(assistant.len(), 1);
    assert_eq!(assistant[0].content, "first\n\nsecond");
}

#[tokio::test]
async fn test_second_turn_reuses_resource() {
    let temp = TempDir::new().unwrap();
    let engine = Arc::new(ScriptedEngine {
        events: vec![ChatEvent::text("ok"), ChatEvent::done()],
        ..Default::default()
    });
    let exec = SessionExecutor::new(engine.clone(), ConversationLog::new(temp.path()));
    let key = SessionKey::new("s1");

    run(&exec, &key, "one").await;
    run(&exec, &key, "two").await;

    assert_eq!(engine.opens.load(Ordering::SeqCst), 1);
    assert_eq!(exec.history(&key).await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_cancel_without_turn_keeps_entry() {
    let temp = TempDir::new().unwrap();
    let engine = Arc::new(ScriptedEngine {
        events: vec![ChatEvent::done()],
        ..Default::default()
    });
    let exec = SessionExecutor::new(engine.clone(), ConversationLog::new(temp.path()));
    let key = SessionKey::new("s1");

    assert!(!exec.cancel(&key).await);
    assert!(exec.active_sessions().await.is_empty());

    run(&exec, &key, "hi").await;
    assert!(exec.cancel(&key).await);
    assert_eq!(engine.cancels.load(Ordering::SeqCst), 1);
    assert_eq!(exec.active_sessions().await, vec![key]);
}

#[tokio::test]
async fn test_disconnect_and_shutdown() {
    let temp = TempDir::new().unwrap();
    let exec = executor(
        ScriptedEngine {
            events: vec![ChatEvent::done()],
            ..Default::default()
        },
        &temp,
    );

    for id in ["a", "b", "c"] {
        run(&exec, &SessionKey::new(id), "hi").await;
    }
    assert!(exec.disconnect(&SessionKey::new("a")).await);
    assert!(!exec.disconnect(&SessionKey::new("a")).await);
    assert_eq!(exec.active_sessions().await.len(), 2);

    exec.shutdown().await;
    assert!(exec.active_sessions().await.is_empty());
}

#[tokio::test]
async fn test_reject_policy_answers_busy_session() {
    let temp = TempDir::new().unwrap();
    let gate = Arc::new(Notify::new());
    let exec = Arc::new(
        executor(
            ScriptedEngine {
                events: vec![ChatEvent::tool_call("Bash")],
                gate: Some(gate.clone()),
                ..Default::default()
            },
            &temp,
        )
        .with_busy_policy(BusyPolicy::Reject),
    );
    let key = SessionKey::new("s1");

    let mut first = exec.spawn_turn(key.clone(), "long task");
    // The first event means the turn holds the session
    assert_eq!(first.recv().await.unwrap().kind, ChatEventKind::ToolCall);

    let events = run(&exec, &key, "second").await;
    assert_eq!(kinds(&events), vec![ChatEventKind::Error, ChatEventKind::Done]);
    assert_eq!(events[0].content, "session s1 is busy");

    gate.notify_one();
    let mut rest = Vec::new();
    while let Some(event) = first.recv().await {
        rest.push(event);
    }
    assert_eq!(kinds(&rest), vec![ChatEventKind::Done]);
}

#[tokio::test]
async fn test_queue_policy_serializes_turns() {
    let temp = TempDir::new().unwrap();
    let gate = Arc::new(Notify::new());
    let exec = Arc::new(executor(
        ScriptedEngine {
            events: vec![ChatEvent::text("answer")],
            gate: Some(gate.clone()),
            ..Default::default()
        },
        &temp,
    ));
    let key = SessionKey::new("s1");

    let mut first = exec.spawn_turn(key.clone(), "one");
    assert_eq!(first.recv().await.unwrap().kind, ChatEventKind::Text);
    let mut second = exec.spawn_turn(key.clone(), "two");

    gate.notify_one();
    assert_eq!(first.recv().await.unwrap().kind, ChatEventKind::Done);
    assert_eq!(second.recv().await.unwrap().kind, ChatEventKind::Text);

    gate.notify_one();
    assert_eq!(second.recv().await.unwrap().kind, ChatEventKind::Done);

    let history = exec.history(&key).await.unwrap();
    let roles: Vec<_> = history.iter().map(|r| r.role).collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
    );
}
