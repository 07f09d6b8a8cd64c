//! Shared test utilities for engine integration tests

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc;

use anywork_bridge::agent::ProcessEngine;
use anywork_bridge::executor::SessionExecutor;
use anywork_bridge::workspace::Workspace;
use anywork_bridge::{ChatEvent, ChatEventKind};

/// Creates an initialized workspace in a temp directory
pub fn create_test_workspace() -> TempDir {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    Workspace::new(temp_dir.path())
        .init()
        .expect("Failed to init workspace");
    temp_dir
}

/// Writes an executable shell script standing in for the claude CLI
#[cfg(unix)]
pub fn write_fake_cli(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("Failed to write script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("Failed to chmod script");
    path
}

/// Executor over a process engine running `script` in `workspace`
pub fn process_executor(script: &Path, workspace: &Path) -> Arc<SessionExecutor> {
    let engine = ProcessEngine::new(script, workspace);
    let log = Workspace::new(workspace).conversation_log();
    Arc::new(SessionExecutor::new(Arc::new(engine), log))
}

/// Drain a turn's event stream
pub async fn collect(mut rx: mpsc::Receiver<ChatEvent>) -> Vec<ChatEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

pub fn kinds(events: &[ChatEvent]) -> Vec<ChatEventKind> {
    events.iter().map(|e| e.kind).collect()
}
