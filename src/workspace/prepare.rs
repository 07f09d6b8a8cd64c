//! Pre-turn workspace preparation: skill bundles and tool-server descriptors.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::Workspace;
use crate::domain::sanitize;

/// Skill directories with this prefix belong to the user and survive prepare
const LOCAL_SKILL_PREFIX: &str = ".local-";

/// One skill: a name and its files keyed by relative path
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkillBundle {
    pub name: String,
    #[serde(default)]
    pub files: BTreeMap<String, String>,
}

/// Everything a task needs written into the workspace before its first turn
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrepareRequest {
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub skills: Vec<SkillBundle>,
    /// `{name: entry}` as found under `mcpServers`
    #[serde(default, alias = "mcpServers")]
    pub mcp_servers: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PrepareSummary {
    pub skills_written: Vec<String>,
    pub skills_removed: Vec<String>,
    pub mcp_servers: usize,
}

impl Workspace {
    /// Replace prepared skills and the `.mcp.json` descriptor
    pub fn prepare(&self, request: &PrepareRequest) -> Result<PrepareSummary> {
        if let Some(task_id) = &request.task_id {
            info!("Preparing workspace for task {}", task_id);
        }

        let skills_dir = self.skills_dir();
        std::fs::create_dir_all(&skills_dir)
            .with_context(|| format!("Failed to create {}", skills_dir.display()))?;

        let mut summary = PrepareSummary {
            skills_removed: remove_prepared_skills(&skills_dir)?,
            ..Default::default()
        };

        for bundle in &request.skills {
            let dir = skills_dir.join(sanitize(&bundle.name));
            for (rel, content) in &bundle.files {
                let path = dir.join(relative_path(rel)?);
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("Failed to create {}", parent.display()))?;
                }
                std::fs::write(&path, content)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                debug!("Wrote skill file {}", path.display());
            }
            summary.skills_written.push(bundle.name.clone());
        }

        let mcp_path = self.mcp_config_path();
        if request.mcp_servers.is_empty() {
            match std::fs::remove_file(&mcp_path) {
                Ok(()) => debug!("Removed {}", mcp_path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to remove {}", mcp_path.display()));
                }
            }
        } else {
            let doc = serde_json::json!({ "mcpServers": request.mcp_servers });
            let text = serde_json::to_string_pretty(&doc)?;
            std::fs::write(&mcp_path, text)
                .with_context(|| format!("Failed to write {}", mcp_path.display()))?;
            summary.mcp_servers = request.mcp_servers.len();
        }

        info!(
            "Prepared {} skill(s), {} tool server(s)",
            summary.skills_written.len(),
            summary.mcp_servers
        );
        Ok(summary)
    }
}

fn remove_prepared_skills(skills_dir: &Path) -> Result<Vec<String>> {
    let mut removed = Vec::new();
    let entries = std::fs::read_dir(skills_dir)
        .with_context(|| format!("Failed to list {}", skills_dir.display()))?;

    for entry in entries {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with(LOCAL_SKILL_PREFIX) || !entry.file_type()?.is_dir() {
            continue;
        }
        std::fs::remove_dir_all(entry.path())
            .with_context(|| format!("Failed to remove skill {}", name))?;
        removed.push(name);
    }

    removed.sort();
    Ok(removed)
}

/// Reject absolute paths and parent components in bundle file names
fn relative_path(rel: &str) -> Result<PathBuf> {
    let path = Path::new(rel);
    let clean = path
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !clean || rel.is_empty() {
        bail!("Invalid skill file path: {}", rel);
    }
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn request(json: &str) -> PrepareRequest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_prepare_writes_skills_and_mcp() {
        let temp = TempDir::new().unwrap();
        let ws = Workspace::new(temp.path());

        let summary = ws
            .prepare(&request(
                r##"{
                    "task_id": "t1",
                    "skills": [{"name": "review", "files": {"SKILL.md": "# Review", "refs/a.md": "a"}}],
                    "mcpServers": {"gh": {"command": "gh-mcp", "args": []}}
                }"##,
            ))
            .unwrap();

        assert_eq!(summary.skills_written, vec!["review"]);
        assert_eq!(summary.mcp_servers, 1);
        assert_eq!(
            std::fs::read_to_string(ws.skills_dir().join("review/refs/a.md")).unwrap(),
            "a"
        );

        let doc: Value =
            serde_json::from_str(&std::fs::read_to_string(ws.mcp_config_path()).unwrap()).unwrap();
        assert_eq!(doc["mcpServers"]["gh"]["command"], "gh-mcp");
    }

    #[test]
    fn test_prepare_replaces_old_skills_but_keeps_local() {
        let temp = TempDir::new().unwrap();
        let ws = Workspace::new(temp.path());
        std::fs::create_dir_all(ws.skills_dir().join("stale")).unwrap();
        std::fs::create_dir_all(ws.skills_dir().join(".local-mine")).unwrap();
        std::fs::write(ws.mcp_config_path(), "{}").unwrap();

        let summary = ws.prepare(&PrepareRequest::default()).unwrap();

        assert_eq!(summary.skills_removed, vec!["stale"]);
        assert!(!ws.skills_dir().join("stale").exists());
        assert!(ws.skills_dir().join(".local-mine").is_dir());
        assert!(!ws.mcp_config_path().exists());
    }

    #[test]
    fn test_prepare_rejects_escaping_paths() {
        let temp = TempDir::new().unwrap();
        let ws = Workspace::new(temp.path());

        let result = ws.prepare(&request(
            r#"{"skills": [{"name": "evil", "files": {"../../x": "boom"}}]}"#,
        ));
        assert!(result.is_err());
        assert!(!temp.path().join("x").exists());
    }
}
