//! Skill prompt loading
//!
//! A skill contributes one system-prompt fragment. Fragments are looked up in:
//! 1. `<skills_dir>/<name>/prompt.md` (mounted bundles, higher priority)
//! 2. The small built-in catalogue below (fallback)
//!
//! Names that resolve to neither are skipped with a warning.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Separator between rendered skill fragments
const FRAGMENT_SEPARATOR: &str = "\n\n---\n\n";

/// Where a skill's prompt text came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkillSource {
    /// Read from a `prompt.md` bundle on disk
    Directory(PathBuf),
    /// Taken from the built-in catalogue
    Builtin,
    /// Not found anywhere (or the bundle was empty)
    Missing,
}

/// Outcome of resolving one skill name
#[derive(Debug, Clone)]
pub struct ResolvedSkill {
    pub name: String,
    pub source: SkillSource,
    pub prompt: String,
}

/// Parse a comma separated list such as the `SKILLS` environment variable
pub fn parse_skill_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Resolve a single skill name
pub fn resolve_skill(skills_dir: &Path, name: &str) -> ResolvedSkill {
    let prompt_file = skills_dir.join(name).join("prompt.md");
    if prompt_file.is_file() {
        match std::fs::read_to_string(&prompt_file) {
            Ok(text) if !text.trim().is_empty() => {
                return ResolvedSkill {
                    name: name.to_string(),
                    source: SkillSource::Directory(prompt_file),
                    prompt: text,
                };
            }
            Ok(_) => debug!("Skill prompt {} is empty", prompt_file.display()),
            Err(e) => warn!("Could not read skill prompt {}: {}", prompt_file.display(), e),
        }
    }

    match builtin_prompt(name) {
        Some(text) => ResolvedSkill {
            name: name.to_string(),
            source: SkillSource::Builtin,
            prompt: text.to_string(),
        },
        None => ResolvedSkill {
            name: name.to_string(),
            source: SkillSource::Missing,
            prompt: String::new(),
        },
    }
}

/// Load and concatenate the prompt fragments for `names`, in order.
///
/// Returns an empty string when no skill resolves.
pub fn load_skill_prompts(skills_dir: &Path, names: &[String]) -> String {
    let mut fragments = Vec::new();

    for name in names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
        let skill = resolve_skill(skills_dir, name);
        match skill.source {
            SkillSource::Missing => {
                warn!("Skill '{}' not found or has no prompt.md - skipping", name);
            }
            _ => fragments.push(format!("## Skill: {}\n\n{}", name, skill.prompt.trim())),
        }
    }

    fragments.join(FRAGMENT_SEPARATOR)
}

fn builtin_prompt(name: &str) -> Option<&'static str> {
    let text = match name {
        "code-review" => {
            "You review code. Report bugs, security problems and performance issues first, \
             then suggest idiomatic improvements. Keep the tone constructive."
        }
        "data-analysis" => {
            "You analyse data. Check for missing values, outliers and type problems before \
             drawing conclusions, and summarise the key statistics plainly."
        }
        "docker-expert" => {
            "You help with containers: small multi-stage Dockerfiles, non-root images, \
             Compose files, networking, volumes and debugging failing containers."
        }
        "k8s-expert" => {
            "You help with Kubernetes: manifests, RBAC, scheduling and networking problems, \
             Helm charts and Kustomize overlays."
        }
        "sql-expert" => {
            "You help with SQL: readable queries (CTEs over nested subqueries), schema design \
             and reading query plans across PostgreSQL, MySQL and SQLite."
        }
        "writing-assistant" => {
            "You help people write: clarity, tone, grammar and structure, adapted to a \
             technical, business or casual audience."
        }
        _ => return None,
    };
    Some(text)
}
