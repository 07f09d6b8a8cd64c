//! Workspace filesystem layout
//!
//! ```text
//! <root>/
//! ├── SOUL.md       # persona text (pass-through)
//! ├── AGENTS.md     # capability text (pass-through)
//! ├── .mcp.json     # tool servers for the client engine (written by prepare)
//! ├── sessions/     # one JSONL conversation log per session
//! ├── files/        # user and agent files
//! └── skills/       # prepared skill bundles
//! ```

mod log;
mod prepare;

pub use log::{ConversationLog, LogError, SessionSummary};
pub use prepare::{PrepareRequest, PrepareSummary, SkillBundle};

use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Editable persona files at the workspace root
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersonaFile {
    Soul,
    Agents,
}

impl PersonaFile {
    pub fn file_name(&self) -> &'static str {
        match self {
            PersonaFile::Soul => "SOUL.md",
            PersonaFile::Agents => "AGENTS.md",
        }
    }

    fn default_content(&self) -> &'static str {
        match self {
            PersonaFile::Soul => DEFAULT_SOUL,
            PersonaFile::Agents => DEFAULT_AGENTS,
        }
    }
}

impl std::str::FromStr for PersonaFile {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "soul" | "soul.md" => Ok(PersonaFile::Soul),
            "agents" | "agents.md" => Ok(PersonaFile::Agents),
            other => bail!("Unknown workspace file '{}' (expected soul or agents)", other),
        }
    }
}

const DEFAULT_SOUL: &str = "# AnyWork Agent

You are AnyWork, a helpful assistant working inside an isolated workspace.

## Workspace
User files live in `files/`. Conversation history is saved in `sessions/`.

## Guidelines
- Be accurate and concise
- Save important outputs to `files/` so they persist
";

const DEFAULT_AGENTS: &str = "# AnyWork Agent Capabilities

## Workspace Layout

```
SOUL.md       # personality and style
AGENTS.md     # this file
sessions/     # conversation history (managed automatically)
files/        # user files and agent outputs
skills/       # prepared skills
```

## Guidelines
- Keep work inside the workspace
- Prefer editing existing files over rewriting them
";

/// Subdirectories created by [`Workspace::init`]
const SUBDIRS: &[&str] = &["sessions", "files", "skills"];

/// Handle on a workspace root
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.root.join("sessions")
    }

    pub fn files_dir(&self) -> PathBuf {
        self.root.join("files")
    }

    pub fn skills_dir(&self) -> PathBuf {
        self.root.join("skills")
    }

    /// Workspace-local tool server descriptor read by the client engine
    pub fn mcp_config_path(&self) -> PathBuf {
        self.root.join(".mcp.json")
    }

    pub fn persona_path(&self, file: PersonaFile) -> PathBuf {
        self.root.join(file.file_name())
    }

    /// Create the directory structure and default persona files.
    ///
    /// Existing files are never overwritten.
    pub fn init(&self) -> Result<()> {
        info!("Initializing workspace: {}", self.root.display());

        for dir in SUBDIRS {
            let path = self.root.join(dir);
            std::fs::create_dir_all(&path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            debug!("  {}/ ready", dir);
        }

        for file in [PersonaFile::Soul, PersonaFile::Agents] {
            let path = self.persona_path(file);
            if !path.exists() {
                std::fs::write(&path, file.default_content())
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                info!("Created default {}", file.file_name());
            }
        }

        Ok(())
    }

    /// Read a persona file; a missing file reads as `None`
    pub fn read_persona_file(&self, file: PersonaFile) -> Result<Option<String>> {
        let path = self.persona_path(file);
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    pub fn write_persona_file(&self, file: PersonaFile, content: &str) -> Result<()> {
        let path = self.persona_path(file);
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Updated workspace file: {}", file.file_name());
        Ok(())
    }

    /// Conversation log rooted at this workspace's `sessions/`
    pub fn conversation_log(&self) -> ConversationLog {
        ConversationLog::new(self.sessions_dir())
    }
}
