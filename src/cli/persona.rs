//! Persona command implementation

use anyhow::{Result, bail};

use anywork_bridge::config::WorkerConfig;
use anywork_bridge::workspace::{PersonaFile, Workspace};

pub fn get_command(config: &WorkerConfig, file: &str) -> Result<()> {
    let file: PersonaFile = file.parse()?;
    match Workspace::new(&config.workspace_dir).read_persona_file(file)? {
        Some(content) => print!("{}", content),
        None => bail!("{} does not exist (run init first)", file.file_name()),
    }
    Ok(())
}

pub async fn set_command(config: &WorkerConfig, file: &str, content: Option<String>) -> Result<()> {
    let file: PersonaFile = file.parse()?;
    let content = match content {
        Some(content) => content,
        None => super::read_stdin().await?,
    };
    Workspace::new(&config.workspace_dir).write_persona_file(file, &content)?;
    println!("Updated {}", file.file_name());
    Ok(())
}
