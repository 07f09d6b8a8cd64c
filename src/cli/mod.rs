//! CLI command implementations

pub mod chat;
pub mod history;
pub mod init;
pub mod persona;
pub mod prepare;
pub mod serve;
pub mod sessions;

use anyhow::{Context, Result};
use tokio::io::AsyncReadExt;

/// Read all of stdin as text
pub async fn read_stdin() -> Result<String> {
    let mut input = String::new();
    tokio::io::stdin()
        .read_to_string(&mut input)
        .await
        .context("Failed to read stdin")?;
    Ok(input)
}
