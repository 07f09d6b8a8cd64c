use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use anywork_bridge::config::WorkerConfig;

mod cli;

#[derive(Parser)]
#[command(name = "anywork-worker")]
#[command(about = "AnyWork worker - one streaming chat protocol over Claude engines")]
#[command(version)]
struct Cli {
    /// Workspace root (defaults to $WORKSPACE_DIR, then /workspace)
    #[arg(short, long, global = true)]
    workspace: Option<PathBuf>,

    /// Path to the config file (defaults to <workspace>/worker.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the workspace layout, persona files and a worker.toml
    Init {
        /// Overwrite an existing worker.toml
        #[arg(long)]
        force: bool,
    },

    /// Run one turn and print its events
    Chat {
        /// Session id
        #[arg(short, long)]
        session: String,

        /// Message to send (read from stdin when omitted)
        #[arg(short, long)]
        message: Option<String>,

        /// Print Server-Sent Events frames instead of JSON lines
        #[arg(long)]
        sse: bool,
    },

    /// Serve JSON-line requests from stdin until EOF
    Serve,

    /// Show the conversation log of a session
    History {
        /// Session id
        #[arg(short, long)]
        session: String,

        /// Print raw JSON lines
        #[arg(long)]
        json: bool,
    },

    /// List stored sessions
    Sessions,

    /// Write skills and tool servers into the workspace
    Prepare {
        /// JSON request file ("-" for stdin)
        file: PathBuf,
    },

    /// Read or replace SOUL.md / AGENTS.md
    Persona {
        #[command(subcommand)]
        action: PersonaAction,
    },
}

#[derive(Subcommand)]
enum PersonaAction {
    /// Print a persona file
    Get {
        /// soul or agents
        file: String,
    },

    /// Replace a persona file
    Set {
        /// soul or agents
        file: String,

        /// New content (read from stdin when omitted)
        #[arg(long)]
        content: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; stdout is reserved for events
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = WorkerConfig::load(cli.config.as_deref(), cli.workspace.as_deref())?;

    match cli.command {
        Commands::Init { force } => {
            cli::init::init_command(&config, force)?;
        }
        Commands::Chat {
            session,
            message,
            sse,
        } => {
            config.validate(|name| std::env::var(name).ok())?;
            cli::chat::chat_command(&config, &session, message, sse).await?;
        }
        Commands::Serve => {
            config.validate(|name| std::env::var(name).ok())?;
            cli::serve::serve_command(&config).await?;
        }
        Commands::History { session, json } => {
            cli::history::history_command(&config, &session, json).await?;
        }
        Commands::Sessions => {
            cli::sessions::sessions_command(&config).await?;
        }
        Commands::Prepare { file } => {
            cli::prepare::prepare_command(&config, &file).await?;
        }
        Commands::Persona { action } => match action {
            PersonaAction::Get { file } => {
                cli::persona::get_command(&config, &file)?;
            }
            PersonaAction::Set { file, content } => {
                cli::persona::set_command(&config, &file, content).await?;
            }
        },
    }

    Ok(())
}
