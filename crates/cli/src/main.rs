//! Tether CLI, the main entry point.
//!
//! Commands:
//! - `init`     Write a default config to `~/.tether/config.toml`
//! - `chat`     Single message or interactive chat with the agent
//! - `ingest`   Add files to the knowledge base
//! - `history`  Print a session's stored conversation
//! - `tools`    Print the built-in tool definitions as JSON

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod runtime;

#[derive(Parser)]
#[command(
    name = "tether",
    about = "Tether: an LLM agent with tools, memory and retrieval",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Chat with the agent
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Print the answer as it streams in (tools are not offered)
        #[arg(long)]
        stream: bool,

        /// Session to load and persist (defaults to agent.session_id)
        #[arg(short, long, env = "TETHER_SESSION")]
        session: Option<String>,

        /// Attach an image URL to the message (repeatable)
        #[arg(long = "image")]
        images: Vec<String>,
    },

    /// Embed files and add them to the knowledge base
    Ingest {
        /// Text files to ingest
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Show a session's stored messages
    History {
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Print the built-in tool definitions as JSON
    Tools,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init { force } => commands::init::run(force).await?,
        Commands::Chat {
            message,
            stream,
            session,
            images,
        } => {
            let options = commands::chat::ChatOptions {
                stream,
                session,
                images,
            };
            commands::chat::run(message, options).await?
        }
        Commands::Ingest { files } => commands::ingest::run(files).await?,
        Commands::History { session } => commands::history::run(session).await?,
        Commands::Tools => commands::tools::run()?,
    }

    Ok(())
}
