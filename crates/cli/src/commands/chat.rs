//! `tether chat`: single-message or interactive chat.

use std::io::Write;

use tether_agent::Agent;
use tether_core::message::Attachment;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::runtime::{self, CliResult};

pub struct ChatOptions {
    pub stream: bool,
    pub session: Option<String>,
    pub images: Vec<String>,
}

pub async fn run(message: Option<String>, options: ChatOptions) -> CliResult<()> {
    let config = runtime::load_config()?;

    if !config.has_api_key() && !matches!(config.provider.name.as_str(), "ollama" | "custom") {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set TETHER_API_KEY (or OPENAI_API_KEY), or add api_key to:");
        eprintln!("    {}", tether_config::AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let session = options
        .session
        .clone()
        .unwrap_or_else(|| config.agent.session_id.clone());
    let agent = runtime::build_agent(&config, &session).await?;
    let attachments: Vec<Attachment> = options.images.iter().map(Attachment::image_url).collect();

    if let Some(msg) = message {
        let answer = respond(&agent, &msg, attachments, options.stream).await?;
        if !options.stream {
            println!("{answer}");
        }
        return Ok(());
    }

    println!();
    println!("  Tether: interactive mode");
    println!();
    println!("  Provider:  {}", config.provider.name);
    println!("  Model:     {}", config.provider.model);
    println!("  Tools:     {}", agent.tools().names().join(", "));
    println!("  Session:   {session} ({} memory)", config.memory.backend);
    println!("  Knowledge: {}", if config.knowledge.enabled { "on" } else { "off" });
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+D to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    // Images only ride along with the first message.
    let mut pending = attachments;

    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }

        match respond(&agent, line, std::mem::take(&mut pending), options.stream).await {
            Ok(answer) if !options.stream => {
                println!();
                for text in answer.lines() {
                    println!("  {} > {text}", agent.name());
                }
                println!();
            }
            Ok(_) => println!(),
            Err(e) => {
                eprintln!("  [Error] {e}");
                println!();
            }
        }
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}

/// Run one turn. In stream mode chunks are printed as they arrive.
async fn respond(
    agent: &Agent,
    input: &str,
    attachments: Vec<Attachment>,
    stream: bool,
) -> CliResult<String> {
    if !stream {
        return Ok(agent.run(input, attachments).await?);
    }

    let mut rx = agent.run_stream(input, attachments).await?;
    let mut full = String::new();
    while let Some(chunk) = rx.recv().await {
        let chunk = chunk?;
        print!("{chunk}");
        std::io::stdout().flush()?;
        full.push_str(&chunk);
    }
    println!();
    Ok(full)
}
