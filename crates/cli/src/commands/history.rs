//! `tether history`: print a session's stored conversation.

use tether_core::memory::Memory;
use tether_core::message::Role;

use crate::runtime::{self, CliResult};

pub async fn run(session: Option<String>) -> CliResult<()> {
    let config = runtime::load_config()?;
    let session = session.unwrap_or_else(|| config.agent.session_id.clone());
    let memory = runtime::memory(&config).await?;

    let messages = memory.load(&session).await?;
    if messages.is_empty() {
        println!("  No messages in session '{session}'.");
        return Ok(());
    }

    println!("Session '{session}' ({} messages, {} backend)", messages.len(), memory.name());
    println!();
    for msg in &messages {
        let stamp = msg.timestamp.format("%Y-%m-%d %H:%M:%S");
        match msg.role {
            Role::Assistant if msg.has_tool_calls() => {
                for call in &msg.tool_calls {
                    println!("  [{stamp}] assistant > call {}({})", call.name, call.arguments);
                }
            }
            Role::Tool => {
                let id = msg.tool_call_id.as_deref().unwrap_or("?");
                println!("  [{stamp}] tool[{id}] > {}", msg.content);
            }
            role => println!("  [{stamp}] {role} > {}", msg.content),
        }
    }
    Ok(())
}
