//! `tether ingest`: embed text files into the knowledge base.

use std::path::PathBuf;

use tether_core::knowledge::Document;
use tracing::info;

use crate::runtime::{self, CliResult};

pub async fn run(files: Vec<PathBuf>) -> CliResult<()> {
    let config = runtime::load_config()?;
    let knowledge = runtime::knowledge(&config).await?;

    let mut documents = Vec::with_capacity(files.len());
    for path in &files {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
        if content.trim().is_empty() {
            println!("  Skipping empty file: {}", path.display());
            continue;
        }
        let source = path.display().to_string();
        documents.push(Document::new(&source, content).with_metadata("source", source.clone()));
    }

    let count = documents.len();
    knowledge.ingest(documents).await?;
    info!(count, backend = %config.knowledge.backend, "Ingested documents");

    println!("  Ingested {count} document(s) into the {} store.", config.knowledge.backend);
    if !config.knowledge.enabled {
        println!("  Note: set knowledge.enabled = true in config.toml to use them in chat.");
    }
    Ok(())
}
