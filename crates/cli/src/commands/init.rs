//! `tether init`: first-time setup.

use tether_config::AppConfig;

use crate::runtime::CliResult;

pub async fn run(force: bool) -> CliResult<()> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("Tether: first-time setup");
    println!("========================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("  Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    if config_path.exists() && !force {
        println!("\n  Config already exists at: {}", config_path.display());
        println!("  Edit it manually or re-run with --force.\n");
        return Ok(());
    }

    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("  Wrote config.toml at: {}", config_path.display());
    println!("\n  Next steps:");
    println!("    1. Set TETHER_API_KEY (or api_key in config.toml)");
    println!("    2. Run: tether chat -m \"What is 2+2?\"");
    println!();
    Ok(())
}
