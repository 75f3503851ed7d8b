//! `tether tools`: print the tool definitions the model is offered.

use crate::runtime::CliResult;

pub fn run() -> CliResult<()> {
    let registry = tether_tools::default_registry()?;
    let json = serde_json::to_string_pretty(&registry.definitions())?;
    println!("{json}");
    Ok(())
}
