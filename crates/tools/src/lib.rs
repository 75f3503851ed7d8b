//! Built-in tool implementations for Tether.
//!
//! Every tool is declared with [`tether_core::tool_args!`] and registered
//! through [`tether_core::Tool::new`], so its schema is derived from the
//! argument record.

pub mod arithmetic;
pub mod clock;

use tether_core::Result;
use tether_core::tool::ToolRegistry;
use tracing::debug;

/// Create a registry with all built-in tools, in a fixed order.
pub fn default_registry() -> Result<ToolRegistry> {
    let registry = ToolRegistry::from_tools([
        arithmetic::add()?,
        arithmetic::subtract()?,
        arithmetic::multiply()?,
        arithmetic::divide()?,
        clock::current_time()?,
    ])?;
    debug!(tools = ?registry.names(), "Built-in tools registered");
    Ok(registry)
}
