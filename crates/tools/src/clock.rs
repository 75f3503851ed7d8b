//! Current time tool.

use chrono::Utc;
use tether_core::Result;
use tether_core::tool::Tool;
use tether_core::tool_args;

tool_args! {
    pub struct NoArgs {}
}

/// `current_time`: the current UTC time as RFC 3339.
pub fn current_time() -> Result<Tool> {
    Tool::new(
        "current_time",
        "Get the current date and time in UTC (RFC 3339).",
        |_: NoArgs| -> std::result::Result<String, String> { Ok(Utc::now().to_rfc3339()) },
    )
}
