//! The agent loop, the heart of Tether.
//!
//! The agent follows a **Think → Act → Observe** cycle:
//!
//! 1. **Prepare**: reload the session history, seed the instructions and fold
//!    retrieved knowledge into the user's input
//! 2. **Think**: send the history and tool definitions to the provider
//! 3. **Act**: if the reply carries tool calls, run each one in order
//! 4. **Observe**: append the tool results and loop back to step 2
//! 5. **Answer**: a reply without tool calls ends the run
//!
//! The loop ends at the first plain answer or after `max_steps` provider
//! calls. [`Agent::run_stream`] skips the tool loop and forwards one
//! provider stream as it arrives.

pub mod loop_runner;
mod streaming;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use loop_runner::{Agent, DEFAULT_MAX_STEPS, DEFAULT_RETRIEVAL_K};
pub use streaming::ChunkStream;
