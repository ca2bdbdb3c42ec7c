//! Tool-embedded guards.
//!
//! This module provides:
//! - Tool definitions and input/output types
//! - The `ToolBody` trait implemented by tool authors
//! - `GuardedTool`, which validates a tool's payload and reasks from inside the tool

mod definitions;
mod guarded;

pub use definitions::{ToolDefinition, ToolInput, ToolOutput};
pub use guarded::{GuardedTool, ToolBody};
