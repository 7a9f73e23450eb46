//! CLI subcommands

pub mod index;
pub mod mcp;

pub use index::IndexArgs;
pub use mcp::McpArgs;
