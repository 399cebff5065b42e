//! MCP server exposing Xen Orchestra VM and backup management as tools.

pub mod cli;
pub mod error;
pub mod logging;
pub mod mcp;
pub mod settings;
pub mod xo;
