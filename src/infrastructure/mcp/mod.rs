//! MCP server registry.

pub mod registry;

pub use registry::McpRegistry;
