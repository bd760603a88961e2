//! Capability discovery and manifest reconciliation for MCP bundles.

pub mod command;
pub mod config;
pub mod error;
pub mod expand;
pub mod logging;
pub mod manifest;
pub mod mcp;
pub mod reconcile;
pub mod user_config;

pub use error::{McpbError, Result};
