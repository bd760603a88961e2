//! The seam between the discovery state machine and a live MCP connection.
//!
//! Payloads cross this boundary as raw JSON so they can be snapshotted
//! verbatim for the static-response cache.

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use super::types::{DiscoveryLog, LaunchSpec};
use crate::error::Result;

#[async_trait]
pub trait McpSession: Send + Sync {
    /// Run the initialize handshake and return the server's initialize result.
    async fn initialize(&self) -> Result<JsonValue>;

    async fn ping(&self) -> Result<()>;

    /// One `tools/list` page.
    async fn list_tools(&self, cursor: Option<String>) -> Result<JsonValue>;

    /// One `prompts/list` page.
    async fn list_prompts(&self, cursor: Option<String>) -> Result<JsonValue>;

    async fn get_prompt(&self, name: &str) -> Result<JsonValue>;

    /// Terminate the server and release its pipes. Must be safe to call after
    /// any failure.
    async fn close(&self);
}

/// Creates sessions for a materialized launch command.
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    async fn launch(&self, spec: &LaunchSpec, log: &DiscoveryLog) -> Result<Box<dyn McpSession>>;
}
