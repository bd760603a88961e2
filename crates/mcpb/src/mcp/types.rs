//! Shared types for a discovery run.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value as JsonValue;

pub use crate::manifest::{PromptInfo, ToolInfo};

/// Ground truth learned from one server interrogation. Immutable once returned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscoveryResult {
    pub tools: Vec<ToolInfo>,
    pub prompts: Vec<PromptInfo>,
    /// Null-filtered `initialize` snapshot for the static-response cache.
    pub initialize_response: Option<JsonValue>,
    /// Null-filtered `tools/list` snapshot (`{"tools": [...]}`).
    pub tools_list_response: Option<JsonValue>,
    pub reported_server_name: Option<String>,
    pub reported_server_version: Option<String>,
}

/// Fully materialized launch command for the bundled server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub command: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub working_dir: PathBuf,
}

impl LaunchSpec {
    pub fn display_command(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.command.as_str());
        parts.extend(self.args.iter().map(String::as_str));
        parts.join(" ")
    }
}

pub type LogSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Separate, optional informational and warning channels.
#[derive(Clone, Default)]
pub struct DiscoveryLog {
    info: Option<LogSink>,
    warning: Option<LogSink>,
}

impl DiscoveryLog {
    pub fn new(info: Option<LogSink>, warning: Option<LogSink>) -> Self {
        Self { info, warning }
    }

    pub fn info(&self, message: &str) {
        tracing::debug!(target: "mcpb::discovery", "{}", message);
        if let Some(sink) = &self.info {
            sink(message);
        }
    }

    pub fn warn(&self, message: &str) {
        tracing::debug!(target: "mcpb::discovery", "warning: {}", message);
        if let Some(sink) = &self.warning {
            sink(message);
        }
    }
}

impl fmt::Debug for DiscoveryLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscoveryLog")
            .field("info", &self.info.is_some())
            .field("warning", &self.warning.is_some())
            .finish()
    }
}
