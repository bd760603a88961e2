//! Error taxonomy for discovery and reconciliation.
//!
//! Pre-spawn guard failures and final reconciliation outcomes propagate as
//! command-level errors. Launch, protocol, and timeout failures are produced
//! inside the discovery client and downgraded to warnings at its boundary.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::manifest::ValidationIssue;

pub type Result<T> = std::result::Result<T, McpbError>;

#[derive(Debug, Error)]
pub enum McpbError {
    /// Required `user_config` values referenced by the launch command are missing.
    #[error("{}", format_missing_user_config(.keys))]
    UserConfigRequired { keys: Vec<String> },

    /// The manifest cannot describe a launchable server.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("failed to launch MCP server: {0}")]
    ProcessLaunch(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("{operation} timed out after {}ms", .after.as_millis())]
    Timeout { operation: String, after: Duration },

    /// Discovered capabilities differ from the manifest (report/discover mode).
    #[error("{summary}")]
    ReconciliationMismatch {
        messages: Vec<String>,
        summary: String,
    },

    /// The rewritten manifest still differs after an update.
    #[error("manifest did not converge after update: {}", .messages.join("; "))]
    ConvergenceFailure { messages: Vec<String> },

    #[error("manifest validation failed with {} issue(s)", .issues.len())]
    SchemaInvalid { issues: Vec<ValidationIssue> },

    #[error("File not found: {}", .0.display())]
    ManifestNotFound(PathBuf),

    /// Files referenced by the manifest are absent from the bundle directory.
    #[error("{}", .messages.join("\n"))]
    MissingFiles { messages: Vec<String> },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn format_missing_user_config(keys: &[String]) -> String {
    let mut out = format!(
        "Missing required user_config value(s): {}.",
        keys.join(", ")
    );
    for key in keys {
        out.push_str(&format!(
            "\n  Provide a value with --user_config {}=<value>",
            key
        ));
    }
    out
}
