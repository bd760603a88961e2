//! MCP capability discovery: session seam, stdio client, discovery sources,
//! and result normalization.

pub mod deadline;
pub mod dedup;
pub mod discovery;
pub mod session;
pub mod source;
pub mod stdio;
pub mod types;

pub use dedup::{dedup_prompts, dedup_tools};
pub use discovery::{DiscoveryContext, discover, discover_with, extract_prompt_text, materialize_launch};
pub use session::{McpSession, SessionLauncher};
pub use source::{DiscoverySource, FixedSource, LiveSource};
pub use stdio::StdioLauncher;
pub use types::*;
