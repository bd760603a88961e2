//! Where discovery results come from: a spawned server or fixed payloads.

use async_trait::async_trait;
use serde_json::{Value as JsonValue, json};

use super::discovery::{DiscoveryContext, initialize_snapshot, materialize_launch, run_live};
use super::dedup::distinct_argument_names;
use super::session::SessionLauncher;
use super::types::{DiscoveryResult, LaunchSpec, PromptInfo, ToolInfo};
use crate::error::{McpbError, Result};
use crate::manifest::{non_blank, strip_nulls};

pub const TOOL_OVERRIDE_VAR: &str = "MCPB_TOOL_DISCOVERY_JSON";
pub const PROMPT_OVERRIDE_VAR: &str = "MCPB_PROMPT_DISCOVERY_JSON";
pub const INITIALIZE_OVERRIDE_VAR: &str = "MCPB_INITIALIZE_DISCOVERY_JSON";
pub const TOOLS_LIST_OVERRIDE_VAR: &str = "MCPB_TOOLS_LIST_DISCOVERY_JSON";

#[async_trait]
pub trait DiscoverySource: Send + Sync {
    async fn discover(&self, ctx: &DiscoveryContext<'_>) -> Result<DiscoveryResult>;
}

/// Spawns the manifest's server and interrogates it.
#[derive(Debug, Clone)]
pub struct LiveSource<L> {
    launcher: L,
}

impl<L: SessionLauncher> LiveSource<L> {
    pub fn new(launcher: L) -> Self {
        Self { launcher }
    }
}

#[async_trait]
impl<L: SessionLauncher> DiscoverySource for LiveSource<L> {
    async fn discover(&self, ctx: &DiscoveryContext<'_>) -> Result<DiscoveryResult> {
        let spec = materialize_launch(ctx.base_dir, ctx.manifest, ctx.overrides)?;
        announce(ctx, &spec);
        Ok(run_live(&self.launcher, &spec, &ctx.log, ctx.timeouts).await)
    }
}

/// Payloads supplied up front; no process is spawned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FixedSource {
    result: DiscoveryResult,
}

impl FixedSource {
    pub fn new(result: DiscoveryResult) -> Self {
        Self { result }
    }

    /// Read the override variables once. `None` when none is usable.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let parse = |name: &str| -> Option<JsonValue> {
            let raw = lookup(name).filter(|v| !v.trim().is_empty())?;
            match serde_json::from_str(&raw) {
                Ok(v) => Some(v),
                Err(e) => {
                    tracing::warn!("ignoring {}: {}", name, e);
                    None
                }
            }
        };

        let tools = parse(TOOL_OVERRIDE_VAR).and_then(|v| parse_tools(&v));
        let prompts = parse(PROMPT_OVERRIDE_VAR).and_then(|v| parse_prompts(&v));
        let initialize = parse(INITIALIZE_OVERRIDE_VAR).filter(JsonValue::is_object);
        let tools_list = parse(TOOLS_LIST_OVERRIDE_VAR).and_then(|v| match v {
            JsonValue::Object(_) => Some(strip_nulls(v)),
            JsonValue::Array(_) => Some(json!({ "tools": strip_nulls(v) })),
            _ => None,
        });

        if tools.is_none() && prompts.is_none() && initialize.is_none() && tools_list.is_none() {
            return None;
        }

        let server_field = |key: &str| {
            initialize
                .as_ref()
                .and_then(|i| i.get("serverInfo"))
                .and_then(|s| s.get(key))
                .and_then(JsonValue::as_str)
                .and_then(|s| non_blank(Some(s)))
                .map(str::to_string)
        };
        let result = DiscoveryResult {
            reported_server_name: server_field("name"),
            reported_server_version: server_field("version"),
            tools: tools.unwrap_or_default(),
            prompts: prompts.unwrap_or_default(),
            initialize_response: initialize.as_ref().map(initialize_snapshot),
            tools_list_response: tools_list,
        };
        Some(Self { result })
    }
}

#[async_trait]
impl DiscoverySource for FixedSource {
    /// The launch line is still expanded and reported; nothing is spawned.
    async fn discover(&self, ctx: &DiscoveryContext<'_>) -> Result<DiscoveryResult> {
        match materialize_launch(ctx.base_dir, ctx.manifest, ctx.overrides) {
            Ok(spec) => announce(ctx, &spec),
            Err(McpbError::InvalidConfiguration(reason)) => {
                tracing::debug!("no launch command to report: {}", reason);
            }
            Err(e) => return Err(e),
        }
        Ok(self.result.clone())
    }
}

fn announce(ctx: &DiscoveryContext<'_>, spec: &LaunchSpec) {
    ctx.log.info(&format!(
        "Discovering tools & prompts using: {}",
        spec.display_command()
    ));
}

fn entry_name(entry: &JsonValue) -> Option<&str> {
    match entry {
        JsonValue::String(s) => non_blank(Some(s.as_str())),
        JsonValue::Object(_) => non_blank(entry.get("name").and_then(JsonValue::as_str)),
        _ => None,
    }
}

fn entry_str<'v>(entry: &'v JsonValue, key: &str) -> Option<&'v str> {
    non_blank(entry.get(key).and_then(JsonValue::as_str))
}

fn parse_tools(value: &JsonValue) -> Option<Vec<ToolInfo>> {
    let entries = value.as_array()?;
    Some(
        entries
            .iter()
            .filter_map(|e| Some(ToolInfo::new(entry_name(e)?, entry_str(e, "description"))))
            .collect(),
    )
}

fn parse_prompts(value: &JsonValue) -> Option<Vec<PromptInfo>> {
    let entries = value.as_array()?;
    Some(
        entries
            .iter()
            .filter_map(|e| {
                let name = entry_name(e)?;
                let arguments = distinct_argument_names(
                    e.get("arguments")
                        .and_then(JsonValue::as_array)
                        .into_iter()
                        .flatten()
                        .filter_map(JsonValue::as_str),
                );
                Some(PromptInfo {
                    name: name.to_string(),
                    description: entry_str(e, "description").map(str::to_string),
                    arguments: (!arguments.is_empty()).then_some(arguments),
                    text: e.get("text").and_then(JsonValue::as_str).map(str::to_string),
                })
            })
            .collect(),
    )
}
