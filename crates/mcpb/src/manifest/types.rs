//! Typed view of `manifest.json`.
//!
//! Only the fields the engine reads or rewrites are typed; everything else is
//! captured in flattened `extra` maps so a rewrite never drops content.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_version: Option<String>,
    /// Deprecated predecessor of `manifest_version`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dxt_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icons: Option<Vec<ManifestIcon>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshots: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub localization: Option<Localization>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolInfo>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompts: Option<Vec<PromptInfo>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_config: Option<BTreeMap<String, UserConfigOption>>,
    /// Per-vendor metadata bag (`_meta`), holding cached static responses.
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<JsonMap<String, JsonValue>>,
    #[serde(flatten)]
    pub extra: JsonMap<String, JsonValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub server_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_point: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcp_config: Option<McpConfig>,
    #[serde(flatten)]
    pub extra: JsonMap<String, JsonValue>,
}

/// Launch templates for the bundled server (`server.mcp_config`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct McpConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<BTreeMap<String, String>>,
    #[serde(flatten)]
    pub extra: JsonMap<String, JsonValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserConfigOption {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multiple: Option<bool>,
    #[serde(flatten)]
    pub extra: JsonMap<String, JsonValue>,
}

impl UserConfigOption {
    pub fn is_required(&self) -> bool {
        self.required.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestIcon {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(flatten)]
    pub extra: JsonMap<String, JsonValue>,
}

/// Where translated resources live; `${locale}` in `resources` names the locale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Localization {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_locale: Option<String>,
    #[serde(flatten)]
    pub extra: JsonMap<String, JsonValue>,
}

impl Localization {
    pub const DEFAULT_RESOURCES: &'static str = "mcpb-resources/${locale}.json";
    pub const DEFAULT_LOCALE: &'static str = "en-US";

    /// Resource path for the default locale.
    pub fn default_locale_resources(&self) -> String {
        let pattern = non_blank(self.resources.as_deref()).unwrap_or(Self::DEFAULT_RESOURCES);
        let locale = non_blank(self.default_locale.as_deref()).unwrap_or(Self::DEFAULT_LOCALE);
        LOCALE_TOKEN.replace_all(pattern, regex::NoExpand(locale)).into_owned()
    }
}

static LOCALE_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\$\{locale\}").expect("locale pattern is valid"));

/// A tool entry; `name` is the identity key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ToolInfo {
    pub fn new(name: impl Into<String>, description: Option<&str>) -> Self {
        Self {
            name: name.into(),
            description: non_blank(description).map(str::to_string),
        }
    }
}

/// A prompt entry with its argument names and cached text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Manifest {
    /// Parse manifest JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Pretty JSON with a trailing newline, the on-disk format.
    pub fn to_json_pretty(&self) -> Result<String> {
        let mut s = serde_json::to_string_pretty(self)?;
        s.push('\n');
        Ok(s)
    }

    pub fn mcp_config(&self) -> Option<&McpConfig> {
        self.server.as_ref().and_then(|s| s.mcp_config.as_ref())
    }

    pub fn user_config_option(&self, key: &str) -> Option<&UserConfigOption> {
        self.user_config.as_ref().and_then(|m| m.get(key))
    }

    pub fn tools_or_empty(&self) -> &[ToolInfo] {
        self.tools.as_deref().unwrap_or(&[])
    }

    pub fn prompts_or_empty(&self) -> &[PromptInfo] {
        self.prompts.as_deref().unwrap_or(&[])
    }
}

/// `None` for absent, empty, or whitespace-only strings.
pub fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.trim().is_empty())
}
