//! Manifest schema validation.
//!
//! The engine consumes validation as a black box through [`ManifestSchema`];
//! [`StructuralValidator`] is the built-in implementation covering the
//! structural rules of manifest versions 0.1 through 0.3.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::user_config::referenced_user_config_keys;

pub const SUPPORTED_MANIFEST_VERSIONS: &[&str] = &["0.1", "0.2", "0.3"];
const SERVER_TYPES: &[&str] = &["node", "python", "binary", "uv"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
    pub severity: Severity,
}

impl ValidationIssue {
    pub fn error(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            severity: Severity::Error,
        }
    }

    pub fn warning(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            severity: Severity::Warning,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// Schema validation collaborator.
pub trait ManifestSchema {
    fn validate(&self, manifest: &JsonValue) -> Vec<ValidationIssue>;

    /// Parse then validate; unparsable JSON is a single root-level error.
    fn validate_json(&self, json: &str) -> Vec<ValidationIssue> {
        match serde_json::from_str::<JsonValue>(json) {
            Ok(v) => self.validate(&v),
            Err(e) => vec![ValidationIssue::error("", format!("Invalid JSON: {}", e))],
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralValidator;

impl ManifestSchema for StructuralValidator {
    fn validate(&self, manifest: &JsonValue) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        let Some(root) = manifest.as_object() else {
            issues.push(ValidationIssue::error("", "Manifest must be a JSON object"));
            return issues;
        };

        match (str_at(manifest, "manifest_version"), str_at(manifest, "dxt_version")) {
            (Some(v), _) => check_version(&mut issues, "manifest_version", v),
            (None, Some(v)) => {
                issues.push(ValidationIssue::warning(
                    "dxt_version",
                    "dxt_version is deprecated; use manifest_version instead",
                ));
                check_version(&mut issues, "dxt_version", v);
            }
            (None, None) => issues.push(ValidationIssue::error(
                "manifest_version",
                "manifest_version is required",
            )),
        }

        for field in ["name", "version", "description"] {
            if str_at(manifest, field).is_none() {
                issues.push(ValidationIssue::error(field, format!("{} is required", field)));
            }
        }
        if manifest
            .get("author")
            .and_then(|a| str_at(a, "name"))
            .is_none()
        {
            issues.push(ValidationIssue::error("author.name", "author.name is required"));
        }

        check_server(&mut issues, root.get("server"));
        check_named_list(&mut issues, manifest, "tools");
        check_named_list(&mut issues, manifest, "prompts");
        check_prompt_text(&mut issues, manifest);
        check_user_config_refs(&mut issues, manifest);
        issues
    }
}

fn str_at<'a>(v: &'a JsonValue, key: &str) -> Option<&'a str> {
    v.get(key)
        .and_then(JsonValue::as_str)
        .filter(|s| !s.trim().is_empty())
}

fn check_version(issues: &mut Vec<ValidationIssue>, path: &str, version: &str) {
    if !SUPPORTED_MANIFEST_VERSIONS.contains(&version) {
        issues.push(ValidationIssue::error(
            path,
            format!(
                "Unsupported manifest version '{}' (supported: {})",
                version,
                SUPPORTED_MANIFEST_VERSIONS.join(", ")
            ),
        ));
    }
}

fn check_server(issues: &mut Vec<ValidationIssue>, server: Option<&JsonValue>) {
    let Some(server) = server.filter(|s| s.is_object()) else {
        issues.push(ValidationIssue::error("server", "server is required"));
        return;
    };
    match str_at(server, "type") {
        Some(t) if SERVER_TYPES.contains(&t) => {}
        Some(t) => issues.push(ValidationIssue::error(
            "server.type",
            format!(
                "Unknown server type '{}' (expected one of: {})",
                t,
                SERVER_TYPES.join(", ")
            ),
        )),
        None => issues.push(ValidationIssue::error("server.type", "server.type is required")),
    }
    if str_at(server, "entry_point").is_none() {
        issues.push(ValidationIssue::error(
            "server.entry_point",
            "server.entry_point is required",
        ));
    }
    match server.get("mcp_config") {
        Some(cfg) if cfg.is_object() => {
            if str_at(cfg, "command").is_none() {
                issues.push(ValidationIssue::error(
                    "server.mcp_config.command",
                    "server.mcp_config.command is required",
                ));
            }
            if let Some(args) = cfg.get("args")
                && !args
                    .as_array()
                    .is_some_and(|a| a.iter().all(JsonValue::is_string))
            {
                issues.push(ValidationIssue::error(
                    "server.mcp_config.args",
                    "args must be an array of strings",
                ));
            }
            if let Some(env) = cfg.get("env") {
                match env.as_object() {
                    Some(vars) => {
                        for (key, value) in vars {
                            if !value.is_string() {
                                issues.push(ValidationIssue::error(
                                    format!("server.mcp_config.env.{}", key),
                                    "env values must be strings",
                                ));
                            }
                        }
                    }
                    None => issues.push(ValidationIssue::error(
                        "server.mcp_config.env",
                        "env must be an object of strings",
                    )),
                }
            }
        }
        _ => issues.push(ValidationIssue::error(
            "server.mcp_config",
            "server.mcp_config is required",
        )),
    }
}

fn check_named_list(issues: &mut Vec<ValidationIssue>, manifest: &JsonValue, key: &str) {
    let Some(value) = manifest.get(key) else {
        return;
    };
    let Some(items) = value.as_array() else {
        issues.push(ValidationIssue::error(key, format!("{} must be an array", key)));
        return;
    };
    for (i, item) in items.iter().enumerate() {
        if str_at(item, "name").is_none() {
            issues.push(ValidationIssue::error(
                format!("{}[{}].name", key, i),
                "name is required",
            ));
        }
    }
}

fn check_prompt_text(issues: &mut Vec<ValidationIssue>, manifest: &JsonValue) {
    let Some(prompts) = manifest.get("prompts").and_then(JsonValue::as_array) else {
        return;
    };
    for (i, prompt) in prompts.iter().enumerate() {
        if str_at(prompt, "text").is_none() {
            issues.push(ValidationIssue::warning(
                format!("prompts[{}].text", i),
                "prompt text is empty; clients will not be able to preview it",
            ));
        }
    }
}

fn check_user_config_refs(issues: &mut Vec<ValidationIssue>, manifest: &JsonValue) {
    let Some(cfg) = manifest.pointer("/server/mcp_config") else {
        return;
    };
    let mut templates: Vec<&str> = Vec::new();
    if let Some(cmd) = cfg.get("command").and_then(JsonValue::as_str) {
        templates.push(cmd);
    }
    if let Some(args) = cfg.get("args").and_then(JsonValue::as_array) {
        templates.extend(args.iter().filter_map(JsonValue::as_str));
    }
    if let Some(env) = cfg.get("env").and_then(JsonValue::as_object) {
        templates.extend(env.values().filter_map(JsonValue::as_str));
    }
    let declared: BTreeSet<&str> = manifest
        .get("user_config")
        .and_then(JsonValue::as_object)
        .map(|m| m.keys().map(String::as_str).collect())
        .unwrap_or_default();
    for key in referenced_user_config_keys(templates) {
        if !declared.contains(key.as_str()) {
            issues.push(ValidationIssue::error(
                "server.mcp_config",
                format!(
                    "References ${{user_config.{}}} but user_config.{} is not declared",
                    key, key
                ),
            ));
        }
    }
}
