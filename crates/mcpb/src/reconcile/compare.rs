//! Diff a manifest against a discovery result.

use std::collections::BTreeMap;

use crate::manifest::meta::{INITIALIZE_KEY, TOOLS_LIST_KEY};
use crate::manifest::{Manifest, non_blank};
use crate::mcp::{DiscoveryResult, PromptInfo, ToolInfo};

/// Differences found for one capability class (or the static-response cache).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComparisonResult {
    pub names_differ: bool,
    pub metadata_differ: bool,
    pub summary_terms: Vec<String>,
    pub messages: Vec<String>,
}

impl ComparisonResult {
    pub fn has_differences(&self) -> bool {
        self.names_differ || self.metadata_differ
    }
}

/// Full comparison of a manifest against one discovery run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Comparison {
    pub tools: ComparisonResult,
    pub prompts: ComparisonResult,
    pub static_responses: ComparisonResult,
    /// Message when the server-reported name differs from `name`.
    pub server_name_mismatch: Option<String>,
    /// Message when the server-reported version differs from `version`.
    pub server_version_mismatch: Option<String>,
}

impl Comparison {
    pub fn has_differences(&self) -> bool {
        self.tools.has_differences()
            || self.prompts.has_differences()
            || self.static_responses.has_differences()
            || self.server_name_mismatch.is_some()
            || self.server_version_mismatch.is_some()
    }

    pub fn summary_terms(&self) -> Vec<String> {
        let mut terms: Vec<String> = [&self.tools, &self.prompts, &self.static_responses]
            .into_iter()
            .flat_map(|c| c.summary_terms.iter().cloned())
            .collect();
        if self.server_name_mismatch.is_some() {
            terms.push("server name".to_string());
        }
        if self.server_version_mismatch.is_some() {
            terms.push("server version".to_string());
        }
        terms
    }

    pub fn messages(&self) -> Vec<String> {
        [&self.tools, &self.prompts, &self.static_responses]
            .into_iter()
            .flat_map(|c| c.messages.iter().cloned())
            .chain(self.server_name_mismatch.clone())
            .chain(self.server_version_mismatch.clone())
            .collect()
    }
}

pub fn compare(manifest: &Manifest, discovery: &DiscoveryResult) -> Comparison {
    Comparison {
        tools: compare_tools(manifest.tools_or_empty(), &discovery.tools),
        prompts: compare_prompts(manifest.prompts_or_empty(), &discovery.prompts),
        static_responses: compare_static_responses(manifest, discovery),
        server_name_mismatch: field_mismatch(
            "Server name",
            manifest.name.as_deref(),
            discovery.reported_server_name.as_deref(),
        ),
        server_version_mismatch: field_mismatch(
            "Server version",
            manifest.version.as_deref(),
            discovery.reported_server_version.as_deref(),
        ),
    }
}

pub fn compare_tools(manifest: &[ToolInfo], discovered: &[ToolInfo]) -> ComparisonResult {
    let mut result = ComparisonResult::default();
    let declared = sorted_names(manifest.iter().map(|t| t.name.as_str()));
    let found = sorted_names(discovered.iter().map(|t| t.name.as_str()));
    if declared != found {
        result.names_differ = true;
        result.summary_terms.push("tool names".to_string());
        result.messages.push(names_message("Tool", &declared, &found));
    }

    let by_name: BTreeMap<&str, &ToolInfo> = manifest.iter().map(|t| (t.name.as_str(), t)).collect();
    for tool in discovered {
        let Some(existing) = by_name.get(tool.name.as_str()) else {
            continue;
        };
        let (declared, found) = (
            non_blank(existing.description.as_deref()),
            non_blank(tool.description.as_deref()),
        );
        if declared != found {
            result.metadata_differ = true;
            result.messages.push(format!(
                "Tool '{}' description differs (manifest: {}, discovered: {}).",
                tool.name,
                format_value(declared),
                format_value(found)
            ));
        }
    }
    if result.metadata_differ {
        result.summary_terms.push("tool metadata".to_string());
    }
    result
}

pub fn compare_prompts(manifest: &[PromptInfo], discovered: &[PromptInfo]) -> ComparisonResult {
    let mut result = ComparisonResult::default();
    let declared = sorted_names(manifest.iter().map(|p| p.name.as_str()));
    let found = sorted_names(discovered.iter().map(|p| p.name.as_str()));
    if declared != found {
        result.names_differ = true;
        result.summary_terms.push("prompt names".to_string());
        result.messages.push(names_message("Prompt", &declared, &found));
    }

    let by_name: BTreeMap<&str, &PromptInfo> =
        manifest.iter().map(|p| (p.name.as_str(), p)).collect();
    for prompt in discovered {
        let Some(existing) = by_name.get(prompt.name.as_str()) else {
            continue;
        };
        let mut differs = Vec::new();

        let (declared, found) = (
            non_blank(existing.description.as_deref()),
            non_blank(prompt.description.as_deref()),
        );
        if declared != found {
            differs.push(format!(
                "Prompt '{}' description differs (manifest: {}, discovered: {}).",
                prompt.name,
                format_value(declared),
                format_value(found)
            ));
        }

        let (declared_args, found_args) = (
            normalized_arguments(existing.arguments.as_deref()),
            normalized_arguments(prompt.arguments.as_deref()),
        );
        if declared_args != found_args {
            differs.push(format!(
                "Prompt '{}' arguments differ (manifest: [{}], discovered: [{}]).",
                prompt.name,
                declared_args.join(", "),
                found_args.join(", ")
            ));
        }

        if non_blank(existing.text.as_deref()).is_none() && non_blank(prompt.text.as_deref()).is_some()
        {
            differs.push(format!(
                "Prompt '{}' text differs (manifest length {}, discovered length {}).",
                prompt.name,
                text_len(existing),
                text_len(prompt)
            ));
        }

        if !differs.is_empty() {
            result.metadata_differ = true;
            result.messages.extend(differs);
        }
    }
    if result.metadata_differ {
        result.summary_terms.push("prompt metadata".to_string());
    }
    result
}

/// Cached payloads differ when absent or not JSON-equal to the discovered ones.
pub fn compare_static_responses(manifest: &Manifest, discovery: &DiscoveryResult) -> ComparisonResult {
    let mut result = ComparisonResult::default();
    let payloads = [
        (INITIALIZE_KEY, discovery.initialize_response.as_ref()),
        (TOOLS_LIST_KEY, discovery.tools_list_response.as_ref()),
    ];
    for (key, discovered) in payloads {
        let Some(discovered) = discovered else {
            continue;
        };
        match manifest.static_response(key) {
            None => result.messages.push(format!(
                "Static response '{}' is missing from manifest _meta.",
                key
            )),
            Some(cached) if cached != discovered => result.messages.push(format!(
                "Static response '{}' differs from discovered payload.",
                key
            )),
            Some(_) => continue,
        }
        result.metadata_differ = true;
    }
    if result.metadata_differ {
        result.summary_terms.push("static responses".to_string());
    }
    result
}

/// Warnings for discovered prompts that returned no text.
pub fn prompt_text_warnings(manifest: &Manifest, discovered: &[PromptInfo]) -> Vec<String> {
    let by_name: BTreeMap<&str, &PromptInfo> = manifest
        .prompts_or_empty()
        .iter()
        .map(|p| (p.name.as_str(), p))
        .collect();
    discovered
        .iter()
        .filter(|p| non_blank(p.text.as_deref()).is_none())
        .map(|p| {
            let keeps = by_name
                .get(p.name.as_str())
                .is_some_and(|e| non_blank(e.text.as_deref()).is_some());
            if keeps {
                format!(
                    "Prompt '{}' did not return text during discovery; keeping manifest text.",
                    p.name
                )
            } else {
                format!(
                    "Prompt '{}' did not return text during discovery; consider adding text to manifest manually.",
                    p.name
                )
            }
        })
        .collect()
}

fn field_mismatch(label: &str, declared: Option<&str>, reported: Option<&str>) -> Option<String> {
    let reported = non_blank(reported)?;
    let declared = non_blank(declared);
    (declared != Some(reported)).then(|| {
        format!(
            "{} differs (manifest: {}, discovered: {}).",
            label,
            format_value(declared),
            reported
        )
    })
}

fn sorted_names<'a>(names: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut names: Vec<&str> = names.filter(|n| !n.trim().is_empty()).collect();
    names.sort_unstable();
    names
}

fn names_message(class: &str, declared: &[&str], found: &[&str]) -> String {
    let missing: Vec<&str> = found.iter().filter(|n| !declared.contains(n)).copied().collect();
    let extra: Vec<&str> = declared.iter().filter(|n| !found.contains(n)).copied().collect();
    let mut msg = format!(
        "{} names differ (manifest: [{}], discovered: [{}]).",
        class,
        declared.join(", "),
        found.join(", ")
    );
    if !missing.is_empty() {
        msg.push_str(&format!(" Not in manifest: {}.", missing.join(", ")));
    }
    if !extra.is_empty() {
        msg.push_str(&format!(" Not reported by server: {}.", extra.join(", ")));
    }
    msg
}

fn normalized_arguments(args: Option<&[String]>) -> Vec<&str> {
    args.unwrap_or_default()
        .iter()
        .map(String::as_str)
        .filter(|a| !a.trim().is_empty())
        .collect()
}

fn format_value(value: Option<&str>) -> &str {
    value.unwrap_or("(none)")
}

fn text_len(prompt: &PromptInfo) -> usize {
    prompt.text.as_deref().map_or(0, |t| t.chars().count())
}
