//! Name-keyed deduplication of discovered tools and prompts.
//!
//! Groups by exact name, merges metadata within a group, drops blank names,
//! and sorts by name so comparisons are deterministic.

use std::collections::BTreeMap;

use super::types::{PromptInfo, ToolInfo};
use crate::manifest::non_blank;

pub fn dedup_tools(tools: impl IntoIterator<Item = ToolInfo>) -> Vec<ToolInfo> {
    group_by_name(tools, |t| &t.name)
        .into_values()
        .map(|group| {
            let description = group
                .iter()
                .find_map(|t| non_blank(t.description.as_deref()))
                .map(str::to_string);
            ToolInfo {
                name: group[0].name.clone(),
                description,
            }
        })
        .collect()
}

pub fn dedup_prompts(prompts: impl IntoIterator<Item = PromptInfo>) -> Vec<PromptInfo> {
    group_by_name(prompts, |p| &p.name)
        .into_values()
        .map(|group| {
            let description = group
                .iter()
                .find_map(|p| non_blank(p.description.as_deref()))
                .map(str::to_string);
            let arguments = group
                .iter()
                .filter_map(|p| p.arguments.as_ref())
                .find(|args| !args.is_empty())
                .cloned();
            let text = group
                .iter()
                .find_map(|p| non_blank(p.text.as_deref()))
                .map(str::to_string);
            PromptInfo {
                name: group[0].name.clone(),
                description,
                arguments,
                text,
            }
        })
        .collect()
}

/// Ordered argument names: blanks dropped, first occurrence kept.
pub fn distinct_argument_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for name in names {
        if !name.trim().is_empty() && !out.iter().any(|n| n == name) {
            out.push(name.to_string());
        }
    }
    out
}

// BTreeMap on String keys gives the ordinal sort.
fn group_by_name<T>(items: impl IntoIterator<Item = T>, name: impl Fn(&T) -> &String) -> BTreeMap<String, Vec<T>> {
    let mut groups: BTreeMap<String, Vec<T>> = BTreeMap::new();
    for item in items {
        if name(&item).trim().is_empty() {
            continue;
        }
        let key = name(&item).clone();
        groups.entry(key).or_default().push(item);
    }
    groups
}
