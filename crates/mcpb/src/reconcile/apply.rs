//! Mode semantics: report and discover fail on differences, update rewrites
//! the manifest in memory and is then verified for convergence.

use std::collections::BTreeMap;

use super::compare::{Comparison, compare};
use crate::error::{McpbError, Result};
use crate::manifest::{Manifest, ManifestSchema, PromptInfo, non_blank};
use crate::mcp::DiscoveryResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Differences are fatal.
    Report,
    /// Verification probe; same detection as report, never mutates.
    Discover,
    /// Differences are corrected in memory.
    Update,
}

/// What reconciliation did to the in-memory manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub comparison: Comparison,
    /// True when the manifest was rewritten and should be persisted.
    pub changed: bool,
}

/// Compare and act according to `mode`.
pub fn reconcile(mode: Mode, manifest: &mut Manifest, discovery: &DiscoveryResult) -> Result<Reconciled> {
    let comparison = compare(manifest, discovery);
    if !comparison.has_differences() {
        return Ok(Reconciled {
            comparison,
            changed: false,
        });
    }
    match mode {
        Mode::Report | Mode::Discover => Err(McpbError::ReconciliationMismatch {
            messages: comparison.messages(),
            summary: mismatch_summary(mode, &comparison),
        }),
        Mode::Update => {
            let changed = apply_update(manifest, discovery, &comparison);
            Ok(Reconciled { comparison, changed })
        }
    }
}

/// One line naming every differing category.
pub fn mismatch_summary(mode: Mode, comparison: &Comparison) -> String {
    let terms = comparison.summary_terms().join(", ");
    match mode {
        Mode::Discover => format!("Discovered capabilities differ from manifest: {}.", terms),
        Mode::Report | Mode::Update => format!(
            "Manifest does not match the server ({}). Run with --update to rewrite manifest.json.",
            terms
        ),
    }
}

/// Overwrite every differing category with discovered values.
pub fn apply_update(manifest: &mut Manifest, discovery: &DiscoveryResult, comparison: &Comparison) -> bool {
    let mut changed = false;

    if comparison.tools.has_differences() {
        manifest.tools = Some(discovery.tools.clone());
        changed = true;
    }
    if comparison.prompts.has_differences() {
        manifest.prompts = Some(merge_prompts(manifest.prompts_or_empty(), &discovery.prompts));
        changed = true;
    }
    if comparison.static_responses.has_differences() {
        changed |= manifest.apply_static_responses(
            discovery.initialize_response.as_ref(),
            discovery.tools_list_response.as_ref(),
        );
    }
    if comparison.server_name_mismatch.is_some() {
        manifest.name = discovery.reported_server_name.clone();
        changed = true;
    }
    if comparison.server_version_mismatch.is_some() {
        manifest.version = discovery.reported_server_version.clone();
        changed = true;
    }
    if changed {
        tracing::info!(terms = ?comparison.summary_terms(), "manifest updated from discovery");
    }
    changed
}

/// Discovered prompts; hand-written manifest text wins over discovered text.
pub fn merge_prompts(existing: &[PromptInfo], discovered: &[PromptInfo]) -> Vec<PromptInfo> {
    let by_name: BTreeMap<&str, &PromptInfo> =
        existing.iter().map(|p| (p.name.as_str(), p)).collect();
    discovered
        .iter()
        .map(|p| {
            let text = by_name
                .get(p.name.as_str())
                .and_then(|e| non_blank(e.text.as_deref()))
                .or_else(|| non_blank(p.text.as_deref()))
                .map(str::to_string);
            PromptInfo {
                name: p.name.clone(),
                description: non_blank(p.description.as_deref()).map(str::to_string),
                arguments: p.arguments.clone().filter(|a| !a.is_empty()),
                text,
            }
        })
        .collect()
}

/// Re-validate and re-compare a rewritten manifest against the same discovery.
pub fn verify_convergence(
    manifest: &Manifest,
    discovery: &DiscoveryResult,
    schema: &dyn ManifestSchema,
) -> Result<()> {
    let mut messages: Vec<String> = schema
        .validate(&serde_json::to_value(manifest)?)
        .into_iter()
        .filter(|i| i.is_error())
        .map(|i| i.to_string())
        .collect();

    let comparison = compare(manifest, discovery);
    if comparison.tools.has_differences() {
        messages.extend(comparison.tools.messages.iter().cloned());
    }
    if comparison.prompts.has_differences() {
        messages.extend(comparison.prompts.messages.iter().cloned());
    }
    messages.extend(comparison.server_version_mismatch.iter().cloned());

    if messages.is_empty() {
        Ok(())
    } else {
        Err(McpbError::ConvergenceFailure { messages })
    }
}
