//! Reconciliation of discovered capabilities against the manifest.

pub mod apply;
pub mod compare;

pub use apply::{Mode, Reconciled, apply_update, merge_prompts, mismatch_summary, reconcile, verify_convergence};
pub use compare::{Comparison, ComparisonResult, compare, prompt_text_warnings};
