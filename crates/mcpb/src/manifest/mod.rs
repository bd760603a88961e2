//! Bundle manifest model, cached static responses, and validation.

pub mod files;
pub mod meta;
pub mod schema;
pub mod types;

pub use files::missing_referenced_files;
pub use meta::strip_nulls;
pub use schema::{ManifestSchema, Severity, StructuralValidator, ValidationIssue};
pub use types::*;
