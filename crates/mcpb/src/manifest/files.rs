//! Existence checks for files the manifest points at.

use std::path::{Path, PathBuf};

use super::Manifest;
use crate::expand::{expand, normalize_path_for_platform};
use crate::user_config::UserConfigOverrides;

/// Returns one message per missing file, relative to `base_dir`.
pub fn missing_referenced_files(manifest: &Manifest, base_dir: &Path) -> Vec<String> {
    let mut errors = Vec::new();
    let Some(server) = manifest.server.as_ref() else {
        errors.push("Manifest server configuration missing".to_string());
        return errors;
    };

    let mut check = |rel: Option<&str>, category: &str| {
        let Some(rel) = rel.filter(|r| !r.trim().is_empty()) else {
            return;
        };
        if !resolve(base_dir, rel).exists() {
            errors.push(format!("Missing {} file: {}", category, rel));
        }
    };

    check(manifest.icon.as_deref(), "icon");
    check(server.entry_point.as_deref(), "entry_point");
    for shot in manifest.screenshots.iter().flatten() {
        check(Some(shot.as_str()), "screenshot");
    }
    for (i, icon) in manifest.icons.iter().flatten().enumerate() {
        check(icon.src.as_deref(), &format!("icons[{}]", i));
    }
    if let Some(localization) = manifest.localization.as_ref() {
        let resources = localization.default_locale_resources();
        if !resolve(base_dir, &resources).exists() {
            errors.push(format!(
                "Missing localization resources for default locale: {}",
                resources
            ));
        }
    }

    if let Some(command) = manifest
        .mcp_config()
        .and_then(|c| c.command.as_deref())
        .filter(|c| is_path_like(c))
    {
        let base = base_dir.to_string_lossy();
        let expanded = expand(command, &base, &UserConfigOverrides::default());
        let normalized = PathBuf::from(normalize_path_for_platform(&expanded));
        let resolved = if normalized.is_absolute() {
            normalized
        } else {
            base_dir.join(normalized)
        };
        if !resolved.exists() {
            errors.push(format!("Missing server.command file: {}", command));
        }
    }
    errors
}

/// Whether a command template names a file rather than a program on PATH.
pub fn is_path_like(command: &str) -> bool {
    let lower = command.to_ascii_lowercase();
    command.contains('/')
        || command.contains('\\')
        || lower.starts_with("${__dirname}")
        || command.starts_with("./")
        || command.starts_with("..")
        || lower.ends_with(".js")
        || lower.ends_with(".py")
        || lower.ends_with(".exe")
}

fn resolve(base_dir: &Path, rel: &str) -> PathBuf {
    let p = PathBuf::from(normalize_path_for_platform(&rel.replace('\\', "/")));
    if p.is_absolute() { p } else { base_dir.join(p) }
}
