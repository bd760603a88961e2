//! Placeholder expansion for `server.mcp_config` templates.
//!
//! Recognized tokens (case-insensitive): `${__dirname}`, `${HOME}`,
//! `${DESKTOP}`, `${DOCUMENTS}`, `${DOWNLOADS}`, `${pathSeparator}` / `${/}`,
//! and `${user_config.KEY}`. Unknown tokens are left verbatim.

use std::path::{MAIN_SEPARATOR, MAIN_SEPARATOR_STR, PathBuf};

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::user_config::UserConfigOverrides;

static TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([^}]+)\}").expect("token pattern is valid"));

const USER_CONFIG_PREFIX: &str = "user_config.";

/// Platform known-folder paths substituted for the folder tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownFolders {
    pub home: String,
    pub desktop: String,
    pub documents: String,
    pub downloads: String,
}

impl KnownFolders {
    /// Query the platform, falling back to `$HOME/<Folder>` for anything it
    /// cannot answer.
    pub fn detect() -> Self {
        let user_dirs = directories::UserDirs::new();
        let home = user_dirs
            .as_ref()
            .map(|d| d.home_dir().to_path_buf())
            .or_else(|| std::env::var_os("HOME").map(PathBuf::from))
            .or_else(|| std::env::var_os("USERPROFILE").map(PathBuf::from))
            .unwrap_or_default();
        let pick = |found: Option<&std::path::Path>, fallback: &str| -> String {
            found
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| home.join(fallback))
                .to_string_lossy()
                .into_owned()
        };
        Self {
            desktop: pick(user_dirs.as_ref().and_then(|d| d.desktop_dir()), "Desktop"),
            documents: pick(
                user_dirs.as_ref().and_then(|d| d.document_dir()),
                "Documents",
            ),
            downloads: pick(
                user_dirs.as_ref().and_then(|d| d.download_dir()),
                "Downloads",
            ),
            home: home.to_string_lossy().into_owned(),
        }
    }
}

/// Expands templates against one base directory and override set.
#[derive(Debug, Clone)]
pub struct TokenExpander<'a> {
    base_dir: String,
    overrides: &'a UserConfigOverrides,
    folders: KnownFolders,
}

impl<'a> TokenExpander<'a> {
    pub fn new(base_dir: &str, overrides: &'a UserConfigOverrides) -> Self {
        Self::with_folders(base_dir, overrides, KnownFolders::detect())
    }

    pub fn with_folders(
        base_dir: &str,
        overrides: &'a UserConfigOverrides,
        folders: KnownFolders,
    ) -> Self {
        Self {
            base_dir: base_dir.replace('\\', "/"),
            overrides,
            folders,
        }
    }

    /// Substitute every recognized token, then normalize separators.
    pub fn expand(&self, template: &str) -> String {
        if template.is_empty() {
            return String::new();
        }
        let substituted = TOKEN.replace_all(template, |caps: &Captures<'_>| {
            let token = &caps[1];
            self.resolve(token)
                .unwrap_or_else(|| caps[0].to_string())
        });
        normalize_path_for_platform(&substituted)
    }

    /// Expand one argument template into zero or more argument tokens.
    ///
    /// An argument that is exactly `${user_config.KEY}` becomes one token per
    /// non-blank override value, in order. Anything else yields at most one
    /// token and is dropped when it resolves to blank.
    pub fn expand_argument_values(&self, value: &str) -> Vec<String> {
        if let Some(key) = whole_user_config_reference(value)
            && let Some(values) = self.overrides.get(key)
        {
            return values
                .iter()
                .filter(|v| !v.trim().is_empty())
                .cloned()
                .collect();
        }
        let expanded = self.expand(value);
        if expanded.trim().is_empty() {
            Vec::new()
        } else {
            vec![expanded]
        }
    }

    fn resolve(&self, token: &str) -> Option<String> {
        if token.eq_ignore_ascii_case("__dirname") {
            return Some(self.base_dir.clone());
        }
        if token.eq_ignore_ascii_case("HOME") {
            return Some(self.folders.home.clone());
        }
        if token.eq_ignore_ascii_case("DESKTOP") {
            return Some(self.folders.desktop.clone());
        }
        if token.eq_ignore_ascii_case("DOCUMENTS") {
            return Some(self.folders.documents.clone());
        }
        if token.eq_ignore_ascii_case("DOWNLOADS") {
            return Some(self.folders.downloads.clone());
        }
        if token.eq_ignore_ascii_case("pathSeparator") || token == "/" {
            return Some(MAIN_SEPARATOR_STR.to_string());
        }
        if let Some(key) = strip_user_config_prefix(token) {
            return Some(
                self.overrides
                    .first(key)
                    .map(str::to_string)
                    .unwrap_or_default(),
            );
        }
        None
    }
}

/// Scalar expansion of one template.
pub fn expand(template: &str, base_dir: &str, overrides: &UserConfigOverrides) -> String {
    TokenExpander::new(base_dir, overrides).expand(template)
}

/// Multi-valued argument expansion; see [`TokenExpander::expand_argument_values`].
pub fn expand_argument_values(
    value: &str,
    base_dir: &str,
    overrides: &UserConfigOverrides,
) -> Vec<String> {
    TokenExpander::new(base_dir, overrides).expand_argument_values(value)
}

/// Rewrite `/` and `\` to the platform separator. URLs and flags pass through.
pub fn normalize_path_for_platform(value: &str) -> String {
    if value.is_empty() || value.contains("://") || value.starts_with('-') {
        return value.to_string();
    }
    value
        .chars()
        .map(|c| if c == '/' || c == '\\' { MAIN_SEPARATOR } else { c })
        .collect()
}

/// `user_config.KEY` (prefix case-insensitive) → `KEY`.
pub(crate) fn strip_user_config_prefix(token: &str) -> Option<&str> {
    let prefix = token.get(..USER_CONFIG_PREFIX.len())?;
    if prefix.eq_ignore_ascii_case(USER_CONFIG_PREFIX) {
        Some(&token[USER_CONFIG_PREFIX.len()..])
    } else {
        None
    }
}

/// The key when the trimmed value is exactly one `${user_config.KEY}` token.
fn whole_user_config_reference(value: &str) -> Option<&str> {
    let inner = value.trim().strip_prefix("${")?.strip_suffix('}')?;
    if inner.contains('}') {
        return None;
    }
    strip_user_config_prefix(inner).filter(|k| !k.is_empty())
}
