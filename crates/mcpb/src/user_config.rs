//! End-user `user_config` values and the pre-spawn required-value guard.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{McpbError, Result};
use crate::manifest::Manifest;

static USER_CONFIG_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\$\{user_config\.([^}]+)\}").expect("user_config pattern is valid")
});

/// Option key → ordered list of supplied values.
///
/// Built once per invocation from `--user_config name=value` flags; repeated
/// flags for one key accumulate in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserConfigOverrides {
    values: BTreeMap<String, Vec<String>>,
}

impl UserConfigOverrides {
    pub fn push(&mut self, key: &str, value: &str) {
        self.values
            .entry(key.to_string())
            .or_default()
            .push(value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.values.get(key).map(Vec::as_slice)
    }

    pub fn first(&self, key: &str) -> Option<&str> {
        self.get(key)?.first().map(String::as_str)
    }

    /// A key is satisfied when it has values and none of them is blank.
    pub fn is_satisfied(&self, key: &str) -> bool {
        self.get(key)
            .is_some_and(|v| !v.is_empty() && v.iter().all(|s| !s.trim().is_empty()))
    }
}

/// Parse raw `name=value` flag values.
pub fn parse_user_config_options<I, S>(raw_values: I) -> Result<UserConfigOverrides>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = UserConfigOverrides::default();
    for raw in raw_values {
        let raw = raw.as_ref();
        if raw.trim().is_empty() {
            return Err(McpbError::InvalidConfiguration(
                "--user_config values cannot be empty".to_string(),
            ));
        }
        let Some((key, value)) = raw.split_once('=').filter(|(k, _)| !k.is_empty()) else {
            return Err(McpbError::InvalidConfiguration(format!(
                "Invalid --user_config value '{}'. Use name=value.",
                raw
            )));
        };
        if key.trim().is_empty() {
            return Err(McpbError::InvalidConfiguration(format!(
                "Invalid --user_config value '{}'. Key cannot be empty.",
                raw
            )));
        }
        out.push(key, value);
    }
    Ok(out)
}

/// Distinct `${user_config.KEY}` keys across templates, first appearance first.
pub fn referenced_user_config_keys<'a, I>(templates: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut keys: Vec<String> = Vec::new();
    for template in templates {
        for caps in USER_CONFIG_REF.captures_iter(template) {
            let key = &caps[1];
            if !keys.iter().any(|k| k == key) {
                keys.push(key.to_string());
            }
        }
    }
    keys
}

/// Fail before any process is spawned when a required option referenced by
/// the unexpanded command or arguments has no usable value.
pub fn ensure_required_provided(
    manifest: &Manifest,
    command: &str,
    args: &[String],
    overrides: &UserConfigOverrides,
) -> Result<()> {
    let referenced =
        referenced_user_config_keys(std::iter::once(command).chain(args.iter().map(String::as_str)));
    let missing: Vec<String> = referenced
        .into_iter()
        .filter(|key| {
            manifest
                .user_config_option(key)
                .is_some_and(|opt| opt.is_required())
        })
        .filter(|key| !overrides.is_satisfied(key))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        tracing::debug!("required user_config missing: {:?}", missing);
        Err(McpbError::UserConfigRequired { keys: missing })
    }
}
