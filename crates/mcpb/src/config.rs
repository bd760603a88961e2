use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default overall discovery budget.
pub const DEFAULT_DISCOVERY_TIMEOUT_MS: u64 = 8_000;
/// Default budget for the initialize handshake alone.
pub const DEFAULT_INITIALIZE_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    pub logging: Option<LoggingCfg>,
    pub discovery: Option<DiscoveryCfg>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoggingCfg {
    pub to_file: Option<bool>,
    pub dir: Option<String>,
    pub json: Option<bool>,
    pub compact: Option<bool>,
    pub pretty: Option<bool>,
    pub level: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DiscoveryCfg {
    pub timeout_ms: Option<u64>,
    pub initialize_timeout_ms: Option<u64>,
}

/// Resolved discovery time budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryTimeouts {
    /// Bounds the whole session, every round-trip included.
    pub overall: Duration,
    /// Bounds the initialize handshake; never longer than `overall`.
    pub initialize: Duration,
}

impl Default for DiscoveryTimeouts {
    fn default() -> Self {
        Self {
            overall: Duration::from_millis(DEFAULT_DISCOVERY_TIMEOUT_MS),
            initialize: Duration::from_millis(DEFAULT_INITIALIZE_TIMEOUT_MS),
        }
    }
}

impl DiscoveryTimeouts {
    pub fn from_millis(overall_ms: u64, initialize_ms: u64) -> Self {
        let overall = Duration::from_millis(overall_ms.max(1));
        let initialize = Duration::from_millis(initialize_ms.max(1)).min(overall);
        Self {
            overall,
            initialize,
        }
    }

    /// Env values win when explicitly set, then the config file, then defaults.
    pub fn resolve(
        settings: Option<&Settings>,
        env_overall_ms: Option<u64>,
        env_initialize_ms: Option<u64>,
    ) -> Self {
        let file = settings.and_then(|s| s.discovery.as_ref());
        let overall = env_overall_ms
            .or_else(|| file.and_then(|d| d.timeout_ms))
            .unwrap_or(DEFAULT_DISCOVERY_TIMEOUT_MS);
        let initialize = env_initialize_ms
            .or_else(|| file.and_then(|d| d.initialize_timeout_ms))
            .unwrap_or(DEFAULT_INITIALIZE_TIMEOUT_MS);
        Self::from_millis(overall, initialize)
    }
}

pub fn load_settings(mcpb_home: &Path) -> anyhow::Result<Option<Settings>> {
    let path = mcpb_home.join("config.toml");
    if !path.exists() {
        return Ok(None);
    }
    let s = std::fs::read_to_string(&path)?;
    let cfg: Settings = toml::from_str(&s)?;
    Ok(Some(cfg))
}

/// `$MCPB_HOME`, else `$HOME/.mcpb`, else `./.mcpb`.
pub fn mcpb_home(explicit: &str) -> PathBuf {
    if !explicit.is_empty() {
        return expand_home(explicit);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".mcpb");
    }
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".mcpb")
}

pub fn expand_home(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    PathBuf::from(path)
}
