//! Tracing bootstrap for the CLI.
//!
//! Logs always go to stderr; stdout carries command output. Environment knobs
//! win over `[logging]` in `<MCPB_HOME>/config.toml`.

use std::path::PathBuf;

use env_flags::env_flags;
use once_cell::sync::OnceCell;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, prelude::*};

use crate::config::{Settings, load_settings, mcpb_home};

const LOG_FILE_NAME: &str = "mcpb.log";

static FILE_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

env_flags! {
    /// Tracing filter, e.g. "info", "debug", or targets format.
    RUST_LOG: &str = "warn";
    /// Preferred filter env (alias). If set, overrides RUST_LOG.
    TRACING_FILTER: &str = "";
    /// Pretty formatting (ignored if TRACING_JSON=true).
    TRACING_PRETTY: bool = false;
    /// Compact single-line formatting (ignored if TRACING_JSON=true).
    TRACING_COMPACT: bool = true;
    /// JSON formatting.
    TRACING_JSON: bool = false;
    /// Also log to a daily file under <MCPB_HOME>/logs or LOG_DIR.
    LOG_TO_FILE: bool = false;
    /// Optional explicit log directory.
    LOG_DIR: &str = "";
    /// mcpb home directory. Defaults to $HOME/.mcpb
    MCPB_HOME: &str = "";
}

/// Resolved logging knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogOptions {
    pub filter: String,
    pub json: bool,
    pub compact: bool,
    pub pretty: bool,
    pub to_file: bool,
    pub dir: PathBuf,
}

impl LogOptions {
    /// Env (when explicitly set) wins over the config file.
    pub fn resolve(settings: Option<&Settings>, home: PathBuf, verbose: bool) -> Self {
        let env_set = |k: &str| std::env::var_os(k).is_some();
        let mut opts = Self {
            filter: if !(*TRACING_FILTER).is_empty() {
                (*TRACING_FILTER).to_string()
            } else {
                (*RUST_LOG).to_string()
            },
            json: *TRACING_JSON,
            compact: *TRACING_COMPACT,
            pretty: *TRACING_PRETTY,
            to_file: *LOG_TO_FILE,
            dir: if !(*LOG_DIR).is_empty() {
                PathBuf::from((*LOG_DIR).to_string())
            } else {
                home.join("logs")
            },
        };

        if let Some(cfg) = settings.and_then(|s| s.logging.as_ref()) {
            if !(env_set("TRACING_FILTER") || env_set("RUST_LOG"))
                && let Some(level) = cfg.level.as_ref()
            {
                opts.filter = level.clone();
            }
            if !env_set("TRACING_JSON")
                && let Some(v) = cfg.json
            {
                opts.json = v;
            }
            if !env_set("TRACING_COMPACT")
                && let Some(v) = cfg.compact
            {
                opts.compact = v;
            }
            if !env_set("TRACING_PRETTY")
                && let Some(v) = cfg.pretty
            {
                opts.pretty = v;
            }
            if !env_set("LOG_TO_FILE")
                && let Some(v) = cfg.to_file
            {
                opts.to_file = v;
            }
            if !env_set("LOG_DIR")
                && let Some(dir) = cfg.dir.as_ref()
            {
                opts.dir = crate::config::expand_home(dir);
            }
        }
        if verbose && !(env_set("TRACING_FILTER") || env_set("RUST_LOG")) {
            opts.filter = "debug".to_string();
        }
        opts
    }
}

/// Home directory from `MCPB_HOME`, else `$HOME/.mcpb`.
pub fn home_dir() -> PathBuf {
    mcpb_home(*MCPB_HOME)
}

pub fn init_tracing(verbose: bool) {
    let home = home_dir();
    let settings = match load_settings(&home) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("warning: ignoring {}: {}", home.join("config.toml").display(), e);
            None
        }
    };
    install(&LogOptions::resolve(settings.as_ref(), home, verbose));
}

macro_rules! try_init {
    ($subscriber:expr) => {
        if let Err(e) = $subscriber.try_init() {
            tracing::debug!("tracing already set: {:?}", e);
        }
    };
}

/// Build the stderr layer in `$fmt` style plus an optional file layer in the
/// same style, then install.
macro_rules! install_with {
    ($opts:expr, $($fmt:ident)?) => {{
        let filter = EnvFilter::try_new(&$opts.filter).unwrap_or_else(|_| EnvFilter::new("warn"));
        let reg = tracing_subscriber::registry().with(filter);
        let stderr_layer = tracing_subscriber::fmt::layer()
            .with_file(false)
            .with_line_number(false)
            .with_target(true)
            .with_ansi(true)
            .with_writer(std::io::stderr)
            $(.$fmt())?;
        match file_writer($opts) {
            Some(nb) => {
                let file_layer = tracing_subscriber::fmt::layer()
                    .with_file(false)
                    .with_line_number(false)
                    .with_target(true)
                    .with_ansi(false)
                    .with_writer(nb)
                    $(.$fmt())?;
                try_init!(reg.with(stderr_layer).with(file_layer));
            }
            None => try_init!(reg.with(stderr_layer)),
        }
    }};
}

fn install(opts: &LogOptions) {
    if opts.json {
        install_with!(opts, json);
    } else if opts.compact {
        install_with!(opts, compact);
    } else if opts.pretty {
        install_with!(opts, pretty);
    } else {
        install_with!(opts,);
    }
}

fn file_writer(opts: &LogOptions) -> Option<tracing_appender::non_blocking::NonBlocking> {
    if !opts.to_file {
        return None;
    }
    if let Err(e) = std::fs::create_dir_all(&opts.dir) {
        eprintln!("warning: failed to create log dir {}: {}", opts.dir.display(), e);
        return None;
    }
    let appender = tracing_appender::rolling::daily(&opts.dir, LOG_FILE_NAME);
    let (nb, guard) = tracing_appender::non_blocking(appender);
    let _ = FILE_GUARD.set(guard);
    Some(nb)
}
