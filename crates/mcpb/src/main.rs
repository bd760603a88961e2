use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use env_flags::env_flags;

use mcpb::command::{ValidateArgs, Validator, error_lines};
use mcpb::config::{DiscoveryTimeouts, load_settings};
use mcpb::logging::{home_dir, init_tracing};
use mcpb::mcp::{DiscoveryLog, LogSink};

env_flags! {
    /// Overall discovery budget in milliseconds. 0 defers to config.toml / default.
    MCPB_DISCOVERY_TIMEOUT_MS: u64 = 0;
    /// Initialize handshake budget in milliseconds. 0 defers to config.toml / default.
    MCPB_INITIALIZE_TIMEOUT_MS: u64 = 0;
}

/// Validate MCP bundle manifests against the server they describe.
#[derive(Parser, Debug)]
#[command(name = "mcpb", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a manifest, optionally reconciling it with its server's capabilities.
    Validate(ValidateCmd),
}

#[derive(Args, Debug)]
struct ValidateCmd {
    /// manifest.json, or the bundle directory containing it.
    manifest: PathBuf,

    /// Bundle directory used to launch the server and resolve ${__dirname}.
    #[arg(long)]
    dirname: Option<PathBuf>,

    /// Rewrite tools, prompts, and cached responses from the server.
    #[arg(long, conflicts_with = "discover")]
    update: bool,

    /// Check the manifest against the server without changing it.
    #[arg(long)]
    discover: bool,

    #[arg(long)]
    verbose: bool,

    /// name=value for a user_config option; repeat for multi-valued options.
    #[arg(long = "user_config", visible_alias = "user-config", value_name = "NAME=VALUE")]
    user_config: Vec<String>,
}

impl From<ValidateCmd> for ValidateArgs {
    fn from(cmd: ValidateCmd) -> Self {
        ValidateArgs {
            manifest: cmd.manifest,
            dirname: cmd.dirname,
            update: cmd.update,
            discover: cmd.discover,
            user_config: cmd.user_config,
        }
    }
}

fn console_log() -> DiscoveryLog {
    let info: LogSink = Arc::new(|m: &str| println!("{}", m));
    let warning: LogSink = Arc::new(|m: &str| eprintln!("Warning: {}", m));
    DiscoveryLog::new(Some(info), Some(warning))
}

fn timeouts() -> DiscoveryTimeouts {
    let settings = load_settings(&home_dir()).ok().flatten();
    let env = |v: u64| (v > 0).then_some(v);
    DiscoveryTimeouts::resolve(
        settings.as_ref(),
        env(*MCPB_DISCOVERY_TIMEOUT_MS),
        env(*MCPB_INITIALIZE_TIMEOUT_MS),
    )
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command {
        Command::Validate(cmd) => {
            init_tracing(cmd.verbose);
            let timeouts = timeouts();
            tracing::debug!(?timeouts, "starting mcpb validate");

            let args = ValidateArgs::from(cmd);
            let validator = Validator::new(console_log(), timeouts);
            match validator.run(&args).await {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    tracing::debug!(error = ?e, "validate failed");
                    for line in error_lines(&e) {
                        eprintln!("{}", line);
                    }
                    ExitCode::FAILURE
                }
            }
        }
    }
}
