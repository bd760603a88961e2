//! Stdio MCP client session backed by `rust-mcp-sdk`.
//!
//! Launches the bundled server as a child process, relays its logging
//! notifications into the discovery log, and shuts the server down on close.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rust_mcp_sdk::McpClient;
use rust_mcp_sdk::mcp_client::{ClientHandlerCore, client_runtime_core};
use rust_mcp_sdk::schema::schema_utils::{
    NotificationFromServer, RequestFromServer, ResultFromClient,
};
use rust_mcp_sdk::schema::{
    ClientCapabilities, Implementation, InitializeRequestParams, LATEST_PROTOCOL_VERSION, RpcError,
    ServerNotification,
};
use rust_mcp_sdk::{StdioTransport, TransportOptions};
use serde_json::{Value as JsonValue, json};

use super::session::{McpSession, SessionLauncher};
use super::types::{DiscoveryLog, LaunchSpec};
use crate::error::{McpbError, Result};

const CLIENT_NAME: &str = "mcpb-discovery";

/// Spawns the server over stdio, inside the bundle directory.
///
/// The SDK transport always inherits this process's working directory, so the
/// server is started through a shell that changes into `working_dir` first.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdioLauncher;

#[async_trait]
impl SessionLauncher for StdioLauncher {
    async fn launch(&self, spec: &LaunchSpec, log: &DiscoveryLog) -> Result<Box<dyn McpSession>> {
        let client_details = InitializeRequestParams {
            capabilities: ClientCapabilities::default(),
            client_info: Implementation {
                name: CLIENT_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: None,
            },
            protocol_version: LATEST_PROTOCOL_VERSION.into(),
        };

        let (program, args) = launch_line(spec);
        let env: Option<HashMap<String, String>> = if spec.env.is_empty() {
            None
        } else {
            Some(spec.env.clone().into_iter().collect())
        };
        tracing::debug!(
            command = %spec.command,
            args = ?spec.args,
            cwd = %spec.working_dir.display(),
            "launching MCP server"
        );

        let transport =
            StdioTransport::create_with_server_launch(program, args, env, TransportOptions::default())
                .map_err(|e| McpbError::ProcessLaunch(format!("{}: {}", spec.command, e)))?;

        let handler = LogRelayHandler { log: log.clone() };
        let client = client_runtime_core::create_client(client_details, transport, handler);
        Ok(Box::new(StdioSession { client }))
    }
}

/// Program and arguments that run `spec` with `working_dir` as its cwd.
#[cfg(unix)]
fn launch_line(spec: &LaunchSpec) -> (&'static str, Vec<String>) {
    let mut args = vec![
        "-c".to_string(),
        r#"cd "$1" && shift && exec "$@""#.to_string(),
        "sh".to_string(),
        spec.working_dir.to_string_lossy().into_owned(),
        spec.command.clone(),
    ];
    args.extend(spec.args.iter().cloned());
    ("sh", args)
}

#[cfg(windows)]
fn launch_line(spec: &LaunchSpec) -> (&'static str, Vec<String>) {
    let mut args = vec![
        "/D".to_string(),
        "/C".to_string(),
        "cd".to_string(),
        "/d".to_string(),
        spec.working_dir.to_string_lossy().into_owned(),
        "&&".to_string(),
        spec.command.clone(),
    ];
    args.extend(spec.args.iter().cloned());
    ("cmd", args)
}

struct StdioSession<C> {
    client: Arc<C>,
}

fn protocol<E: std::fmt::Display>(operation: &str) -> impl FnOnce(E) -> McpbError + '_ {
    move |e| McpbError::Protocol(format!("{}: {}", operation, e))
}

fn cursor_params<T: serde::de::DeserializeOwned>(cursor: Option<String>) -> Result<Option<T>> {
    match cursor {
        Some(cursor) => Ok(Some(serde_json::from_value(json!({ "cursor": cursor }))?)),
        None => Ok(None),
    }
}

#[async_trait]
impl<C> McpSession for StdioSession<C>
where
    C: McpClient + Send + Sync + 'static,
{
    async fn initialize(&self) -> Result<JsonValue> {
        self.client
            .clone()
            .start()
            .await
            .map_err(protocol("initialize"))?;
        let info = self.client.server_info().ok_or_else(|| {
            McpbError::Protocol("initialize: server returned no result".to_string())
        })?;
        Ok(serde_json::to_value(info)?)
    }

    async fn ping(&self) -> Result<()> {
        self.client.ping(None).await.map_err(protocol("ping"))?;
        Ok(())
    }

    async fn list_tools(&self, cursor: Option<String>) -> Result<JsonValue> {
        let params = cursor_params(cursor)?;
        let page = self
            .client
            .list_tools(params)
            .await
            .map_err(protocol("tools/list"))?;
        Ok(serde_json::to_value(page)?)
    }

    async fn list_prompts(&self, cursor: Option<String>) -> Result<JsonValue> {
        let params = cursor_params(cursor)?;
        let page = self
            .client
            .list_prompts(params)
            .await
            .map_err(protocol("prompts/list"))?;
        Ok(serde_json::to_value(page)?)
    }

    async fn get_prompt(&self, name: &str) -> Result<JsonValue> {
        let params = serde_json::from_value(json!({ "name": name }))?;
        let prompt = self
            .client
            .get_prompt(params)
            .await
            .map_err(protocol("prompts/get"))?;
        Ok(serde_json::to_value(prompt)?)
    }

    async fn close(&self) {
        if let Err(e) = self.client.shut_down().await {
            tracing::debug!("MCP server shutdown error: {}", e);
        }
    }
}

/// Relays server logging notifications; rejects server-initiated requests.
#[derive(Clone)]
struct LogRelayHandler {
    log: DiscoveryLog,
}

impl LogRelayHandler {
    fn relay(&self, level: &str, logger: Option<&str>, data: &JsonValue) {
        let text = match data {
            JsonValue::String(s) => s.clone(),
            other => other.to_string(),
        };
        let message = match logger {
            Some(logger) if !logger.is_empty() => format!("[server:{}] {}", logger, text),
            _ => format!("[server] {}", text),
        };
        if is_warning_level(level) {
            self.log.warn(&message);
        } else {
            self.log.info(&message);
        }
    }
}

/// MCP log levels at or above `warning` go to the warning channel.
pub(crate) fn is_warning_level(level: &str) -> bool {
    matches!(
        level.to_ascii_lowercase().as_str(),
        "warning" | "error" | "critical" | "alert" | "emergency"
    )
}

#[async_trait]
impl ClientHandlerCore for LogRelayHandler {
    async fn handle_request(
        &self,
        _request: RequestFromServer,
        _runtime: &dyn McpClient,
    ) -> std::result::Result<ResultFromClient, RpcError> {
        Err(RpcError::method_not_found())
    }

    async fn handle_notification(
        &self,
        notification: NotificationFromServer,
        _runtime: &dyn McpClient,
    ) -> std::result::Result<(), RpcError> {
        if let NotificationFromServer::ServerNotification(
            ServerNotification::LoggingMessageNotification(n),
        ) = notification
        {
            let level = serde_json::to_value(&n.params.level)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();
            self.relay(&level, n.params.logger.as_deref(), &n.params.data);
        }
        Ok(())
    }

    async fn handle_error(
        &self,
        error: &RpcError,
        _runtime: &dyn McpClient,
    ) -> std::result::Result<(), RpcError> {
        tracing::debug!("MCP client error: {:?}", error);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use std::sync::Mutex;

    fn spec(command: &str) -> LaunchSpec {
        LaunchSpec {
            command: command.to_string(),
            args: vec![],
            env: BTreeMap::new(),
            working_dir: PathBuf::from("/bundle"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn launch_line_changes_into_bundle_dir() {
        let mut s = spec("node");
        s.args = vec!["server/index.js".into(), "a b".into()];
        let (program, args) = launch_line(&s);
        assert_eq!(program, "sh");
        assert_eq!(&args[2..], ["sh", "/bundle", "node", "server/index.js", "a b"]);
    }

    #[cfg(unix)]
    async fn run_launch_line(s: &LaunchSpec) -> String {
        let (program, args) = launch_line(s);
        let out = tokio::process::Command::new(program)
            .args(args)
            .output()
            .await
            .unwrap();
        assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
        String::from_utf8(out.stdout).unwrap()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn child_runs_in_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = dir.path().canonicalize().unwrap();
        std::fs::create_dir_all(bundle.join("server")).unwrap();
        std::fs::write(bundle.join("server/marker.txt"), "found").unwrap();

        let mut s = spec("pwd");
        s.working_dir = bundle.clone();
        assert_eq!(PathBuf::from(run_launch_line(&s).await.trim()), bundle);

        let mut s = spec("cat");
        s.args = vec!["server/marker.txt".into()];
        s.working_dir = bundle;
        assert_eq!(run_launch_line(&s).await, "found");
    }

    #[test]
    fn warning_levels() {
        assert!(is_warning_level("warning"));
        assert!(is_warning_level("ERROR"));
        assert!(is_warning_level("emergency"));
        assert!(!is_warning_level("notice"));
        assert!(!is_warning_level("debug"));
    }

    #[test]
    fn relay_routes_by_level() {
        let infos = Arc::new(Mutex::new(Vec::<String>::new()));
        let warns = Arc::new(Mutex::new(Vec::<String>::new()));
        let (i, w) = (infos.clone(), warns.clone());
        let handler = LogRelayHandler {
            log: DiscoveryLog::new(
                Some(Arc::new(move |m: &str| i.lock().unwrap().push(m.to_string()))),
                Some(Arc::new(move |m: &str| w.lock().unwrap().push(m.to_string()))),
            ),
        };
        handler.relay("info", Some("db"), &json!("connected"));
        handler.relay("error", None, &json!({"code": 1}));
        assert_eq!(infos.lock().unwrap().as_slice(), &["[server:db] connected".to_string()]);
        assert_eq!(warns.lock().unwrap().as_slice(), &["[server] {\"code\":1}".to_string()]);
    }
}
