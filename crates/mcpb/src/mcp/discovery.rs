//! Capability discovery against a live server session.
//!
//! The session advances Handshake → capability inspection → ping → tools →
//! prompts. Every round-trip shares one deadline; any failure after the
//! pre-spawn checks becomes a warning and the partial result is returned.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde_json::{Value as JsonValue, json};

use super::deadline::{Deadline, SoftCall};
use super::dedup::{dedup_prompts, dedup_tools, distinct_argument_names};
use super::session::{McpSession, SessionLauncher};
use super::source::{DiscoverySource, FixedSource, LiveSource};
use super::stdio::StdioLauncher;
use super::types::{DiscoveryLog, DiscoveryResult, LaunchSpec, PromptInfo, ToolInfo};
use crate::config::DiscoveryTimeouts;
use crate::error::{McpbError, Result};
use crate::expand::{TokenExpander, normalize_path_for_platform};
use crate::manifest::{Manifest, non_blank, strip_nulls};
use crate::user_config::{UserConfigOverrides, ensure_required_provided};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);
const MAX_PAGES: usize = 64;

/// Inputs shared by every discovery source.
#[derive(Debug, Clone)]
pub struct DiscoveryContext<'a> {
    pub base_dir: &'a Path,
    pub manifest: &'a Manifest,
    pub overrides: &'a UserConfigOverrides,
    pub log: DiscoveryLog,
    pub timeouts: DiscoveryTimeouts,
}

/// Discover the bundle's capabilities.
///
/// Environment overrides, when present, replace the live server. The
/// required-config guard runs first either way.
pub async fn discover(ctx: &DiscoveryContext<'_>) -> Result<DiscoveryResult> {
    match FixedSource::from_env() {
        Some(fixed) => {
            tracing::debug!("using discovery overrides from environment");
            discover_with(&fixed, ctx).await
        }
        None => discover_with(&LiveSource::new(StdioLauncher), ctx).await,
    }
}

pub async fn discover_with(
    source: &dyn DiscoverySource,
    ctx: &DiscoveryContext<'_>,
) -> Result<DiscoveryResult> {
    if let Some(config) = ctx.manifest.mcp_config()
        && let Some(command) = config.command.as_deref()
    {
        let args = config.args.as_deref().unwrap_or(&[]);
        ensure_required_provided(ctx.manifest, command, args, ctx.overrides)?;
    }
    let result = source.discover(ctx).await?;
    Ok(DiscoveryResult {
        tools: dedup_tools(result.tools),
        prompts: dedup_prompts(result.prompts),
        ..result
    })
}

/// Resolve the launch command, arguments, and environment for `base_dir`.
pub fn materialize_launch(
    base_dir: &Path,
    manifest: &Manifest,
    overrides: &UserConfigOverrides,
) -> Result<LaunchSpec> {
    let config = manifest.mcp_config().ok_or_else(|| {
        McpbError::InvalidConfiguration("Manifest server.mcp_config missing".to_string())
    })?;
    let command = non_blank(config.command.as_deref()).ok_or_else(|| {
        McpbError::InvalidConfiguration("Manifest server.mcp_config.command empty".to_string())
    })?;
    let raw_args = config.args.as_deref().unwrap_or(&[]);
    ensure_required_provided(manifest, command, raw_args, overrides)?;

    let base = base_dir.to_string_lossy();
    let expander = TokenExpander::new(&base, overrides);
    let args = raw_args
        .iter()
        .flat_map(|a| expander.expand_argument_values(a))
        .map(|a| normalize_path_for_platform(&a))
        .collect();
    let env = config
        .env
        .iter()
        .flatten()
        .map(|(k, v)| (k.clone(), expander.expand(v)))
        .collect();
    Ok(LaunchSpec {
        command: expander.expand(command),
        args,
        env,
        working_dir: base_dir.to_path_buf(),
    })
}

/// Launch a session and walk it through the discovery states.
pub(crate) async fn run_live(
    launcher: &dyn SessionLauncher,
    spec: &LaunchSpec,
    log: &DiscoveryLog,
    timeouts: DiscoveryTimeouts,
) -> DiscoveryResult {
    let deadline = Deadline::after(timeouts.overall);
    let soft = SoftCall::new(deadline, log.clone());
    let Some(session) = soft
        .call("launch", "MCP client discovery failed", launcher.launch(spec, log))
        .await
    else {
        return DiscoveryResult::default();
    };
    let result = interrogate(session.as_ref(), &soft, timeouts.initialize).await;
    if tokio::time::timeout(SHUTDOWN_GRACE, session.close()).await.is_err() {
        tracing::warn!("MCP server did not shut down within {:?}", SHUTDOWN_GRACE);
    }
    result
}

pub(crate) async fn interrogate(
    session: &dyn McpSession,
    soft: &SoftCall,
    initialize_limit: Duration,
) -> DiscoveryResult {
    let mut result = DiscoveryResult::default();

    let Some(init) = soft
        .call_within(
            "initialize",
            Some(initialize_limit),
            "MCP client discovery failed",
            session.initialize(),
        )
        .await
    else {
        return result;
    };
    let capabilities = Capabilities::from_initialize(&init);
    let (name, version) = server_identity(&init);
    result.reported_server_name = name;
    result.reported_server_version = version;
    result.initialize_response = Some(initialize_snapshot(&init));

    if soft
        .call("ping", "MCP client discovery failed", session.ping())
        .await
        .is_none()
    {
        return result;
    }

    if capabilities.tools
        && let Some(raw_tools) = list_all(soft, "tools/list", "Tool discovery failed", "tools", move |c| {
            session.list_tools(c)
        })
        .await
    {
        result.tools = raw_tools.iter().filter_map(tool_from_raw).collect();
        result.tools_list_response = Some(json!({ "tools": raw_tools }));
    }

    if capabilities.prompts
        && let Some(raw_prompts) = list_all(
            soft,
            "prompts/list",
            "Prompt discovery skipped",
            "prompts",
            move |c| session.list_prompts(c),
        )
        .await
    {
        for raw in &raw_prompts {
            let Some(mut prompt) = prompt_from_raw(raw) else {
                continue;
            };
            let context = format!("Prompt '{}' content fetch failed", prompt.name);
            let text = soft
                .call("prompts/get", &context, session.get_prompt(&prompt.name))
                .await
                .map(|content| extract_prompt_text(&content))
                .unwrap_or_default();
            prompt.text = Some(text);
            result.prompts.push(prompt);
        }
    }

    result
}

/// Follow `nextCursor` until exhausted, collecting null-filtered items.
async fn list_all<F, Fut>(
    soft: &SoftCall,
    operation: &str,
    context: &str,
    key: &str,
    mut fetch: F,
) -> Option<Vec<JsonValue>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: std::future::Future<Output = Result<JsonValue>>,
{
    let mut items = Vec::new();
    let mut seen = HashSet::new();
    let mut cursor: Option<String> = None;
    for _ in 0..MAX_PAGES {
        let page = soft.call(operation, context, fetch(cursor.take())).await?;
        if let Some(entries) = page.get(key).and_then(JsonValue::as_array) {
            items.extend(entries.iter().cloned().map(strip_nulls));
        }
        match page.get("nextCursor").and_then(JsonValue::as_str) {
            Some(next) if !next.is_empty() && seen.insert(next.to_string()) => {
                cursor = Some(next.to_string());
            }
            _ => return Some(items),
        }
    }
    soft.log()
        .warn(&format!("{}: stopped after {} pages", context, MAX_PAGES));
    Some(items)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Capabilities {
    tools: bool,
    prompts: bool,
}

impl Capabilities {
    fn from_initialize(init: &JsonValue) -> Self {
        let advertised = |key: &str| {
            init.get("capabilities")
                .and_then(|c| c.get(key))
                .is_some_and(|v| !v.is_null())
        };
        Self {
            tools: advertised("tools"),
            prompts: advertised("prompts"),
        }
    }
}

fn server_identity(init: &JsonValue) -> (Option<String>, Option<String>) {
    let field = |key: &str| {
        init.get("serverInfo")
            .and_then(|s| s.get(key))
            .and_then(JsonValue::as_str)
            .and_then(|s| non_blank(Some(s)))
            .map(str::to_string)
    };
    (field("name"), field("version"))
}

/// The cached `initialize` payload: protocol version, capabilities, server
/// info, and instructions, with nulls removed.
pub(crate) fn initialize_snapshot(init: &JsonValue) -> JsonValue {
    let mut snapshot = serde_json::Map::new();
    for key in ["protocolVersion", "capabilities", "serverInfo"] {
        if let Some(v) = init.get(key) {
            snapshot.insert(key.to_string(), v.clone());
        }
    }
    if let Some(instructions) = init
        .get("instructions")
        .and_then(JsonValue::as_str)
        .filter(|s| !s.trim().is_empty())
    {
        snapshot.insert("instructions".to_string(), json!(instructions));
    }
    strip_nulls(JsonValue::Object(snapshot))
}

fn str_field<'v>(value: &'v JsonValue, key: &str) -> Option<&'v str> {
    value.get(key).and_then(JsonValue::as_str)
}

fn tool_from_raw(raw: &JsonValue) -> Option<ToolInfo> {
    let name = non_blank(str_field(raw, "name"))?;
    Some(ToolInfo::new(name, str_field(raw, "description")))
}

fn prompt_from_raw(raw: &JsonValue) -> Option<PromptInfo> {
    let name = non_blank(str_field(raw, "name"))?;
    let arguments = distinct_argument_names(
        raw.get("arguments")
            .and_then(JsonValue::as_array)
            .into_iter()
            .flatten()
            .filter_map(|a| str_field(a, "name")),
    );
    Some(PromptInfo {
        name: name.to_string(),
        description: non_blank(str_field(raw, "description")).map(str::to_string),
        arguments: (!arguments.is_empty()).then_some(arguments),
        text: None,
    })
}

/// Non-blank text of every text content block, one per line.
pub fn extract_prompt_text(prompt: &JsonValue) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for message in prompt
        .get("messages")
        .and_then(JsonValue::as_array)
        .into_iter()
        .flatten()
    {
        let blocks: Vec<&JsonValue> = match message.get("content") {
            Some(JsonValue::Array(items)) => items.iter().collect(),
            Some(block) => vec![block],
            None => continue,
        };
        for block in blocks {
            if str_field(block, "type") != Some("text") {
                continue;
            }
            if let Some(text) = non_blank(str_field(block, "text")) {
                parts.push(text);
            }
        }
    }
    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{McpConfig, ServerConfig, UserConfigOption};
    use crate::mcp::source::{
        INITIALIZE_OVERRIDE_VAR, PROMPT_OVERRIDE_VAR, TOOL_OVERRIDE_VAR, TOOLS_LIST_OVERRIDE_VAR,
    };
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::path::MAIN_SEPARATOR_STR;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Scripted session; `None` entries fail with a protocol error.
    #[derive(Default)]
    struct Scripted {
        initialize: Option<JsonValue>,
        hang_on_initialize: bool,
        hang_on_ping: bool,
        tools_pages: Vec<JsonValue>,
        prompts: Option<JsonValue>,
        prompt_bodies: BTreeMap<String, JsonValue>,
        closed: Arc<AtomicBool>,
        tool_calls: AtomicUsize,
    }

    #[async_trait]
    impl McpSession for Scripted {
        async fn initialize(&self) -> Result<JsonValue> {
            if self.hang_on_initialize {
                std::future::pending::<()>().await;
            }
            self.initialize
                .clone()
                .ok_or_else(|| McpbError::Protocol("connection closed".into()))
        }

        async fn ping(&self) -> Result<()> {
            if self.hang_on_ping {
                std::future::pending::<()>().await;
            }
            Ok(())
        }

        async fn list_tools(&self, cursor: Option<String>) -> Result<JsonValue> {
            self.tool_calls.fetch_add(1, Ordering::SeqCst);
            let index = cursor.map(|c| c.parse::<usize>().unwrap()).unwrap_or(0);
            self.tools_pages
                .get(index)
                .cloned()
                .ok_or_else(|| McpbError::Protocol("no such page".into()))
        }

        async fn list_prompts(&self, _cursor: Option<String>) -> Result<JsonValue> {
            self.prompts
                .clone()
                .ok_or_else(|| McpbError::Protocol("prompts unsupported".into()))
        }

        async fn get_prompt(&self, name: &str) -> Result<JsonValue> {
            self.prompt_bodies
                .get(name)
                .cloned()
                .ok_or_else(|| McpbError::Protocol(format!("unknown prompt {name}")))
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    struct ScriptedLauncher(Mutex<Option<Scripted>>);

    #[async_trait]
    impl SessionLauncher for ScriptedLauncher {
        async fn launch(&self, _spec: &LaunchSpec, _log: &DiscoveryLog) -> Result<Box<dyn McpSession>> {
            let session = self.0.lock().unwrap().take().expect("launched once");
            Ok(Box::new(session))
        }
    }

    fn init_payload() -> JsonValue {
        json!({
            "protocolVersion": "2025-06-18",
            "capabilities": {"tools": {"listChanged": null}, "prompts": {}, "logging": null},
            "serverInfo": {"name": "demo", "version": "1.2.0", "title": null},
            "instructions": "  "
        })
    }

    fn warnings() -> (DiscoveryLog, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let log = DiscoveryLog::new(
            None,
            Some(Arc::new(move |m: &str| sink.lock().unwrap().push(m.to_string()))),
        );
        (log, seen)
    }

    fn spec() -> LaunchSpec {
        LaunchSpec {
            command: "node".into(),
            args: vec![],
            env: BTreeMap::new(),
            working_dir: "/bundle".into(),
        }
    }

    #[tokio::test]
    async fn full_session_collects_tools_prompts_and_snapshots() {
        let closed = Arc::new(AtomicBool::new(false));
        let session = Scripted {
            initialize: Some(init_payload()),
            tools_pages: vec![
                json!({"tools": [{"name": "b", "description": "B", "annotations": null}], "nextCursor": "1"}),
                json!({"tools": [{"name": "a", "inputSchema": {"type": "object"}}]}),
            ],
            prompts: Some(json!({"prompts": [
                {"name": "greet", "description": "Say hi", "arguments": [{"name": "who"}, {"name": "who"}, {"name": ""}]},
                {"name": "broken"}
            ]})),
            prompt_bodies: BTreeMap::from([(
                "greet".to_string(),
                json!({"messages": [
                    {"role": "user", "content": {"type": "text", "text": "Hello"}},
                    {"role": "user", "content": {"type": "image", "data": "..."}},
                    {"role": "user", "content": [{"type": "text", "text": "World"}]}
                ]}),
            )]),
            closed: closed.clone(),
            ..Default::default()
        };
        let launcher = ScriptedLauncher(Mutex::new(Some(session)));
        let (log, warned) = warnings();
        let result = run_live(&launcher, &spec(), &log, DiscoveryTimeouts::default()).await;

        assert!(closed.load(Ordering::SeqCst));
        assert_eq!(result.reported_server_name.as_deref(), Some("demo"));
        assert_eq!(result.reported_server_version.as_deref(), Some("1.2.0"));
        assert_eq!(
            result.initialize_response,
            Some(json!({
                "protocolVersion": "2025-06-18",
                "capabilities": {"tools": {}, "prompts": {}},
                "serverInfo": {"name": "demo", "version": "1.2.0"}
            }))
        );
        assert_eq!(
            result.tools_list_response,
            Some(json!({"tools": [
                {"name": "b", "description": "B"},
                {"name": "a", "inputSchema": {"type": "object"}}
            ]}))
        );
        let names: Vec<&str> = result.tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);

        let greet = &result.prompts[0];
        assert_eq!(greet.arguments, Some(vec!["who".to_string()]));
        assert_eq!(greet.text.as_deref(), Some("Hello\nWorld"));
        let broken = &result.prompts[1];
        assert_eq!(broken.text.as_deref(), Some(""));
        assert_eq!(
            warned.lock().unwrap().as_slice(),
            &["Prompt 'broken' content fetch failed: protocol error: unknown prompt broken".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn ping_timeout_keeps_handshake_fields_only() {
        let closed = Arc::new(AtomicBool::new(false));
        let session = Scripted {
            initialize: Some(init_payload()),
            hang_on_ping: true,
            tools_pages: vec![json!({"tools": [{"name": "a"}]})],
            closed: closed.clone(),
            ..Default::default()
        };
        let launcher = ScriptedLauncher(Mutex::new(Some(session)));
        let (log, warned) = warnings();
        let result = run_live(&launcher, &spec(), &log, DiscoveryTimeouts::from_millis(200, 100)).await;

        assert!(closed.load(Ordering::SeqCst));
        assert!(result.tools.is_empty());
        assert!(result.tools_list_response.is_none());
        assert_eq!(result.reported_server_name.as_deref(), Some("demo"));
        assert!(result.initialize_response.is_some());
        let warned = warned.lock().unwrap();
        assert_eq!(warned.len(), 1);
        assert!(warned[0].contains("ping timed out"), "{}", warned[0]);
    }

    #[tokio::test(start_paused = true)]
    async fn initialize_hang_is_cut_at_initialize_limit() {
        let closed = Arc::new(AtomicBool::new(false));
        let session = Scripted {
            initialize: Some(init_payload()),
            hang_on_initialize: true,
            closed: closed.clone(),
            ..Default::default()
        };
        let launcher = ScriptedLauncher(Mutex::new(Some(session)));
        let (log, warned) = warnings();
        let started = tokio::time::Instant::now();
        let result = run_live(&launcher, &spec(), &log, DiscoveryTimeouts::from_millis(10_000, 100)).await;
        let elapsed = started.elapsed();

        assert_eq!(result, DiscoveryResult::default());
        assert!(closed.load(Ordering::SeqCst));
        assert!(elapsed >= Duration::from_millis(100), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(1), "{elapsed:?}");
        let warned = warned.lock().unwrap();
        assert_eq!(warned.len(), 1);
        assert!(warned[0].contains("initialize timed out after 100ms"), "{}", warned[0]);
    }

    #[tokio::test]
    async fn handshake_failure_returns_empty_result() {
        let session = Scripted::default();
        let launcher = ScriptedLauncher(Mutex::new(Some(session)));
        let (log, warned) = warnings();
        let result = run_live(&launcher, &spec(), &log, DiscoveryTimeouts::default()).await;
        assert_eq!(result, DiscoveryResult::default());
        assert!(warned.lock().unwrap()[0].starts_with("MCP client discovery failed"));
    }

    #[tokio::test]
    async fn unsupported_capabilities_are_not_queried() {
        let session = Scripted {
            initialize: Some(json!({"capabilities": {"tools": null}, "serverInfo": {"name": "x"}})),
            tools_pages: vec![json!({"tools": [{"name": "a"}]})],
            ..Default::default()
        };
        let (log, _) = warnings();
        let soft = SoftCall::new(Deadline::after(Duration::from_secs(1)), log);
        let result = interrogate(&session, &soft, Duration::from_secs(1)).await;
        assert!(result.tools.is_empty());
        assert!(result.prompts.is_empty());
        assert_eq!(session.tool_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn tool_listing_failure_still_lists_prompts() {
        let session = Scripted {
            initialize: Some(init_payload()),
            prompts: Some(json!({"prompts": [{"name": "p"}]})),
            prompt_bodies: BTreeMap::from([(
                "p".to_string(),
                json!({"messages": [{"content": {"type": "text", "text": "body"}}]}),
            )]),
            ..Default::default()
        };
        let (log, warned) = warnings();
        let soft = SoftCall::new(Deadline::after(Duration::from_secs(1)), log);
        let result = interrogate(&session, &soft, Duration::from_secs(1)).await;
        assert!(result.tools_list_response.is_none());
        assert_eq!(result.prompts.len(), 1);
        assert_eq!(result.prompts[0].text.as_deref(), Some("body"));
        assert!(warned.lock().unwrap()[0].starts_with("Tool discovery failed"));
    }

    fn manifest_with(command: &str, args: &[&str]) -> Manifest {
        Manifest {
            server: Some(ServerConfig {
                mcp_config: Some(McpConfig {
                    command: Some(command.into()),
                    args: Some(args.iter().map(|a| a.to_string()).collect()),
                    env: Some(BTreeMap::from([(
                        "DATA".to_string(),
                        "${__dirname}/data".to_string(),
                    )])),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            user_config: Some(BTreeMap::from([(
                "allowed_directories".to_string(),
                UserConfigOption {
                    required: Some(true),
                    multiple: Some(true),
                    ..Default::default()
                },
            )])),
            ..Default::default()
        }
    }

    #[test]
    fn materialize_expands_multi_value_arguments() {
        let manifest = manifest_with(
            "node",
            &["${__dirname}/server/index.js", "--allow", "${user_config.allowed_directories}"],
        );
        let mut overrides = UserConfigOverrides::default();
        overrides.push("allowed_directories", "/data/a");
        overrides.push("allowed_directories", "/data/b");
        let spec = materialize_launch(Path::new("/proj"), &manifest, &overrides).unwrap();
        let sep = |s: &str| s.replace('/', MAIN_SEPARATOR_STR);
        assert_eq!(spec.command, "node");
        assert_eq!(
            spec.args,
            vec![sep("/proj/server/index.js"), "--allow".to_string(), sep("/data/a"), sep("/data/b")]
        );
        assert_eq!(spec.env.get("DATA"), Some(&sep("/proj/data")));
    }

    #[test]
    fn materialize_rejects_missing_command() {
        let err = materialize_launch(Path::new("/p"), &Manifest::default(), &UserConfigOverrides::default())
            .unwrap_err();
        assert!(matches!(err, McpbError::InvalidConfiguration(_)));
        let blank = manifest_with("  ", &[]);
        let err = materialize_launch(Path::new("/p"), &blank, &UserConfigOverrides::default()).unwrap_err();
        assert!(matches!(err, McpbError::InvalidConfiguration(_)));
    }

    #[tokio::test]
    async fn guard_runs_before_any_source() {
        let manifest = manifest_with("node", &["${user_config.allowed_directories}"]);
        let overrides = UserConfigOverrides::default();
        let ctx = DiscoveryContext {
            base_dir: Path::new("/p"),
            manifest: &manifest,
            overrides: &overrides,
            log: DiscoveryLog::default(),
            timeouts: DiscoveryTimeouts::default(),
        };
        let fixed = FixedSource::from_lookup(|name| {
            (name == "MCPB_TOOL_DISCOVERY_JSON").then(|| "[\"a\"]".to_string())
        })
        .unwrap();
        let err = discover_with(&fixed, &ctx).await.unwrap_err();
        match err {
            McpbError::UserConfigRequired { keys } => assert_eq!(keys, vec!["allowed_directories"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    /// Runs only inside the child process started by
    /// `discover_reads_payloads_from_environment`.
    #[tokio::test]
    async fn environment_payload_child() {
        if std::env::var_os(TOOL_OVERRIDE_VAR).is_none() {
            return;
        }
        let manifest = Manifest {
            server: Some(ServerConfig {
                mcp_config: Some(McpConfig {
                    command: Some("mcpb-no-such-server".into()),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        };
        let overrides = UserConfigOverrides::default();
        let infos = Arc::new(Mutex::new(Vec::<String>::new()));
        let info_sink = infos.clone();
        let (_, warned) = warnings();
        let warn_sink = warned.clone();
        let log = DiscoveryLog::new(
            Some(Arc::new(move |m: &str| info_sink.lock().unwrap().push(m.to_string()))),
            Some(Arc::new(move |m: &str| warn_sink.lock().unwrap().push(m.to_string()))),
        );
        let ctx = DiscoveryContext {
            base_dir: Path::new("/p"),
            manifest: &manifest,
            overrides: &overrides,
            log,
            timeouts: DiscoveryTimeouts::from_millis(500, 500),
        };

        let result = discover(&ctx).await.unwrap();
        let names: Vec<&str> = result.tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "beta"]);
        assert!(result.prompts.is_empty());
        assert!(warned.lock().unwrap().is_empty(), "{:?}", warned.lock().unwrap());
        assert_eq!(
            infos.lock().unwrap().as_slice(),
            &["Discovering tools & prompts using: mcpb-no-such-server".to_string()]
        );
    }

    #[test]
    fn discover_reads_payloads_from_environment() {
        let path = module_path!().split_once("::").map_or(module_path!(), |(_, rest)| rest);
        let test = format!("{}::environment_payload_child", path);
        let mut cmd = std::process::Command::new(std::env::current_exe().unwrap());
        cmd.args([test.as_str(), "--exact", "--nocapture"])
            .env(TOOL_OVERRIDE_VAR, r#"["beta", {"name": "alpha", "description": "A"}]"#);
        for var in [PROMPT_OVERRIDE_VAR, INITIALIZE_OVERRIDE_VAR, TOOLS_LIST_OVERRIDE_VAR] {
            cmd.env_remove(var);
        }
        let out = cmd.output().unwrap();
        let stdout = String::from_utf8_lossy(&out.stdout);
        assert!(
            out.status.success(),
            "{stdout}\n{}",
            String::from_utf8_lossy(&out.stderr)
        );
        assert!(stdout.contains("1 passed"), "{stdout}");
    }

    #[test]
    fn prompt_text_ignores_non_text_blocks() {
        let body = json!({"messages": [
            {"content": {"type": "resource", "resource": {"text": "no"}}},
            {"content": {"type": "text", "text": "  "}},
            {"content": {"type": "text", "text": "yes"}}
        ]});
        assert_eq!(extract_prompt_text(&body), "yes");
        assert_eq!(extract_prompt_text(&json!({})), "");
    }
}
