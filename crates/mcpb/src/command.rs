//! The `validate` command: schema checks, optional discovery, reconciliation,
//! and the atomic rewrite in update mode.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use crate::config::DiscoveryTimeouts;
use crate::error::{McpbError, Result};
use crate::manifest::{
    Manifest, ManifestSchema, StructuralValidator, ValidationIssue, missing_referenced_files,
};
use crate::mcp::{DiscoveryContext, DiscoveryLog, DiscoverySource, discover, discover_with};
use crate::reconcile::{Mode, prompt_text_warnings, reconcile, verify_convergence};
use crate::user_config::parse_user_config_options;

pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// Parsed `validate` arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidateArgs {
    /// Manifest file, or the directory holding `manifest.json`.
    pub manifest: PathBuf,
    pub dirname: Option<PathBuf>,
    pub update: bool,
    pub discover: bool,
    pub user_config: Vec<String>,
}

impl ValidateArgs {
    /// Discovery is opt-in through any of the discovery flags.
    pub fn runs_discovery(&self) -> bool {
        self.dirname.is_some() || self.update || self.discover
    }

    pub fn mode(&self) -> Mode {
        if self.update {
            Mode::Update
        } else if self.discover {
            Mode::Discover
        } else {
            Mode::Report
        }
    }
}

pub struct Validator {
    schema: Box<dyn ManifestSchema>,
    source: Option<Box<dyn DiscoverySource>>,
    log: DiscoveryLog,
    timeouts: DiscoveryTimeouts,
}

impl Validator {
    pub fn new(log: DiscoveryLog, timeouts: DiscoveryTimeouts) -> Self {
        Self {
            schema: Box::new(StructuralValidator),
            source: None,
            log,
            timeouts,
        }
    }

    /// Replace the default source (environment overrides, else a live server).
    pub fn with_source(mut self, source: Box<dyn DiscoverySource>) -> Self {
        self.source = Some(source);
        self
    }

    pub async fn run(&self, args: &ValidateArgs) -> Result<()> {
        let path = resolve_manifest_path(&args.manifest);
        if !path.is_file() {
            return Err(McpbError::ManifestNotFound(path));
        }
        let content = std::fs::read_to_string(&path)?;

        let (errors, warnings): (Vec<ValidationIssue>, Vec<ValidationIssue>) = self
            .schema
            .validate_json(&content)
            .into_iter()
            .partition(ValidationIssue::is_error);
        for warning in &warnings {
            self.log.warn(&warning.to_string());
        }
        if !errors.is_empty() {
            return Err(McpbError::SchemaInvalid { issues: errors });
        }

        if args.runs_discovery() {
            let mut manifest = Manifest::from_json(&content)?;
            self.reconcile_with_server(args, &path, &mut manifest).await?;
        }

        self.log.info("Manifest is valid!");
        Ok(())
    }

    async fn reconcile_with_server(
        &self,
        args: &ValidateArgs,
        path: &Path,
        manifest: &mut Manifest,
    ) -> Result<()> {
        let base_dir = base_dir_for(args, path)?;
        let missing = missing_referenced_files(manifest, &base_dir);
        if !missing.is_empty() {
            return Err(McpbError::MissingFiles { messages: missing });
        }
        let overrides = parse_user_config_options(&args.user_config)?;

        let ctx = DiscoveryContext {
            base_dir: &base_dir,
            manifest: &*manifest,
            overrides: &overrides,
            log: self.log.clone(),
            timeouts: self.timeouts,
        };
        let discovery = match &self.source {
            Some(source) => discover_with(source.as_ref(), &ctx).await?,
            None => discover(&ctx).await?,
        };
        for warning in prompt_text_warnings(manifest, &discovery.prompts) {
            self.log.warn(&warning);
        }

        let mode = args.mode();
        let reconciled = reconcile(mode, manifest, &discovery)?;
        if mode == Mode::Update {
            if reconciled.changed {
                write_atomic(path, &manifest.to_json_pretty()?)?;
                self.log
                    .info("Updated manifest.json capabilities to match discovered results.");
            }
            verify_convergence(manifest, &discovery, self.schema.as_ref())?;
        }
        Ok(())
    }
}

/// A directory argument means its `manifest.json`.
pub fn resolve_manifest_path(input: &Path) -> PathBuf {
    if input.is_dir() {
        input.join(MANIFEST_FILE_NAME)
    } else {
        input.to_path_buf()
    }
}

/// `--dirname` when given, else the manifest's own directory; always absolute.
fn base_dir_for(args: &ValidateArgs, manifest_path: &Path) -> Result<PathBuf> {
    let dir = match &args.dirname {
        Some(dir) => dir.clone(),
        None => manifest_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    Ok(std::path::absolute(dir)?)
}

/// Replace `path` in one step through a sibling temp file.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// User-facing lines for a failed command.
pub fn error_lines(error: &McpbError) -> Vec<String> {
    match error {
        McpbError::SchemaInvalid { issues } => {
            let mut lines = vec!["ERROR: Manifest validation failed:".to_string()];
            lines.extend(issues.iter().map(|i| format!("  - {}", i)));
            lines
        }
        McpbError::ReconciliationMismatch { messages, summary } => messages
            .iter()
            .chain(std::iter::once(summary))
            .map(|m| format!("ERROR: {}", m))
            .collect(),
        McpbError::ConvergenceFailure { messages } => {
            let mut lines =
                vec!["ERROR: manifest.json still differs from the server after update:".to_string()];
            lines.extend(messages.iter().map(|m| format!("  - {}", m)));
            lines
        }
        McpbError::MissingFiles { messages } => {
            messages.iter().map(|m| format!("ERROR: {}", m)).collect()
        }
        other => other
            .to_string()
            .lines()
            .enumerate()
            .map(|(i, l)| if i == 0 { format!("ERROR: {}", l) } else { l.to_string() })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ToolInfo;
    use crate::mcp::{DiscoveryResult, FixedSource, LogSink, PromptInfo};
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    const MANIFEST: &str = r#"{
        "manifest_version": "0.3",
        "name": "demo",
        "version": "1.0.0",
        "description": "Demo bundle",
        "author": {"name": "Someone"},
        "server": {
            "type": "node",
            "entry_point": "server/index.js",
            "mcp_config": {
                "command": "node",
                "args": ["${__dirname}/server/index.js", "--key=${user_config.api_key}"]
            }
        },
        "user_config": {
            "api_key": {"type": "string", "title": "API key", "required": true}
        },
        "tools": [{"name": "old_tool", "description": "Gone"}]
    }"#;

    #[derive(Default, Clone)]
    struct Captured {
        info: Arc<Mutex<Vec<String>>>,
        warn: Arc<Mutex<Vec<String>>>,
    }

    impl Captured {
        fn log(&self) -> DiscoveryLog {
            let info = self.info.clone();
            let warn = self.warn.clone();
            let info: LogSink = Arc::new(move |m: &str| info.lock().unwrap().push(m.to_string()));
            let warn: LogSink = Arc::new(move |m: &str| warn.lock().unwrap().push(m.to_string()));
            DiscoveryLog::new(Some(info), Some(warn))
        }

        fn infos(&self) -> Vec<String> {
            self.info.lock().unwrap().clone()
        }

        fn warnings(&self) -> Vec<String> {
            self.warn.lock().unwrap().clone()
        }
    }

    fn bundle(manifest: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("server")).unwrap();
        std::fs::write(dir.path().join("server/index.js"), "").unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE_NAME), manifest).unwrap();
        dir
    }

    fn discovered() -> DiscoveryResult {
        DiscoveryResult {
            tools: vec![
                ToolInfo::new("write_file", None),
                ToolInfo::new("read_file", Some("Read a file")),
                ToolInfo::new("read_file", None),
            ],
            prompts: vec![PromptInfo {
                name: "greet".into(),
                text: Some(String::new()),
                ..Default::default()
            }],
            initialize_response: Some(json!({"protocolVersion": "2025-06-18"})),
            tools_list_response: Some(json!({"tools": [{"name": "read_file"}, {"name": "write_file"}]})),
            reported_server_name: None,
            reported_server_version: None,
        }
    }

    fn validator(captured: &Captured) -> Validator {
        Validator::new(captured.log(), DiscoveryTimeouts::default())
            .with_source(Box::new(FixedSource::new(discovered())))
    }

    fn args(dir: &Path) -> ValidateArgs {
        ValidateArgs {
            manifest: dir.to_path_buf(),
            user_config: vec!["api_key=secret".into()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn missing_manifest_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = validator(&Captured::default())
            .run(&args(dir.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, McpbError::ManifestNotFound(_)));
        assert!(error_lines(&err)[0].starts_with("ERROR: File not found: "));
    }

    #[tokio::test]
    async fn schema_only_when_no_discovery_flag() {
        let dir = bundle(MANIFEST);
        let captured = Captured::default();
        validator(&captured).run(&args(dir.path())).await.unwrap();
        assert_eq!(captured.infos(), vec!["Manifest is valid!"]);
    }

    #[tokio::test]
    async fn schema_errors_are_listed() {
        let dir = bundle(r#"{"manifest_version": "0.3", "name": "demo"}"#);
        let err = validator(&Captured::default())
            .run(&args(dir.path()))
            .await
            .unwrap_err();
        let lines = error_lines(&err);
        assert_eq!(lines[0], "ERROR: Manifest validation failed:");
        assert!(lines.contains(&"  - version: version is required".to_string()));
    }

    #[tokio::test]
    async fn report_mode_fails_on_differences() {
        let dir = bundle(MANIFEST);
        let mut a = args(dir.path());
        a.dirname = Some(dir.path().to_path_buf());
        let err = validator(&Captured::default()).run(&a).await.unwrap_err();
        let lines = error_lines(&err);
        assert!(lines.last().unwrap().contains("--update"), "{lines:?}");
        let on_disk = std::fs::read_to_string(dir.path().join(MANIFEST_FILE_NAME)).unwrap();
        assert_eq!(on_disk, MANIFEST);
    }

    #[tokio::test]
    async fn update_rewrites_and_converges() {
        let dir = bundle(MANIFEST);
        let captured = Captured::default();
        let mut a = args(dir.path());
        a.update = true;
        validator(&captured).run(&a).await.unwrap();

        let written = std::fs::read_to_string(dir.path().join(MANIFEST_FILE_NAME)).unwrap();
        let manifest = Manifest::from_json(&written).unwrap();
        let names: Vec<&str> = manifest.tools_or_empty().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["read_file", "write_file"]);
        assert_eq!(
            manifest.tools_or_empty()[0].description.as_deref(),
            Some("Read a file")
        );
        assert_eq!(
            captured.infos(),
            vec![
                "Updated manifest.json capabilities to match discovered results.",
                "Manifest is valid!"
            ]
        );
        assert!(
            captured
                .warnings()
                .iter()
                .any(|w| w.starts_with("Prompt 'greet' did not return text")),
            "{:?}",
            captured.warnings()
        );

        // The rewritten bundle now passes discover mode untouched.
        let before = std::fs::read_to_string(dir.path().join(MANIFEST_FILE_NAME)).unwrap();
        let mut probe = args(dir.path());
        probe.discover = true;
        validator(&Captured::default()).run(&probe).await.unwrap();
        let after = std::fs::read_to_string(dir.path().join(MANIFEST_FILE_NAME)).unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn missing_required_user_config_aborts_before_discovery() {
        let dir = bundle(MANIFEST);
        let mut a = args(dir.path());
        a.update = true;
        a.user_config.clear();
        let err = validator(&Captured::default()).run(&a).await.unwrap_err();
        assert!(matches!(err, McpbError::UserConfigRequired { ref keys } if keys == &["api_key"]));
        let on_disk = std::fs::read_to_string(dir.path().join(MANIFEST_FILE_NAME)).unwrap();
        assert_eq!(on_disk, MANIFEST);
    }

    #[tokio::test]
    async fn missing_entry_point_is_fatal_when_discovering() {
        let dir = bundle(MANIFEST);
        std::fs::remove_file(dir.path().join("server/index.js")).unwrap();
        let mut a = args(dir.path());
        a.discover = true;
        let err = validator(&Captured::default()).run(&a).await.unwrap_err();
        assert_eq!(
            error_lines(&err),
            vec!["ERROR: Missing entry_point file: server/index.js"]
        );
    }

    #[test]
    fn atomic_write_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.json");
        std::fs::write(&path, "old").unwrap();
        write_atomic(&path, "new").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn mode_follows_flags() {
        let mut a = ValidateArgs::default();
        assert!(!a.runs_discovery());
        a.dirname = Some(PathBuf::from("."));
        assert_eq!(a.mode(), Mode::Report);
        a.discover = true;
        assert_eq!(a.mode(), Mode::Discover);
        a.discover = false;
        a.update = true;
        assert_eq!(a.mode(), Mode::Update);
    }
}
