//! Configuration for devflow workflows
//!
//! Configuration is assembled once at startup with precedence
//! CLI flags > config file > built-in defaults, and is read-only for the
//! rest of the process. The config file is optional TOML, either given via
//! `--config` or discovered as `devflow.toml` in the working directory.
//!
//! Credential resolution is the one fatal path: without an API key from the
//! `--api-key` flag or the environment, the process exits before any phase
//! runs.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Model identifiers accepted by `--llm-backend`.
pub const SUPPORTED_BACKENDS: &[&str] = &["o1-mini", "gpt-4o", "gpt-4-turbo", "gpt-4"];

/// Environment variables consulted for the API key, in order.
pub const API_KEY_ENV_VARS: &[&str] = &["DEVFLOW_API_KEY", "OPENAI_API_KEY"];

const DEFAULT_BACKEND: &str = "o1-mini";
const DEFAULT_RESEARCH_TOPIC: &str = "YOUR DEVELOPING IDEA";
const DEFAULT_CALL_TIMEOUT_SECS: u64 = 60;
const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 600;
const DEFAULT_MAX_TOKENS: u32 = 512;

/// CLI argument values that participate in configuration resolution.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config_path: Option<PathBuf>,
    pub api_key: Option<String>,
    pub llm_backend: Option<String>,
    pub research_topic: Option<String>,
    pub doc_path: Option<PathBuf>,
    pub append_docs: bool,
    pub verbose: bool,
}

/// How the documentation file is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Replace the file contents.
    Overwrite,
    /// Append to the existing file, separated by a blank line.
    Append,
}

/// A named build step. Steps without a configured command are logged
/// placeholders, mirroring a build system that is wired up incrementally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildStep {
    pub name: String,
    /// Command as an argument vector; first element is the executable.
    pub command: Option<Vec<String>>,
}

impl BuildStep {
    fn placeholder(name: &str) -> Self {
        Self {
            name: name.to_string(),
            command: None,
        }
    }
}

/// Build phase settings.
#[derive(Debug, Clone)]
pub struct BuildSettings {
    pub steps: Vec<BuildStep>,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            steps: vec![
                BuildStep::placeholder("clean"),
                BuildStep::placeholder("compile"),
                BuildStep::placeholder("link"),
                BuildStep::placeholder("generate"),
            ],
        }
    }
}

/// Test phase settings.
#[derive(Debug, Clone)]
pub struct TestSettings {
    /// Test runner as an argument vector; first element is the executable.
    pub command: Vec<String>,
}

impl Default for TestSettings {
    fn default() -> Self {
        Self {
            command: vec![
                "pytest".to_string(),
                "--maxfail=1".to_string(),
                "--disable-warnings".to_string(),
                "-q".to_string(),
            ],
        }
    }
}

/// Deploy phase settings. Unset commands make the corresponding sub-step a
/// logged no-op.
#[derive(Debug, Clone, Default)]
pub struct DeploySettings {
    pub package_command: Option<Vec<String>>,
    pub deploy_command: Option<Vec<String>>,
}

/// Documentation phase settings.
#[derive(Debug, Clone)]
pub struct DocSettings {
    pub path: PathBuf,
    pub mode: WriteMode,
    pub project_summary: String,
    pub structure_overview: String,
}

impl Default for DocSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("README.md"),
            mode: WriteMode::Overwrite,
            project_summary: "DevFlow is an automated development process that integrates \
                              planning, building, testing, deployment, and documentation \
                              generation using AI-powered agents."
                .to_string(),
            structure_overview: "project/\n\
                                 ├── src/\n\
                                 ├── tests/\n\
                                 ├── docs/\n\
                                 └── README.md\n"
                .to_string(),
        }
    }
}

/// Immutable workflow configuration, created once at startup.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    pub api_key: String,
    /// Model identifier for all completion calls.
    pub llm_backend: String,
    pub research_topic: String,
    /// Requirement notes consumed by the planning phase.
    pub task_notes: Vec<String>,
    pub build: BuildSettings,
    pub test: TestSettings,
    pub deploy: DeploySettings,
    pub docs: DocSettings,
    /// Bound on every external completion call.
    pub call_timeout: Duration,
    /// Bound on every subprocess invocation.
    pub command_timeout: Duration,
    /// Token cap for completion responses.
    pub max_tokens: u32,
}

impl WorkflowConfig {
    /// Resolve the effective configuration from CLI arguments, an optional
    /// config file, the environment, and built-in defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when no credential is resolvable, when the
    /// requested backend is unknown, or when an explicit config file cannot
    /// be read or parsed.
    pub fn resolve(args: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(args.config_path.as_deref())?;

        let api_key = resolve_api_key(args, &file)?;

        let llm_backend = args
            .llm_backend
            .clone()
            .or_else(|| file.llm.as_ref().and_then(|l| l.backend.clone()))
            .unwrap_or_else(|| DEFAULT_BACKEND.to_string());
        if !SUPPORTED_BACKENDS.contains(&llm_backend.as_str()) {
            return Err(ConfigError::UnsupportedBackend {
                backend: llm_backend,
                supported: SUPPORTED_BACKENDS.join(", "),
            });
        }

        let research_topic = args
            .research_topic
            .clone()
            .or_else(|| file.workflow.as_ref().and_then(|w| w.research_topic.clone()))
            .unwrap_or_else(|| DEFAULT_RESEARCH_TOPIC.to_string());

        let task_notes = file
            .workflow
            .as_ref()
            .and_then(|w| w.task_notes.clone())
            .unwrap_or_else(default_task_notes);

        let build = match file.build.as_ref().and_then(|b| b.steps.clone()) {
            Some(steps) => BuildSettings {
                steps: steps
                    .into_iter()
                    .map(|s| BuildStep {
                        name: s.name,
                        command: s.command,
                    })
                    .collect(),
            },
            None => BuildSettings::default(),
        };

        let test = match file.test.as_ref().and_then(|t| t.command.clone()) {
            Some(command) => TestSettings { command },
            None => TestSettings::default(),
        };

        let deploy = DeploySettings {
            package_command: file.deploy.as_ref().and_then(|d| d.package_command.clone()),
            deploy_command: file.deploy.as_ref().and_then(|d| d.deploy_command.clone()),
        };

        let mut docs = DocSettings::default();
        if let Some(table) = file.docs.as_ref() {
            if let Some(path) = &table.path {
                docs.path = path.clone();
            }
            if table.append == Some(true) {
                docs.mode = WriteMode::Append;
            }
            if let Some(summary) = &table.project_summary {
                docs.project_summary = summary.clone();
            }
            if let Some(overview) = &table.structure_overview {
                docs.structure_overview = overview.clone();
            }
        }
        if let Some(path) = &args.doc_path {
            docs.path = path.clone();
        }
        if args.append_docs {
            docs.mode = WriteMode::Append;
        }

        let call_timeout = Duration::from_secs(
            file.llm
                .as_ref()
                .and_then(|l| l.timeout_seconds)
                .unwrap_or(DEFAULT_CALL_TIMEOUT_SECS),
        );

        let command_timeout = Duration::from_secs(
            file.workflow
                .as_ref()
                .and_then(|w| w.command_timeout_seconds)
                .unwrap_or(DEFAULT_COMMAND_TIMEOUT_SECS),
        );

        let max_tokens = file
            .llm
            .as_ref()
            .and_then(|l| l.max_tokens)
            .unwrap_or(DEFAULT_MAX_TOKENS);

        Ok(Self {
            api_key,
            llm_backend,
            research_topic,
            task_notes,
            build,
            test,
            deploy,
            docs,
            call_timeout,
            command_timeout,
            max_tokens,
        })
    }

    /// A valid configuration for tests, with no environment or file access.
    #[must_use]
    pub fn minimal_for_testing() -> Self {
        Self {
            api_key: "test-key".to_string(),
            llm_backend: DEFAULT_BACKEND.to_string(),
            research_topic: "test topic".to_string(),
            task_notes: default_task_notes(),
            build: BuildSettings::default(),
            test: TestSettings::default(),
            deploy: DeploySettings::default(),
            docs: DocSettings::default(),
            call_timeout: Duration::from_secs(5),
            command_timeout: Duration::from_secs(30),
            max_tokens: 64,
        }
    }
}

fn default_task_notes() -> Vec<String> {
    vec![
        "Setup development environment".to_string(),
        "Implement core features".to_string(),
        "Write unit tests".to_string(),
        "Prepare deployment scripts".to_string(),
    ]
}

// ---------------------------------------------------------------------------
// Config file model
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    llm: Option<LlmTable>,
    workflow: Option<WorkflowTable>,
    build: Option<BuildTable>,
    test: Option<TestTable>,
    deploy: Option<DeployTable>,
    docs: Option<DocsTable>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmTable {
    backend: Option<String>,
    max_tokens: Option<u32>,
    timeout_seconds: Option<u64>,
    /// Name of an environment variable to read the API key from, checked
    /// before the built-in ones.
    api_key_env: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkflowTable {
    research_topic: Option<String>,
    task_notes: Option<Vec<String>>,
    command_timeout_seconds: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct BuildTable {
    steps: Option<Vec<BuildStepEntry>>,
}

#[derive(Debug, Clone, Deserialize)]
struct BuildStepEntry {
    name: String,
    command: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct TestTable {
    command: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct DeployTable {
    package_command: Option<Vec<String>>,
    deploy_command: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct DocsTable {
    path: Option<PathBuf>,
    append: Option<bool>,
    project_summary: Option<String>,
    structure_overview: Option<String>,
}

fn load_config_file(explicit: Option<&Path>) -> Result<ConfigFile, ConfigError> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let discovered = PathBuf::from("devflow.toml");
            if discovered.is_file() {
                discovered
            } else {
                return Ok(ConfigFile::default());
            }
        }
    };

    let raw = std::fs::read_to_string(&path).map_err(|e| ConfigError::File {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    toml::from_str(&raw).map_err(|e| ConfigError::File {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

fn resolve_api_key(args: &CliArgs, file: &ConfigFile) -> Result<String, ConfigError> {
    if let Some(key) = &args.api_key
        && !key.is_empty()
    {
        return Ok(key.clone());
    }

    let mut candidates: Vec<String> = Vec::new();
    if let Some(custom) = file.llm.as_ref().and_then(|l| l.api_key_env.clone()) {
        candidates.push(custom);
    }
    candidates.extend(API_KEY_ENV_VARS.iter().map(ToString::to_string));

    for var in &candidates {
        if let Ok(value) = std::env::var(var)
            && !value.is_empty()
        {
            return Ok(value);
        }
    }

    Err(ConfigError::MissingCredential {
        env_vars: candidates.join(" / "),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use std::sync::{Mutex, OnceLock};

    // Single lock for all tests that touch environment variables, so
    // env-mutating tests never run concurrently with each other.
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_guard() -> std::sync::MutexGuard<'static, ()> {
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().unwrap()
    }

    fn clear_key_env() {
        // SAFETY: guarded by ENV_LOCK; no other thread mutates the
        // environment concurrently within this test binary.
        unsafe {
            for var in API_KEY_ENV_VARS {
                std::env::remove_var(var);
            }
        }
    }

    fn args_with_key() -> CliArgs {
        CliArgs {
            api_key: Some("cli-key".to_string()),
            ..CliArgs::default()
        }
    }

    #[test]
    fn test_defaults() {
        let _guard = env_guard();
        clear_key_env();

        let config = WorkflowConfig::resolve(&args_with_key()).unwrap();
        assert_eq!(config.api_key, "cli-key");
        assert_eq!(config.llm_backend, "o1-mini");
        assert_eq!(config.research_topic, "YOUR DEVELOPING IDEA");
        assert_eq!(config.task_notes.len(), 4);
        assert_eq!(config.build.steps.len(), 4);
        assert!(config.build.steps.iter().all(|s| s.command.is_none()));
        assert_eq!(config.test.command[0], "pytest");
        assert!(config.deploy.package_command.is_none());
        assert_eq!(config.docs.path, PathBuf::from("README.md"));
        assert_eq!(config.docs.mode, WriteMode::Overwrite);
        assert_eq!(config.call_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_missing_credential_is_fatal() {
        let _guard = env_guard();
        clear_key_env();

        let result = WorkflowConfig::resolve(&CliArgs::default());
        match result {
            Err(ConfigError::MissingCredential { env_vars }) => {
                assert!(env_vars.contains("DEVFLOW_API_KEY"));
                assert!(env_vars.contains("OPENAI_API_KEY"));
            }
            other => panic!("expected MissingCredential, got {other:?}"),
        }
    }

    #[test]
    fn test_credential_from_environment() {
        let _guard = env_guard();
        clear_key_env();
        // SAFETY: guarded by ENV_LOCK.
        unsafe {
            std::env::set_var("DEVFLOW_API_KEY", "env-key");
        }

        let config = WorkflowConfig::resolve(&CliArgs::default()).unwrap();
        assert_eq!(config.api_key, "env-key");

        clear_key_env();
    }

    #[test]
    fn test_cli_key_beats_environment() {
        let _guard = env_guard();
        clear_key_env();
        // SAFETY: guarded by ENV_LOCK.
        unsafe {
            std::env::set_var("DEVFLOW_API_KEY", "env-key");
        }

        let config = WorkflowConfig::resolve(&args_with_key()).unwrap();
        assert_eq!(config.api_key, "cli-key");

        clear_key_env();
    }

    #[test]
    fn test_unsupported_backend_rejected() {
        let _guard = env_guard();
        clear_key_env();

        let mut args = args_with_key();
        args.llm_backend = Some("gpt-5000".to_string());

        match WorkflowConfig::resolve(&args) {
            Err(ConfigError::UnsupportedBackend { backend, supported }) => {
                assert_eq!(backend, "gpt-5000");
                assert!(supported.contains("o1-mini"));
            }
            other => panic!("expected UnsupportedBackend, got {other:?}"),
        }
    }

    #[test]
    fn test_config_file_merging_and_cli_precedence() {
        let _guard = env_guard();
        clear_key_env();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devflow.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"
[llm]
backend = "gpt-4o"
max_tokens = 256
timeout_seconds = 30

[workflow]
research_topic = "file topic"
task_notes = ["note one", "note two"]

[test]
command = ["cargo", "test", "--quiet"]

[deploy]
package_command = ["tar", "-czf", "dist.tar.gz", "src"]

[docs]
path = "DOCS.md"
append = true
"#
        )
        .unwrap();

        let mut args = args_with_key();
        args.config_path = Some(path);
        let config = WorkflowConfig::resolve(&args).unwrap();

        assert_eq!(config.llm_backend, "gpt-4o");
        assert_eq!(config.max_tokens, 256);
        assert_eq!(config.call_timeout, Duration::from_secs(30));
        assert_eq!(config.research_topic, "file topic");
        assert_eq!(config.task_notes, vec!["note one", "note two"]);
        assert_eq!(config.test.command, vec!["cargo", "test", "--quiet"]);
        assert_eq!(
            config.deploy.package_command.as_deref(),
            Some(["tar", "-czf", "dist.tar.gz", "src"].map(String::from).as_slice())
        );
        assert_eq!(config.docs.path, PathBuf::from("DOCS.md"));
        assert_eq!(config.docs.mode, WriteMode::Append);

        // A CLI flag overrides the file value.
        args.llm_backend = Some("gpt-4".to_string());
        args.research_topic = Some("cli topic".to_string());
        let config = WorkflowConfig::resolve(&args).unwrap();
        assert_eq!(config.llm_backend, "gpt-4");
        assert_eq!(config.research_topic, "cli topic");
    }

    #[test]
    fn test_invalid_config_file_is_reported() {
        let _guard = env_guard();
        clear_key_env();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devflow.toml");
        std::fs::write(&path, "not = [valid").unwrap();

        let mut args = args_with_key();
        args.config_path = Some(path);
        match WorkflowConfig::resolve(&args) {
            Err(ConfigError::File { path, .. }) => assert!(path.contains("devflow.toml")),
            other => panic!("expected File error, got {other:?}"),
        }
    }

    #[test]
    fn test_doc_flags_override() {
        let _guard = env_guard();
        clear_key_env();

        let mut args = args_with_key();
        args.doc_path = Some(PathBuf::from("out/NOTES.md"));
        args.append_docs = true;

        let config = WorkflowConfig::resolve(&args).unwrap();
        assert_eq!(config.docs.path, PathBuf::from("out/NOTES.md"));
        assert_eq!(config.docs.mode, WriteMode::Append);
    }

    #[test]
    fn test_minimal_for_testing_is_self_contained() {
        let config = WorkflowConfig::minimal_for_testing();
        assert!(!config.api_key.is_empty());
        assert!(SUPPORTED_BACKENDS.contains(&config.llm_backend.as_str()));
        assert!(!config.task_notes.is_empty());
    }
}
