//! Phase agent implementations
//!
//! One agent per pipeline stage, all behind the shared [`PhaseAgent`]
//! trait. The agents differ in what they do (planning calls, build steps,
//! subprocesses, file writes), not in how they call the completion service:
//! the shared [`advisory_suggestion`] helper carries every informational
//! LLM call, and its failures never affect a phase's status.
//!
//! Advisory calls reuse the configured per-call timeout and run after the
//! phase's main work, so they can extend wall-clock duration but never
//! change the outcome.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::fs::{self, OpenOptions};
use std::io::{self, Write as _};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{WorkflowConfig, WriteMode};
use crate::error::CompletionError;
use crate::llm::{CompletionRequest, LlmBackend, Message, NO_SUGGESTION};
use crate::phase::{PhaseAgent, PhaseId, PhaseResult};
use crate::runner::{CommandSpec, ProcessRunner};

/// Text written when documentation generation fails but the phase still
/// has to produce an artifact on disk.
const DOC_GENERATION_FAILED: &str = "Documentation generation failed.";

/// Build the five agents in pipeline order.
#[must_use]
pub fn default_agents(
    llm: Arc<dyn LlmBackend>,
    runner: Arc<dyn ProcessRunner>,
) -> Vec<Box<dyn PhaseAgent>> {
    vec![
        Box::new(PlanAgent::new(llm.clone())),
        Box::new(BuildAgent::new(llm.clone(), runner.clone())),
        Box::new(TestAgent::new(llm.clone(), runner.clone())),
        Box::new(DeployAgent::new(llm.clone(), runner)),
        Box::new(DocumentAgent::new(llm)),
    ]
}

/// Perform one blocking completion call for a phase.
async fn completion(
    llm: &dyn LlmBackend,
    config: &WorkflowConfig,
    system: &str,
    user: String,
) -> Result<String, CompletionError> {
    let req = CompletionRequest::new(
        &config.llm_backend,
        vec![Message::system(system), Message::user(user)],
        config.max_tokens,
        config.call_timeout,
    );
    llm.complete(req).await
}

/// Request an advisory suggestion. Failures are logged as warnings and
/// degrade to [`NO_SUGGESTION`]; they never affect phase status.
async fn advisory_suggestion(
    llm: &dyn LlmBackend,
    config: &WorkflowConfig,
    system: &str,
    user: String,
) -> String {
    match completion(llm, config, system, user).await {
        Ok(text) if !text.is_empty() => text,
        Ok(_) => NO_SUGGESTION.to_string(),
        Err(err) => {
            warn!(error = %err, "advisory suggestion call failed");
            NO_SUGGESTION.to_string()
        }
    }
}

/// Keep at most the last `max` characters of captured output for details.
fn tail(text: &str, max: usize) -> &str {
    let trimmed = text.trim();
    if trimmed.len() <= max {
        return trimmed;
    }
    let mut start = trimmed.len() - max;
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    &trimmed[start..]
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// Turns requirement notes into a task breakdown, one completion call per
/// requirement. A failed call degrades that requirement to a locally
/// derived task line; the phase itself never fails on completion errors.
pub struct PlanAgent {
    llm: Arc<dyn LlmBackend>,
}

impl PlanAgent {
    #[must_use]
    pub fn new(llm: Arc<dyn LlmBackend>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl PhaseAgent for PlanAgent {
    fn id(&self) -> PhaseId {
        PhaseId::Plan
    }

    async fn execute(&self, config: &WorkflowConfig) -> Result<PhaseResult> {
        let started = Utc::now();
        info!(requirements = config.task_notes.len(), "formulating plan");

        let mut tasks = Vec::with_capacity(config.task_notes.len());
        for requirement in &config.task_notes {
            let expanded = completion(
                self.llm.as_ref(),
                config,
                "You are an expert software project planner.",
                format!(
                    "Expand the following requirement into a short, concrete task breakdown: \
                     {requirement}"
                ),
            )
            .await;

            match expanded {
                Ok(breakdown) => tasks.push(format!("{requirement}: {breakdown}")),
                Err(err) => {
                    warn!(requirement = %requirement, error = %err, "requirement expansion failed");
                    tasks.push(format!("Handle: {requirement}"));
                }
            }
        }

        Ok(PhaseResult::success(PhaseId::Plan, tasks.join("\n"), started))
    }
}

// ---------------------------------------------------------------------------
// Build
// ---------------------------------------------------------------------------

/// Runs the fixed build step sequence. Steps without a configured command
/// are logged placeholders; a configured command that exits non-zero fails
/// the phase with the captured stderr.
pub struct BuildAgent {
    llm: Arc<dyn LlmBackend>,
    runner: Arc<dyn ProcessRunner>,
}

impl BuildAgent {
    #[must_use]
    pub fn new(llm: Arc<dyn LlmBackend>, runner: Arc<dyn ProcessRunner>) -> Self {
        Self { llm, runner }
    }
}

#[async_trait]
impl PhaseAgent for BuildAgent {
    fn id(&self) -> PhaseId {
        PhaseId::Build
    }

    async fn execute(&self, config: &WorkflowConfig) -> Result<PhaseResult> {
        let started = Utc::now();

        for step in &config.build.steps {
            match &step.command {
                None => {
                    info!(step = %step.name, "no command configured, step is a no-op");
                }
                Some(argv) => {
                    let Some(cmd) = CommandSpec::from_argv(argv) else {
                        return Ok(PhaseResult::failure(
                            PhaseId::Build,
                            format!("build step '{}' has an empty command", step.name),
                            started,
                        ));
                    };
                    info!(step = %step.name, command = %cmd.display_line(), "running build step");

                    let output = match self.runner.run(&cmd, config.command_timeout).await {
                        Ok(output) => output,
                        Err(err) => {
                            return Ok(PhaseResult::failure(
                                PhaseId::Build,
                                format!("build step '{}' failed to run: {err}", step.name),
                                started,
                            ));
                        }
                    };
                    if !output.success() {
                        return Ok(PhaseResult::failure(
                            PhaseId::Build,
                            format!(
                                "build step '{}' exited with code {}: {}",
                                step.name,
                                output.exit_code.unwrap_or(-1),
                                tail(&output.stderr_string(), 400),
                            ),
                            started,
                        ));
                    }
                }
            }
        }

        let suggestion = advisory_suggestion(
            self.llm.as_ref(),
            config,
            "You are an expert in build optimization.",
            "How can I optimize the build process for faster compilation?".to_string(),
        )
        .await;
        info!(suggestion = %suggestion, "build optimization suggestion");

        let step_names: Vec<&str> = config.build.steps.iter().map(|s| s.name.as_str()).collect();
        Ok(PhaseResult::success(
            PhaseId::Build,
            format!("completed steps: {}", step_names.join(", ")),
            started,
        ))
    }
}

// ---------------------------------------------------------------------------
// Test
// ---------------------------------------------------------------------------

/// Runs the configured test runner as a subprocess. Phase success is
/// exactly exit code 0; stdout and stderr are captured, never streamed.
pub struct TestAgent {
    llm: Arc<dyn LlmBackend>,
    runner: Arc<dyn ProcessRunner>,
}

impl TestAgent {
    #[must_use]
    pub fn new(llm: Arc<dyn LlmBackend>, runner: Arc<dyn ProcessRunner>) -> Self {
        Self { llm, runner }
    }

    async fn run_test_suite(&self, config: &WorkflowConfig) -> (bool, String) {
        let Some(cmd) = CommandSpec::from_argv(&config.test.command) else {
            return (false, "no test command configured".to_string());
        };

        if which::which(&cmd.program).is_err() {
            return (
                false,
                format!(
                    "test runner '{}' not found in PATH",
                    cmd.program.to_string_lossy()
                ),
            );
        }

        info!(command = %cmd.display_line(), "running test suite");
        let output = match self.runner.run(&cmd, config.command_timeout).await {
            Ok(output) => output,
            Err(err) => return (false, format!("test runner failed to run: {err}")),
        };

        let stdout = output.stdout_string();
        let stderr = output.stderr_string();
        if !stdout.trim().is_empty() {
            info!(output = %tail(&stdout, 400), "test runner output");
        }
        if !stderr.trim().is_empty() {
            warn!(output = %tail(&stderr, 400), "test runner errors");
        }

        if output.success() {
            (true, "all tests passed".to_string())
        } else {
            let detail = if stderr.trim().is_empty() {
                tail(&stdout, 400).to_string()
            } else {
                tail(&stderr, 400).to_string()
            };
            (
                false,
                format!(
                    "test runner exited with code {}: {detail}",
                    output.exit_code.unwrap_or(-1)
                ),
            )
        }
    }
}

#[async_trait]
impl PhaseAgent for TestAgent {
    fn id(&self) -> PhaseId {
        PhaseId::Test
    }

    async fn execute(&self, config: &WorkflowConfig) -> Result<PhaseResult> {
        let started = Utc::now();

        let (passed, detail) = self.run_test_suite(config).await;

        let suggestion = advisory_suggestion(
            self.llm.as_ref(),
            config,
            "You are an expert software testing engineer.",
            format!(
                "Based on the following project details, provide test suggestions to ensure \
                 thorough coverage: {}",
                config.docs.project_summary
            ),
        )
        .await;
        info!(suggestion = %suggestion, "test coverage suggestion");

        Ok(if passed {
            PhaseResult::success(PhaseId::Test, detail, started)
        } else {
            PhaseResult::failure(PhaseId::Test, detail, started)
        })
    }
}

// ---------------------------------------------------------------------------
// Deploy
// ---------------------------------------------------------------------------

/// Packages and deploys the project in two sequential sub-steps. When
/// packaging fails, deployment is not attempted and the phase fails with
/// the packaging reason.
pub struct DeployAgent {
    llm: Arc<dyn LlmBackend>,
    runner: Arc<dyn ProcessRunner>,
}

impl DeployAgent {
    #[must_use]
    pub fn new(llm: Arc<dyn LlmBackend>, runner: Arc<dyn ProcessRunner>) -> Self {
        Self { llm, runner }
    }

    async fn run_sub_step(
        &self,
        name: &str,
        command: Option<&Vec<String>>,
        config: &WorkflowConfig,
    ) -> Result<(), String> {
        let Some(argv) = command else {
            info!(step = %name, "no command configured, step is a no-op");
            return Ok(());
        };
        let Some(cmd) = CommandSpec::from_argv(argv) else {
            return Err(format!("{name} command is empty"));
        };

        info!(step = %name, command = %cmd.display_line(), "running deployment step");
        let output = match self.runner.run(&cmd, config.command_timeout).await {
            Ok(output) => output,
            Err(err) => return Err(format!("{name} failed to run: {err}")),
        };
        if output.success() {
            Ok(())
        } else {
            Err(format!(
                "{name} exited with code {}: {}",
                output.exit_code.unwrap_or(-1),
                tail(&output.stderr_string(), 400),
            ))
        }
    }
}

#[async_trait]
impl PhaseAgent for DeployAgent {
    fn id(&self) -> PhaseId {
        PhaseId::Deploy
    }

    async fn execute(&self, config: &WorkflowConfig) -> Result<PhaseResult> {
        let started = Utc::now();

        if let Err(reason) = self
            .run_sub_step("package", config.deploy.package_command.as_ref(), config)
            .await
        {
            return Ok(PhaseResult::failure(
                PhaseId::Deploy,
                format!("packaging failed: {reason}"),
                started,
            ));
        }

        if let Err(reason) = self
            .run_sub_step("deploy", config.deploy.deploy_command.as_ref(), config)
            .await
        {
            return Ok(PhaseResult::failure(
                PhaseId::Deploy,
                format!("deployment failed: {reason}"),
                started,
            ));
        }

        let suggestion = advisory_suggestion(
            self.llm.as_ref(),
            config,
            "You are an expert in cloud deployment.",
            "Suggest improvements to the packaging and deployment process.".to_string(),
        )
        .await;
        info!(suggestion = %suggestion, "deployment improvement suggestion");

        Ok(PhaseResult::success(
            PhaseId::Deploy,
            "package and deploy steps completed",
            started,
        ))
    }
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// Generates project documentation and writes it to the configured path.
/// A generation failure degrades to placeholder text; a write failure
/// fails the phase even when generation succeeded — the artifact must
/// exist on disk to count as success.
pub struct DocumentAgent {
    llm: Arc<dyn LlmBackend>,
}

impl DocumentAgent {
    #[must_use]
    pub fn new(llm: Arc<dyn LlmBackend>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl PhaseAgent for DocumentAgent {
    fn id(&self) -> PhaseId {
        PhaseId::Document
    }

    async fn execute(&self, config: &WorkflowConfig) -> Result<PhaseResult> {
        let started = Utc::now();

        let generated = completion(
            self.llm.as_ref(),
            config,
            "You are an expert technical writer.",
            format!(
                "Generate comprehensive documentation for a software project with the \
                 following details:\nProject Summary: {}\nCode Structure:\n{}\n\
                 The documentation should include an overview, installation instructions, \
                 usage examples, and contribution guidelines.",
                config.docs.project_summary, config.docs.structure_overview
            ),
        )
        .await;

        let text = match generated {
            Ok(text) => text,
            Err(err) => {
                warn!(error = %err, "documentation generation failed, writing placeholder");
                DOC_GENERATION_FAILED.to_string()
            }
        };

        match write_documentation(&config.docs.path, &text, config.docs.mode) {
            Ok(()) => Ok(PhaseResult::success(
                PhaseId::Document,
                format!("documentation written to {}", config.docs.path.display()),
                started,
            )),
            Err(err) => Ok(PhaseResult::failure(
                PhaseId::Document,
                format!(
                    "failed to write documentation to {}: {err}",
                    config.docs.path.display()
                ),
                started,
            )),
        }
    }
}

/// Write documentation text to `path`.
///
/// In append mode the new text is separated from existing content by a
/// blank line; an empty or missing file receives the text without a
/// leading separator.
///
/// # Errors
///
/// Returns the underlying I/O error when the file cannot be created or
/// written.
pub fn write_documentation(path: &Path, content: &str, mode: WriteMode) -> io::Result<()> {
    match mode {
        WriteMode::Overwrite => fs::write(path, content),
        WriteMode::Append => {
            let has_content = fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false);
            let mut file = OpenOptions::new().create(true).append(true).open(path)?;
            if has_content {
                file.write_all(b"\n\n")?;
            }
            file.write_all(content.as_bytes())
        }
    }
}
