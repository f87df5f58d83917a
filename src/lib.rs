//! devflow - AI-assisted development workflow automation
//!
//! devflow runs a software-development lifecycle (plan → build → test →
//! deploy → document) as a sequence of phases, each driven by a stateless
//! agent that queries a language-model completion service and optionally
//! shells out to local tooling. It also provides a multi-participant idea
//! refinement loop: participants alternately propose and critique ideas
//! over a fixed number of rounds before a final artifact is synthesized.
//!
//! devflow can be used two ways:
//! - **CLI**: `devflow run` executes the pipeline, `devflow refine` runs a
//!   refinement session
//! - **Library**: drive [`WorkflowOrchestrator`] or [`RefinementSession`]
//!   directly with your own [`llm::LlmBackend`] / [`runner::ProcessRunner`]
//!   implementations
//!
//! # Design
//!
//! Phase failures are data, not exceptions: every agent folds external
//! failures (command exits, completion errors, I/O errors) into a
//! [`PhaseResult`], so the orchestrator's sequencing and abort logic is
//! deterministic given a fixed sequence of results and fully testable via
//! pure data inspection. A failed critical phase halts the pipeline and
//! the remaining phases are recorded as skipped; non-critical failures
//! degrade gracefully with a logged warning.

pub mod cli;
pub mod config;
pub mod error;
pub mod exit_codes;
pub mod llm;
pub mod logging;
pub mod orchestrator;
pub mod phase;
pub mod phases;
pub mod refine;
pub mod runner;

pub use config::{CliArgs, WorkflowConfig, WriteMode};
pub use error::{CommandError, CompletionError, ConfigError, DevFlowError};
pub use exit_codes::ExitCode;
pub use orchestrator::WorkflowOrchestrator;
pub use phase::{PhaseAgent, PhaseId, PhaseResult, PhaseStatus, RunReport, RunStatus};
pub use refine::{Participant, RefinementSession};
