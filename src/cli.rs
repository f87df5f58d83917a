//! CLI entry point and dispatch
//!
//! This module owns argument parsing and the `run()` function which
//! resolves configuration, creates the tokio runtime, dispatches to the
//! selected command, and handles ALL user-facing output including errors.
//! `main.rs` only maps the returned exit code to the process exit.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{CliArgs, WorkflowConfig};
use crate::exit_codes::ExitCode;
use crate::llm::{LlmBackend, backend_from_config};
use crate::logging;
use crate::orchestrator::WorkflowOrchestrator;
use crate::phase::RunStatus;
use crate::phases;
use crate::refine::{Participant, RefinementSession};
use crate::runner::{ProcessRunner, TokioRunner};

/// devflow - AI-assisted development workflow automation
#[derive(Parser)]
#[command(name = "devflow")]
#[command(about = "Automates plan, build, test, deploy, and documentation phases with LLM agents")]
#[command(long_about = r#"
devflow runs a development workflow as a sequence of phases (plan, build,
test, deploy, document), each driven by an agent that may consult a
language-model completion service and shell out to local tooling. A failed
critical phase halts the pipeline; the run report records every phase.

EXAMPLES:
  # Run the full workflow
  devflow --api-key sk-... run

  # Use a different model and emit the run report as JSON
  devflow --llm-backend gpt-4o run --json

  # Append generated documentation instead of overwriting
  devflow run --doc-path docs/GENERATED.md --append-docs

  # Brainstorm a topic with three participants over five rounds
  devflow --research-topic "offline sync engine" refine --participants 3 --rounds 5

CONFIGURATION:
  Configuration is loaded with precedence: CLI flags > config file > defaults.
  The config file is ./devflow.toml, or an explicit path via --config.
  The API key is resolved from --api-key, then DEVFLOW_API_KEY, then
  OPENAI_API_KEY; without one the process exits with code 2.
"#)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// API key for the completion service
    #[arg(long, global = true)]
    pub api_key: Option<String>,

    /// LLM backend to use
    #[arg(long, global = true, value_parser = ["o1-mini", "gpt-4o", "gpt-4-turbo", "gpt-4"])]
    pub llm_backend: Option<String>,

    /// Project idea driving the workflow and refinement prompts
    #[arg(long, global = true)]
    pub research_topic: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run the full development workflow (plan → build → test → deploy → document)
    Run {
        /// Where to write generated documentation
        #[arg(long)]
        doc_path: Option<PathBuf>,

        /// Append to the documentation file instead of overwriting it
        #[arg(long)]
        append_docs: bool,

        /// Output the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a multi-participant idea refinement session
    Refine {
        /// Number of generate-then-evaluate rounds
        #[arg(long, default_value_t = 3)]
        rounds: u32,

        /// Number of participants
        #[arg(long, default_value_t = 2)]
        participants: usize,
    },
}

/// Main CLI execution function.
///
/// Handles all output including errors and returns the exit code for
/// `main` to apply.
///
/// # Errors
///
/// Returns the exit code to terminate with when the run did not succeed.
pub fn run() -> Result<(), ExitCode> {
    let cli = Cli::parse();

    let mut args = CliArgs {
        config_path: cli.config.clone(),
        api_key: cli.api_key.clone(),
        llm_backend: cli.llm_backend.clone(),
        research_topic: cli.research_topic.clone(),
        doc_path: None,
        append_docs: false,
        verbose: cli.verbose,
    };
    if let Commands::Run {
        doc_path,
        append_docs,
        ..
    } = &cli.command
    {
        args.doc_path = doc_path.clone();
        args.append_docs = *append_docs;
    }

    if let Err(e) = logging::init_tracing(cli.verbose) {
        eprintln!("✗ failed to initialize logging: {e}");
        return Err(ExitCode::INTERNAL);
    }

    let config = match WorkflowConfig::resolve(&args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("✗ {err}");
            return Err(ExitCode::CONFIG);
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("✗ failed to create async runtime: {e}");
            return Err(ExitCode::INTERNAL);
        }
    };

    rt.block_on(async {
        match cli.command {
            Commands::Run { json, .. } => execute_run(&config, json).await,
            Commands::Refine {
                rounds,
                participants,
            } => execute_refine(&config, rounds, participants).await,
        }
    })
}

async fn execute_run(config: &WorkflowConfig, json: bool) -> Result<(), ExitCode> {
    let llm: Arc<dyn LlmBackend> = match backend_from_config(config) {
        Ok(backend) => backend,
        Err(err) => {
            eprintln!("✗ {err}");
            return Err(ExitCode::CONFIG);
        }
    };
    let runner: Arc<dyn ProcessRunner> = Arc::new(TokioRunner::new());

    let agents = phases::default_agents(llm, runner);
    let report = WorkflowOrchestrator::new().run(&agents, config).await;

    if json {
        match serde_json::to_string_pretty(&report) {
            Ok(rendered) => println!("{rendered}"),
            Err(e) => {
                eprintln!("✗ failed to serialize run report: {e}");
                return Err(ExitCode::INTERNAL);
            }
        }
    } else {
        print!("{}", report.render());
    }

    if report.status == RunStatus::Failure {
        Err(ExitCode::PIPELINE_FAILED)
    } else {
        Ok(())
    }
}

async fn execute_refine(
    config: &WorkflowConfig,
    rounds: u32,
    participants: usize,
) -> Result<(), ExitCode> {
    let llm: Arc<dyn LlmBackend> = match backend_from_config(config) {
        Ok(backend) => backend,
        Err(err) => {
            eprintln!("✗ {err}");
            return Err(ExitCode::CONFIG);
        }
    };

    let session = RefinementSession::new(llm, config);
    let roster = Participant::numbered(participants);

    match session.run(&roster, &config.research_topic, rounds).await {
        Ok(artifact) => {
            println!("{artifact}");
            Ok(())
        }
        Err(err) => {
            eprintln!("✗ {err}");
            Err(err.to_exit_code())
        }
    }
}

/// Build the CLI command structure without parsing arguments. Used for
/// introspection in tests.
#[must_use]
pub fn build_cli() -> clap::Command {
    <Cli as clap::CommandFactory>::command()
}
