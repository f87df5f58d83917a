//! Workflow orchestration
//!
//! Sequences the configured phases, converts unexpected agent errors into
//! failure results, applies the abort policy, and aggregates everything
//! into a [`RunReport`]. Given a fixed sequence of phase results the
//! sequencing and abort behavior is fully deterministic; only the agents
//! themselves talk to non-deterministic collaborators.

use tracing::warn;

use crate::config::WorkflowConfig;
use crate::logging;
use crate::phase::{PhaseAgent, PhaseResult, PhaseStatus, RunReport, RunStatus};

/// Drives an ordered list of phase agents to completion.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkflowOrchestrator;

impl WorkflowOrchestrator {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Execute the phases strictly in order.
    ///
    /// Each agent runs exactly once. A failed critical phase stops
    /// execution; the remaining phases are recorded as `Skipped`. A failed
    /// non-critical phase is recorded and logged but does not halt the run
    /// or change the overall status.
    pub async fn run(
        &self,
        agents: &[Box<dyn PhaseAgent>],
        config: &WorkflowConfig,
    ) -> RunReport {
        let mut phases = Vec::with_capacity(agents.len());
        let mut status = RunStatus::Success;
        let mut aborted = false;

        for agent in agents {
            let phase = agent.id();

            if aborted {
                phases.push(PhaseResult::skipped(phase));
                continue;
            }

            logging::log_phase_start(phase.as_str());
            let started = chrono::Utc::now();

            let result = match agent.execute(config).await {
                Ok(result) => result,
                // Agents are expected to fold failures into their result;
                // anything escaping here is converted, never propagated.
                Err(err) => {
                    PhaseResult::failure(phase, format!("unexpected phase error: {err}"), started)
                }
            };

            logging::log_phase_outcome(
                phase.as_str(),
                result.status.as_str(),
                result.duration_ms(),
            );

            if result.status == PhaseStatus::Failure {
                if agent.critical() {
                    logging::log_pipeline_abort(phase.as_str());
                    status = RunStatus::Failure;
                    aborted = true;
                } else {
                    warn!(phase = %phase, "non-critical phase failed, continuing");
                }
            }

            phases.push(result);
        }

        RunReport { status, phases }
    }
}
