//! Phase types for the development workflow
//!
//! Defines the phase identifiers, per-phase results, the aggregated run
//! report, and the [`PhaseAgent`] trait implemented by each phase. Phase
//! failures are always data: an agent maps every internal failure (command
//! exit, completion error, I/O error) into a `PhaseResult` with
//! `PhaseStatus::Failure`, so the orchestrator's control flow never deals
//! in exceptions.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::WorkflowConfig;

/// Identifier for one stage of the development pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseId {
    Plan,
    Build,
    Test,
    Deploy,
    Document,
}

impl PhaseId {
    /// All phases in pipeline order.
    pub const ALL: [PhaseId; 5] = [
        PhaseId::Plan,
        PhaseId::Build,
        PhaseId::Test,
        PhaseId::Deploy,
        PhaseId::Document,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            PhaseId::Plan => "plan",
            PhaseId::Build => "build",
            PhaseId::Test => "test",
            PhaseId::Deploy => "deploy",
            PhaseId::Document => "document",
        }
    }

    /// Whether a failure in this phase halts the remaining pipeline.
    /// Planning and documentation failures degrade gracefully; the middle
    /// of the pipeline is load-bearing.
    #[must_use]
    pub const fn is_critical_by_default(self) -> bool {
        matches!(self, PhaseId::Build | PhaseId::Test | PhaseId::Deploy)
    }
}

impl fmt::Display for PhaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseStatus {
    Success,
    Failure,
    /// Not executed because an earlier critical phase failed.
    Skipped,
}

impl PhaseStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            PhaseStatus::Success => "success",
            PhaseStatus::Failure => "failure",
            PhaseStatus::Skipped => "skipped",
        }
    }
}

/// Result of executing (or skipping) a single phase. Immutable once
/// created; owned by the run report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseResult {
    pub phase: PhaseId,
    pub status: PhaseStatus,
    pub detail: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl PhaseResult {
    #[must_use]
    pub fn success(phase: PhaseId, detail: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            phase,
            status: PhaseStatus::Success,
            detail: detail.into(),
            started_at,
            ended_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn failure(phase: PhaseId, detail: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            phase,
            status: PhaseStatus::Failure,
            detail: detail.into(),
            started_at,
            ended_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn skipped(phase: PhaseId) -> Self {
        let now = Utc::now();
        Self {
            phase,
            status: PhaseStatus::Skipped,
            detail: "skipped after earlier critical failure".to_string(),
            started_at: now,
            ended_at: now,
        }
    }

    /// Wall-clock duration of the phase in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        (self.ended_at - self.started_at).num_milliseconds()
    }
}

/// Overall outcome of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Failure,
}

/// Aggregated report of one workflow run: one `PhaseResult` per configured
/// phase, in input order.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub status: RunStatus,
    pub phases: Vec<PhaseResult>,
}

impl RunReport {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Success
    }

    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.phases
            .iter()
            .filter(|p| p.status == PhaseStatus::Failure)
            .count()
    }

    #[must_use]
    pub fn skipped_count(&self) -> usize {
        self.phases
            .iter()
            .filter(|p| p.status == PhaseStatus::Skipped)
            .count()
    }

    /// Human-readable rendering for terminal output.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("Workflow run report\n");
        for result in &self.phases {
            let first_line = result.detail.lines().next().unwrap_or("");
            out.push_str(&format!(
                "  {:<10} {:<8} {:>6}ms  {}\n",
                result.phase.as_str(),
                result.status.as_str(),
                result.duration_ms(),
                first_line,
            ));
        }
        out.push_str(&format!(
            "Overall: {}\n",
            match self.status {
                RunStatus::Success => "success",
                RunStatus::Failure => "failure",
            }
        ));
        out
    }
}

/// Trait implemented by every workflow phase.
///
/// `execute` must catch its own failures and fold them into the returned
/// `PhaseResult`; an `Err` from this method signals a defect, and the
/// orchestrator converts it into a `Failure` result rather than letting it
/// propagate.
#[async_trait]
pub trait PhaseAgent: Send + Sync {
    /// Identifier of this phase.
    fn id(&self) -> PhaseId;

    /// Whether a failure here halts the remaining pipeline.
    fn critical(&self) -> bool {
        self.id().is_critical_by_default()
    }

    /// Run the phase against the immutable workflow configuration.
    async fn execute(&self, config: &WorkflowConfig) -> Result<PhaseResult>;
}
