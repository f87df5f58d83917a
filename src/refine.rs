//! Multi-participant idea refinement
//!
//! Drives N participants through K rounds of idea generation and all-pairs
//! critique, then synthesizes a final artifact from the accumulated state.
//!
//! Known design limitation, kept deliberately: ideas in round r+1 are
//! conditioned only on the topic and the round index, never on round r's
//! critiques. The critiques are recorded and surface in the synthesized
//! artifact, but they do not feed back into generation.
//!
//! A failed completion call during generation or evaluation is substituted
//! with the fixed placeholder text at the call site, so one participant's
//! failure never aborts the session.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::WorkflowConfig;
use crate::error::{ConfigError, DevFlowError};
use crate::llm::{CompletionRequest, LlmBackend, Message, NO_SUGGESTION};
use crate::logging;

const GENERATION_SYSTEM: &str =
    "You are a creative participant in a collaborative brainstorming session.";
const EVALUATION_SYSTEM: &str = "You are a critical reviewer of brainstormed ideas.";

/// An actor in the refinement loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Participant {
    pub id: String,
}

impl Participant {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// A roster of `count` participants with sequential identifiers.
    #[must_use]
    pub fn numbered(count: usize) -> Vec<Self> {
        (1..=count)
            .map(|i| Self::new(format!("participant-{i}")))
            .collect()
    }
}

/// One idea produced during a generation step. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Idea {
    pub participant_id: String,
    pub round: u32,
    pub text: String,
}

/// One critique produced during a cross-evaluation step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Evaluation {
    pub evaluator_id: String,
    /// Author of the idea under critique; with one idea per participant
    /// per round this identifies the idea exactly.
    pub target_participant_id: String,
    pub round: u32,
    pub critique: String,
}

/// Ideas and evaluations of a single round.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RoundRecord {
    pub round: u32,
    pub ideas: Vec<Idea>,
    pub evaluations: Vec<Evaluation>,
}

/// Accumulated session state, owned by the session and discarded after the
/// final artifact is synthesized.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RefinementState {
    pub rounds: Vec<RoundRecord>,
}

impl RefinementState {
    #[must_use]
    pub fn idea_count(&self) -> usize {
        self.rounds.iter().map(|r| r.ideas.len()).sum()
    }

    #[must_use]
    pub fn evaluation_count(&self) -> usize {
        self.rounds.iter().map(|r| r.evaluations.len()).sum()
    }
}

/// Drives participants through generate-then-evaluate rounds.
pub struct RefinementSession {
    llm: Arc<dyn LlmBackend>,
    model: String,
    max_tokens: u32,
    call_timeout: Duration,
}

impl RefinementSession {
    #[must_use]
    pub fn new(llm: Arc<dyn LlmBackend>, config: &WorkflowConfig) -> Self {
        Self {
            llm,
            model: config.llm_backend.clone(),
            max_tokens: config.max_tokens,
            call_timeout: config.call_timeout,
        }
    }

    /// Run the full session and return the synthesized artifact.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an empty roster or zero rounds.
    /// Completion failures never abort the session; they degrade to
    /// placeholder text in the affected idea or critique.
    pub async fn run(
        &self,
        participants: &[Participant],
        topic: &str,
        rounds: u32,
    ) -> Result<String, DevFlowError> {
        if participants.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "participants".to_string(),
                value: "0".to_string(),
            }
            .into());
        }
        if rounds == 0 {
            return Err(ConfigError::InvalidValue {
                key: "rounds".to_string(),
                value: "0".to_string(),
            }
            .into());
        }

        let state = self.execute_rounds(participants, topic, rounds).await;
        Ok(synthesize(topic, &state))
    }

    /// Execute all rounds and return the accumulated state.
    pub(crate) async fn execute_rounds(
        &self,
        participants: &[Participant],
        topic: &str,
        rounds: u32,
    ) -> RefinementState {
        let mut state = RefinementState::default();

        for round in 1..=rounds {
            logging::log_round_start(round, rounds);

            // Generation: one idea per participant, conditioned only on
            // the topic and the round index.
            let mut ideas = Vec::with_capacity(participants.len());
            for participant in participants {
                let text = self
                    .call(
                        GENERATION_SYSTEM,
                        generation_prompt(topic, round, &participant.id),
                    )
                    .await;
                ideas.push(Idea {
                    participant_id: participant.id.clone(),
                    round,
                    text,
                });
            }

            // Cross-evaluation: every participant critiques every idea of
            // this round, their own included.
            let mut evaluations = Vec::with_capacity(participants.len() * ideas.len());
            for evaluator in participants {
                for idea in &ideas {
                    let critique = self
                        .call(EVALUATION_SYSTEM, evaluation_prompt(topic, round, idea))
                        .await;
                    evaluations.push(Evaluation {
                        evaluator_id: evaluator.id.clone(),
                        target_participant_id: idea.participant_id.clone(),
                        round,
                        critique,
                    });
                }
            }

            info!(
                round = %round,
                ideas = ideas.len(),
                evaluations = evaluations.len(),
                "round complete"
            );
            state.rounds.push(RoundRecord {
                round,
                ideas,
                evaluations,
            });
        }

        state
    }

    async fn call(&self, system: &str, user: String) -> String {
        let req = CompletionRequest::new(
            &self.model,
            vec![Message::system(system), Message::user(user)],
            self.max_tokens,
            self.call_timeout,
        );
        match self.llm.complete(req).await {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => NO_SUGGESTION.to_string(),
            Err(err) => {
                warn!(error = %err, "completion call failed, substituting placeholder");
                NO_SUGGESTION.to_string()
            }
        }
    }
}

fn generation_prompt(topic: &str, round: u32, participant_id: &str) -> String {
    format!(
        "Brainstorming round {round} on the topic: {topic}. \
         As {participant_id}, propose exactly one concrete idea."
    )
}

fn evaluation_prompt(topic: &str, round: u32, idea: &Idea) -> String {
    format!(
        "Round {round} critique on the topic: {topic}. \
         Evaluate the following idea from {}: {} \
         Point out its strengths and weaknesses.",
        idea.participant_id, idea.text
    )
}

/// Build the final artifact from the accumulated state. Deterministic:
/// the same state always yields the same document, and the topic is
/// embedded verbatim.
#[must_use]
pub fn synthesize(topic: &str, state: &RefinementState) -> String {
    let participant_count = state.rounds.first().map_or(0, |r| r.ideas.len());

    let mut out = String::new();
    out.push_str(&format!("# Refined proposal: {topic}\n"));
    for record in &state.rounds {
        out.push_str(&format!("\n## Round {}\n", record.round));
        for idea in &record.ideas {
            out.push_str(&format!("- {}: {}\n", idea.participant_id, idea.text));
        }
        out.push_str(&format!(
            "  ({} critiques recorded)\n",
            record.evaluations.len()
        ));
    }
    out.push_str(&format!(
        "\n## Outcome\n\nAfter {} round(s) with {} participant(s), the ideas above form the \
         consolidated direction for: {topic}\n",
        state.rounds.len(),
        participant_count,
    ));
    out
}
