// Response / Evaluation Agent
//
// Second stage of the pipeline: either condense the diagnostic narrative to a
// single sentence, or grade it against a reference answer.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::{AgentError, AgentResult, LLMProvider};
use crate::config::{DiagnosticsConfig, RubricKind};
use crate::evaluation::{
    embedding_score, parse_rubric_response, rubric_prompt, EvaluationResult, FactRubric, Reference,
};
use crate::knowledge::Embedder;

pub const SUMMARY_SYSTEM_PROMPT: &str =
    "You are a helpful assistant. Summarize the message into one sentence.";

const JUDGE_SYSTEM_PROMPT: &str =
    "You are a strict grader. Reply with a single JSON object and nothing else.";

/// Rubric result and embedding similarity for one candidate answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub rubric: EvaluationResult,
    pub embedding_score: u32,
}

pub struct ResponseAgent {
    provider: Arc<dyn LLMProvider>,
    embedder: Arc<dyn Embedder>,
    summary_model: String,
    judge_model: String,
    rubric: RubricKind,
}

impl ResponseAgent {
    pub fn new(provider: Arc<dyn LLMProvider>, embedder: Arc<dyn Embedder>) -> Self {
        let defaults = DiagnosticsConfig::default();
        Self {
            provider,
            embedder,
            summary_model: defaults.summary_model,
            judge_model: defaults.judge_model,
            rubric: defaults.rubric,
        }
    }

    pub fn from_config(
        provider: Arc<dyn LLMProvider>,
        embedder: Arc<dyn Embedder>,
        config: &DiagnosticsConfig,
    ) -> Self {
        Self {
            summary_model: config.summary_model.clone(),
            judge_model: config.judge_model.clone(),
            rubric: config.rubric,
            ..Self::new(provider, embedder)
        }
    }

    pub fn with_rubric(mut self, rubric: RubricKind) -> Self {
        self.rubric = rubric;
        self
    }

    /// One-sentence summary of `message`.
    pub async fn summarize(&self, message: &str) -> AgentResult<String> {
        println!("Formatting response");
        self.provider
            .generate(
                &self.summary_model,
                message.to_string(),
                Some(SUMMARY_SYSTEM_PROMPT.to_string()),
            )
            .await
            .map_err(|e| AgentError::Provider(e.to_string()))
    }

    /// Detail-coverage rubric, graded by the judge model or locally.
    pub async fn score_rubric(
        &self,
        candidate: &str,
        reference: &Reference,
    ) -> AgentResult<EvaluationResult> {
        match self.rubric {
            RubricKind::Facts => {
                let rubric = FactRubric::new().map_err(|e| AgentError::Parse(e.to_string()))?;
                Ok(rubric.score(candidate, reference))
            }
            RubricKind::Llm => {
                let raw = self
                    .provider
                    .generate(
                        &self.judge_model,
                        rubric_prompt(candidate, reference),
                        Some(JUDGE_SYSTEM_PROMPT.to_string()),
                    )
                    .await
                    .map_err(|e| AgentError::Provider(e.to_string()))?;
                Ok(parse_rubric_response(&raw))
            }
        }
    }

    pub async fn score_similarity(&self, candidate: &str, reference: &Reference) -> AgentResult<u32> {
        embedding_score(self.embedder.as_ref(), candidate, &reference.text())
            .await
            .map_err(|e| AgentError::Provider(format!("embedding failed: {}", e)))
    }

    pub async fn evaluate(&self, candidate: &str, reference: &Reference) -> AgentResult<EvaluationReport> {
        let rubric = self.score_rubric(candidate, reference).await?;
        let embedding_score = match self.score_similarity(candidate, reference).await {
            Ok(score) => score,
            Err(e) => {
                warn!("Embedding similarity unavailable: {}", e);
                0
            }
        };
        info!(
            "Evaluation: rubric {} / embedding {}",
            rubric.score, embedding_score
        );
        Ok(EvaluationReport {
            rubric,
            embedding_score,
        })
    }
}
