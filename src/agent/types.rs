use std::time::Duration;

use crate::config::DiagnosticsConfig;

/// The alert the evaluation driver asks about.
pub const DIAGNOSTIC_QUERY: &str = "What is the cause of alert 'Origin service d3f1a8b2-7c4e-4f9e-9e2a-8b6c3a2d1f4e with high latency on more than 90% of requests in the last hour'";

/// A chat model the diagnostic agent can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelProfile {
    pub name: &'static str,
    /// Whether the model emits its own reasoning, which selects the
    /// PLANNING/REASONING response format.
    pub reasoning: bool,
}

impl ModelProfile {
    pub const GPT_OSS: ModelProfile = ModelProfile {
        name: "gpt-oss:20b",
        reasoning: true,
    };
    pub const GRANITE: ModelProfile = ModelProfile {
        name: "granite4:32b-a9b-h",
        reasoning: false,
    };

    pub const KNOWN: [ModelProfile; 2] = [Self::GPT_OSS, Self::GRANITE];

    /// Resolve a requested model name. Unknown or missing names use the default.
    pub fn select(requested: Option<&str>) -> ModelProfile {
        match requested.map(str::trim).filter(|name| !name.is_empty()) {
            None => Self::default(),
            Some(name) => Self::KNOWN
                .into_iter()
                .find(|profile| profile.name == name)
                .unwrap_or_else(|| {
                    tracing::warn!(
                        "Unknown model '{}', falling back to {}",
                        name,
                        Self::GPT_OSS.name
                    );
                    Self::default()
                }),
        }
    }
}

impl Default for ModelProfile {
    fn default() -> Self {
        Self::GPT_OSS
    }
}

/// Configuration for the diagnostic agent
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub model: String,
    pub reasoning_enabled: bool,
    pub system_prompt: String,
    pub max_steps: usize,
    pub step_timeout: Duration,
    /// Observations longer than this many bytes are cut in the middle
    pub observation_budget: usize,
}

impl AgentConfig {
    pub fn new(profile: ModelProfile) -> Self {
        Self {
            model: profile.name.to_string(),
            reasoning_enabled: profile.reasoning,
            system_prompt: "You are a diagnostic assistant that determines the root cause of service alerts using only the tools provided to you.".to_string(),
            max_steps: 15,
            step_timeout: Duration::from_secs(300),
            observation_budget: 4000,
        }
    }

    pub fn from_settings(profile: ModelProfile, settings: &DiagnosticsConfig) -> Self {
        Self {
            max_steps: settings.max_steps,
            step_timeout: settings.step_timeout,
            ..Self::new(profile)
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::new(ModelProfile::default())
    }
}

/// Instruction prompt wrapping the operator's query.
pub fn diagnostic_prompt(query: &str) -> String {
    format!(
        "You are a helpful assistant. Answer the following query by only using the tools provided to you. \
DO NOT make up any information. \
Query failure analysis KB first to make a plan on how to derive the response. \
Then execute the plan until root cause is determined for response. \
Do not repeat tool calls with the same query. \
If the result of a step in the plan indicates a new KB query is needed for root causing the issue then you MUST perform the new failure analysis KB query and make a new plan to derive the root cause response. \
DO NOT finish before the root cause is determined, unless the conclusion is \"unable to determine root cause\". \
Query: {}",
        query
    )
}
