// ReAct Diagnostic Agent
//
// Reasoning + Acting loop over the tool registry: ask the model for the next
// step, run the requested tools one at a time, feed the observations back,
// and stop at a final answer.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::trace::{NullTrace, TraceSink};
use super::{AgentConfig, AgentError, AgentResult, LLMProvider};
use crate::tools::{ToolCall, ToolRegistry, KB_TOOL_NAME};
use crate::utils::{balanced_object, truncate_middle};

/// Returned by `diagnose` in place of an answer when the run fails.
pub const FAILURE_SENTINEL: &str = "Error";

const TAGS: [&str; 5] = ["PLANNING", "REASONING", "THOUGHT", "ACTION", "ANSWER"];

/// A single step in the ReAct loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReActStep {
    pub thought: String,
    pub actions: Vec<ToolCall>,
    pub observations: Vec<String>,
    pub is_final: bool,
    pub answer: Option<String>,
}

impl ReActStep {
    pub fn thought(thought: impl Into<String>) -> Self {
        Self {
            thought: thought.into(),
            actions: Vec::new(),
            observations: Vec::new(),
            is_final: false,
            answer: None,
        }
    }

    pub fn with_actions(mut self, actions: Vec<ToolCall>) -> Self {
        self.actions = actions;
        self
    }

    pub fn final_answer(thought: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            thought: thought.into(),
            actions: Vec::new(),
            observations: Vec::new(),
            is_final: true,
            answer: Some(answer.into()),
        }
    }
}

/// Final answer plus the (decision, observation) trace that produced it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    pub answer: String,
    pub steps: Vec<ReActStep>,
}

impl AgentResponse {
    /// Every tool call the model requested, in order.
    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCall> {
        self.steps.iter().flat_map(|s| s.actions.iter())
    }
}

pub struct DiagnosticAgent {
    provider: Arc<dyn LLMProvider>,
    config: AgentConfig,
    tools: Arc<ToolRegistry>,
    trace: Arc<dyn TraceSink>,
}

impl DiagnosticAgent {
    pub fn new(provider: Arc<dyn LLMProvider>, config: AgentConfig, tools: Arc<ToolRegistry>) -> Self {
        Self {
            provider,
            config,
            tools,
            trace: Arc::new(NullTrace),
        }
    }

    pub fn with_trace(mut self, trace: Arc<dyn TraceSink>) -> Self {
        self.trace = trace;
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Run the loop and return the answer, or `"Error"` if anything failed.
    pub async fn diagnose(&self, query: &str) -> String {
        match self.run(query).await {
            Ok(response) => response.answer,
            Err(e) => {
                error!("Diagnostic run failed: {}", e);
                FAILURE_SENTINEL.to_string()
            }
        }
    }

    /// Run until the model gives a final answer, `max_steps` is reached or
    /// a single step exceeds `step_timeout`.
    pub async fn run(&self, query: &str) -> AgentResult<AgentResponse> {
        info!("Diagnostic agent starting with model {}", self.config.model);

        let mut steps = Vec::new();
        let mut seen: HashMap<String, String> = HashMap::new();

        for iteration in 0..self.config.max_steps {
            debug!("ReAct iteration {}", iteration + 1);
            let turn = self.iterate(query, &mut steps, &mut seen);
            let outcome = tokio::time::timeout(self.config.step_timeout, turn).await;
            match outcome {
                Err(_) => {
                    warn!("Step {} timed out", iteration + 1);
                    return Err(AgentError::StepTimeout(self.config.step_timeout));
                }
                Ok(Err(e)) => return Err(e),
                Ok(Ok(Some(answer))) => {
                    info!("Diagnostic agent completed in {} iterations", iteration + 1);
                    return Ok(AgentResponse { answer, steps });
                }
                Ok(Ok(None)) => {}
            }
        }

        Err(AgentError::MaxStepsExceeded(self.config.max_steps))
    }

    /// One decide -> invoke -> observe turn. Returns the answer when final.
    async fn iterate(
        &self,
        query: &str,
        steps: &mut Vec<ReActStep>,
        seen: &mut HashMap<String, String>,
    ) -> AgentResult<Option<String>> {
        let mut step = self.step(query, steps).await?;

        if step.is_final {
            // Laziness filter: the playbook lookup must come before any conclusion.
            if !steps.iter().any(|s| !s.actions.is_empty()) {
                warn!("Agent tried to finish without any tool calls. Rejecting answer.");
                step.is_final = false;
                step.thought = format!("{} [REJECTED: No tool used.]", step.thought);
                step.observations.push(format!(
                    "SYSTEM HINT: You MUST use the tools before answering. Start by querying {} for a diagnostic procedure.",
                    KB_TOOL_NAME
                ));
                steps.push(step);
                return Ok(None);
            }
            let answer = step.answer.clone().unwrap_or_else(|| step.thought.clone());
            steps.push(step);
            return Ok(Some(answer));
        }

        if step.actions.is_empty() {
            step.observations.push(
                "SYSTEM HINT: No tool call or final answer found. Use [ACTION] with a JSON tool call, or [ANSWER] with the root cause.".to_string(),
            );
            steps.push(step);
            return Ok(None);
        }

        let mut observations = Vec::with_capacity(step.actions.len());
        for action in &step.actions {
            let key = action.dedup_key();
            if let Some(previous) = seen.get(&key) {
                warn!("Redundant tool call detected: {}", key);
                observations.push(format!(
                    "SYSTEM HINT: {} was already called with these arguments. Do not repeat tool calls. Earlier result: {}",
                    action.name, previous
                ));
                continue;
            }

            let description = self
                .tools
                .descriptor(&action.name)
                .map(|d| d.description.clone())
                .unwrap_or_default();
            self.trace.on_tool_start(action, &description);
            let started = Instant::now();
            let output = self.tools.invoke(action).await;
            self.trace.on_tool_end(action, &output, started.elapsed());

            let observation = truncate_middle(&output.summary, self.config.observation_budget);
            seen.insert(key, observation.clone());
            observations.push(observation);
        }

        step.observations = observations;
        steps.push(step);
        Ok(None)
    }

    async fn step(&self, query: &str, steps: &[ReActStep]) -> AgentResult<ReActStep> {
        let prompt = self.build_react_prompt(query, steps);
        self.trace.on_llm_start(&self.config.model, &prompt);

        let started = Instant::now();
        let response = self
            .provider
            .generate(&self.config.model, prompt, Some(self.config.system_prompt.clone()))
            .await
            .map_err(|e| AgentError::Provider(format!("{:#}", e)))?;
        self.trace.on_llm_end(&response, started.elapsed());

        Ok(self.parse_response(&response))
    }

    fn build_react_prompt(&self, query: &str, steps: &[ReActStep]) -> String {
        let mut prompt = String::new();

        prompt.push_str("## Available Tools\n");
        prompt.push_str(&self.tools.tools_prompt());
        prompt.push('\n');

        if self.config.reasoning_enabled {
            prompt.push_str(
                r###"## Response Format

Respond using the EXACT format below.

[PLANNING]
The diagnostic plan and which step comes next.

[REASONING]
What the latest observations mean for the plan.

[ACTION]
{"name": "tool_name", "parameters": {"key": "value"}}

[ANSWER]
The root cause, once determined.

---
RULES:
1. Every turn MUST include [PLANNING] and [REASONING].
2. Use [ACTION] for tool calls (JSON format). Do NOT wrap JSON in code blocks.
3. Use [ANSWER] only when the root cause is determined or cannot be determined.
4. NEVER output [OBSERVATION]. The system will provide the observation after your action.

EXAMPLE OF TOOL CALL:
[PLANNING]
Look up the procedure for this alert first.
[REASONING]
No procedure is known yet.
[ACTION]
{"name": "failure_analysis_kb", "parameters": {"query": "origin service high latency"}}

"###,
            );
        } else {
            prompt.push_str(
                r###"## Response Format
If you need to use a tool, use the [ACTION] tag. Otherwise, provide the root cause with the [ANSWER] tag.

RULES:
1. Use [ACTION] for tool calls (JSON format): {"name": "tool_name", "parameters": {"key": "value"}}
2. Use [ANSWER] for your final response.
3. NEVER output [OBSERVATION].
"###,
            );
        }

        prompt.push_str(&format!("## User Query\n{}\n\n", query));

        if !steps.is_empty() {
            prompt.push_str("## Trace\n");
            for step in steps {
                if !step.thought.is_empty() {
                    prompt.push_str(&format!("[REASONING]\n{}\n", step.thought));
                }
                for action in &step.actions {
                    if let Ok(action_json) = serde_json::to_string(action) {
                        prompt.push_str(&format!("[ACTION]\n{}\n", action_json));
                    }
                }
                for obs in &step.observations {
                    prompt.push_str(&format!("[OBSERVATION]\n{}\n", obs));
                }
                prompt.push('\n');
            }
        }

        prompt.push_str("Continue:\n");
        prompt
    }

    /// Parse the model output using the response tags.
    fn parse_response(&self, response: &str) -> ReActStep {
        debug!("Raw LLM Response for parsing:\n{}", response);

        // The model must not simulate tool results; drop anything from there on.
        let clean = match response.to_ascii_uppercase().find("[OBSERVATION]") {
            Some(idx) => {
                warn!("Hallucinated [OBSERVATION] detected. Truncating response.");
                &response[..idx]
            }
            None => response,
        };

        let thought = extract_tag(clean, "REASONING")
            .or_else(|| extract_tag(clean, "THOUGHT"))
            .or_else(|| extract_tag(clean, "PLANNING"))
            .unwrap_or_default();

        let mut tool_calls: Vec<ToolCall> = extract_all_tags(clean, "ACTION")
            .iter()
            .filter_map(|a| parse_json_tool_call(a))
            .collect();

        if tool_calls.is_empty() && extract_tag(clean, "ANSWER").is_none() {
            if let Some(call) = parse_json_tool_call(clean) {
                warn!("Found raw JSON tool call without [ACTION] tag.");
                tool_calls.push(call);
            }
        }

        if !tool_calls.is_empty() {
            return ReActStep::thought(thought).with_actions(tool_calls);
        }

        if let Some(answer) = extract_tag(clean, "ANSWER") {
            return ReActStep::final_answer(thought, answer);
        }

        let trimmed = clean.trim();
        if !trimmed.is_empty() && !starts_with_tag(trimmed) {
            info!("Model provided tagless response. Treating as final answer.");
            return ReActStep::final_answer(thought, trimmed);
        }

        warn!("Model response had no action or answer.");
        ReActStep::thought(thought)
    }
}

fn starts_with_tag(text: &str) -> bool {
    let upper = text.to_ascii_uppercase();
    TAGS.iter().any(|t| upper.starts_with(&format!("[{}]", t)))
}

/// Header patterns for a tag, e.g. `[ANSWER]`, `ANSWER:`, `**ANSWER**`.
fn tag_patterns(tag: &str) -> [String; 4] {
    [
        format!("[{}]", tag),
        format!("**{}**:", tag),
        format!("**{}**", tag),
        format!("{}:", tag),
    ]
}

/// Byte offset of the next tag header at or after `from`.
fn next_tag_start(upper: &str, from: usize) -> usize {
    TAGS.iter()
        .flat_map(|t| tag_patterns(t))
        .filter_map(|p| upper[from..].find(&p).map(|i| from + i))
        .min()
        .unwrap_or(upper.len())
}

fn extract_tag(text: &str, tag: &str) -> Option<String> {
    // ASCII uppercasing keeps byte offsets aligned with `text`.
    let upper = text.to_ascii_uppercase();
    for pattern in tag_patterns(tag) {
        if let Some(idx) = upper.find(&pattern) {
            let start = idx + pattern.len();
            let end = next_tag_start(&upper, start);
            let body = text[start..end].trim().trim_start_matches(':').trim();
            if !body.is_empty() {
                return Some(body.to_string());
            }
        }
    }
    None
}

fn extract_all_tags(text: &str, tag: &str) -> Vec<String> {
    let upper = text.to_ascii_uppercase();
    for pattern in tag_patterns(tag) {
        let mut results = Vec::new();
        let mut pos = 0;
        while let Some(idx) = upper[pos..].find(&pattern) {
            let start = pos + idx + pattern.len();
            let end = next_tag_start(&upper, start);
            let body = text[start..end].trim().trim_start_matches(':').trim();
            if !body.is_empty() {
                results.push(body.to_string());
            }
            pos = end;
            if pos >= text.len() {
                break;
            }
        }
        if !results.is_empty() {
            return results;
        }
    }
    Vec::new()
}

fn parse_json_tool_call(text: &str) -> Option<ToolCall> {
    let json = balanced_object(text)?;
    let call: ToolCall = serde_json::from_str(json).ok()?;
    if call.name.trim().is_empty() {
        return None;
    }
    Some(call)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::ModelProfile;
    use crate::tools::{Channel, Tool, ToolOutput};
    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    struct ScriptedProvider {
        responses: Mutex<VecDeque<String>>,
    }

    impl ScriptedProvider {
        fn new(responses: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.iter().map(|r| r.to_string()).collect()),
            })
        }
    }

    #[async_trait]
    impl LLMProvider for ScriptedProvider {
        async fn generate(&self, _model: &str, _prompt: String, _system: Option<String>) -> Result<String> {
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| anyhow::anyhow!("script exhausted"))
        }
    }

    struct SlowProvider;

    #[async_trait]
    impl LLMProvider for SlowProvider {
        async fn generate(&self, _model: &str, _prompt: String, _system: Option<String>) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("[ANSWER]\ntoo late".to_string())
        }
    }

    struct CountingTool {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for CountingTool {
        fn name(&self) -> String {
            "failure_analysis_kb".to_string()
        }
        fn description(&self) -> String {
            "Counts calls".to_string()
        }
        fn parameters(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, params: Value) -> AgentResult<ToolOutput> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(ToolOutput::success_str(format!("call {} for {}", n, params["query"])))
        }
    }

    fn agent_with(provider: Arc<dyn LLMProvider>, max_steps: usize) -> (DiagnosticAgent, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let tools = ToolRegistry::builder()
            .register(Channel::InProcess, Arc::new(CountingTool { calls: calls.clone() }))
            .build()
            .unwrap();
        let config = AgentConfig {
            max_steps,
            ..AgentConfig::new(ModelProfile::GPT_OSS)
        };
        (DiagnosticAgent::new(provider, config, Arc::new(tools)), calls)
    }

    const KB_CALL: &str = "[PLANNING]\nFind a procedure.\n[REASONING]\nNeed the playbook.\n[ACTION]\n{\"name\": \"failure_analysis_kb\", \"parameters\": {\"query\": \"high latency\"}}";

    #[test]
    fn test_parse_action_and_reasoning() {
        let (agent, _) = agent_with(ScriptedProvider::new(&[]), 3);
        let step = agent.parse_response(KB_CALL);
        assert_eq!(step.thought, "Need the playbook.");
        assert_eq!(step.actions.len(), 1);
        assert_eq!(step.actions[0].parameters["query"], "high latency");
        assert!(!step.is_final);
    }

    #[test]
    fn test_parse_answer() {
        let (agent, _) = agent_with(ScriptedProvider::new(&[]), 3);
        let step = agent.parse_response("[REASONING]\nDone.\n[ANSWER]\nThe system is overloaded.");
        assert!(step.is_final);
        assert_eq!(step.answer.as_deref(), Some("The system is overloaded."));
    }

    #[test]
    fn test_parse_drops_hallucinated_observation() {
        let (agent, _) = agent_with(ScriptedProvider::new(&[]), 3);
        let step = agent.parse_response(&format!("{}\n[OBSERVATION]\nfake\n[ANSWER]\nmade up", KB_CALL));
        assert_eq!(step.actions.len(), 1);
        assert!(!step.is_final);
    }

    #[test]
    fn test_parse_tagless_text_is_final() {
        let (agent, _) = agent_with(ScriptedProvider::new(&[]), 3);
        let step = agent.parse_response("The link is down.");
        assert!(step.is_final);
        assert_eq!(step.answer.as_deref(), Some("The link is down."));
    }

    #[test]
    fn test_parse_raw_json_with_arguments_key() {
        let (agent, _) = agent_with(ScriptedProvider::new(&[]), 3);
        let step = agent.parse_response(r#"Calling {"name": "query_link_status", "arguments": {"query": "link"}}"#);
        assert_eq!(step.actions[0].name, "query_link_status");
        assert_eq!(step.actions[0].parameters["query"], "link");
    }

    #[tokio::test]
    async fn test_duplicate_call_is_not_reexecuted() {
        let provider = ScriptedProvider::new(&[KB_CALL, KB_CALL, "[ANSWER]\nunable to determine root cause"]);
        let (agent, calls) = agent_with(provider, 5);
        let response = agent.run("why?").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(response.steps[1].observations[0].starts_with("SYSTEM HINT"));
        assert!(response.steps[1].observations[0].contains("call 1"));
        assert_eq!(response.answer, "unable to determine root cause");
    }

    #[tokio::test]
    async fn test_answer_before_any_tool_is_rejected() {
        let provider = ScriptedProvider::new(&["[ANSWER]\nguess", KB_CALL, "[ANSWER]\nreal answer"]);
        let (agent, calls) = agent_with(provider, 5);
        let response = agent.run("why?").await.unwrap();
        assert_eq!(response.answer, "real answer");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(response.steps[0].thought.contains("REJECTED"));
    }

    #[tokio::test]
    async fn test_max_steps_exceeded_is_distinct_error() {
        let provider = ScriptedProvider::new(&[KB_CALL, KB_CALL, KB_CALL]);
        let (agent, _) = agent_with(provider, 2);
        let err = agent.run("why?").await.unwrap_err();
        assert!(matches!(err, AgentError::MaxStepsExceeded(2)));
    }

    #[tokio::test]
    async fn test_step_timeout_is_distinct_error() {
        let (agent, _) = agent_with(Arc::new(SlowProvider), 3);
        let agent = DiagnosticAgent {
            config: AgentConfig {
                step_timeout: Duration::from_millis(50),
                ..agent.config.clone()
            },
            ..agent
        };
        let err = agent.run("why?").await.unwrap_err();
        assert!(matches!(err, AgentError::StepTimeout(_)));
    }

    #[tokio::test]
    async fn test_diagnose_returns_sentinel_on_failure() {
        let (agent, _) = agent_with(ScriptedProvider::new(&[]), 3);
        assert_eq!(agent.diagnose("why?").await, FAILURE_SENTINEL);
    }
}
