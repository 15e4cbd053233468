//! Two-node pipeline: Diagnostic -> Response -> End.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use super::message::{ConversationState, Message, Part};
use crate::a2a::{execute_a2a_agent, A2aError, PromptInput};
use crate::agent::{AgentError, DiagnosticAgent, EvaluationReport, ResponseAgent, TraceLevel};
use crate::evaluation::Reference;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error(transparent)]
    Transport(#[from] A2aError),
    #[error(transparent)]
    Agent(#[from] AgentError),
    #[error("{node:?} node has no input: {reason}")]
    MissingInput { node: NodeId, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeId {
    Diagnostic,
    Response,
    End,
}

impl NodeId {
    /// Fixed edges, no branching.
    pub fn next(self) -> NodeId {
        match self {
            NodeId::Diagnostic => NodeId::Response,
            NodeId::Response | NodeId::End => NodeId::End,
        }
    }
}

/// A graph step: reads the state, returns messages to append.
#[async_trait]
pub trait GraphNode: Send + Sync {
    fn id(&self) -> NodeId;
    async fn run(&self, state: &ConversationState) -> Result<Vec<Message>, GraphError>;
}

/// Anything that can answer a diagnostic prompt.
#[async_trait]
pub trait DiagnosticService: Send + Sync {
    async fn diagnose(&self, prompt: &str) -> Result<String, GraphError>;
}

#[async_trait]
impl DiagnosticService for DiagnosticAgent {
    async fn diagnose(&self, prompt: &str) -> Result<String, GraphError> {
        Ok(DiagnosticAgent::diagnose(self, prompt).await)
    }
}

/// The diagnostic agent reached over A2A.
pub struct RemoteDiagnostic {
    pub base_url: String,
    pub user: String,
    pub model: Option<String>,
    pub log_level: TraceLevel,
}

impl RemoteDiagnostic {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            user: String::new(),
            model: None,
            log_level: TraceLevel::Verbose,
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }
}

#[async_trait]
impl DiagnosticService for RemoteDiagnostic {
    async fn diagnose(&self, prompt: &str) -> Result<String, GraphError> {
        let answer = execute_a2a_agent(
            &self.base_url,
            &self.user,
            PromptInput::from(prompt),
            self.model.clone(),
            self.log_level,
        )
        .await?;
        Ok(answer)
    }
}

pub struct DiagnosticNode {
    service: Arc<dyn DiagnosticService>,
}

impl DiagnosticNode {
    pub fn new(service: Arc<dyn DiagnosticService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl GraphNode for DiagnosticNode {
    fn id(&self) -> NodeId {
        NodeId::Diagnostic
    }

    async fn run(&self, state: &ConversationState) -> Result<Vec<Message>, GraphError> {
        let prompt = state.query().text();
        println!("Diagnostic agent node received {}", prompt);

        let response = self.service.diagnose(&prompt).await?;
        println!("🤖 Diagnostic agent node response: {}", response);
        Ok(vec![Message::assistant(response)])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseMode {
    Summarize,
    Evaluate(Reference),
}

pub struct ResponseNode {
    agent: Arc<ResponseAgent>,
    mode: ResponseMode,
}

impl ResponseNode {
    pub fn new(agent: Arc<ResponseAgent>, mode: ResponseMode) -> Self {
        Self { agent, mode }
    }
}

#[async_trait]
impl GraphNode for ResponseNode {
    fn id(&self) -> NodeId {
        NodeId::Response
    }

    async fn run(&self, state: &ConversationState) -> Result<Vec<Message>, GraphError> {
        let candidate = state
            .first_assistant()
            .map(Message::text)
            .ok_or_else(|| GraphError::MissingInput {
                node: NodeId::Response,
                reason: "no assistant message".to_string(),
            })?;
        println!("Response agent node received {}", candidate);

        let message = match &self.mode {
            ResponseMode::Summarize => Message::assistant(self.agent.summarize(&candidate).await?),
            ResponseMode::Evaluate(reference) => {
                let report = self.agent.evaluate(&candidate, reference).await?;
                let data = serde_json::to_value(&report).map_err(AgentError::from)?;
                Message::assistant_parts(vec![
                    Part::Text {
                        text: report.rubric.explanation.clone(),
                    },
                    Part::Data { data },
                ])
            }
        };
        println!("🤖 Response agent node response: {}", message.text());
        Ok(vec![message])
    }
}

pub struct DiagnosticGraph {
    diagnostic: DiagnosticNode,
    response: ResponseNode,
}

impl DiagnosticGraph {
    pub fn new(service: Arc<dyn DiagnosticService>, agent: Arc<ResponseAgent>, mode: ResponseMode) -> Self {
        Self {
            diagnostic: DiagnosticNode::new(service),
            response: ResponseNode::new(agent, mode),
        }
    }

    fn node(&self, id: NodeId) -> Option<&dyn GraphNode> {
        match id {
            NodeId::Diagnostic => Some(&self.diagnostic),
            NodeId::Response => Some(&self.response),
            NodeId::End => None,
        }
    }

    /// Run every node once, in order, starting from `query`.
    pub async fn invoke(&self, query: &str) -> Result<ConversationState, GraphError> {
        let mut state = ConversationState::new(query);
        let mut current = NodeId::Diagnostic;
        while let Some(node) = self.node(current) {
            info!("Running {:?} node", node.id());
            let delta = node.run(&state).await?;
            state.merge(delta);
            current = current.next();
        }
        Ok(state)
    }
}

/// Evaluation report carried by the final message of an `Evaluate` run.
pub fn evaluation_report(state: &ConversationState) -> Option<EvaluationReport> {
    state
        .last()
        .content
        .data()
        .cloned()
        .and_then(|data: Value| serde_json::from_value(data).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::HashingEmbedder;
    use crate::agent::LLMProvider;
    use std::sync::Mutex;

    struct FixedDiagnosis(&'static str);

    #[async_trait]
    impl DiagnosticService for FixedDiagnosis {
        async fn diagnose(&self, _prompt: &str) -> Result<String, GraphError> {
            Ok(self.0.to_string())
        }
    }

    struct FailingDiagnosis;

    #[async_trait]
    impl DiagnosticService for FailingDiagnosis {
        async fn diagnose(&self, _prompt: &str) -> Result<String, GraphError> {
            Err(GraphError::Transport(A2aError::EmptyResponse))
        }
    }

    struct Recorder {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LLMProvider for Recorder {
        async fn generate(&self, _model: &str, prompt: String, _system: Option<String>) -> anyhow::Result<String> {
            self.prompts.lock().unwrap().push(prompt);
            Ok("Summary sentence.".to_string())
        }
    }

    fn response_agent(provider: Arc<Recorder>) -> Arc<ResponseAgent> {
        Arc::new(ResponseAgent::new(provider, Arc::new(HashingEmbedder::default())))
    }

    #[test]
    fn test_edges_are_fixed() {
        assert_eq!(NodeId::Diagnostic.next(), NodeId::Response);
        assert_eq!(NodeId::Response.next(), NodeId::End);
        assert_eq!(NodeId::End.next(), NodeId::End);
    }

    #[tokio::test]
    async fn test_summarize_run_appends_two_messages() {
        let provider = Arc::new(Recorder {
            prompts: Mutex::new(Vec::new()),
        });
        let graph = DiagnosticGraph::new(
            Arc::new(FixedDiagnosis("The deployment is overloaded.")),
            response_agent(provider.clone()),
            ResponseMode::Summarize,
        );
        let state = graph.invoke("why?").await.unwrap();
        assert_eq!(state.len(), 3);
        assert_eq!(state.last().text(), "Summary sentence.");
        // the response node sees the diagnostic answer, not the query
        assert_eq!(provider.prompts.lock().unwrap()[0], "The deployment is overloaded.");
    }

    #[tokio::test]
    async fn test_evaluate_run_carries_report() {
        let provider = Arc::new(Recorder {
            prompts: Mutex::new(Vec::new()),
        });
        let agent = Arc::new(
            ResponseAgent::new(provider, Arc::new(HashingEmbedder::default()))
                .with_rubric(crate::config::RubricKind::Facts),
        );
        let reference = Reference::Text("name: Alice; age: 35; city: Seattle".to_string());
        let graph = DiagnosticGraph::new(
            Arc::new(FixedDiagnosis("Alice from Seattle")),
            agent,
            ResponseMode::Evaluate(reference),
        );
        let state = graph.invoke("who?").await.unwrap();
        let report = evaluation_report(&state).unwrap();
        assert_eq!(report.rubric.score, 67);
    }

    #[tokio::test]
    async fn test_diagnostic_errors_propagate() {
        let provider = Arc::new(Recorder {
            prompts: Mutex::new(Vec::new()),
        });
        let graph = DiagnosticGraph::new(
            Arc::new(FailingDiagnosis),
            response_agent(provider.clone()),
            ResponseMode::Summarize,
        );
        assert!(graph.invoke("why?").await.is_err());
        assert!(provider.prompts.lock().unwrap().is_empty());
    }
}
