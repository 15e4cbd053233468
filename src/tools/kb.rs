//! Failure analysis knowledge base exposed as a tool.

use async_trait::async_trait;
use schemars::{schema_for, JsonSchema};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{Tool, ToolOutput};
use crate::agent::{AgentError, AgentResult};
use crate::knowledge::DiagnosticKb;

pub const KB_TOOL_NAME: &str = "failure_analysis_kb";

#[derive(Debug, Deserialize, JsonSchema)]
struct KbQuery {
    /// Free-text description of the issue to look up
    query: String,
}

pub struct FailureAnalysisKbTool {
    kb: Arc<DiagnosticKb>,
    top_n: usize,
}

impl FailureAnalysisKbTool {
    pub fn new(kb: Arc<DiagnosticKb>, top_n: usize) -> Self {
        Self { kb, top_n }
    }
}

#[async_trait]
impl Tool for FailureAnalysisKbTool {
    fn name(&self) -> String {
        KB_TOOL_NAME.to_string()
    }

    fn description(&self) -> String {
        "Knowledge base for procedures on how to diagnose issues.".to_string()
    }

    fn parameters(&self) -> Value {
        serde_json::to_value(schema_for!(KbQuery)).unwrap_or_else(|_| json!({"type": "object"}))
    }

    fn output_schema(&self) -> Option<Value> {
        Some(json!({"type": "array", "items": {"type": "string"}}))
    }

    async fn execute(&self, params: Value) -> AgentResult<ToolOutput> {
        let args: KbQuery = serde_json::from_value(params)
            .map_err(|e| AgentError::Validation(format!("{}: {}", KB_TOOL_NAME, e)))?;
        let documents = self.kb.query(&args.query, self.top_n).await;
        let data = json!(documents);
        Ok(ToolOutput::success(data.clone(), data.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::HashingEmbedder;

    #[tokio::test]
    async fn test_returns_top_n_playbooks_as_json_array() {
        let kb = Arc::new(DiagnosticKb::with_playbooks(Arc::new(HashingEmbedder::default())).await);
        let tool = FailureAnalysisKbTool::new(kb, 2);
        let out = tool
            .execute(json!({"query": "origin service with high latency"}))
            .await
            .unwrap();
        assert!(out.success);
        assert_eq!(out.data.as_array().unwrap().len(), 2);
        let parsed: Vec<String> = serde_json::from_str(&out.summary).unwrap();
        assert_eq!(parsed.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_query_is_validation_error() {
        let kb = Arc::new(DiagnosticKb::new(Arc::new(HashingEmbedder::default())));
        let tool = FailureAnalysisKbTool::new(kb, 2);
        let err = tool.execute(json!({})).await.unwrap_err();
        assert!(matches!(err, AgentError::Validation(_)));
    }
}
