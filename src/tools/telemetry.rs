//! Telemetry endpoints exposed as tools.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use super::{Tool, ToolOutput};
use crate::agent::{AgentError, AgentResult};
use crate::telemetry::{TelemetryEndpoint, TelemetryError};

pub struct TelemetryTool(pub TelemetryEndpoint);

#[async_trait]
impl Tool for TelemetryTool {
    fn name(&self) -> String {
        self.0.name().to_string()
    }

    fn description(&self) -> String {
        self.0.description().to_string()
    }

    fn parameters(&self) -> Value {
        self.0.input_schema()
    }

    fn output_schema(&self) -> Option<Value> {
        Some(self.0.output_schema())
    }

    async fn execute(&self, params: Value) -> AgentResult<ToolOutput> {
        match self.0.invoke(params) {
            Ok(data) => Ok(ToolOutput::success_json(data)),
            Err(e @ TelemetryError::InvalidArguments { .. }) => {
                Err(AgentError::Validation(e.to_string()))
            }
            Err(e) => Err(AgentError::Tool(e.to_string())),
        }
    }
}

/// One tool per telemetry endpoint.
pub fn telemetry_tools() -> Vec<Arc<dyn Tool>> {
    TelemetryEndpoint::ALL
        .into_iter()
        .map(|endpoint| Arc::new(TelemetryTool(endpoint)) as Arc<dyn Tool>)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_all_endpoints_are_exposed() {
        let tools = telemetry_tools();
        assert_eq!(tools.len(), 9);
        assert!(tools.iter().any(|t| t.name() == "query_average_requests_per_sec"));
    }

    #[tokio::test]
    async fn test_summary_is_compact_json() {
        let tool = TelemetryTool(TelemetryEndpoint::AverageCpuLoad);
        let out = tool
            .execute(json!({"deployment_id": "d", "time_window": 60}))
            .await
            .unwrap();
        assert_eq!(out.summary, r#"{"average_cpu_load_percent":98}"#);
    }
}
