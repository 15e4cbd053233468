//! Trace sink for model and tool activity.
//!
//! One sink instance is handed to the agent at construction; it only
//! observes and never alters control flow.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::tools::{ToolCall, ToolOutput};

/// Console verbosity, carried as an integer on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum TraceLevel {
    #[default]
    Normal = 0,
    Verbose = 1,
    Trace = 2,
    Debug = 3,
}

impl From<i64> for TraceLevel {
    fn from(value: i64) -> Self {
        match value {
            i64::MIN..=0 => TraceLevel::Normal,
            1 => TraceLevel::Verbose,
            2 => TraceLevel::Trace,
            _ => TraceLevel::Debug,
        }
    }
}

impl From<TraceLevel> for i64 {
    fn from(level: TraceLevel) -> Self {
        level as i64
    }
}

pub trait TraceSink: Send + Sync {
    fn level(&self) -> TraceLevel;
    fn on_llm_start(&self, model: &str, prompt: &str);
    fn on_llm_end(&self, output: &str, elapsed: Duration);
    fn on_tool_start(&self, call: &ToolCall, description: &str);
    fn on_tool_end(&self, call: &ToolCall, output: &ToolOutput, elapsed: Duration);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTrace;

impl TraceSink for NullTrace {
    fn level(&self) -> TraceLevel {
        TraceLevel::Normal
    }
    fn on_llm_start(&self, _model: &str, _prompt: &str) {}
    fn on_llm_end(&self, _output: &str, _elapsed: Duration) {}
    fn on_tool_start(&self, _call: &ToolCall, _description: &str) {}
    fn on_tool_end(&self, _call: &ToolCall, _output: &ToolOutput, _elapsed: Duration) {}
}

/// Prints to stdout.
///
/// * Normal: tool name per call
/// * Verbose: arguments, results and elapsed times
/// * Trace: adds model outputs
/// * Debug: adds full prompts
#[derive(Debug, Clone, Copy)]
pub struct ConsoleTrace {
    level: TraceLevel,
}

impl ConsoleTrace {
    pub fn new(level: TraceLevel) -> Self {
        Self { level }
    }
}

impl TraceSink for ConsoleTrace {
    fn level(&self) -> TraceLevel {
        self.level
    }

    fn on_llm_start(&self, model: &str, prompt: &str) {
        if self.level >= TraceLevel::Debug {
            println!("\n🧠 LLM start ({})\n{}", model, prompt);
        }
    }

    fn on_llm_end(&self, output: &str, elapsed: Duration) {
        if self.level >= TraceLevel::Trace {
            println!("\n🧠 LLM output:\n{}", output);
        }
        if self.level >= TraceLevel::Verbose {
            println!("   ⏱️ LLM call took {:.2}s", elapsed.as_secs_f64());
        }
    }

    fn on_tool_start(&self, call: &ToolCall, description: &str) {
        println!("🔧 Using Tool: {}", call.name);
        if self.level >= TraceLevel::Verbose {
            println!("   Description: {}", description);
            println!("   Arguments: {}", call.parameters);
        }
    }

    fn on_tool_end(&self, call: &ToolCall, output: &ToolOutput, elapsed: Duration) {
        if self.level < TraceLevel::Verbose {
            return;
        }
        println!("   Result from {}:", call.name);
        for line in render_output(&output.summary) {
            println!("   {}", line);
        }
        println!("   ⏱️ Tool call took {:.2}s", elapsed.as_secs_f64());
    }
}

/// JSON arrays are listed item by item; anything else is shown as is.
pub fn render_output(summary: &str) -> Vec<String> {
    match serde_json::from_str::<Value>(summary) {
        Ok(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(idx, item)| match item {
                Value::String(s) => format!("#{} {}", idx, s.trim()),
                other => format!("#{} {}", idx, other),
            })
            .collect(),
        _ => vec![summary.to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_wire_format_is_integer() {
        assert_eq!(serde_json::to_string(&TraceLevel::Trace).unwrap(), "2");
        let level: TraceLevel = serde_json::from_str("1").unwrap();
        assert_eq!(level, TraceLevel::Verbose);
        let clamped: TraceLevel = serde_json::from_str("42").unwrap();
        assert_eq!(clamped, TraceLevel::Debug);
    }

    #[test]
    fn test_levels_are_ordered() {
        assert!(TraceLevel::Normal < TraceLevel::Verbose);
        assert!(TraceLevel::Trace < TraceLevel::Debug);
    }

    #[test]
    fn test_array_output_is_itemized() {
        let lines = render_output(r#"["first doc", "second doc"]"#);
        assert_eq!(lines, vec!["#0 first doc", "#1 second doc"]);
        assert_eq!(render_output("{\"a\":1}"), vec!["{\"a\":1}"]);
    }
}
