//! Environment-driven configuration.
//!
//! Every process reads the same variables (optionally from a `.env` file via
//! `dotenv`). There is no config file and nothing is persisted between runs.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Which embedding backend to use for retrieval and similarity scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedderKind {
    /// `fastembed` AllMiniLM-L6-v2 (downloads the model on first use)
    FastEmbed,
    /// Deterministic feature hashing, no model download
    Hashing,
}

impl FromStr for EmbedderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fastembed" | "minilm" => Ok(Self::FastEmbed),
            "hashing" | "hash" => Ok(Self::Hashing),
            other => Err(format!("unknown embedder '{}'", other)),
        }
    }
}

/// Which rubric the evaluation agent applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RubricKind {
    /// Grading prompt answered by the judge model
    Llm,
    /// Local fact matching, no model call
    Facts,
}

impl FromStr for RubricKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "llm" => Ok(Self::Llm),
            "facts" | "local" => Ok(Self::Facts),
            other => Err(format!("unknown rubric '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DiagnosticsConfig {
    pub ollama_host: String,
    pub ollama_port: u16,
    /// Optional OpenAI-compatible endpoint used instead of Ollama
    pub provider_url: Option<String>,
    pub provider_api_key: Option<String>,
    pub mcp_http_url: String,
    pub mcp_http_bind: String,
    pub mcp_local_command: PathBuf,
    pub a2a_url: String,
    pub a2a_bind: String,
    pub summary_model: String,
    pub judge_model: String,
    pub embedder: EmbedderKind,
    pub rubric: RubricKind,
    pub max_steps: usize,
    pub step_timeout: Duration,
    pub kb_top_n: usize,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            ollama_host: "http://localhost".to_string(),
            ollama_port: 11434,
            provider_url: None,
            provider_api_key: None,
            mcp_http_url: "http://localhost:8000/mcp".to_string(),
            mcp_http_bind: "localhost:8000".to_string(),
            mcp_local_command: sibling_binary("mcp_local_server"),
            a2a_url: "http://localhost:9001/".to_string(),
            a2a_bind: "0.0.0.0:9001".to_string(),
            summary_model: "llama3.2".to_string(),
            judge_model: "llama3.2".to_string(),
            embedder: EmbedderKind::FastEmbed,
            rubric: RubricKind::Llm,
            max_steps: 15,
            step_timeout: Duration::from_secs(300),
            kb_top_n: 2,
        }
    }
}

impl DiagnosticsConfig {
    /// Load from the process environment, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup (the environment, or a map in tests).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let text = |key: &str, default: String| -> String {
            lookup(key).filter(|v| !v.trim().is_empty()).unwrap_or(default)
        };

        Self {
            ollama_host: text("OLLAMA_HOST", defaults.ollama_host),
            ollama_port: parse_or(&lookup, "OLLAMA_PORT", defaults.ollama_port),
            provider_url: lookup("DIAG_PROVIDER_URL").filter(|v| !v.trim().is_empty()),
            provider_api_key: lookup("DIAG_PROVIDER_API_KEY").filter(|v| !v.trim().is_empty()),
            mcp_http_url: text("DIAG_MCP_HTTP_URL", defaults.mcp_http_url),
            mcp_http_bind: text("DIAG_MCP_HTTP_BIND", defaults.mcp_http_bind),
            mcp_local_command: lookup("DIAG_MCP_LOCAL_COMMAND")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.mcp_local_command),
            a2a_url: text("DIAG_A2A_URL", defaults.a2a_url),
            a2a_bind: text("DIAG_A2A_BIND", defaults.a2a_bind),
            summary_model: text("DIAG_SUMMARY_MODEL", defaults.summary_model),
            judge_model: text("DIAG_JUDGE_MODEL", defaults.judge_model),
            embedder: parse_or(&lookup, "DIAG_EMBEDDER", defaults.embedder),
            rubric: parse_or(&lookup, "DIAG_RUBRIC", defaults.rubric),
            max_steps: parse_or(&lookup, "DIAG_MAX_STEPS", defaults.max_steps).max(1),
            step_timeout: Duration::from_secs(parse_or(
                &lookup,
                "DIAG_STEP_TIMEOUT_SECS",
                defaults.step_timeout.as_secs(),
            )),
            kb_top_n: parse_or(&lookup, "DIAG_KB_TOP_N", defaults.kb_top_n).max(1),
        }
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(e) => {
                warn!("Ignoring invalid {}={:?}: {}", key, raw, e);
                default
            }
        },
        _ => default,
    }
}

/// Path of a binary shipped next to the current executable.
fn sibling_binary(name: &str) -> PathBuf {
    let file = format!("{}{}", name, std::env::consts::EXE_SUFFIX);
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(&file)))
        .unwrap_or_else(|| PathBuf::from(file))
}
