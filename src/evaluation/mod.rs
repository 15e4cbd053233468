//! Answer evaluation: rubric scoring and embedding similarity.

pub mod rubric;
pub mod similarity;

pub use rubric::{score_verdicts, FactRubric, FactVerdict};
pub use similarity::{cosine_similarity, embedding_score, similarity_score};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Narrative the diagnostic answer is scored against.
pub const REFERENCE_ANSWER: &str = "Origin service d3f1a8b2-7c4e-4f9e-9e2a-8b6c3a2d1f4e has high latency on 98% of requests in the last hour. \
The server latency of 500 ms is 25% of the 2000 ms end-to-end latency and the storage latency of 10 ms is small, so neither external factors nor storage explain it. \
The service runs on deployment f3c9a7e2-8b4d-4f6a-9c2e-7d1b3a6e5c9f, whose average CPU load is 98%. \
The deployment handles 500 requests/sec across 2 role instances, which is 250 requests/sec per instance and exceeds the 100/sec threshold. \
Root cause: system overloaded with too many requests.";

/// The same reference as atomic `key: value` facts.
pub const REFERENCE_DETAILS: [&str; 8] = [
    "high latency requests percent: 98",
    "server latency ms: 500",
    "end-to-end latency ms: 2000",
    "average CPU load percent: 98",
    "requests per second: 500",
    "role instances: 2",
    "requests per second per instance: 250",
    "root cause: system overloaded with too many requests",
];

/// What a candidate answer is compared with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reference {
    Text(String),
    Details(Vec<String>),
}

impl Reference {
    pub fn text(&self) -> String {
        match self {
            Reference::Text(text) => text.clone(),
            Reference::Details(items) => items.join("; "),
        }
    }

    pub fn default_narrative() -> Self {
        Reference::Text(REFERENCE_ANSWER.to_string())
    }

    pub fn default_details() -> Self {
        Reference::Details(REFERENCE_DETAILS.iter().map(|d| d.to_string()).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub score: u32,
    #[serde(default)]
    pub missing_details: Vec<String>,
    #[serde(default)]
    pub explanation: String,
}

impl EvaluationResult {
    /// Stand-in for a result that could not be obtained. Scores 0.
    pub fn absent(reason: impl Into<String>) -> Self {
        Self {
            score: 0,
            missing_details: Vec::new(),
            explanation: reason.into(),
        }
    }
}

/// Grading prompt for the judge model.
pub fn rubric_prompt(candidate: &str, reference: &Reference) -> String {
    let reference_block = match reference {
        Reference::Text(text) => text.clone(),
        Reference::Details(items) => items
            .iter()
            .map(|item| format!("- {}", item))
            .collect::<Vec<_>>()
            .join("\n"),
    };

    format!(
        r#"You are grading how completely a candidate answer covers the details of a reference answer.

Scoring rules:
1. Extract the N atomic facts stated in the reference.
2. For each fact decide whether the candidate states it (present), states it only in part (partial), or does not state it (missing).
3. Each missing fact deducts 100/N points and each partial fact deducts 50/N points.
4. score = round(max(0, 100 - total deductions)). If the reference has no facts, score = 100.
5. Wording may differ; judge meaning, not phrasing.

Respond with ONLY this JSON object and nothing else:
{{"score": <integer 0-100>, "missing_details": [<missing or partial facts>], "explanation": "<one or two sentences>"}}

Reference:
{}

Candidate:
{}
"#,
        reference_block, candidate
    )
}

/// Trim noise around the outermost object and restore missing braces.
///
/// Running it on its own output returns the same text.
pub fn repair_json(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let mut text = match trimmed.find('{') {
        Some(start) => trimmed[start..].to_string(),
        None => format!("{{{}", trimmed),
    };

    match text.rfind('}') {
        Some(end) => text.truncate(end + 1),
        None => text.truncate(text.trim_end().len()),
    }

    let opens = text.matches('{').count();
    let closes = text.matches('}').count();
    for _ in closes..opens {
        text.push('}');
    }
    text
}

/// Parse the judge's output. Anything that does not yield an integer score
/// becomes an absent result (score 0) with the reason logged.
pub fn parse_rubric_response(raw: &str) -> EvaluationResult {
    let repaired = repair_json(raw);
    let value: Value = match serde_json::from_str(&repaired) {
        Ok(value) => value,
        Err(e) => {
            warn!("Unparseable rubric response ({}): {}", e, raw);
            return EvaluationResult::absent(format!("unparseable rubric response: {}", e));
        }
    };

    let Some(score) = value.get("score").and_then(Value::as_i64) else {
        warn!("Rubric response has no integer score: {}", value);
        return EvaluationResult::absent("rubric response has no integer score");
    };

    let missing_details = value
        .get("missing_details")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect()
        })
        .unwrap_or_default();

    let explanation = value
        .get("explanation")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    EvaluationResult {
        score: score.clamp(0, 100) as u32,
        missing_details,
        explanation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repair_trims_surrounding_text() {
        let raw = "Sure! Here is the grade:\n{\"score\": 80, \"missing_details\": [], \"explanation\": \"ok\"}\nThanks.";
        assert_eq!(
            repair_json(raw),
            "{\"score\": 80, \"missing_details\": [], \"explanation\": \"ok\"}"
        );
    }

    #[test]
    fn test_repair_adds_missing_braces() {
        assert_eq!(repair_json("\"score\": 50}"), "{\"score\": 50}");
        assert_eq!(
            repair_json("{\"score\": 50, \"missing_details\": []"),
            "{\"score\": 50, \"missing_details\": []}"
        );
        assert_eq!(repair_json("   "), "");
    }

    #[test]
    fn test_repair_is_idempotent() {
        let samples = [
            "{\"score\": 1}",
            "noise {\"score\": 2",
            "\"score\": 3",
            "x { {\"a\": {\"b\": 1} trailing",
            "}}{",
            "{\"explanation\": \"uses } inside\"} tail",
            "",
            "plain text",
        ];
        for sample in samples {
            let once = repair_json(sample);
            assert_eq!(repair_json(&once), once, "not idempotent for {:?}", sample);
        }
    }

    #[test]
    fn test_parse_valid_response() {
        let result = parse_rubric_response(
            "{\"score\": 67, \"missing_details\": [\"age: 35\"], \"explanation\": \"age missing\"}",
        );
        assert_eq!(result.score, 67);
        assert_eq!(result.missing_details, vec!["age: 35"]);
    }

    #[test]
    fn test_non_integer_score_is_absent() {
        assert_eq!(parse_rubric_response("{\"score\": \"high\"}").score, 0);
        assert_eq!(parse_rubric_response("{\"score\": 87.5}").score, 0);
        assert_eq!(parse_rubric_response("no json at all").score, 0);
    }

    #[test]
    fn test_score_is_clamped() {
        assert_eq!(parse_rubric_response("{\"score\": 140}").score, 100);
        assert_eq!(parse_rubric_response("{\"score\": -5}").score, 0);
    }

    #[test]
    fn test_prompt_lists_detail_references() {
        let prompt = rubric_prompt("candidate text", &Reference::default_details());
        assert!(prompt.contains("- role instances: 2"));
        assert!(prompt.contains("candidate text"));
    }
}
