//! Deterministic detail-coverage rubric.
//!
//! Facts come from the reference; each is judged present, partial or missing
//! in the candidate. Missing facts cost `100/N`, partial ones `50/N`, and the
//! score is `round(max(0, 100 - deductions))` with ties to even. No facts
//! scores 100.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::{EvaluationResult, Reference};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactVerdict {
    Present,
    Partial,
    Missing,
}

/// Lowercased `\w+` tokens of `text`.
fn words(pattern: &Regex, text: &str) -> Vec<String> {
    pattern
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

pub fn score_verdicts(verdicts: &[FactVerdict]) -> u32 {
    if verdicts.is_empty() {
        return 100;
    }
    let n = verdicts.len() as f64;
    let missing = verdicts.iter().filter(|v| **v == FactVerdict::Missing).count() as f64;
    let partial = verdicts.iter().filter(|v| **v == FactVerdict::Partial).count() as f64;
    let deductions = missing * 100.0 / n + partial * 50.0 / n;
    (100.0 - deductions).max(0.0).round_ties_even() as u32
}

/// Local rubric that needs no judge model.
#[derive(Debug, Clone)]
pub struct FactRubric {
    words: Regex,
    separators: Regex,
}

impl FactRubric {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            words: Regex::new(r"\w+")?,
            // `;`, newline, or a sentence-ending period (not a decimal point)
            separators: Regex::new(r"[;\n]|\.(?:\s+|$)")?,
        })
    }

    /// Atomic facts of a reference. Text is split on `;`, newlines and
    /// sentence ends; a detail list is used as is. Fragments without word
    /// characters are dropped.
    pub fn extract_facts(&self, reference: &Reference) -> Vec<String> {
        let candidates: Vec<String> = match reference {
            Reference::Text(text) => self
                .separators
                .split(text)
                .map(|f| f.trim().to_string())
                .collect(),
            Reference::Details(items) => items.iter().map(|f| f.trim().to_string()).collect(),
        };
        candidates
            .into_iter()
            .filter(|fact| !words(&self.words, fact).is_empty())
            .collect()
    }

    /// For `key: value` facts only the value has to appear in the candidate.
    pub fn judge_fact(&self, fact: &str, candidate: &str) -> FactVerdict {
        let value = match fact.split_once(':') {
            Some((_, value)) if !words(&self.words, value).is_empty() => value,
            _ => fact,
        };
        let wanted = words(&self.words, value);
        if wanted.is_empty() {
            return FactVerdict::Present;
        }

        let available: HashSet<String> = words(&self.words, candidate).into_iter().collect();
        let found = wanted.iter().filter(|w| available.contains(*w)).count();
        if found == wanted.len() {
            FactVerdict::Present
        } else if found > 0 {
            FactVerdict::Partial
        } else {
            FactVerdict::Missing
        }
    }

    pub fn score(&self, candidate: &str, reference: &Reference) -> EvaluationResult {
        let facts = self.extract_facts(reference);
        let verdicts: Vec<FactVerdict> = facts
            .iter()
            .map(|f| self.judge_fact(f, candidate))
            .collect();

        let missing_details: Vec<String> = facts
            .iter()
            .zip(&verdicts)
            .filter_map(|(fact, verdict)| match verdict {
                FactVerdict::Missing => Some(fact.clone()),
                FactVerdict::Partial => Some(format!("{} (partial)", fact)),
                FactVerdict::Present => None,
            })
            .collect();

        let present = verdicts.iter().filter(|v| **v == FactVerdict::Present).count();
        let explanation = if facts.is_empty() {
            "Reference has no facts to check.".to_string()
        } else {
            format!(
                "{} of {} reference facts present, {} partial, {} missing.",
                present,
                facts.len(),
                verdicts.iter().filter(|v| **v == FactVerdict::Partial).count(),
                verdicts.iter().filter(|v| **v == FactVerdict::Missing).count()
            )
        };

        EvaluationResult {
            score: score_verdicts(&verdicts),
            missing_details,
            explanation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(reference: &str) -> Reference {
        Reference::Text(reference.to_string())
    }

    fn rubric() -> FactRubric {
        FactRubric::new().unwrap()
    }

    #[test]
    fn test_alice_scores_67() {
        let result = rubric().score("Alice from Seattle", &text("name: Alice; age: 35; city: Seattle"));
        assert_eq!(result.score, 67);
        assert_eq!(result.missing_details, vec!["age: 35"]);
    }

    #[test]
    fn test_full_and_no_coverage() {
        let reference = text("cpu: 98\nrequests: 500\ninstances: 2");
        assert_eq!(rubric().score("cpu 98, 500 requests over 2 instances", &reference).score, 100);
        assert_eq!(rubric().score("nothing relevant", &reference).score, 0);
    }

    #[test]
    fn test_zero_facts_scores_100() {
        for reference in [text(""), text(" ; \n ;"), Reference::Details(vec![])] {
            let result = rubric().score("anything at all", &reference);
            assert_eq!(result.score, 100);
            assert!(result.missing_details.is_empty());
        }
    }

    #[test]
    fn test_partial_costs_half() {
        let reference = text("cause: system overloaded; cpu: 98");
        let result = rubric().score("the system hit 98% cpu", &reference);
        // one partial of two facts: 100 - 25
        assert_eq!(result.score, 75);
        assert_eq!(result.missing_details, vec!["cause: system overloaded (partial)"]);
    }

    #[test]
    fn test_values_are_word_bounded() {
        assert_eq!(rubric().judge_fact("instances: 2", "handled 250 requests"), FactVerdict::Missing);
        assert_eq!(rubric().judge_fact("instances: 2", "2 role instances"), FactVerdict::Present);
    }

    #[test]
    fn test_half_points_round_to_even() {
        // 100 - 25 - 12.5 = 62.5
        let verdicts = [
            FactVerdict::Missing,
            FactVerdict::Partial,
            FactVerdict::Present,
            FactVerdict::Present,
        ];
        assert_eq!(score_verdicts(&verdicts), 62);
        // 100 - 12.5 = 87.5
        let verdicts = [
            FactVerdict::Partial,
            FactVerdict::Present,
            FactVerdict::Present,
            FactVerdict::Present,
        ];
        assert_eq!(score_verdicts(&verdicts), 88);
    }

    #[test]
    fn test_narrative_splits_into_sentences() {
        let reference = Reference::default_narrative();
        let facts = rubric().extract_facts(&reference);
        assert_eq!(facts.len(), 5);
        assert!(facts[4].starts_with("Root cause:"));
        assert!(facts.iter().all(|f| !f.ends_with('.')));
    }

    #[test]
    fn test_root_cause_alone_misses_the_evidence() {
        let reference = Reference::default_narrative();
        let result = rubric().score("system overloaded with too many requests", &reference);
        // root cause present, two sentences share "requests", two missing
        assert_eq!(result.score, 40);
        assert_eq!(result.missing_details.len(), 4);
    }

    #[test]
    fn test_decimal_point_is_not_a_sentence_end() {
        let facts = rubric().extract_facts(&text("load: 2.5 ms. cause: overload"));
        assert_eq!(facts, vec!["load: 2.5 ms", "cause: overload"]);
    }

    #[test]
    fn test_score_never_negative() {
        let verdicts = [FactVerdict::Missing; 3];
        assert_eq!(score_verdicts(&verdicts), 0);
    }
}
