//! Per-iteration measurements and their summary table.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const STAT_LABELS: [&str; 3] = [
    "Diagnostic_elapsed_time",
    "LLM_similarity_score",
    "ST_similarity_score",
];

/// Two-sided 95% Student t critical values for 1..=30 degrees of freedom.
const T_CRITICAL_95: [f64; 30] = [
    12.706, 4.303, 3.182, 2.776, 2.571, 2.447, 2.365, 2.306, 2.262, 2.228, 2.201, 2.179, 2.160,
    2.145, 2.131, 2.120, 2.110, 2.101, 2.093, 2.086, 2.080, 2.074, 2.069, 2.064, 2.060, 2.056,
    2.052, 2.048, 2.045, 2.042,
];
const Z_95: f64 = 1.96;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StatsError {
    #[error("data length does not match labels length")]
    LengthMismatch { labels: usize, columns: usize },
}

/// One evaluation iteration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub elapsed_secs: f64,
    pub llm_score: u32,
    pub embedding_score: u32,
}

impl Sample {
    /// Column-major view in `STAT_LABELS` order.
    pub fn columns(samples: &[Sample]) -> Vec<Vec<f64>> {
        vec![
            samples.iter().map(|s| round2(s.elapsed_secs)).collect(),
            samples.iter().map(|s| s.llm_score as f64).collect(),
            samples.iter().map(|s| s.embedding_score as f64).collect(),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub mean: f64,
    /// Half-width of the 95% confidence interval
    pub ci95: f64,
}

pub fn summarize(values: &[f64]) -> Summary {
    let n = values.len();
    if n == 0 {
        return Summary { mean: 0.0, ci95: 0.0 };
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    if n < 2 {
        return Summary { mean, ci95: 0.0 };
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    let t = T_CRITICAL_95.get(n - 2).copied().unwrap_or(Z_95);
    Summary {
        mean,
        ci95: t * variance.sqrt() / (n as f64).sqrt(),
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn format_value(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{}", round2(v))
    }
}

/// Right-aligned table followed by one `label: mean ± ci95` line per column.
///
/// The row count comes from the first column; shorter columns show `N/A`.
pub fn render_stats(labels: &[&str], data: &[Vec<f64>]) -> Result<String, StatsError> {
    if data.is_empty() || data.len() != labels.len() {
        return Err(StatsError::LengthMismatch {
            labels: labels.len(),
            columns: data.len(),
        });
    }

    let rows = data[0].len();
    let cell = |col: usize, row: usize| -> String {
        data[col]
            .get(row)
            .map(|v| format_value(*v))
            .unwrap_or_else(|| "N/A".to_string())
    };

    let widths: Vec<usize> = labels
        .iter()
        .enumerate()
        .map(|(col, label)| {
            (0..rows)
                .map(|row| cell(col, row).len())
                .fold(label.len(), usize::max)
        })
        .collect();

    let mut lines = Vec::with_capacity(rows + labels.len() + 3);
    lines.push(
        labels
            .iter()
            .zip(&widths)
            .map(|(label, w)| format!("{:>w$}", label, w = w))
            .collect::<Vec<_>>()
            .join(" | "),
    );
    lines.push(
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-"),
    );
    for row in 0..rows {
        lines.push(
            widths
                .iter()
                .enumerate()
                .map(|(col, w)| format!("{:>w$}", cell(col, row), w = w))
                .collect::<Vec<_>>()
                .join(" | "),
        );
    }

    lines.push(String::new());
    for (label, column) in labels.iter().zip(data) {
        let summary = summarize(column);
        lines.push(format!("{}: {:.2} ± {:.2}", label, summary.mean, summary.ci95));
    }

    Ok(lines.join("\n"))
}

/// Print the table, or the mismatch message when the shapes disagree.
pub fn print_stats(labels: &[&str], data: &[Vec<f64>]) {
    match render_stats(labels, data) {
        Ok(table) => println!("{}", table),
        Err(StatsError::LengthMismatch { .. }) => {
            println!("Error: data length does not match labels length")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_three_iteration_table() {
        let data = vec![vec![0.0, 1.0, 2.0], vec![3.0, 4.0, 5.0], vec![6.0, 7.0, 8.0]];
        let table = render_stats(&STAT_LABELS, &data).unwrap();
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines[0], "Diagnostic_elapsed_time | LLM_similarity_score | ST_similarity_score");
        assert_eq!(
            lines[1],
            format!("{}-+-{}-+-{}", "-".repeat(23), "-".repeat(20), "-".repeat(19))
        );
        assert_eq!(lines[2], format!("{:>23} | {:>20} | {:>19}", "0", "3", "6"));
        assert_eq!(lines[4], format!("{:>23} | {:>20} | {:>19}", "2", "5", "8"));
        assert_eq!(lines[6], "Diagnostic_elapsed_time: 1.00 ± 2.48");
        assert_eq!(lines[7], "LLM_similarity_score: 4.00 ± 2.48");
    }

    #[test]
    fn test_short_columns_show_na() {
        let data = vec![vec![1.5, 2.25], vec![90.0]];
        let table = render_stats(&["a", "b"], &data).unwrap();
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[2], " 1.5 |  90");
        assert_eq!(lines[3], "2.25 | N/A");
    }

    #[test]
    fn test_mismatched_lengths() {
        let err = render_stats(&STAT_LABELS, &[vec![1.0]]).unwrap_err();
        assert_eq!(err, StatsError::LengthMismatch { labels: 3, columns: 1 });
        assert!(render_stats(&[], &[]).is_err());
    }

    #[test]
    fn test_summary_edge_cases() {
        assert_eq!(summarize(&[]), Summary { mean: 0.0, ci95: 0.0 });
        assert_eq!(summarize(&[42.0]), Summary { mean: 42.0, ci95: 0.0 });
        let many: Vec<f64> = (0..40).map(|i| (i % 2) as f64).collect();
        let summary = summarize(&many);
        assert!((summary.mean - 0.5).abs() < 1e-9);
        let sd = (10.0f64 / 39.0).sqrt();
        assert!((summary.ci95 - Z_95 * sd / 40f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_samples_to_columns() {
        let samples = [
            Sample { elapsed_secs: 12.346, llm_score: 80, embedding_score: 71 },
            Sample { elapsed_secs: 10.0, llm_score: 90, embedding_score: 75 },
        ];
        let columns = Sample::columns(&samples);
        assert_eq!(columns[0], vec![12.35, 10.0]);
        assert_eq!(columns[2], vec![71.0, 75.0]);
    }
}
