//! Diagnostic Agency evaluation driver
//!
//! Sends the stock latency alert to the A2A diagnostic agent, scores each
//! answer against the reference with the LLM rubric and embedding similarity,
//! and prints a summary table over all iterations.

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::info;

use diagnostic_agency::agent::{provider_from_config, ResponseAgent, DIAGNOSTIC_QUERY};
use diagnostic_agency::config::DiagnosticsConfig;
use diagnostic_agency::evaluation::Reference;
use diagnostic_agency::knowledge::embedder_from_config;
use diagnostic_agency::orchestrator::{
    evaluation_report, DiagnosticGraph, DiagnosticService, GraphError, RemoteDiagnostic,
    ResponseMode,
};
use diagnostic_agency::stats::{print_stats, Sample, STAT_LABELS};
use diagnostic_agency::utils::{init_tracing, LogTarget};

#[derive(Parser)]
#[command(name = "diagnostic_agency")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Evaluate the diagnostic agent over repeated runs", long_about = None)]
struct Cli {
    /// Number of diagnostic runs to score
    #[arg(short, long, default_value_t = 1)]
    iterations: usize,

    /// Model the diagnostic agent reasons with
    #[arg(short, long)]
    model: Option<String>,
}

/// Records how long the wrapped diagnosis took.
struct Timed {
    inner: RemoteDiagnostic,
    last: Mutex<Duration>,
}

#[async_trait]
impl DiagnosticService for Timed {
    async fn diagnose(&self, prompt: &str) -> Result<String, GraphError> {
        let start = Instant::now();
        let answer = self.inner.diagnose(prompt).await;
        *self.last.lock().await = start.elapsed();
        answer
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let _log = init_tracing("diagnostic_agency", LogTarget::Stdout);

    let cli = Cli::parse();
    let config = DiagnosticsConfig::from_env();

    let responder = Arc::new(ResponseAgent::from_config(
        provider_from_config(&config),
        embedder_from_config(&config),
        &config,
    ));
    let diagnostic = Arc::new(Timed {
        inner: RemoteDiagnostic::new(config.a2a_url.clone()).with_model(cli.model.clone()),
        last: Mutex::new(Duration::ZERO),
    });
    let graph = DiagnosticGraph::new(
        diagnostic.clone(),
        responder,
        ResponseMode::Evaluate(Reference::default_narrative()),
    );

    let started = chrono::Local::now();
    info!(
        "Evaluation run of {} iterations started at {}",
        cli.iterations,
        started.format("%Y-%m-%d %H:%M:%S")
    );

    let mut samples = Vec::with_capacity(cli.iterations);
    for iteration in 1..=cli.iterations {
        println!("\n{}", "═".repeat(60));
        println!("Iteration {}/{}", iteration, cli.iterations);
        println!("{}", "═".repeat(60));

        let state = graph
            .invoke(DIAGNOSTIC_QUERY)
            .await
            .with_context(|| format!("iteration {} failed", iteration))?;
        let report = evaluation_report(&state).context("response node returned no evaluation report")?;
        let elapsed = *diagnostic.last.lock().await;

        println!("\nAGENT: {}", state.last().text());
        info!(
            "Iteration {}: {:.2}s, rubric {}, embedding {}",
            iteration,
            elapsed.as_secs_f64(),
            report.rubric.score,
            report.embedding_score
        );
        samples.push(Sample {
            elapsed_secs: elapsed.as_secs_f64(),
            llm_score: report.rubric.score,
            embedding_score: report.embedding_score,
        });
    }

    info!(
        "Evaluation run finished in {}s",
        (chrono::Local::now() - started).num_seconds()
    );
    println!();
    print_stats(&STAT_LABELS, &Sample::columns(&samples));
    Ok(())
}
