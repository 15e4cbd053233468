//! Logging bootstrap shared by every entry point.
//!
//! Console output goes to stdout or stderr depending on the process role
//! (the stdio MCP server must keep stdout free for protocol frames). When
//! `DIAG_LOG_DIR` is set, a daily-rolling file layer is added as well.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Where console logs are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Stdout,
    Stderr,
}

/// Keeps the non-blocking file writer alive. Hold it for the life of `main`.
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

pub fn init_tracing(service_name: &str, target: LogTarget) -> LogGuard {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("diagnostic_agency=info,tower_http=info"));

    let writer = match target {
        LogTarget::Stdout => BoxMakeWriter::new(std::io::stdout),
        LogTarget::Stderr => BoxMakeWriter::new(std::io::stderr),
    };
    let console = fmt::layer().with_target(false).with_writer(writer);

    let (file_layer, guard) = match std::env::var("DIAG_LOG_DIR") {
        Ok(dir) if !dir.trim().is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, format!("{}.log", service_name));
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        _ => (None, None),
    };

    // A second init (tests, embedded use) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init();

    LogGuard { _file: guard }
}
