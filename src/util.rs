use tracing_subscriber::EnvFilter;

use crate::prelude::*;

/// Log filter for a `-v` count; `RUST_LOG` wins when set.
pub fn log_filter(verbosity: u8) -> EnvFilter {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

pub fn init_tracing(verbosity: u8) {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(verbosity))
        .with_target(false)
        .init();
}

pub fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}

/// Whole milliseconds for log fields, saturating instead of truncating.
pub fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// One line per worker plus the counter check
pub fn summarize(report: &crate::harness::HarnessReport) -> String {
    use crate::harness::WorkerOutcome;
    use std::fmt::Write;

    let mut out = String::new();
    for r in &report.outcomes {
        let line = match &r.outcome {
            WorkerOutcome::Completed { release } => format!("completed ({release})"),
            WorkerOutcome::ReleaseFailed { message } => format!("completed, release failed: {message}"),
            WorkerOutcome::TimedOut => "skipped: lock timeout".to_string(),
            WorkerOutcome::StoreError { message } => format!("store error: {message}"),
        };
        let _ = writeln!(out, "worker {:>3}: {line}", r.worker);
    }
    let _ = writeln!(
        out,
        "final counter: {} (completed workers: {}, expected: {})",
        report.counter,
        report.completed(),
        report.workers
    );
    if report.max_overlap() > 1 {
        let _ = writeln!(
            out,
            "warning: up to {} workers were inside the critical section at once",
            report.max_overlap()
        );
    }
    if report.already_gone() > 0 {
        let _ = writeln!(
            out,
            "warning: {} lease(s) expired inside the critical section; exclusivity was not guaranteed",
            report.already_gone()
        );
    }
    out
}
