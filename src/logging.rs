//! Logging and observability setup
//!
//! Structured logging built on `tracing`. One line is emitted per phase and
//! per refinement round transition; the format is compact by default and
//! includes targets when `--verbose` is set. `RUST_LOG` overrides the
//! built-in filter.

use tracing::{error, info, warn};
use tracing_subscriber::{
    EnvFilter,
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Initialize the tracing subscriber.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            if verbose {
                EnvFilter::try_new("devflow=debug,info")
            } else {
                EnvFilter::try_new("devflow=info,warn")
            }
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // Log lines go to stderr so that report output (including --json)
    // stays pipeable.
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(verbose)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_line_number(false)
                .with_file(false)
                .compact(),
        )
        .try_init()?;

    Ok(())
}

/// Log the start of a phase execution.
pub fn log_phase_start(phase: &str) {
    info!(phase = %phase, "starting phase");
}

/// Log the outcome of a phase execution with its duration.
pub fn log_phase_outcome(phase: &str, status: &str, duration_ms: i64) {
    match status {
        "failure" => warn!(
            phase = %phase,
            status = %status,
            duration_ms = %duration_ms,
            "phase finished"
        ),
        _ => info!(
            phase = %phase,
            status = %status,
            duration_ms = %duration_ms,
            "phase finished"
        ),
    }
}

/// Log that the remaining pipeline is being aborted.
pub fn log_pipeline_abort(phase: &str) {
    error!(phase = %phase, "critical phase failed, aborting remaining phases");
}

/// Log the start of a refinement round.
pub fn log_round_start(round: u32, total_rounds: u32) {
    info!(round = %round, total_rounds = %total_rounds, "starting refinement round");
}
