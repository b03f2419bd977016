//! # Logging Initialization
//!
//! One global `tracing` subscriber, installed once. `RUST_LOG` takes precedence;
//! otherwise the configured level applies to everything, with the gateway's
//! own crates always at `debug` or finer.
//!
//! With a log directory, output goes to a daily rolling file (no ANSI colors)
//! via `tracing_appender`. Without one, or if the directory is not writable,
//! logs go to stderr with colors.

use anyhow::Result;
use std::{io::stderr, path::Path, sync::Once};
use tracing_subscriber::{EnvFilter, fmt::layer, prelude::*};

static INIT: Once = Once::new();

const LOG_FILE_PREFIX: &str = "claude_gateway.log";

/// Initialize verbose logging for tests.
pub fn init_test_logging() {
    let _ = init_logging("trace", None);
}

/// Installs the global subscriber. Later calls are no-ops.
pub fn init_logging(log_level: &str, log_dir: Option<&Path>) -> Result<()> {
    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{log_level},claude_gateway=debug,claude_gateway_core=debug"
            ))
        });

        if let Some(dir) = log_dir
            && can_write(dir)
        {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(layer().with_writer(non_blocking).with_ansi(false))
                .init();
            // Flushes on drop, so it has to live for the whole process.
            Box::leak(Box::new(guard));
            return;
        }

        tracing_subscriber::registry()
            .with(env_filter)
            .with(layer().with_writer(stderr).with_ansi(true))
            .init();
    });

    Ok(())
}

/// tracing_appender panics on an unwritable directory, so check first.
fn can_write(dir: &Path) -> bool {
    if std::fs::create_dir_all(dir).is_err() {
        return false;
    }
    let marker = dir.join(".claude_gateway_log_test");
    match std::fs::write(&marker, "test") {
        Ok(()) => {
            let _ = std::fs::remove_file(&marker);
            true
        }
        Err(_) => false,
    }
}
