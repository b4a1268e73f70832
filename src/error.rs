//! Harness error types

use thiserror::Error;

/// Errors raised by the display and recording fixtures.
///
/// These never propagate into test outcomes; callers log them and carry on
/// (recording is best-effort instrumentation). They exist so the fixture
/// internals can use `?` instead of stringly-typed errors.
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("No usable display: {0}")]
    DisplayUnavailable(String),

    #[error("Failed to spawn {program}: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
