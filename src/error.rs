use std::path::PathBuf;
use thiserror::Error;

/// Failures that abort a whole scan. Everything narrower is recovered and
/// reported as a warning instead.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("Cannot read log root {}: {source}", path.display())]
    RootUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Scan cancelled")]
    Cancelled,

    #[error("Worker task failed: {0}")]
    Task(String),
}
