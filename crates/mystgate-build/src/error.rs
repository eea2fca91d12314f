//! Error types for builds.

use std::path::PathBuf;

/// Build error.
///
/// The `Display` output is what users see on the failure page, so every
/// variant carries enough context to debug without server access.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// Builder process could not be started.
    #[error("Failed to start {program}: {source}")]
    Spawn {
        /// Program name.
        program: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Builder exited unsuccessfully.
    #[error("{program} exited with {status}\n{output}")]
    Failed {
        /// Program name.
        program: String,
        /// Exit status description.
        status: String,
        /// Last lines of combined output.
        output: String,
    },

    /// Builder succeeded but did not produce the entry file.
    #[error("Build finished but {} was not produced", .0.display())]
    MissingEntry(PathBuf),

    /// An output HTML file has no closing body tag to inject into.
    #[error("No </body> tag found in {}", .0.display())]
    MissingBodyTag(PathBuf),

    /// Build task panicked.
    #[error("Build task aborted: {0}")]
    Aborted(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
