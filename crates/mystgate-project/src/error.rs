//! Error types for project discovery.

use std::path::PathBuf;

/// Project discovery error.
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    /// Path exists but is not a directory.
    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
