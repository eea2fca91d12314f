//! Application state.
//!
//! Shared state for all request handlers.

use mystgate_build::BuildCoordinator;
use mystgate_project::{MountContext, ProjectResolver};

use crate::ServerConfig;

/// Application state shared across all handlers.
pub(crate) struct AppState {
    /// Maps request paths onto projects.
    pub(crate) resolver: ProjectResolver,
    /// Per-project build state.
    pub(crate) builds: BuildCoordinator,
    /// Externally-imposed mount prefix.
    pub(crate) mount: MountContext,
}

impl AppState {
    /// Create state from server configuration.
    pub(crate) fn new(config: &ServerConfig) -> Self {
        Self {
            resolver: ProjectResolver::new(&config.content_root, &config.marker),
            builds: BuildCoordinator::new(config.build.clone()),
            mount: config.mount.clone(),
        }
    }
}
