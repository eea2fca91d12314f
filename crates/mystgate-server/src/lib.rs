//! HTTP server for mystgate.
//!
//! Serves a tree of documentation projects, building each one on demand:
//!
//! - Paths inside a project are served from its build output, building it
//!   first when the output is missing
//! - Paths outside any project render a directory browser
//! - `?rebuild=1` discards a project's output and starts over
//!
//! # Architecture
//!
//! ```text
//! Gateway ──HTTP──► axum server (mystgate-server)
//!                        │
//!                        ├─► Dispatcher ──► ProjectResolver (mystgate-project)
//!                        │       │
//!                        │       ├─► Directory browser
//!                        │       ├─► BuildCoordinator (mystgate-build) ──► builder process
//!                        │       └─► Static files (tower-http ServeDir)
//!                        │
//!                        └─► Response rewriter (navigation URLs under the mount prefix)
//! ```

mod app;
mod error;
mod handlers;
mod html;
mod middleware;
mod rewrite;
mod state;
mod static_files;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use mystgate_build::{BuildSettings, REBUILD_BUTTON};
use mystgate_project::MountContext;
use state::AppState;

pub use error::ServerError;
pub use rewrite::{project_path_from_request, rewrite_html, rewrite_response};

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Directory tree containing projects.
    pub content_root: PathBuf,
    /// Marker file name.
    pub marker: String,
    /// Externally-imposed mount context.
    pub mount: MountContext,
    /// Builder settings.
    pub build: BuildSettings,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 7980,
            content_root: PathBuf::from("."),
            marker: "myst.yml".to_owned(),
            mount: MountContext::new(None, "myst"),
            build: BuildSettings::default(),
        }
    }
}

/// Run the server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let state = Arc::new(AppState::new(&config));

    tracing::info!(
        content_root = %state.resolver.content_root().display(),
        proxy_base = %state.mount.proxy_base(),
        rewrite = state.mount.is_configured(),
        "Serving projects"
    );

    let app = app::create_router(state);

    let addr = SocketAddr::from_str(&format!("{}:{}", config.host, config.port))?;
    tracing::info!(address = %addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Wait for shutdown signal (Ctrl-C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, stopping server...");
}

/// Create server configuration from mystgate config.
#[must_use]
pub fn server_config_from_config(config: &mystgate_config::Config) -> ServerConfig {
    let build = &config.build;
    ServerConfig {
        host: config.server.host.clone(),
        port: config.server.port,
        content_root: config.content_resolved.root.clone(),
        marker: config.content_resolved.marker.clone(),
        mount: MountContext::new(config.mount.prefix.as_deref(), &config.mount.path_info),
        build: BuildSettings {
            command: build.command.clone(),
            base_url_env: build.base_url_env.clone(),
            output_dir: PathBuf::from(&build.output_dir),
            entry_file: build.entry_file.clone(),
            log_lines: build.log_lines,
            inject: build
                .inject_rebuild_button
                .then(|| REBUILD_BUTTON.to_owned()),
        },
    }
}
