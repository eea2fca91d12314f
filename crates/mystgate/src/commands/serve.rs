//! `mystgate serve` command implementation.

use std::path::PathBuf;

use clap::Args;
use mystgate_config::{CliSettings, Config};
use mystgate_project::MountContext;
use mystgate_server::{run_server, server_config_from_config};

use crate::error::CliError;
use crate::output::Output;

/// Arguments for the serve command.
///
/// The three positionals are the startup values a gateway passes when it
/// launches the service.
#[derive(Args, Debug)]
pub(crate) struct ServeArgs {
    /// Port to listen on (overrides config).
    port: Option<u16>,

    /// Directory tree containing projects (overrides config).
    #[arg(env = "MYSTGATE_CONTENT_ROOT")]
    content_root: Option<PathBuf>,

    /// Externally-imposed mount prefix, e.g. `/user/alice` (overrides config).
    #[arg(conflicts_with = "proxy_base_url")]
    mount_prefix: Option<String>,

    /// Path to configuration file (default: auto-discover mystgate.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host to bind to (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Full external base URL of this service, e.g. `/user/alice/myst/`.
    ///
    /// The trailing path-info segment is stripped to obtain the mount prefix.
    #[arg(long)]
    proxy_base_url: Option<String>,

    /// Add a floating "Rebuild" button to every built page.
    #[arg(long)]
    inject_rebuild_button: bool,

    /// Enable verbose output (request and build logs).
    #[arg(short, long)]
    pub verbose: bool,
}

impl ServeArgs {
    /// Execute the serve command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails or the server fails to start.
    pub(crate) async fn execute(self, version: &str) -> Result<(), CliError> {
        let output = Output::new();

        let config = Config::load(self.config.as_deref(), Some(&self.cli_settings()))?;
        match &config.config_path {
            Some(path) => tracing::info!(path = %path.display(), "Loaded configuration"),
            None => tracing::info!("No mystgate.toml found, using defaults"),
        }

        let mut server_config = server_config_from_config(&config);
        if let Some(base_url) = &self.proxy_base_url {
            server_config.mount = MountContext::from_proxy_base(base_url, &config.mount.path_info);
        }

        output.highlight(&format!("mystgate {version}"));
        output.field(
            "Listening on",
            &format!("http://{}:{}", server_config.host, server_config.port),
        );
        output.field(
            "Content root",
            &server_config.content_root.display().to_string(),
        );
        if server_config.mount.is_configured() {
            output.field("Mounted at", &format!("{}/", server_config.mount.proxy_base()));
        } else {
            output.info("Mount prefix unknown, navigation links are not rewritten");
        }
        output.field("Builder", &server_config.build.command.join(" "));
        if server_config.build.inject.is_some() {
            output.info("Rebuild button: enabled");
        }

        run_server(server_config)
            .await
            .map_err(|e| CliError::Server(e.to_string()))?;

        Ok(())
    }

    /// Settings overriding the config file.
    fn cli_settings(&self) -> CliSettings {
        CliSettings {
            host: self.host.clone(),
            port: self.port,
            content_root: self.content_root.clone(),
            mount_prefix: self.mount_prefix.clone(),
            inject_rebuild_button: self.inject_rebuild_button.then_some(true),
        }
    }
}
