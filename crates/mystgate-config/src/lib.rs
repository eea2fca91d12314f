//! Configuration management for mystgate.
//!
//! Parses `mystgate.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories.
//!
//! CLI settings (including the three positional startup values handed over
//! by the hosting gateway) are applied during load via [`CliSettings`].
//!
//! ## Environment Variable Expansion
//!
//! String configuration values support environment variable expansion:
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default
//!
//! Expanded fields:
//! - `server.host`
//! - `content.root`
//! - `mount.prefix`

mod expand;

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// CLI settings that override configuration file values.
///
/// All fields are optional. Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override server host.
    pub host: Option<String>,
    /// Override server port.
    pub port: Option<u16>,
    /// Override content root directory.
    pub content_root: Option<PathBuf>,
    /// Override the externally-imposed mount prefix.
    pub mount_prefix: Option<String>,
    /// Override the post-build rebuild button toggle.
    pub inject_rebuild_button: Option<bool>,
}

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "mystgate.toml";

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Content configuration (paths are relative strings from TOML).
    content: ContentConfigRaw,
    /// Mount configuration.
    pub mount: MountConfig,
    /// Builder configuration.
    pub build: BuildConfig,

    /// Resolved content configuration (set after loading).
    #[serde(skip)]
    pub content_resolved: ContentConfig,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Server configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host address.
    pub host: String,
    /// Server port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 7980,
        }
    }
}

/// Raw content configuration as parsed from TOML (paths as strings).
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ContentConfigRaw {
    root: Option<String>,
    marker: Option<String>,
}

/// Resolved content configuration with absolute paths.
#[derive(Debug, Default)]
pub struct ContentConfig {
    /// Directory tree that request paths are resolved against.
    pub root: PathBuf,
    /// File whose presence marks a directory as a project.
    pub marker: String,
}

/// Mount configuration.
///
/// Describes how the externally-visible URL space maps onto this server.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MountConfig {
    /// Externally-imposed prefix (e.g. `/user/alice`). `None` when unknown.
    pub prefix: Option<String>,
    /// Fixed path segment the gateway mounts this service under.
    pub path_info: String,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            prefix: None,
            path_info: "myst".to_owned(),
        }
    }
}

/// Builder configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Builder command line (program followed by arguments).
    pub command: Vec<String>,
    /// Environment variable carrying the computed base URL.
    pub base_url_env: String,
    /// Output directory relative to the project root.
    pub output_dir: String,
    /// Entry file inside the output directory that marks a finished build.
    pub entry_file: String,
    /// Number of trailing output lines kept for failure reports.
    pub log_lines: usize,
    /// Inject a rebuild button into every built HTML page.
    pub inject_rebuild_button: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "myst".to_owned(),
                "build".to_owned(),
                "--html".to_owned(),
                "--ci".to_owned(),
            ],
            base_url_env: "BASE_URL".to_owned(),
            output_dir: "_build/html".to_owned(),
            entry_file: "index.html".to_owned(),
            log_lines: 20,
            inject_rebuild_button: false,
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`content.root`").
        field: String,
        /// Error message (e.g., "${`HOME`} not set").
        message: String,
    },
}

/// Require a string field to be non-empty.
fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `mystgate.toml` in current directory and parents.
    ///
    /// CLI settings are applied after loading and path resolution, allowing CLI
    /// arguments to take precedence over config file values. The merged result
    /// is validated.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist, parsing fails
    /// or the merged configuration is invalid.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
        }

        config.validate()?;
        Ok(config)
    }

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(host) = &settings.host {
            self.server.host.clone_from(host);
        }
        if let Some(port) = settings.port {
            self.server.port = port;
        }
        if let Some(root) = &settings.content_root {
            self.content_resolved.root.clone_from(root);
        }
        if let Some(prefix) = &settings.mount_prefix {
            self.mount.prefix = Some(prefix.clone());
        }
        if let Some(inject) = settings.inject_rebuild_button {
            self.build.inject_rebuild_button = inject;
        }
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Create default config with paths relative to current working directory.
    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    /// Create default config with paths relative to given base directory.
    fn default_with_base(base: &Path) -> Self {
        Self {
            server: ServerConfig::default(),
            content: ContentConfigRaw::default(),
            mount: MountConfig::default(),
            build: BuildConfig::default(),
            content_resolved: ContentConfig {
                root: base.to_path_buf(),
                marker: "myst.yml".to_owned(),
            },
            config_path: None,
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        // Expand environment variables before path resolution
        config.expand_env_vars()?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(config_dir);
        config.config_path = Some(path.to_path_buf());

        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_content()?;
        self.validate_mount()?;
        self.validate_build()?;
        Ok(())
    }

    /// Validate server configuration.
    fn validate_server(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.server.host, "server.host")?;

        // Port 0 would make the gateway unable to reach us
        if self.server.port == 0 {
            return Err(ConfigError::Validation(
                "server.port cannot be 0".to_owned(),
            ));
        }

        Ok(())
    }

    /// Validate content configuration.
    fn validate_content(&self) -> Result<(), ConfigError> {
        let marker = &self.content_resolved.marker;
        require_non_empty(marker, "content.marker")?;
        if marker.contains('/') || marker == "." || marker == ".." {
            return Err(ConfigError::Validation(
                "content.marker must be a plain file name".to_owned(),
            ));
        }
        Ok(())
    }

    /// Validate mount configuration.
    fn validate_mount(&self) -> Result<(), ConfigError> {
        if self.mount.path_info.trim_matches('/').contains('/') {
            return Err(ConfigError::Validation(
                "mount.path_info must be a single path segment".to_owned(),
            ));
        }
        if let Some(prefix) = &self.mount.prefix
            && !prefix.starts_with('/')
        {
            return Err(ConfigError::Validation(
                "mount.prefix must start with /".to_owned(),
            ));
        }
        Ok(())
    }

    /// Validate builder configuration.
    fn validate_build(&self) -> Result<(), ConfigError> {
        if self.build.command.first().is_none_or(String::is_empty) {
            return Err(ConfigError::Validation(
                "build.command cannot be empty".to_owned(),
            ));
        }
        require_non_empty(&self.build.base_url_env, "build.base_url_env")?;
        require_non_empty(&self.build.output_dir, "build.output_dir")?;
        require_non_empty(&self.build.entry_file, "build.entry_file")?;
        if self.build.log_lines == 0 {
            return Err(ConfigError::Validation(
                "build.log_lines must be greater than 0".to_owned(),
            ));
        }
        Ok(())
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        self.server.host = expand::expand_env(&self.server.host, "server.host")?;

        if let Some(ref root) = self.content.root {
            self.content.root = Some(expand::expand_env(root, "content.root")?);
        }

        if let Some(ref prefix) = self.mount.prefix {
            self.mount.prefix = Some(expand::expand_env(prefix, "mount.prefix")?);
        }

        Ok(())
    }

    /// Resolve relative paths to absolute paths based on config directory.
    fn resolve_paths(&mut self, config_dir: &Path) {
        self.content_resolved = ContentConfig {
            root: config_dir.join(self.content.root.as_deref().unwrap_or(".")),
            marker: self
                .content
                .marker
                .clone()
                .unwrap_or_else(|| "myst.yml".to_owned()),
        };
    }
}
