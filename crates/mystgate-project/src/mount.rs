//! Mapping between internal paths and the externally-visible URL space.
//!
//! The hosting gateway mounts this service at `<jupyter base>/<path info>/`,
//! e.g. `/user/alice/myst/`, and forwards requests with that prefix removed.
//! Anything that ends up in a browser (builder base URLs, redirects,
//! rewritten navigation links) must put the prefix back.

/// Externally-imposed mount prefix, fixed for the process lifetime.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MountContext {
    jupyter_base: Option<String>,
    path_info: String,
}

impl MountContext {
    /// Create a mount context.
    ///
    /// `prefix` is the Jupyter server base (`/user/alice`), or `None` when the
    /// gateway has not told us. A bare `/` is the empty base.
    #[must_use]
    pub fn new(prefix: Option<&str>, path_info: &str) -> Self {
        Self {
            jupyter_base: prefix.map(|p| p.trim_end_matches('/').to_owned()),
            path_info: path_info.trim_matches('/').to_owned(),
        }
    }

    /// Derive the mount context from the gateway's full base URL.
    ///
    /// `/user/alice/myst/` becomes the Jupyter base `/user/alice`. Exactly one
    /// trailing path-info segment is stripped, so a user named after the
    /// segment (`/user/myst/myst/`) keeps their own name.
    #[must_use]
    pub fn from_proxy_base(base_url: &str, path_info: &str) -> Self {
        let path_info = path_info.trim_matches('/');
        let trimmed = base_url.trim_end_matches('/');
        let base = if path_info.is_empty() {
            trimmed
        } else {
            trimmed
                .strip_suffix(path_info)
                .and_then(|rest| rest.strip_suffix('/'))
                .unwrap_or(trimmed)
        };
        Self::new(Some(base), path_info)
    }

    /// Jupyter server base without trailing slash (`""` for the root).
    #[must_use]
    pub fn jupyter_base(&self) -> Option<&str> {
        self.jupyter_base.as_deref()
    }

    /// Path segment the gateway mounts this service under.
    #[must_use]
    pub fn path_info(&self) -> &str {
        &self.path_info
    }

    /// Whether the external prefix is known.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.jupyter_base.is_some()
    }

    /// Externally-visible base of this service (`/user/alice/myst`).
    ///
    /// An unknown Jupyter base counts as empty.
    #[must_use]
    pub fn proxy_base(&self) -> String {
        let mut base = self.jupyter_base.clone().unwrap_or_default();
        if !self.path_info.is_empty() {
            base.push('/');
            base.push_str(&self.path_info);
        }
        base
    }

    /// Externally-visible URL of a project, handed to the builder.
    ///
    /// `project_url_path` is `""` for the content root or `/a/b`.
    #[must_use]
    pub fn builder_base_url(&self, project_url_path: &str) -> String {
        let mut url = self.proxy_base();
        url.push_str(project_url_path);
        url
    }
}
