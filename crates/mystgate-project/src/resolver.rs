//! Request path to project resolution.
//!
//! Projects may be nested arbitrarily deep below the content root
//! (`courses/fall/stat159/myst.yml`), so resolution tests every ancestor of
//! the requested path for the marker file, deepest first.

use std::path::{Path, PathBuf};

use percent_encoding::percent_decode_str;

/// Result of resolving a request path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolution {
    /// Project root directory, or the full requested directory when no
    /// project was found.
    pub project_root: PathBuf,
    /// Path inside the project, always starting with `/`.
    pub in_project_path: String,
    /// Whether `project_root` contains the marker file.
    pub has_marker: bool,
    /// Segments of `project_root` relative to the content root.
    pub segments: Vec<String>,
}

impl Resolution {
    /// Project location as a URL path relative to the content root.
    ///
    /// Returns `""` for the content root itself and `/a/b` otherwise.
    #[must_use]
    pub fn project_url_path(&self) -> String {
        self.segments.iter().fold(String::new(), |mut acc, segment| {
            acc.push('/');
            acc.push_str(segment);
            acc
        })
    }

    /// Whether the resolved directory is the content root.
    #[must_use]
    pub fn is_content_root(&self) -> bool {
        self.segments.is_empty()
    }
}

/// Maps request paths onto projects below a content root.
#[derive(Clone, Debug)]
pub struct ProjectResolver {
    content_root: PathBuf,
    marker: String,
}

impl ProjectResolver {
    /// Create a resolver for the given content root and marker file name.
    ///
    /// The content root is canonicalized when it exists so that every
    /// resolved path is absolute.
    #[must_use]
    pub fn new(content_root: impl Into<PathBuf>, marker: impl Into<String>) -> Self {
        let content_root = content_root.into();
        let content_root = std::fs::canonicalize(&content_root).unwrap_or(content_root);
        Self {
            content_root,
            marker: marker.into(),
        }
    }

    /// Content root directory.
    #[must_use]
    pub fn content_root(&self) -> &Path {
        &self.content_root
    }

    /// Marker file name.
    #[must_use]
    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Whether `dir` contains the marker file.
    #[must_use]
    pub fn has_marker(&self, dir: &Path) -> bool {
        dir.join(&self.marker).is_file()
    }

    /// Whether `path` stays inside the content root once symlinks are
    /// followed.
    ///
    /// Paths that do not exist are considered contained since nothing can be
    /// read through them.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        match std::fs::canonicalize(path) {
            Ok(canonical) => canonical.starts_with(&self.content_root),
            Err(_) => true,
        }
    }

    /// Resolve a raw request path (without query string).
    ///
    /// The deepest ancestor containing the marker wins, down to the content
    /// root itself. Candidates that symlink outside the content root are
    /// skipped. When none matches, the whole path is returned as
    /// `project_root` with `has_marker == false` and `/` as the in-project path.
    #[must_use]
    pub fn resolve(&self, request_path: &str) -> Resolution {
        let decoded = percent_decode_str(request_path).decode_utf8_lossy();
        let segments = normalize_segments(&decoded);
        let trailing_slash = decoded.ends_with('/');

        for len in (0..=segments.len()).rev() {
            let candidate = self.join_segments(&segments[..len]);
            if self.has_marker(&candidate) && self.contains(&candidate) {
                let rest = &segments[len..];
                let mut in_project_path = format!("/{}", rest.join("/"));
                if trailing_slash && !rest.is_empty() {
                    in_project_path.push('/');
                }
                tracing::debug!(
                    request = %request_path,
                    project = %candidate.display(),
                    path = %in_project_path,
                    "Resolved project"
                );
                return Resolution {
                    project_root: candidate,
                    in_project_path,
                    has_marker: true,
                    segments: segments[..len].to_vec(),
                };
            }
        }

        Resolution {
            project_root: self.join_segments(&segments),
            in_project_path: "/".to_owned(),
            has_marker: false,
            segments,
        }
    }

    fn join_segments(&self, segments: &[String]) -> PathBuf {
        let mut path = self.content_root.clone();
        path.extend(segments);
        path
    }
}

/// Split a decoded path into segments, resolving `.` and `..` lexically.
///
/// `..` never climbs above the first segment, which keeps every joined path
/// inside the content root.
fn normalize_segments(path: &str) -> Vec<String> {
    let mut segments: Vec<String> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other.to_owned()),
        }
    }
    segments
}
