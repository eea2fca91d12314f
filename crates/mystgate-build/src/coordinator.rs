//! Build state machine and registry.
//!
//! # Concurrency
//!
//! - One `Mutex` guards the whole registry; every check-and-set happens in a
//!   single critical section.
//! - Each build runs in its own `tokio` task, supervised by a second task that
//!   records the outcome even if the build task panics.
//! - Records carry a generation. [`BuildCoordinator::rebuild`] bumps it, so
//!   progress and results from a build started before the reset are dropped.
//! - A root stays *running* until its builder exits, even across a reset, so
//!   two builders never write the same output directory.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::BuildError;
use crate::runner::{self, BuildJob};

/// Builder invocation settings shared by all projects.
#[derive(Clone, Debug)]
pub struct BuildSettings {
    /// Builder command line (program followed by arguments).
    pub command: Vec<String>,
    /// Environment variable carrying the base URL.
    pub base_url_env: String,
    /// Output directory relative to the project root.
    pub output_dir: PathBuf,
    /// Entry file inside the output directory.
    pub entry_file: String,
    /// Number of trailing output lines kept for failure reports.
    pub log_lines: usize,
    /// HTML fragment injected before `</body>` after a successful build.
    pub inject: Option<String>,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            command: vec![
                "myst".to_owned(),
                "build".to_owned(),
                "--html".to_owned(),
                "--ci".to_owned(),
            ],
            base_url_env: "BASE_URL".to_owned(),
            output_dir: PathBuf::from("_build/html"),
            entry_file: "index.html".to_owned(),
            log_lines: 20,
            inject: None,
        }
    }
}

/// Snapshot of a project's build state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BuildStatus {
    /// No build attempted since start or since the last rebuild.
    Absent,
    /// Builder is running.
    Building {
        /// Most recent non-empty output line.
        last_line: String,
    },
    /// Last build succeeded.
    Success,
    /// Last build failed.
    Failed {
        /// Diagnostic text.
        error: String,
    },
}

#[derive(Debug)]
struct BuildRecord {
    status: BuildStatus,
    generation: u64,
}

#[derive(Debug, Default)]
struct Registry {
    records: HashMap<PathBuf, BuildRecord>,
    /// Roots with a live builder process.
    running: HashSet<PathBuf>,
    next_generation: u64,
}

struct Inner {
    settings: Arc<BuildSettings>,
    registry: Mutex<Registry>,
}

/// Coordinates on-demand builds across projects.
///
/// Cloning is cheap; all clones share one registry.
#[derive(Clone)]
pub struct BuildCoordinator {
    inner: Arc<Inner>,
}

impl BuildCoordinator {
    /// Create a coordinator with the given builder settings.
    #[must_use]
    pub fn new(settings: BuildSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                settings: Arc::new(settings),
                registry: Mutex::new(Registry::default()),
            }),
        }
    }

    /// Builder settings.
    #[must_use]
    pub fn settings(&self) -> &BuildSettings {
        &self.inner.settings
    }

    /// Output directory of a project.
    #[must_use]
    pub fn output_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.inner.settings.output_dir)
    }

    /// Whether the project's entry file is missing on disk.
    #[must_use]
    pub fn needs_build(&self, root: &Path) -> bool {
        !self
            .output_dir(root)
            .join(&self.inner.settings.entry_file)
            .is_file()
    }

    /// Current build state of a project.
    #[must_use]
    pub fn status(&self, root: &Path) -> BuildStatus {
        let registry = self.inner.registry.lock().unwrap();
        registry
            .records
            .get(root)
            .map_or(BuildStatus::Absent, |record| record.status.clone())
    }

    /// Whether a builder process for `root` is still running.
    ///
    /// Can be true while [`status`](Self::status) reports `Absent`, when a
    /// rebuild reset the record under a running build.
    #[must_use]
    pub fn is_running(&self, root: &Path) -> bool {
        self.inner.registry.lock().unwrap().running.contains(root)
    }

    /// Start building `root` unless a builder for it is already running.
    ///
    /// Returns `true` if this call launched the build. Must be called from
    /// within a tokio runtime.
    pub fn start_build(&self, root: &Path, base_url: &str) -> bool {
        let generation = {
            let mut registry = self.inner.registry.lock().unwrap();
            if registry.running.contains(root) {
                return false;
            }
            registry.next_generation += 1;
            let generation = registry.next_generation;
            registry.running.insert(root.to_path_buf());
            registry.records.insert(
                root.to_path_buf(),
                BuildRecord {
                    status: BuildStatus::Building {
                        last_line: String::new(),
                    },
                    generation,
                },
            );
            generation
        };

        tracing::info!(root = %root.display(), base_url, "Starting build");

        let job = BuildJob {
            root: root.to_path_buf(),
            base_url: base_url.to_owned(),
            settings: Arc::clone(&self.inner.settings),
        };
        let progress = self.clone();
        let build = tokio::spawn(async move {
            let started = Instant::now();
            let result = runner::execute(&job, |line| {
                tracing::debug!(root = %job.root.display(), line, "Build output");
                progress.record_line(&job.root, generation, line);
            })
            .await;
            (result, started.elapsed())
        });

        let supervisor = self.clone();
        let root = root.to_path_buf();
        tokio::spawn(async move {
            let result = match build.await {
                Ok((result, elapsed)) => {
                    match &result {
                        Ok(()) => tracing::info!(
                            root = %root.display(),
                            elapsed = ?elapsed,
                            "Build succeeded"
                        ),
                        Err(e) => tracing::warn!(
                            root = %root.display(),
                            elapsed = ?elapsed,
                            error = %e,
                            "Build failed"
                        ),
                    }
                    result
                }
                Err(e) => {
                    tracing::error!(root = %root.display(), error = %e, "Build task aborted");
                    Err(BuildError::Aborted(e.to_string()))
                }
            };
            supervisor.finish(&root, generation, result).await;
        });

        true
    }

    /// Delete the project's output and reset its record to `Absent`.
    ///
    /// A running builder is not cancelled; its eventual result is discarded.
    pub async fn rebuild(&self, root: &Path) -> Result<(), BuildError> {
        let output_dir = self.output_dir(root);
        tracing::info!(output = %output_dir.display(), "Rebuild requested, removing output");
        match tokio::fs::remove_dir_all(&output_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let mut registry = self.inner.registry.lock().unwrap();
        registry.next_generation += 1;
        let generation = registry.next_generation;
        registry.records.insert(
            root.to_path_buf(),
            BuildRecord {
                status: BuildStatus::Absent,
                generation,
            },
        );
        Ok(())
    }

    /// Store the latest output line of a build, if it is still current.
    fn record_line(&self, root: &Path, generation: u64, line: &str) {
        let mut registry = self.inner.registry.lock().unwrap();
        if let Some(record) = registry.records.get_mut(root)
            && record.generation == generation
            && let BuildStatus::Building { last_line } = &mut record.status
        {
            line.clone_into(last_line);
        }
    }

    /// Record the outcome of a build and release the root.
    ///
    /// A build superseded by a rebuild may have written output after the
    /// reset; that output is removed so the next request builds again.
    async fn finish(&self, root: &Path, generation: u64, result: Result<(), BuildError>) {
        let superseded = {
            let registry = self.inner.registry.lock().unwrap();
            registry
                .records
                .get(root)
                .is_none_or(|record| record.generation != generation)
        };
        if superseded {
            let output_dir = self.output_dir(root);
            match tokio::fs::remove_dir_all(&output_dir).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(
                    output = %output_dir.display(),
                    error = %e,
                    "Failed to remove output of superseded build"
                ),
            }
        }

        let mut registry = self.inner.registry.lock().unwrap();
        registry.running.remove(root);
        match registry.records.get_mut(root) {
            Some(record) if record.generation == generation => {
                record.status = match result {
                    Ok(()) => BuildStatus::Success,
                    Err(e) => BuildStatus::Failed {
                        error: e.to_string(),
                    },
                };
            }
            _ => {
                tracing::debug!(root = %root.display(), "Discarding result of superseded build");
            }
        }
    }
}
