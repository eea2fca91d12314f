//! Build coordination for mystgate.
//!
//! Projects are built on demand by an external site generator. This crate
//! owns the per-project build state machine:
//!
//! ```text
//! Absent ──start_build──► Building ──exit 0──► Success
//!    ▲                        │
//!    │                        └──exit ≠ 0 / inject error──► Failed
//!    └──────────────rebuild (from any state)───────────────────┘
//! ```
//!
//! At most one builder process runs per project root. Request handlers never
//! wait for a build; they read [`BuildCoordinator::status`] and answer
//! immediately.

mod coordinator;
mod error;
mod inject;
mod runner;

pub use coordinator::{BuildCoordinator, BuildSettings, BuildStatus};
pub use error::BuildError;
pub use inject::REBUILD_BUTTON;
