//! Project discovery for mystgate.
//!
//! A *project* is any directory below the content root that contains the
//! marker file (`myst.yml` by default). This crate answers three questions
//! for the server:
//!
//! - [`ProjectResolver::resolve`]: which project does a request path belong to,
//!   and which file inside it is being asked for?
//! - [`list_child_directories`]: what can a user browse into from here?
//! - [`MountContext`]: how do internal paths map onto the externally-visible
//!   URL space the hosting gateway exposes?

mod error;
mod listing;
mod mount;
mod resolver;

pub use error::ProjectError;
pub use listing::{DirEntry, list_child_directories};
pub use mount::MountContext;
pub use resolver::{ProjectResolver, Resolution};
