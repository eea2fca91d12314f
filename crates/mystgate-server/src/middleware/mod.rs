//! HTTP middleware.

pub(crate) mod logging;
pub(crate) mod rewrite;
pub(crate) mod security;
