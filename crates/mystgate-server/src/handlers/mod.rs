//! HTTP request handlers.

pub(crate) mod browser;
pub(crate) mod dispatch;
pub(crate) mod status;

/// Whether the query string asks for a rebuild (`rebuild=1`).
pub(crate) fn wants_rebuild(query: Option<&str>) -> bool {
    query.is_some_and(|query| query.split('&').any(|pair| pair == "rebuild=1"))
}
