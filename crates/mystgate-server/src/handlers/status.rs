//! Build status responses: progress page, failure report, rebuild redirect.

use std::fmt::Write;

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use mystgate_project::Resolution;

use crate::error::ServerError;
use crate::html::{encode_path, escape_html, page};
use crate::state::AppState;

/// Seconds between progress page reloads.
const REFRESH_SECS: u32 = 2;

/// `200` page shown while a project builds; reloads itself.
pub(crate) fn progress(project_url_path: &str, last_line: &str) -> Response {
    let project = if project_url_path.is_empty() {
        "/"
    } else {
        project_url_path
    };

    let head = format!("<meta http-equiv=\"refresh\" content=\"{REFRESH_SECS}\">\n");
    let mut body = String::new();
    let _ = writeln!(body, "<h1>Building {}</h1>", escape_html(project));
    body.push_str("<p>This page reloads automatically when the build finishes.</p>\n");
    let line = if last_line.is_empty() {
        "Starting build..."
    } else {
        last_line
    };
    let _ = write!(body, "<pre class=\"progress\">{}</pre>", escape_html(line));

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        page(&format!("Building {project}"), &head, &body),
    )
        .into_response()
}

/// `500` plain-text report of a failed build.
pub(crate) fn failure(error: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        error.to_owned(),
    )
        .into_response()
}

/// Discard the project's output and redirect to the clean URL.
///
/// The redirect target is external when the mount prefix is known, and the
/// internal path otherwise.
pub(crate) async fn rebuild(state: &AppState, resolution: &Resolution) -> Response {
    if let Err(e) = state.builds.rebuild(&resolution.project_root).await {
        return ServerError::from(e).into_response();
    }

    let project_url_path = resolution.project_url_path();
    let mut target = if state.mount.is_configured() {
        state.mount.builder_base_url(&project_url_path)
    } else {
        project_url_path
    };
    target.push_str(&resolution.in_project_path);

    (
        StatusCode::FOUND,
        [
            (header::LOCATION, encode_path(&target)),
            (
                header::CACHE_CONTROL,
                "no-cache, no-store, must-revalidate".to_owned(),
            ),
        ],
    )
        .into_response()
}
