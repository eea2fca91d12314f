//! Static file serving from a project's build output.

use std::path::Path;

use axum::extract::Request;
use axum::http::{StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use tower::ServiceExt;
use tower_http::services::ServeDir;

use crate::html::encode_path;

/// Serve `in_project_path` from `output_dir`.
///
/// A directory requested without a trailing slash is redirected to the
/// slash form so relative asset URLs in its index page resolve correctly.
/// Everything else is handed to [`ServeDir`], which confines lookups to
/// `output_dir`.
pub(crate) async fn serve(output_dir: &Path, in_project_path: &str, request: Request) -> Response {
    let target = output_dir.join(in_project_path.trim_start_matches('/'));
    let is_dir = tokio::fs::metadata(&target)
        .await
        .is_ok_and(|metadata| metadata.is_dir());
    if is_dir && !request.uri().path().ends_with('/') {
        return add_trailing_slash(request.uri());
    }

    let mut uri = encode_path(in_project_path);
    if let Some(query) = request.uri().query() {
        uri.push('?');
        uri.push_str(query);
    }

    let (mut parts, body) = request.into_parts();
    parts.uri = match uri.parse::<Uri>() {
        Ok(uri) => uri,
        Err(e) => {
            tracing::warn!(path = %in_project_path, error = %e, "Unservable path");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    match ServeDir::new(output_dir)
        .oneshot(Request::from_parts(parts, body))
        .await
    {
        Ok(response) => response.into_response(),
        Err(never) => match never {},
    }
}

/// `301` to the request path with a trailing slash appended.
pub(crate) fn add_trailing_slash(uri: &Uri) -> Response {
    (
        StatusCode::MOVED_PERMANENTLY,
        [(header::LOCATION, slash_redirect_target(uri))],
    )
        .into_response()
}

/// Relative redirect target adding a trailing slash to the request path.
fn slash_redirect_target(uri: &Uri) -> String {
    let last = uri.path().rsplit('/').next().unwrap_or_default();
    let mut location = format!("{last}/");
    if let Some(query) = uri.query() {
        location.push('?');
        location.push_str(query);
    }
    location
}
