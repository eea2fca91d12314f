//! Response rewriting middleware.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::Method;
use axum::middleware::Next;
use axum::response::Response;

use crate::rewrite::{ProjectUrlPath, project_path_from_request, rewrite_response};
use crate::state::AppState;

/// Rewrite navigation URLs in HTML responses when the mount prefix is known.
///
/// `HEAD` is answered as `GET` internally so its `Content-Length` matches
/// the rewritten body; the body itself is dropped by the router.
pub(crate) async fn rewrite_layer(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    if !state.mount.is_configured() {
        return next.run(request).await;
    }

    if request.method() == Method::HEAD {
        *request.method_mut() = Method::GET;
    }

    let request_path = request.uri().path().to_owned();
    let response = next.run(request).await;

    let project_url_path = match response.extensions().get::<ProjectUrlPath>() {
        Some(ProjectUrlPath(path)) => path.clone(),
        None => project_path_from_request(&request_path),
    };

    rewrite_response(response, &project_url_path, &state.mount).await
}
