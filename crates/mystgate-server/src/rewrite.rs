//! Navigation URL rewriting.
//!
//! The builder embeds page navigation as JSON (`"url":"/intro"`) computed
//! from the base URL it was given. When the gateway adds a prefix the builder
//! never saw, those URLs are patched to carry the full external base of the
//! project.

use std::borrow::Cow;
use std::sync::LazyLock;

use axum::body::{Body, to_bytes};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use mystgate_project::MountContext;
use percent_encoding::percent_decode_str;
use regex::{Captures, Regex};

/// Root-relative `"url"` values in embedded JSON.
static NAV_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""url":"(/[^"]*)""#).unwrap());

/// Project URL path (`/a/b`, or `""` for the content root) of a response.
///
/// Set by the dispatcher on every response that belongs to a project.
#[derive(Clone, Debug)]
pub(crate) struct ProjectUrlPath(pub(crate) String);

/// Best-effort project URL path for a request path.
///
/// Drops the final segment when it looks like a file (contains a dot, or is
/// literally `index`). An extension-less page such as `/docs/intro` is taken
/// as a directory, so prefer the resolver's answer whenever one exists.
#[must_use]
pub fn project_path_from_request(request_path: &str) -> String {
    let decoded = percent_decode_str(request_path).decode_utf8_lossy();
    let mut segments: Vec<&str> = decoded.split('/').filter(|s| !s.is_empty()).collect();
    if segments
        .last()
        .is_some_and(|last| last.contains('.') || *last == "index")
    {
        segments.pop();
    }
    segments.iter().fold(String::new(), |mut acc, segment| {
        acc.push('/');
        acc.push_str(segment);
        acc
    })
}

/// Prefix root-relative navigation URLs with the project's external base.
///
/// URLs already under the path-info segment, a `/user/` prefix, the proxy
/// base or the project base are left alone, which makes the rewrite
/// idempotent. Returns the body unchanged when the mount prefix is unknown.
#[must_use]
pub fn rewrite_html<'a>(body: &'a str, project_url_path: &str, mount: &MountContext) -> Cow<'a, str> {
    if !mount.is_configured() {
        return Cow::Borrowed(body);
    }

    let effective_base = mount.builder_base_url(project_url_path);
    let proxy_base = mount.proxy_base();
    let path_info = if mount.path_info().is_empty() {
        String::new()
    } else {
        format!("/{}", mount.path_info())
    };

    let rewritten = NAV_URL_RE.replace_all(body, |caps: &Captures<'_>| {
        let url = &caps[1];
        let prefixed = [
            path_info.as_str(),
            "/user",
            proxy_base.as_str(),
            effective_base.as_str(),
        ]
        .iter()
        .any(|base| under(url, base));
        if prefixed {
            caps[0].to_owned()
        } else {
            format!("\"url\":\"{effective_base}{url}\"")
        }
    });

    // replace_all allocates whenever anything matched, even if every match
    // was kept as is
    match rewritten {
        Cow::Owned(html) if html == body => Cow::Borrowed(body),
        other => other,
    }
}

/// Whether `url` is `base` or lies below it.
fn under(url: &str, base: &str) -> bool {
    !base.is_empty()
        && url
            .strip_prefix(base)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// Apply [`rewrite_html`] to a response.
///
/// Only successful `text/html` responses are touched; `Content-Length` is
/// updated when the body changes.
pub async fn rewrite_response(
    response: Response,
    project_url_path: &str,
    mount: &MountContext,
) -> Response {
    if !mount.is_configured() || response.status() != StatusCode::OK || !is_html(&response) {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(error = %e, "Failed to read response body for rewriting");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to read response body")
                .into_response();
        }
    };

    let rewritten = match std::str::from_utf8(&bytes) {
        Ok(text) => match rewrite_html(text, project_url_path, mount) {
            Cow::Owned(html) => Some(html),
            Cow::Borrowed(_) => None,
        },
        Err(_) => None,
    };

    let body = match rewritten {
        Some(html) => {
            parts
                .headers
                .insert(header::CONTENT_LENGTH, HeaderValue::from(html.len()));
            Body::from(html)
        }
        None => Body::from(bytes),
    };
    Response::from_parts(parts, body)
}

fn is_html(response: &Response) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.trim_start().to_ascii_lowercase().starts_with("text/html"))
}
