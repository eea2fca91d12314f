//! Directory browser for paths outside any project.

use std::fmt::Write;

use axum::http::{StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use mystgate_project::{DirEntry, ProjectError, Resolution, list_child_directories};

use crate::error::ServerError;
use crate::html::{encode_path, escape_html, page};
use crate::state::AppState;
use crate::static_files::add_trailing_slash;

/// Render the listing of `resolution.project_root`.
///
/// Directories requested without a trailing slash are redirected first so
/// the relative links in the listing resolve below them.
pub(crate) async fn browse(state: &AppState, resolution: &Resolution, uri: &Uri) -> Response {
    let dir = resolution.project_root.clone();
    let marker = state.resolver.marker().to_owned();

    if !resolution.is_content_root()
        && !uri.path().ends_with('/')
        && tokio::fs::metadata(&dir)
            .await
            .is_ok_and(|metadata| metadata.is_dir())
    {
        return add_trailing_slash(uri);
    }

    let listing = if state.resolver.contains(&dir) {
        match tokio::task::spawn_blocking(move || list_child_directories(&dir, &marker)).await {
            Ok(listing) => listing,
            Err(e) => return ServerError::Io(std::io::Error::other(e)).into_response(),
        }
    } else {
        tracing::warn!(path = %dir.display(), "Refusing to browse outside the content root");
        Err(ProjectError::NotADirectory(dir))
    };

    let title = location(resolution);
    let body = match listing {
        Ok(entries) => render_listing(&title, &entries, resolution.is_content_root()),
        Err(e) => {
            tracing::debug!(path = %resolution.project_root.display(), error = %e, "Nothing to browse");
            render_notice(&title, &e)
        }
    };

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        page(&title, "", &body),
    )
        .into_response()
}

/// Path of the browsed directory relative to the content root.
fn location(resolution: &Resolution) -> String {
    if resolution.is_content_root() {
        "/".to_owned()
    } else {
        format!("{}/", resolution.project_url_path())
    }
}

fn render_listing(title: &str, entries: &[DirEntry], at_content_root: bool) -> String {
    let mut html = String::with_capacity(256 + entries.len() * 128);
    let _ = writeln!(html, "<h1>{}</h1>", escape_html(title));
    html.push_str("<ul class=\"listing\">\n");

    if !at_content_root {
        html.push_str("<li><a href=\"../\">../</a></li>\n");
    }

    for entry in entries {
        let href = escape_html(&encode_path(&entry.name));
        let name = escape_html(&entry.name);
        let _ = write!(html, "<li><a href=\"{href}/\">{name}/</a>");
        if entry.is_project {
            let _ = write!(
                html,
                "<span class=\"badge\">project</span> <a href=\"{href}/?rebuild=1\">rebuild</a>"
            );
        }
        html.push_str("</li>\n");
    }

    html.push_str("</ul>\n");
    if entries.is_empty() {
        html.push_str("<p>No subdirectories.</p>\n");
    }
    html
}

fn render_notice(title: &str, error: &ProjectError) -> String {
    let reason = match error {
        ProjectError::NotADirectory(_) => "No directory or project here.".to_owned(),
        ProjectError::Io(e) => format!("Cannot list this directory: {e}"),
    };
    format!(
        "<h1>{}</h1>\n<p class=\"notice\">{}</p>\n",
        escape_html(title),
        escape_html(&reason)
    )
}
