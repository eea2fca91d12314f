//! Request dispatcher.
//!
//! Every request is resolved to a project and then answered from exactly
//! one of: directory browser, rebuild redirect, failure report, progress
//! page or build output. No handler ever waits for a build.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use mystgate_build::BuildStatus;
use mystgate_project::Resolution;

use crate::handlers::{browser, status, wants_rebuild};
use crate::rewrite::ProjectUrlPath;
use crate::state::AppState;
use crate::static_files;

/// Fallback handler for all paths.
pub(crate) async fn dispatch(State(state): State<Arc<AppState>>, request: Request) -> Response {
    if !matches!(*request.method(), Method::GET | Method::HEAD) {
        return (StatusCode::METHOD_NOT_ALLOWED, [(header::ALLOW, "GET, HEAD")]).into_response();
    }

    // The gateway strips its own prefix, so the path is already internal
    let resolution = state.resolver.resolve(request.uri().path());

    if !resolution.has_marker {
        return browser::browse(&state, &resolution, request.uri()).await;
    }

    let project_url_path = resolution.project_url_path();
    let mut response = if wants_rebuild(request.uri().query()) {
        status::rebuild(&state, &resolution).await
    } else {
        serve_project(&state, &resolution, request).await
    };
    response
        .extensions_mut()
        .insert(ProjectUrlPath(project_url_path));
    response
}

/// Answer a request inside a project according to its build state.
async fn serve_project(state: &AppState, resolution: &Resolution, request: Request) -> Response {
    let root = &resolution.project_root;

    match state.builds.status(root) {
        BuildStatus::Failed { error } => status::failure(&error),
        BuildStatus::Building { last_line } => {
            status::progress(&resolution.project_url_path(), &last_line)
        }
        BuildStatus::Absent | BuildStatus::Success => {
            if state.builds.needs_build(root) {
                let project_url_path = resolution.project_url_path();
                let base_url = state.mount.builder_base_url(&project_url_path);
                if !state.builds.start_build(root, &base_url) {
                    tracing::debug!(root = %root.display(), "Previous builder still running");
                }
                status::progress(&project_url_path, "")
            } else {
                let output_dir = state.builds.output_dir(root);
                static_files::serve(&output_dir, &resolution.in_project_path, request).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;
    use std::time::Duration;

    use axum::Router;
    use axum::body::{Body, to_bytes};
    use mystgate_build::BuildSettings;
    use mystgate_project::MountContext;
    use pretty_assertions::assert_eq;
    use tower::ServiceExt;

    use crate::ServerConfig;
    use crate::app::create_router;

    use super::*;

    /// Builder script writing `BASE_URL` into the entry page.
    const BUILD_OK: &str = "echo compiling; mkdir -p _build/html && \
        printf '<html><body>built for %s</body></html>' \"$BASE_URL\" > _build/html/index.html";

    fn router(root: &Path, mount: MountContext, script: &str) -> Router {
        let config = ServerConfig {
            content_root: root.to_path_buf(),
            mount,
            build: BuildSettings {
                command: vec!["sh".to_owned(), "-c".to_owned(), script.to_owned()],
                ..BuildSettings::default()
            },
            ..ServerConfig::default()
        };
        create_router(Arc::new(AppState::new(&config)))
    }

    fn unmounted() -> MountContext {
        MountContext::new(None, "myst")
    }

    fn make_project(root: &Path, rel: &str) {
        let dir = root.join(rel);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("myst.yml"), "version: 1\n").unwrap();
    }

    fn make_output(root: &Path, rel: &str, file: &str, content: &str) {
        let path = root.join(rel).join("_build/html").join(file);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    async fn send(app: &Router, method: Method, uri: &str) -> Response {
        let request = axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        app.clone().oneshot(request).await.unwrap()
    }

    async fn get(app: &Router, uri: &str) -> (StatusCode, String) {
        let response = send(app, Method::GET, uri).await;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    /// Poll `uri` until `done` holds for the response.
    async fn poll(
        app: &Router,
        uri: &str,
        done: impl Fn(StatusCode, &str) -> bool,
    ) -> (StatusCode, String) {
        for _ in 0..200 {
            let (status, body) = get(app, uri).await;
            if done(status, &body) {
                return (status, body);
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("{uri} did not settle");
    }

    #[tokio::test]
    async fn test_browser_at_content_root() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("notes")).unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        make_project(dir.path(), "courses/fall/stat159");
        let app = router(dir.path(), unmounted(), "exit 1");

        let (status, html) = get(&app, "/").await;

        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("href=\"courses/\""));
        assert!(html.contains("href=\"notes/\""));
        assert!(!html.contains(".git"));
        assert!(!html.contains("../"));
    }

    #[tokio::test]
    async fn test_browser_marks_projects() {
        let dir = tempfile::tempdir().unwrap();
        make_project(dir.path(), "courses/fall/stat159");
        let app = router(dir.path(), unmounted(), "exit 1");

        let (status, html) = get(&app, "/courses/fall/").await;

        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("<a href=\"../\">../</a>"));
        assert!(html.contains("<span class=\"badge\">project</span>"));
        assert!(html.contains("href=\"stat159/?rebuild=1\""));
    }

    #[tokio::test]
    async fn test_browser_redirects_directory_without_slash() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("courses/fall")).unwrap();
        let app = router(dir.path(), unmounted(), "exit 1");

        let response = send(&app, Method::GET, "/courses/fall?x=1").await;

        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(response.headers()[header::LOCATION], "fall/?x=1");
    }

    #[tokio::test]
    async fn test_browser_notice_for_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(dir.path(), unmounted(), "exit 1");

        let (status, html) = get(&app, "/no/such/place/").await;

        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("class=\"notice\""));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_browser_does_not_follow_symlinks_out_of_root() {
        let outside = tempfile::tempdir().unwrap();
        fs::create_dir_all(outside.path().join("private-notes")).unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("escape")).unwrap();
        let app = router(dir.path(), unmounted(), "exit 1");

        let (status, html) = get(&app, "/escape/").await;

        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("class=\"notice\""));
        assert!(!html.contains("private-notes"));
    }

    #[tokio::test]
    async fn test_first_request_builds_then_serves() {
        let dir = tempfile::tempdir().unwrap();
        make_project(dir.path(), "courses/fall/stat159");
        let app = router(dir.path(), unmounted(), BUILD_OK);

        let (status, html) = get(&app, "/courses/fall/stat159/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("http-equiv=\"refresh\""));

        let (status, html) = poll(&app, "/courses/fall/stat159/", |_, body| {
            !body.contains("http-equiv=\"refresh\"")
        })
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            html,
            "<html><body>built for /myst/courses/fall/stat159</body></html>"
        );
    }

    #[tokio::test]
    async fn test_failed_build_returns_error_text() {
        let dir = tempfile::tempdir().unwrap();
        make_project(dir.path(), "docs");
        let app = router(
            dir.path(),
            unmounted(),
            "echo compiling; echo 'template error' >&2; exit 2",
        );

        let (status, _) = get(&app, "/docs/").await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = poll(&app, "/docs/", |status, _| status != StatusCode::OK).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains("template error"), "{body}");

        // Failures are terminal until a rebuild
        let (status, _) = get(&app, "/docs/").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_serves_existing_output_without_building() {
        let dir = tempfile::tempdir().unwrap();
        make_project(dir.path(), "docs");
        make_output(dir.path(), "docs", "index.html", "<body>home</body>");
        make_output(dir.path(), "docs", "build/app.js", "run()");
        let app = router(dir.path(), unmounted(), "exit 1");

        assert_eq!(
            get(&app, "/docs/").await,
            (StatusCode::OK, "<body>home</body>".to_owned())
        );
        assert_eq!(
            get(&app, "/docs/build/app.js").await,
            (StatusCode::OK, "run()".to_owned())
        );
        assert_eq!(get(&app, "/docs/missing.js").await.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_project_root_without_slash_redirects() {
        let dir = tempfile::tempdir().unwrap();
        make_project(dir.path(), "docs");
        make_output(dir.path(), "docs", "index.html", "<body>home</body>");
        let app = router(dir.path(), unmounted(), "exit 1");

        let response = send(&app, Method::GET, "/docs").await;

        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(response.headers()[header::LOCATION], "docs/");
    }

    #[tokio::test]
    async fn test_rebuild_removes_output_and_redirects() {
        let dir = tempfile::tempdir().unwrap();
        make_project(dir.path(), "docs");
        make_output(dir.path(), "docs", "index.html", "<body>old</body>");
        let app = router(
            dir.path(),
            MountContext::new(Some("/user/alice"), "myst"),
            "exit 1",
        );

        let response = send(&app, Method::GET, "/docs/chapter%202/?rebuild=1").await;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers()[header::LOCATION],
            "/user/alice/myst/docs/chapter%202/"
        );
        assert_eq!(
            response.headers()[header::CACHE_CONTROL],
            "no-cache, no-store, must-revalidate"
        );
        assert!(!dir.path().join("docs/_build/html").exists());
    }

    #[tokio::test]
    async fn test_rebuild_without_mount_uses_internal_path() {
        let dir = tempfile::tempdir().unwrap();
        make_project(dir.path(), "docs");
        let app = router(dir.path(), unmounted(), "exit 1");

        let response = send(&app, Method::GET, "/docs/?rebuild=1").await;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "/docs/");
    }

    #[tokio::test]
    async fn test_rebuild_clears_failure() {
        let dir = tempfile::tempdir().unwrap();
        make_project(dir.path(), "docs");
        let app = router(dir.path(), unmounted(), "exit 3");

        get(&app, "/docs/").await;
        poll(&app, "/docs/", |status, _| status != StatusCode::OK).await;

        let response = send(&app, Method::GET, "/docs/?rebuild=1").await;
        assert_eq!(response.status(), StatusCode::FOUND);

        let (status, html) = get(&app, "/docs/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("http-equiv=\"refresh\""));
    }

    #[tokio::test]
    async fn test_rewrites_navigation_urls() {
        let dir = tempfile::tempdir().unwrap();
        make_project(dir.path(), "docs");
        make_output(
            dir.path(),
            "docs",
            "index.html",
            r#"<body><script>{"url":"/intro"}</script></body>"#,
        );
        make_output(dir.path(), "docs", "nav.json", r#"{"url":"/intro"}"#);
        let app = router(dir.path(), MountContext::new(Some("/tenant7"), ""), "exit 1");

        let response = send(&app, Method::GET, "/docs/").await;
        let length = response.headers()[header::CONTENT_LENGTH].clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();

        assert_eq!(
            std::str::from_utf8(&bytes).unwrap(),
            r#"<body><script>{"url":"/tenant7/docs/intro"}</script></body>"#
        );
        assert_eq!(length, bytes.len().to_string().as_str());

        let (_, json) = get(&app, "/docs/nav.json").await;
        assert_eq!(json, r#"{"url":"/intro"}"#);
    }

    #[tokio::test]
    async fn test_head_reports_rewritten_length() {
        let dir = tempfile::tempdir().unwrap();
        make_project(dir.path(), "docs");
        make_output(dir.path(), "docs", "index.html", r#"{"url":"/intro"}"#);
        let app = router(dir.path(), MountContext::new(Some("/tenant7"), ""), "exit 1");

        let head = send(&app, Method::HEAD, "/docs/").await;

        assert_eq!(head.status(), StatusCode::OK);
        assert_eq!(
            head.headers()[header::CONTENT_LENGTH],
            r#"{"url":"/tenant7/docs/intro"}"#.len().to_string().as_str()
        );
    }

    #[tokio::test]
    async fn test_path_info_named_directory_is_content() {
        let dir = tempfile::tempdir().unwrap();
        make_project(dir.path(), "myst/book");
        make_output(dir.path(), "myst/book", "index.html", "<body>book</body>");

        for mount in [unmounted(), MountContext::new(Some("/user/alice"), "myst")] {
            let app = router(dir.path(), mount, "exit 1");

            let (status, html) = get(&app, "/myst/book/").await;

            assert_eq!(status, StatusCode::OK);
            assert_eq!(html, "<body>book</body>");
        }
    }

    #[tokio::test]
    async fn test_no_rewrite_without_mount_prefix() {
        let dir = tempfile::tempdir().unwrap();
        make_project(dir.path(), "docs");
        make_output(dir.path(), "docs", "index.html", r#"{"url":"/intro"}"#);
        let app = router(dir.path(), unmounted(), "exit 1");

        let (_, html) = get(&app, "/docs/").await;

        assert_eq!(html, r#"{"url":"/intro"}"#);
    }

    #[tokio::test]
    async fn test_rejects_other_methods() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(dir.path(), unmounted(), "exit 1");

        let response = send(&app, Method::POST, "/").await;

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[header::ALLOW], "GET, HEAD");
    }

    #[tokio::test]
    async fn test_sets_nosniff_header() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(dir.path(), unmounted(), "exit 1");

        let response = send(&app, Method::GET, "/").await;

        assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    }
}
