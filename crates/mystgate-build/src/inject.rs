//! Post-build HTML injection.
//!
//! When enabled, a fixed fragment is inserted before the closing body tag of
//! every HTML file the builder produced.

use std::fs;
use std::path::{Path, PathBuf};

use crate::BuildError;

/// Floating "Rebuild" link added to built pages.
///
/// The link is relative, so it rebuilds whichever project the page belongs to
/// and lands back on the same page afterwards.
pub const REBUILD_BUTTON: &str = concat!(
    "<a href=\"?rebuild=1\" title=\"Rebuild this site\" ",
    "style=\"position:fixed;bottom:1rem;right:1rem;z-index:9999;",
    "padding:0.4rem 0.8rem;border-radius:0.4rem;background:#1f2937;",
    "color:#fff;font:14px sans-serif;text-decoration:none;opacity:0.8\">",
    "Rebuild</a>"
);

/// Inject `fragment` into every `*.html` file below `dir`.
///
/// Returns the number of files rewritten. The first file without a closing
/// body tag aborts injection with [`BuildError::MissingBodyTag`].
pub(crate) fn inject_fragment(dir: &Path, fragment: &str) -> Result<usize, BuildError> {
    let mut files = Vec::new();
    collect_html_files(dir, &mut files)?;
    files.sort();

    for file in &files {
        let html = fs::read_to_string(file)?;
        let injected = insert_before_body_close(&html, fragment)
            .ok_or_else(|| BuildError::MissingBodyTag(file.clone()))?;
        fs::write(file, injected)?;
    }

    Ok(files.len())
}

/// Recursively collect HTML files.
fn collect_html_files(dir: &Path, files: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_html_files(&path, files)?;
        } else if path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("html"))
        {
            files.push(path);
        }
    }
    Ok(())
}

/// Insert `fragment` before the last `</body>` (case-insensitive).
fn insert_before_body_close(html: &str, fragment: &str) -> Option<String> {
    // ASCII lowercasing keeps byte offsets intact
    let pos = html.to_ascii_lowercase().rfind("</body>")?;
    let mut result = String::with_capacity(html.len() + fragment.len());
    result.push_str(&html[..pos]);
    result.push_str(fragment);
    result.push_str(&html[pos..]);
    Some(result)
}
