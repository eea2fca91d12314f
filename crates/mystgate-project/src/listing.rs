//! Child directory listing for the directory browser.

use std::fs;
use std::path::Path;

use crate::ProjectError;

/// A browsable child directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    /// Directory name.
    pub name: String,
    /// Whether the directory contains the marker file.
    pub is_project: bool,
}

/// List the immediate child directories of `dir`, sorted by name.
///
/// Hidden entries (names starting with `.`) and non-directories are skipped.
/// Names that are not valid UTF-8 are skipped as well since they cannot be
/// linked to.
pub fn list_child_directories(dir: &Path, marker: &str) -> Result<Vec<DirEntry>, ProjectError> {
    if !dir.is_dir() {
        return Err(ProjectError::NotADirectory(dir.to_path_buf()));
    }

    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        let path = entry.path();
        // Follows symlinks, so linked directories are browsable too
        if !path.is_dir() {
            continue;
        }
        entries.push(DirEntry {
            is_project: path.join(marker).is_file(),
            name,
        });
    }

    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_lists_directories_with_project_flag() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("notes")).unwrap();
        fs::create_dir_all(dir.path().join("book")).unwrap();
        fs::write(dir.path().join("book/myst.yml"), "").unwrap();
        fs::write(dir.path().join("README.md"), "# hi").unwrap();

        let entries = list_child_directories(dir.path(), "myst.yml").unwrap();

        assert_eq!(
            entries,
            vec![
                DirEntry {
                    name: "book".to_owned(),
                    is_project: true,
                },
                DirEntry {
                    name: "notes".to_owned(),
                    is_project: false,
                },
            ]
        );
    }

    #[test]
    fn test_skips_hidden_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        fs::create_dir_all(dir.path().join(".ipynb_checkpoints")).unwrap();
        fs::create_dir_all(dir.path().join("visible")).unwrap();

        let entries = list_child_directories(dir.path(), "myst.yml").unwrap();

        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["visible"]);
    }

    #[test]
    fn test_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let entries = list_child_directories(dir.path(), "myst.yml").unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_not_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file.txt");
        fs::write(&file, "x").unwrap();

        let result = list_child_directories(&file, "myst.yml");
        assert!(matches!(result, Err(ProjectError::NotADirectory(_))));

        let missing = list_child_directories(&dir.path().join("missing"), "myst.yml");
        assert!(matches!(missing, Err(ProjectError::NotADirectory(_))));
    }
}
