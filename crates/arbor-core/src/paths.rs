use crate::pkg::PACKAGE_JSON;
use std::path::{Path, PathBuf};

/// Find the project root by walking up from `cwd` looking for `package.json`.
///
/// Returns the first directory containing one, or `None` if none is found.
#[must_use]
pub fn project_root(cwd: &Path) -> Option<PathBuf> {
    let mut current = cwd.to_path_buf();

    loop {
        if current.join(PACKAGE_JSON).is_file() {
            return Some(current);
        }

        if !current.pop() {
            return None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_project_root_finds_package_json() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(PACKAGE_JSON), "{}").unwrap();
        let nested = dir.path().join("src/lib");
        fs::create_dir_all(&nested).unwrap();

        assert_eq!(project_root(&nested), Some(dir.path().to_path_buf()));
    }

    #[test]
    fn test_project_root_ignores_directory_named_package_json() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a").join(PACKAGE_JSON)).unwrap();
        let found = project_root(&dir.path().join("a"));
        assert_ne!(found, Some(dir.path().join("a")));
    }
}
