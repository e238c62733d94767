//! `.npmrc` file parser for prune-related settings.
//!
//! Extracts:
//! - `omit=<class>` / `omit[]=<class>` and `include=...` dependency classes
//! - `production=true` (shorthand for `omit=dev`)
//! - `workspaces=false`
//! - `package-lock=false`
//!
//! `${ENV_VAR}` references in values are expanded.

use std::path::{Path, PathBuf};

/// Settings read from `.npmrc` files. `None` means "not set here".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NpmrcConfig {
    pub omit: Option<Vec<String>>,
    pub include: Option<Vec<String>>,
    pub production: Option<bool>,
    pub workspaces: Option<bool>,
    pub package_lock: Option<bool>,
}

/// Parse a single `.npmrc` file's content.
///
/// Ignores comments (`#`, `;`), blank lines, and keys it does not know.
/// Repeated `omit[]`/`include[]` lines within one file accumulate.
#[must_use]
pub fn parse_npmrc(content: &str) -> NpmrcConfig {
    let mut config = NpmrcConfig::default();

    for line in content.lines() {
        let line = line.trim();

        // Skip empty lines and comments
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = expand_env_vars(value.trim().trim_matches('"'));
        apply_setting(&mut config, key.trim(), &value);
    }

    config
}

/// Apply one `key=value` setting. Unknown keys are ignored.
pub fn apply_setting(config: &mut NpmrcConfig, key: &str, value: &str) {
    match key.trim_end_matches("[]") {
        "omit" => push_classes(&mut config.omit, value),
        "include" => push_classes(&mut config.include, value),
        "production" => config.production = parse_bool(value),
        "workspaces" => config.workspaces = parse_bool(value),
        "package-lock" => config.package_lock = parse_bool(value),
        _ => {}
    }
}

fn push_classes(slot: &mut Option<Vec<String>>, value: &str) {
    let list = slot.get_or_insert_with(Vec::new);
    list.extend(
        value
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .map(String::from),
    );
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// Load and merge `.npmrc` files from project directory up to home.
///
/// Priority order (first wins, no overwrite):
/// 1. `project_dir/.npmrc`
/// 2. Parent directories up to filesystem root
/// 3. `$HOME/.npmrc`
#[must_use]
pub fn load_npmrc_files(project_dir: &Path) -> NpmrcConfig {
    let mut merged = NpmrcConfig::default();

    let mut dir = Some(project_dir.to_path_buf());
    while let Some(d) = dir {
        merge_file(&mut merged, &d.join(".npmrc"));
        dir = d.parent().map(Path::to_path_buf);
    }

    // Handles a project_dir outside HOME
    if let Some(home) = home_dir() {
        merge_file(&mut merged, &home.join(".npmrc"));
    }

    merged
}

fn merge_file(target: &mut NpmrcConfig, path: &Path) {
    if !path.is_file() {
        return;
    }
    if let Ok(content) = std::fs::read_to_string(path) {
        merge_config(target, &parse_npmrc(&content));
    }
}

/// Merge `source` into `target`, keeping existing entries (first wins).
fn merge_config(target: &mut NpmrcConfig, source: &NpmrcConfig) {
    if target.omit.is_none() {
        target.omit.clone_from(&source.omit);
    }
    if target.include.is_none() {
        target.include.clone_from(&source.include);
    }
    target.production = target.production.or(source.production);
    target.workspaces = target.workspaces.or(source.workspaces);
    target.package_lock = target.package_lock.or(source.package_lock);
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for ch in chars.by_ref() {
                if ch == '}' {
                    break;
                }
                var_name.push(ch);
            }
            // Unset variables expand to empty string (matches npm behavior)
            if let Ok(val) = std::env::var(&var_name) {
                result.push_str(&val);
            }
        } else {
            result.push(ch);
        }
    }

    result
}

/// Get the user's home directory.
fn home_dir() -> Option<PathBuf> {
    // Try HOME first (Unix), then USERPROFILE (Windows)
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .ok()
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_parse_omit_forms() {
        let content = "omit[]=dev\nomit[]=optional\n";
        let config = parse_npmrc(content);
        assert_eq!(
            config.omit,
            Some(vec!["dev".to_string(), "optional".to_string()])
        );

        let config = parse_npmrc("omit=dev,peer\n");
        assert_eq!(config.omit, Some(vec!["dev".to_string(), "peer".to_string()]));
    }

    #[test]
    fn test_parse_booleans() {
        let content = "\
# prune settings
production=true
workspaces=false
package-lock = false
; unknown keys are ignored
registry=https://example.com/
";
        let config = parse_npmrc(content);
        assert_eq!(config.production, Some(true));
        assert_eq!(config.workspaces, Some(false));
        assert_eq!(config.package_lock, Some(false));
        assert!(config.omit.is_none());
    }

    #[test]
    fn test_invalid_bool_is_unset() {
        let config = parse_npmrc("workspaces=maybe\n");
        assert_eq!(config.workspaces, None);
    }

    #[test]
    #[serial]
    fn test_env_var_expansion() {
        std::env::set_var("TEST_NPMRC_OMIT", "optional");
        let config = parse_npmrc("omit=${TEST_NPMRC_OMIT}\n");
        assert_eq!(config.omit, Some(vec!["optional".to_string()]));
        std::env::remove_var("TEST_NPMRC_OMIT");
    }

    #[test]
    fn test_env_var_missing() {
        let result = expand_env_vars("${NONEXISTENT_VAR_12345}");
        assert_eq!(result, "");
    }

    #[test]
    fn test_merge_first_wins() {
        let mut target = parse_npmrc("omit=dev\n");
        let source = parse_npmrc("omit=optional\nworkspaces=false\n");

        merge_config(&mut target, &source);
        assert_eq!(target.omit, Some(vec!["dev".to_string()]));
        assert_eq!(target.workspaces, Some(false));
    }

    #[test]
    #[serial]
    fn test_load_project_npmrc() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("proj");
        std::fs::create_dir_all(&project).unwrap();
        std::fs::write(project.join(".npmrc"), "include=dev\n").unwrap();
        std::fs::write(dir.path().join(".npmrc"), "include=peer\nproduction=true\n").unwrap();

        let config = load_npmrc_files(&project);
        assert_eq!(config.include, Some(vec!["dev".to_string()]));
        assert_eq!(config.production, Some(true));
    }
}
