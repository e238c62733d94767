//! Version range satisfaction using semver.
//!
//! Only registry ranges are checked. Specs that name a dist-tag, a URL, a git
//! remote, or a local path cannot be compared against an installed version
//! and are reported as "unknown" so callers can treat them as satisfied.

use semver::{Version, VersionReq};

/// Whether `version` satisfies the range `spec`.
///
/// # Rules
/// - `""`, `*`, `x` match any release version
/// - A bare full version (`1.2.3`, `v1.2.3`, `=1.2.3`) matches exactly
/// - A bare partial version (`1`, `1.2`) is an x-range
/// - `npm:<name>@<range>` aliases are checked against `<range>`
/// - OR ranges like `^1.0.0 || ^2.0.0` match if any alternative does
///
/// Returns `None` when either side cannot be interpreted as semver (tags,
/// `file:`/`link:`/`workspace:` specs, URLs, git remotes, junk).
#[must_use]
pub fn version_satisfies(version: &str, spec: &str) -> Option<bool> {
    let version = Version::parse(version.trim().trim_start_matches(['v', '='])).ok()?;
    let range = registry_range(spec)?;

    let mut any_parsed = false;
    for alt in range.split("||").map(str::trim) {
        match alternative_matches(&version, alt) {
            Some(true) => return Some(true),
            Some(false) => any_parsed = true,
            None => {}
        }
    }
    any_parsed.then_some(false)
}

/// Extract the semver range from a spec, or `None` for non-registry specs.
fn registry_range(spec: &str) -> Option<&str> {
    let spec = spec.trim();

    // npm:real-name@range
    let spec = match spec.strip_prefix("npm:") {
        Some(alias) => {
            // Skip a leading '@' so scoped names keep their own separator
            let at = alias
                .get(1..)
                .and_then(|rest| rest.find('@'))
                .map(|i| i + 1);
            match at {
                Some(i) => &alias[i + 1..],
                None => "",
            }
        }
        None => spec,
    };

    let non_registry = spec.contains(':') || spec.contains('/') || spec.contains('\\');
    if non_registry {
        return None;
    }
    Some(spec)
}

fn alternative_matches(version: &Version, alt: &str) -> Option<bool> {
    if alt.is_empty() || alt == "*" || alt == "x" || alt == "X" {
        return Some(version.pre.is_empty());
    }

    // Exact version: semver's bare-version default is caret, npm's is equality
    if let Ok(exact) = Version::parse(alt.trim_start_matches(['v', '='])) {
        return Some(
            exact.major == version.major
                && exact.minor == version.minor
                && exact.patch == version.patch
                && exact.pre == version.pre,
        );
    }

    parse_range(alt).map(|req| req.matches(version))
}

/// Parse a single version range, handling npm-specific syntax.
///
/// Handles:
/// - Standard semver ranges: ^1.0.0, ~1.0.0, >=1.0.0, etc.
/// - Hyphen ranges: 1.0.0 - 2.0.0
/// - X-ranges: 1.x, 1.0.x, 1, 1.2
/// - Space-separated comparators: >= 2.1.2 < 3.0.0
fn parse_range(range: &str) -> Option<VersionReq> {
    let range = range.trim();

    // Handle hyphen ranges: "1.0.0 - 2.0.0" -> ">=1.0.0, <=2.0.0"
    if let Some((start, end)) = parse_hyphen_range(range) {
        return VersionReq::parse(&format!(">={start}, <={end}")).ok();
    }

    if is_x_range(range) {
        return VersionReq::parse(&convert_x_range(range)).ok();
    }

    // npm allows spaces between comparators to mean AND
    VersionReq::parse(&convert_space_separated_comparators(range)).ok()
}

/// Parse a hyphen range like "1.0.0 - 2.0.0".
fn parse_hyphen_range(range: &str) -> Option<(String, String)> {
    let (start, end) = range.split_once(" - ")?;
    let (start, end) = (start.trim(), end.trim());
    if start.is_empty() || end.is_empty() || end.contains(" - ") {
        return None;
    }
    Some((start.to_string(), end.to_string()))
}

/// `1`, `1.2`, `1.x`, `1.2.x`, `1.*`.
fn is_x_range(range: &str) -> bool {
    let parts: Vec<&str> = range.split('.').collect();
    if parts.len() > 3 || parts.iter().any(|p| p.is_empty()) {
        return false;
    }
    let wildcard = |p: &str| matches!(p, "x" | "X" | "*");
    let numeric = |p: &str| p.chars().all(|c| c.is_ascii_digit());

    let first_wild = parts.iter().position(|p| wildcard(p));
    let numeric_prefix = match first_wild {
        Some(i) => parts[i..].iter().all(|p| wildcard(p)) && i > 0,
        None => parts.len() < 3,
    };
    numeric_prefix
        && parts
            .iter()
            .take(first_wild.unwrap_or(parts.len()))
            .all(|p| numeric(p))
}

/// Convert an x-range to a comparator pair.
fn convert_x_range(range: &str) -> String {
    let numbers: Vec<u64> = range
        .split('.')
        .map_while(|p| p.parse::<u64>().ok())
        .collect();

    match numbers.as_slice() {
        [m] => format!(">={m}.0.0, <{}.0.0", m + 1),
        [m, n] => format!(">={m}.{n}.0, <{m}.{}.0", n + 1),
        _ => ">=0.0.0".to_string(),
    }
}

/// Convert space-separated comparators to comma-separated.
///
/// npm allows: ">= 2.1.2 < 3.0.0" which means ">=2.1.2 AND <3.0.0"
/// Rust semver requires: ">=2.1.2, <3.0.0"
fn convert_space_separated_comparators(range: &str) -> String {
    let mut result = String::new();
    let mut pending_op = String::new();

    for token in range.split_whitespace() {
        if token_has_version(token) {
            if !result.is_empty() {
                result.push_str(", ");
            }
            result.push_str(&pending_op);
            result.push_str(token);
            pending_op.clear();
        } else {
            // Operator separated from its version by a space
            pending_op.push_str(token);
        }
    }

    if result.is_empty() {
        return range.to_string();
    }
    result
}

/// Check if a token contains a version number (has digits).
fn token_has_version(token: &str) -> bool {
    token.chars().any(|c| c.is_ascii_digit())
}
