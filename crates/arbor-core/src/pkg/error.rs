//! Package tree error types.

use std::fmt;
use std::io;
use std::path::Path;

use super::lockfile::LockfileError;

/// Package tree error codes.
pub mod codes {
    pub const PKG_PACKAGE_JSON_NOT_FOUND: &str = "PKG_PACKAGE_JSON_NOT_FOUND";
    pub const PKG_PACKAGE_JSON_INVALID: &str = "PKG_PACKAGE_JSON_INVALID";
    pub const PKG_DEP_RANGE_INVALID: &str = "PKG_DEP_RANGE_INVALID";
    pub const PKG_OMIT_INVALID: &str = "PKG_OMIT_INVALID";
    pub const NODE_MODULES_READ_FAILED: &str = "NODE_MODULES_READ_FAILED";

    // Filesystem reconciliation
    pub const PKG_PERMISSION_DENIED: &str = "PKG_PERMISSION_DENIED";
    pub const PKG_REMOVE_FAILED: &str = "PKG_REMOVE_FAILED";
    pub const PKG_REMOVE_RETRIES_EXHAUSTED: &str = "PKG_REMOVE_RETRIES_EXHAUSTED";

    // Lockfile synchronization
    pub const PKG_LOCKFILE_FAILED: &str = "PKG_LOCKFILE_FAILED";
}

/// Package tree error.
#[derive(Debug)]
pub struct PkgError {
    code: &'static str,
    message: String,
}

impl PkgError {
    /// Create a new error with the given code and message.
    #[must_use]
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Get the error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// Get the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Create a package.json not found error.
    #[must_use]
    pub fn package_json_not_found(path: &Path) -> Self {
        Self::new(
            codes::PKG_PACKAGE_JSON_NOT_FOUND,
            format!("package.json not found: {}", path.display()),
        )
    }

    /// Create a package.json invalid error.
    pub fn package_json_invalid(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_PACKAGE_JSON_INVALID, msg)
    }

    /// Create an invalid omit/include class error.
    #[must_use]
    pub fn omit_invalid(value: &str) -> Self {
        Self::new(
            codes::PKG_OMIT_INVALID,
            format!("Invalid dependency class '{value}': expected dev, optional, or peer"),
        )
    }

    /// Create a `node_modules` read failure.
    pub fn node_modules_read_failed(msg: impl Into<String>) -> Self {
        Self::new(codes::NODE_MODULES_READ_FAILED, msg)
    }

    /// Create a permission denied error for a removal target.
    #[must_use]
    pub fn permission_denied(path: &Path, err: &io::Error) -> Self {
        Self::new(
            codes::PKG_PERMISSION_DENIED,
            format!("Permission denied removing {}: {err}", path.display()),
        )
    }

    /// Create a generic removal failure.
    #[must_use]
    pub fn remove_failed(path: &Path, err: &io::Error) -> Self {
        Self::new(
            codes::PKG_REMOVE_FAILED,
            format!("Failed to remove {}: {err}", path.display()),
        )
    }

    /// Create a retries-exhausted error for a transiently locked target.
    #[must_use]
    pub fn retries_exhausted(path: &Path, attempts: u32, err: &io::Error) -> Self {
        Self::new(
            codes::PKG_REMOVE_RETRIES_EXHAUSTED,
            format!(
                "Gave up removing {} after {attempts} attempts: {err}",
                path.display()
            ),
        )
    }

    /// Whether this error came from a denied permission.
    #[must_use]
    pub fn is_permission_denied(&self) -> bool {
        self.code == codes::PKG_PERMISSION_DENIED
    }
}

impl fmt::Display for PkgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for PkgError {}

impl From<io::Error> for PkgError {
    fn from(e: io::Error) -> Self {
        Self::new(codes::PKG_REMOVE_FAILED, e.to_string())
    }
}

impl From<serde_json::Error> for PkgError {
    fn from(e: serde_json::Error) -> Self {
        Self::new(codes::PKG_PACKAGE_JSON_INVALID, format!("Invalid JSON: {e}"))
    }
}

impl From<LockfileError> for PkgError {
    fn from(e: LockfileError) -> Self {
        Self::new(codes::PKG_LOCKFILE_FAILED, e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_format() {
        let err = PkgError::omit_invalid("prod");
        assert_eq!(err.code(), codes::PKG_OMIT_INVALID);
        assert!(err.to_string().starts_with("PKG_OMIT_INVALID: "));
        assert!(err.message().contains("'prod'"));
    }

    #[test]
    fn test_permission_denied_is_flagged() {
        let io_err = io::Error::from(io::ErrorKind::PermissionDenied);
        let err = PkgError::permission_denied(Path::new("/nm/abbrev"), &io_err);
        assert!(err.is_permission_denied());
        assert!(!PkgError::remove_failed(Path::new("/nm/abbrev"), &io_err).is_permission_denied());
    }

    #[test]
    fn test_error_codes_uppercase() {
        let all_codes = [
            codes::PKG_PACKAGE_JSON_NOT_FOUND,
            codes::PKG_PACKAGE_JSON_INVALID,
            codes::PKG_DEP_RANGE_INVALID,
            codes::PKG_OMIT_INVALID,
            codes::NODE_MODULES_READ_FAILED,
            codes::PKG_PERMISSION_DENIED,
            codes::PKG_REMOVE_FAILED,
            codes::PKG_REMOVE_RETRIES_EXHAUSTED,
            codes::PKG_LOCKFILE_FAILED,
        ];

        for code in all_codes {
            assert!(
                code.chars().all(|c| c.is_uppercase() || c == '_'),
                "Error code '{code}' should be SCREAMING_SNAKE_CASE"
            );
        }
    }
}
