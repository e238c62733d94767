use crate::pkg::PkgError;
use std::path::PathBuf;
use thiserror::Error;

/// Core error type for arbor operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid setting `{key}`: {message}")]
    InvalidSetting { key: &'static str, message: String },

    #[error("No package.json found from {start}")]
    ProjectNotFound { start: PathBuf },

    #[error(transparent)]
    Pkg(#[from] PkgError),
}

impl Error {
    /// Stable code for machine-readable output.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io(_) => "IO_ERROR",
            Self::ConfigRead { .. } => "CONFIG_READ_FAILED",
            Self::InvalidSetting { .. } => "CONFIG_INVALID_SETTING",
            Self::ProjectNotFound { .. } => "PROJECT_NOT_FOUND",
            Self::Pkg(e) => e.code(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pkg_error_keeps_code() {
        let err: Error = PkgError::omit_invalid("bogus").into();
        assert_eq!(err.code(), crate::pkg::pkg_codes::PKG_OMIT_INVALID);
        assert!(err.to_string().starts_with("PKG_OMIT_INVALID"));
    }

    #[test]
    fn test_invalid_setting_display() {
        let err = Error::InvalidSetting {
            key: "omit",
            message: "unknown class".into(),
        };
        assert_eq!(err.to_string(), "Invalid setting `omit`: unknown class");
        assert_eq!(err.code(), "CONFIG_INVALID_SETTING");
    }
}
