//! Filesystem reconciliation: apply a removal plan to disk.
//!
//! Removals are independent and operate on disjoint paths, so they run
//! concurrently (bounded). Each one is idempotent: a target that is already
//! gone counts as done, which makes an interrupted run safe to repeat.

use super::error::PkgError;
use arbor_util::fs::{remove_dir_if_empty, remove_entry, Removed};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Maximum removals in flight at once.
pub const MAX_CONCURRENT_REMOVALS: usize = 16;

/// Retries for a transiently locked target before giving up.
pub const MAX_RETRIES: u32 = 4;

/// First retry delay; doubles on each further attempt.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(25);

/// What a removal target is, for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RemovalKind {
    /// A package directory (removed recursively).
    Package,
    /// A symlink or junction to a package stored elsewhere (unlinked only).
    Link,
    /// A bin symlink or shim.
    Bin,
}

/// One path to delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    pub path: PathBuf,
    pub kind: RemovalKind,
}

impl Removal {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, kind: RemovalKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Outcome of a reconcile pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    /// Targets that existed and were deleted.
    pub removed: Vec<PathBuf>,
    /// Targets that were already gone.
    pub already_absent: Vec<PathBuf>,
    /// Empty `@scope` directories cleaned up afterwards.
    pub scopes_removed: Vec<PathBuf>,
    /// Total retry attempts spent on transient errors.
    pub retries: u32,
}

/// How a removal failure is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Target already gone: success.
    Absent,
    /// Fatal at once, never retried.
    PermissionDenied,
    /// Lock contention and the like: retried with backoff.
    Transient,
    /// Anything else: fatal.
    Fatal,
}

/// Classify an I/O error raised while removing a target.
#[must_use]
pub fn classify(err: &io::Error) -> ErrorClass {
    match err.kind() {
        io::ErrorKind::NotFound => ErrorClass::Absent,
        io::ErrorKind::PermissionDenied => ErrorClass::PermissionDenied,
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
            ErrorClass::Transient
        }
        _ if is_transient_os_error(err) => ErrorClass::Transient,
        _ => ErrorClass::Fatal,
    }
}

#[cfg(unix)]
fn is_transient_os_error(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(code) if code == libc::EBUSY
            || code == libc::EAGAIN
            || code == libc::ENOTEMPTY
            || code == libc::EMFILE
            || code == libc::ENFILE
    )
}

#[cfg(windows)]
fn is_transient_os_error(err: &io::Error) -> bool {
    // ERROR_SHARING_VIOLATION, ERROR_LOCK_VIOLATION, ERROR_DIR_NOT_EMPTY
    matches!(err.raw_os_error(), Some(32 | 33 | 145))
}

#[cfg(not(any(unix, windows)))]
fn is_transient_os_error(_err: &io::Error) -> bool {
    false
}

type RemoveFn = fn(&Path) -> io::Result<Removed>;

struct Attempt {
    removed: Removed,
    retries: u32,
}

/// Apply `removals` to disk.
///
/// Runs up to [`MAX_CONCURRENT_REMOVALS`] deletions at once. Stops at the
/// first fatal error; deletions already applied stay applied.
///
/// # Errors
/// Returns `PKG_PERMISSION_DENIED` for a denied removal,
/// `PKG_REMOVE_RETRIES_EXHAUSTED` when a target stays locked, and
/// `PKG_REMOVE_FAILED` for any other failure.
pub async fn apply(removals: Vec<Removal>) -> Result<ReconcileReport, PkgError> {
    apply_with(removals, remove_entry).await
}

async fn apply_with(removals: Vec<Removal>, remove: RemoveFn) -> Result<ReconcileReport, PkgError> {
    let mut report = ReconcileReport::default();
    let scopes: BTreeSet<PathBuf> = removals
        .iter()
        .filter_map(|r| scope_dir(&r.path))
        .collect();

    let mut results = stream::iter(removals)
        .map(|removal| async move {
            debug!(path = %removal.path.display(), kind = ?removal.kind, "removing");
            let attempt = remove_with_retry(&removal.path, remove).await?;
            Ok::<_, PkgError>((removal, attempt))
        })
        .buffer_unordered(MAX_CONCURRENT_REMOVALS);

    while let Some(result) = results.next().await {
        let (removal, attempt) = result?;
        report.retries += attempt.retries;
        if attempt.removed == Removed::Absent {
            report.already_absent.push(removal.path);
        } else {
            report.removed.push(removal.path);
        }
    }

    for scope in scopes {
        match remove_dir_if_empty(&scope) {
            Ok(true) => report.scopes_removed.push(scope),
            Ok(false) => {}
            Err(e) => warn!(scope = %scope.display(), error = %e, "could not remove empty scope"),
        }
    }

    report.removed.sort();
    report.already_absent.sort();
    Ok(report)
}

async fn remove_with_retry(path: &Path, remove: RemoveFn) -> Result<Attempt, PkgError> {
    let mut retries = 0;
    loop {
        let target = path.to_path_buf();
        let result = tokio::task::spawn_blocking(move || remove(&target))
            .await
            .map_err(|e| PkgError::remove_failed(path, &io::Error::other(e)))?;

        let err = match result {
            Ok(removed) => return Ok(Attempt { removed, retries }),
            Err(e) => e,
        };
        match classify(&err) {
            ErrorClass::Absent => {
                return Ok(Attempt {
                    removed: Removed::Absent,
                    retries,
                })
            }
            ErrorClass::PermissionDenied => return Err(PkgError::permission_denied(path, &err)),
            ErrorClass::Transient if retries < MAX_RETRIES => {
                let delay = RETRY_BASE_DELAY * 2u32.pow(retries);
                warn!(
                    path = %path.display(),
                    error = %err,
                    delay_ms = delay.as_millis(),
                    "transient removal failure, retrying"
                );
                tokio::time::sleep(delay).await;
                retries += 1;
            }
            ErrorClass::Transient => {
                return Err(PkgError::retries_exhausted(path, retries + 1, &err))
            }
            ErrorClass::Fatal => return Err(PkgError::remove_failed(path, &err)),
        }
    }
}

/// The `@scope` directory holding `path`, if any.
fn scope_dir(path: &Path) -> Option<PathBuf> {
    let parent = path.parent()?;
    parent
        .file_name()?
        .to_string_lossy()
        .starts_with('@')
        .then(|| parent.to_path_buf())
}
