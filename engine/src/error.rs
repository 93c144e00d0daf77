//! Error types for the sweep engine.
//!
//! `SweepError` is returned by `Sweeper::sweep` and only ever describes the
//! whole sweep: the root could not be used, the sweep was cancelled, or no
//! policy was installed. Problems with individual entries or folders are
//! recorded as `SweepWarning`s and never abort the sweep.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Sweep-level outcome other than success.
#[derive(Error, Debug)]
pub enum SweepError {
    /// Root path does not resolve or is not a folder
    #[error("Invalid sweep root {}: {reason}", .path.display())]
    InvalidRoot {
        path: PathBuf,
        reason: String,
        #[source]
        source: Option<ResolveError>,
    },

    /// The stop flag was observed mid-sweep
    #[error("Sweep cancelled")]
    Cancelled,

    /// `sweep` was called before a policy was installed
    #[error("No decision policy installed")]
    MissingPolicy,
}

impl SweepError {
    /// True for the expected early-exit outcome, as opposed to a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SweepError::Cancelled)
    }

    /// Extract the OS error code behind this error, if available.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            SweepError::InvalidRoot {
                source: Some(source),
                ..
            } => source.raw_os_error(),
            _ => None,
        }
    }
}

/// Failure to turn a path into an object reference.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// Nothing exists at the path
    #[error("No such file or folder: {}", .path.display())]
    NotFound { path: PathBuf },

    /// The path exists but cannot be inspected
    #[error("Access denied: {}", .path.display())]
    AccessDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A symbolic link whose target does not exist
    #[error("Dangling symbolic link: {}", .path.display())]
    DanglingLink { path: PathBuf },

    /// Any other I/O failure
    #[error("Failed to resolve {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ResolveError {
    pub(crate) fn from_io(path: PathBuf, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound => ResolveError::NotFound { path },
            io::ErrorKind::PermissionDenied => ResolveError::AccessDenied { path, source },
            _ => ResolveError::Io { path, source },
        }
    }

    /// Path that failed to resolve.
    pub fn path(&self) -> &std::path::Path {
        match self {
            ResolveError::NotFound { path }
            | ResolveError::AccessDenied { path, .. }
            | ResolveError::DanglingLink { path }
            | ResolveError::Io { path, .. } => path,
        }
    }

    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            ResolveError::AccessDenied { source, .. } | ResolveError::Io { source, .. } => {
                source.raw_os_error()
            }
            _ => None,
        }
    }
}

/// A recovered, per-entry or per-folder problem seen during a sweep.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SweepWarning {
    /// An enumerated entry could not be resolved; it was skipped
    #[error("Skipped entry {}: {reason}", .path.display())]
    EntryResolveFailed { path: PathBuf, reason: String },

    /// A folder could not be opened or read; its subtree was skipped
    #[error("Skipped folder {}: {reason}", .path.display())]
    DirectoryEnumerationFailed { path: PathBuf, reason: String },
}

impl SweepWarning {
    pub fn path(&self) -> &std::path::Path {
        match self {
            SweepWarning::EntryResolveFailed { path, .. }
            | SweepWarning::DirectoryEnumerationFailed { path, .. } => path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_error_classification() {
        let path = PathBuf::from("/nope");
        let err = ResolveError::from_io(path.clone(), io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(err, ResolveError::NotFound { .. }));

        let err = ResolveError::from_io(path.clone(), io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, ResolveError::AccessDenied { .. }));
        assert_eq!(err.path(), path.as_path());
    }

    #[test]
    fn test_invalid_root_exposes_os_error() {
        let err = SweepError::InvalidRoot {
            path: PathBuf::from("/root"),
            reason: "denied".to_string(),
            source: Some(ResolveError::Io {
                path: PathBuf::from("/root"),
                source: io::Error::from_raw_os_error(13),
            }),
        };
        assert_eq!(err.raw_os_error(), Some(13));
        assert!(!err.is_cancelled());
        assert!(SweepError::Cancelled.is_cancelled());
    }
}
