use std::path::{Path, PathBuf};

use thiserror::Error;

/// Which kind of dependency file a parse operation was handed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Manifest,
    Lockfile,
}

impl std::fmt::Display for FileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileKind::Manifest => write!(f, "manifest file"),
            FileKind::Lockfile => write!(f, "lockfile"),
        }
    }
}

/// Errors raised by manifest and lockfile parsing.
///
/// These always propagate to the caller. Repository resolution never raises:
/// a miss (registry 404, transport failure, unsupported URL shape) is
/// `None` in the return value, so one unresolvable package cannot abort a
/// batch.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The requested path does not exist.
    #[error("{kind} not found: {}", .path.display())]
    NotFound { kind: FileKind, path: PathBuf },

    /// The file exists but its name is not one the resolver recognizes.
    #[error("unknown {ecosystem} {kind} type: {filename}")]
    UnknownFormat {
        ecosystem: &'static str,
        kind: FileKind,
        filename: String,
    },

    /// The file exists but its content could not be read.
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ParseError {
    pub(crate) fn not_found(kind: FileKind, path: &Path) -> Self {
        Self::NotFound {
            kind,
            path: path.to_path_buf(),
        }
    }

    pub(crate) fn unknown_format(
        ecosystem: &'static str,
        kind: FileKind,
        filename: &str,
    ) -> Self {
        Self::UnknownFormat {
            ecosystem,
            kind,
            filename: filename.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message_names_kind_and_path() {
        let err = ParseError::not_found(FileKind::Lockfile, Path::new("/missing/go.sum"));
        assert_eq!(err.to_string(), "lockfile not found: /missing/go.sum");
    }

    #[test]
    fn test_unknown_format_message_names_filename() {
        let err = ParseError::unknown_format("go", FileKind::Lockfile, "unknown.lock");
        assert_eq!(err.to_string(), "unknown go lockfile type: unknown.lock");
    }
}
