//! Error types.
//!
//! Only [`ConfigError`] is fatal to a scan. Every [`ScanError`] is contained
//! by the unit that produced it (a block, a record, a file, an ecosystem or a
//! project root) and logged where it is caught.

use std::path::PathBuf;

/// Result alias used throughout the library.
pub type Result<T, E = ScanError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// The external tool is missing, exited non-zero, or timed out.
    #[error("tool unavailable: {tool}: {reason}")]
    ToolUnavailable { tool: String, reason: String },

    /// A tree, JSON document, lock block or record could not be parsed.
    #[error("parse error: {path}: {reason}")]
    Parse { path: String, reason: String },

    /// A file could not be read while computing its fingerprint.
    #[error("fingerprint error: {path}: {source}")]
    FingerprintIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("io error: {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ScanError {
    pub fn parse(path: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        ScanError::Parse {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ScanError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn tool(tool: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        ScanError::ToolUnavailable {
            tool: tool.into(),
            reason: reason.to_string(),
        }
    }
}

/// Invalid configuration, reported before any scanning starts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("archive depth {0} is out of range (expected 0..=7)")]
    InvalidArchiveDepth(u8),

    #[error("include pattern set is empty")]
    EmptyIncludePatterns,

    #[error("invalid glob '{pattern}': {reason}")]
    InvalidGlob { pattern: String, reason: String },

    #[error("{field} must be greater than zero")]
    InvalidTimeout { field: &'static str },

    #[error("partial hash window must be greater than zero")]
    InvalidWindow,

    #[error("fingerprint worker count must be greater than zero")]
    InvalidWorkerCount,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_converts_into_scan_error() {
        let err: ScanError = ConfigError::InvalidArchiveDepth(9).into();
        assert!(matches!(
            err,
            ScanError::Config(ConfigError::InvalidArchiveDepth(9))
        ));
        assert_eq!(
            err.to_string(),
            "archive depth 9 is out of range (expected 0..=7)"
        );
    }

    #[test]
    fn test_parse_error_message() {
        let err = ScanError::parse("yarn.lock", "unterminated entry");
        assert_eq!(err.to_string(), "parse error: yarn.lock: unterminated entry");
    }
}
