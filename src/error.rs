//! Failure taxonomy for edition, engine, and library resolution.
//!
//! Every variant carries the identifier (edition name, library name+version,
//! engine version) it pertains to, so callers can report which resolution
//! step failed without re-threading context. Components return these typed
//! errors directly; only the binary entry point wraps them in `anyhow`.

use std::path::PathBuf;

use crate::version::LibraryName;

pub type Result<T, E = DistributionError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum DistributionError {
    // Configuration: malformed documents, never retried.
    #[error("edition `{name}` could not be parsed: {reason}")]
    EditionParseError { name: String, reason: String },

    #[error("package descriptor for {library} {version} is malformed: {reason}")]
    MalformedPackageDescriptor {
        library: LibraryName,
        version: String,
        reason: String,
    },

    #[error("`{specifier}` is not a valid semantic version")]
    InvalidVersionSpecifier { specifier: String },

    #[error("`{name}` is not a valid library name, expected `Namespace.Name`")]
    InvalidLibraryName { name: String },

    // Not found: absence is surfaced, not retried.
    #[error("edition `{name}` could not be found in any search path or repository")]
    EditionNotFound { name: String },

    #[error("no release provider could locate engine version {version}")]
    EngineReleaseNotFound { version: semver::Version },

    #[error("engine version {version} is not installed")]
    EngineNotInstalled { version: semver::Version },

    #[error("runtime version {version} is not installed")]
    RuntimeNotInstalled { version: semver::Version },

    #[error("library {library} is not available in the local cache")]
    LibraryNotFoundLocally { library: LibraryName },

    #[error("library {library} version {version} was not found in repository {repository}")]
    LibraryNotFoundInRepository {
        library: LibraryName,
        version: semver::Version,
        repository: String,
    },

    // Cycle: always fatal to the affected resolution.
    #[error("edition inheritance cycle detected at `{name}` (chain: {chain})")]
    EditionCycleDetected { name: String, chain: String },

    // Network: caller may retry at a higher layer; this crate never does.
    #[error("repository `{url}` is unreachable: {reason}")]
    RepositoryUnreachable { url: String, reason: String },

    // Integrity: fatal to the affected install, canonical state untouched.
    #[error("checksum mismatch for `{artifact}`: expected {expected}, got {actual}")]
    ChecksumMismatch {
        artifact: String,
        expected: String,
        actual: String,
    },

    #[error("failed to extract `{artifact}`: {reason}")]
    ExtractionFailed { artifact: String, reason: String },

    #[error("required runtime {version} could not be installed: {reason}")]
    RuntimeInstallFailed {
        version: semver::Version,
        reason: String,
    },

    #[error("failed to acquire install lock at {path:?}: {reason}")]
    LockFailed { path: PathBuf, reason: String },

    #[error("i/o failure on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Produced only by the request orchestration layer.
    #[error("request for {subject} did not complete within {millis}ms")]
    Timeout { subject: String, millis: u64 },
}

/// Coarse classification used when mapping a failure onto a wire reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    Configuration,
    NotFound,
    Cycle,
    Network,
    Integrity,
    Timeout,
}

impl DistributionError {
    pub fn kind(&self) -> ErrorKind {
        use DistributionError::*;
        match self {
            EditionParseError { .. }
            | MalformedPackageDescriptor { .. }
            | InvalidVersionSpecifier { .. }
            | InvalidLibraryName { .. } => ErrorKind::Configuration,
            EditionNotFound { .. }
            | EngineReleaseNotFound { .. }
            | EngineNotInstalled { .. }
            | RuntimeNotInstalled { .. }
            | LibraryNotFoundLocally { .. }
            | LibraryNotFoundInRepository { .. } => ErrorKind::NotFound,
            EditionCycleDetected { .. } => ErrorKind::Cycle,
            RepositoryUnreachable { .. } => ErrorKind::Network,
            ChecksumMismatch { .. }
            | ExtractionFailed { .. }
            | RuntimeInstallFailed { .. }
            | LockFailed { .. }
            | Io { .. } => ErrorKind::Integrity,
            Timeout { .. } => ErrorKind::Timeout,
        }
    }

    /// Wraps an i/o error with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DistributionError::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_their_identifier() {
        let err = DistributionError::EditionNotFound {
            name: "2024.1".into(),
        };
        assert!(err.to_string().contains("2024.1"));

        let err = DistributionError::EngineNotInstalled {
            version: semver::Version::new(1, 2, 3),
        };
        assert!(err.to_string().contains("1.2.3"));
    }

    #[test]
    fn test_kind_classification() {
        let err = DistributionError::InvalidVersionSpecifier {
            specifier: "abc".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let err = DistributionError::RepositoryUnreachable {
            url: "https://repo.example".into(),
            reason: "connection refused".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Network);

        let err = DistributionError::Timeout {
            subject: "Standard.Table".into(),
            millis: 500,
        };
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }

    #[test]
    fn test_error_kind_serializes_kebab_case() {
        let json = serde_json::to_string(&ErrorKind::NotFound).unwrap();
        assert_eq!(json, "\"not-found\"");
    }
}
