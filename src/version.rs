//! Version and library-name value types.
//!
//! Semantic versions are `semver::Version` throughout; this module owns the
//! single parse entry point so a malformed specifier always surfaces as
//! [`DistributionError::InvalidVersionSpecifier`] rather than a panic or an
//! opaque parse error.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DistributionError;

/// Parses a semantic version string, mapping failure to a typed error.
///
/// Accepts an optional `v` prefix (`v1.2.3` parses as `1.2.3`).
pub fn parse_version(specifier: &str) -> Result<semver::Version, DistributionError> {
    let trimmed = specifier.strip_prefix('v').unwrap_or(specifier);
    semver::Version::parse(trimmed).map_err(|_| DistributionError::InvalidVersionSpecifier {
        specifier: specifier.to_string(),
    })
}

/// Qualified library name: namespace plus name, case-sensitive.
///
/// Used as the lookup key for cache entries and repository queries.
/// Displays and parses as `Namespace.Name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LibraryName {
    pub namespace: String,
    pub name: String,
}

impl LibraryName {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for LibraryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.name)
    }
}

impl FromStr for LibraryName {
    type Err = DistributionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
            return Err(DistributionError::InvalidLibraryName {
                name: s.to_string(),
            });
        }
        Ok(LibraryName::new(parts[0], parts[1]))
    }
}
