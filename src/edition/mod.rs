//! Edition documents and their resolution.
//!
//! An edition is a named configuration bundle: the engine version to run,
//! the repositories to trust, and the default library set. Editions compose
//! via single-parent inheritance; a [`RawEdition`] may reference a parent by
//! name and is only meaningful once resolved into a [`ResolvedEdition`].
//!
//! # Structure
//!
//! - `provider` - locating edition documents (filesystem scan, remote refresh)
//! - `resolver` - parent-chain resolution and field merging
//! - `engine_version` - picking the concrete engine version for an edition

pub mod engine_version;
pub mod provider;
pub mod resolver;

use serde::{Deserialize, Serialize};

use crate::error::DistributionError;

/// A repository entry declared by an edition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRef {
    pub name: String,
    pub url: String,
}

/// A library requirement declared by an edition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryRequirement {
    pub namespace: String,
    pub name: String,
    pub version: semver::Version,
}

/// A partially specified edition, as read from an edition document.
///
/// Any field may be absent; scalar fields inherit from the parent chain and
/// list fields are concatenated with it during resolution. Unknown document
/// fields are ignored for forward compatibility.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawEdition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,

    #[serde(
        rename = "engine-version",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub engine_version: Option<semver::Version>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repositories: Vec<RepositoryRef>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub libraries: Vec<LibraryRequirement>,
}

impl RawEdition {
    /// Parses an edition document, attributing failures to `name`.
    pub fn from_json_str(name: &str, contents: &str) -> Result<Self, DistributionError> {
        serde_json::from_str(contents).map_err(|e| DistributionError::EditionParseError {
            name: name.to_string(),
            reason: e.to_string(),
        })
    }
}

/// A fully merged edition with no unresolved parent reference.
///
/// `engine_version: None` means "use the distribution default". Repository
/// and library lists are de-duplicated, child entries first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedEdition {
    #[serde(rename = "engine-version", skip_serializing_if = "Option::is_none")]
    pub engine_version: Option<semver::Version>,
    pub repositories: Vec<RepositoryRef>,
    pub libraries: Vec<LibraryRequirement>,
}
