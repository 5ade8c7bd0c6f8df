//! Published library metadata: package descriptors, the repository client
//! that serves them, and the local cache in front of it.
//!
//! # Structure
//!
//! - `repository` - remote "give me the package descriptor" queries
//! - `cache` - locate-or-fetch with atomic cache population

pub mod cache;
pub mod repository;

pub use cache::PublishedLibraryCache;
pub use repository::{HttpRepositoryClient, RepositoryClient};

use serde::{Deserialize, Serialize};

use crate::error::DistributionError;
use crate::version::LibraryName;

/// Component groups a library declares: groups it introduces and groups it
/// extends. Contents are opaque to resolution and passed through verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentGroups {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub new: Vec<serde_json::Value>,

    #[serde(rename = "extend", default, skip_serializing_if = "Vec::is_empty")]
    pub extends: Vec<serde_json::Value>,
}

/// Per-library metadata parsed from a package descriptor. Read-only once
/// obtained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageConfig {
    pub namespace: String,
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,

    #[serde(
        rename = "component-groups",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub component_groups: Option<ComponentGroups>,
}

impl PackageConfig {
    /// Parses a package descriptor, attributing failures to the library it
    /// was requested for.
    pub fn from_json_str(
        library: &LibraryName,
        version: &semver::Version,
        contents: &str,
    ) -> Result<Self, DistributionError> {
        serde_json::from_str(contents).map_err(|e| DistributionError::MalformedPackageDescriptor {
            library: library.clone(),
            version: version.to_string(),
            reason: e.to_string(),
        })
    }
}
