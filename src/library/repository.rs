//! Remote repository queries for package descriptors.
//!
//! A repository answers "does library L at version V exist" and hands back
//! its package descriptor. Only metadata moves over the wire here; library
//! contents are fetched elsewhere.

use async_trait::async_trait;

use crate::error::{DistributionError, Result};
use crate::http::HttpClient;
use crate::version::LibraryName;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RepositoryClient: Send + Sync {
    /// Fetches the raw package descriptor for `(name, version)` from the
    /// repository at `repository_url`.
    async fn fetch_package_descriptor(
        &self,
        repository_url: &str,
        name: &LibraryName,
        version: &semver::Version,
    ) -> Result<String>;
}

/// Repository layout:
/// `{repository}/libraries/{namespace}/{name}/{version}/package.json`.
pub struct HttpRepositoryClient {
    http: HttpClient,
}

impl HttpRepositoryClient {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl RepositoryClient for HttpRepositoryClient {
    #[tracing::instrument(skip(self))]
    async fn fetch_package_descriptor(
        &self,
        repository_url: &str,
        name: &LibraryName,
        version: &semver::Version,
    ) -> Result<String> {
        let url = format!(
            "{}/libraries/{}/{}/{}/package.json",
            repository_url.trim_end_matches('/'),
            name.namespace,
            name.name,
            version
        );
        self.http.get_text(&url).await.map_err(|e| {
            if e.is_not_found() {
                DistributionError::LibraryNotFoundInRepository {
                    library: name.clone(),
                    version: version.clone(),
                    repository: repository_url.to_string(),
                }
            } else {
                DistributionError::RepositoryUnreachable {
                    url: repository_url.to_string(),
                    reason: e.to_string(),
                }
            }
        })
    }
}
