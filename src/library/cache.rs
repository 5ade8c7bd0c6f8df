//! Local cache of published library metadata.
//!
//! Cache entries live at `libraries/<namespace>/<name>/<version>/` and are
//! immutable once written. A descriptor is published into the cache with a
//! temp-file write followed by an atomic rename, so concurrent readers
//! never observe a partially written entry. A cached descriptor that fails
//! to parse is a correctness bug and is surfaced as an error; it is never
//! silently papered over with a refetch.

use log::{debug, info};
use std::path::PathBuf;
use std::sync::Arc;

use super::repository::RepositoryClient;
use super::PackageConfig;
use crate::error::{DistributionError, Result};
use crate::paths::DistributionLayout;
use crate::runtime::Runtime;
use crate::version::LibraryName;

/// File name of the package descriptor inside a cache entry.
pub const PACKAGE_DESCRIPTOR: &str = "package.json";

pub struct PublishedLibraryCache<R: Runtime, C: RepositoryClient> {
    runtime: Arc<R>,
    client: C,
    layout: DistributionLayout,
}

impl<R: Runtime, C: RepositoryClient> PublishedLibraryCache<R, C> {
    pub fn new(runtime: Arc<R>, client: C, layout: DistributionLayout) -> Self {
        Self {
            runtime,
            client,
            layout,
        }
    }

    /// Returns the cache entry path for `(name, version)` if the entry holds
    /// a package descriptor.
    pub fn find_cached_library(
        &self,
        name: &LibraryName,
        version: &semver::Version,
    ) -> Option<PathBuf> {
        let dir = self.layout.library_dir(name, version);
        if self.runtime.exists(&dir.join(PACKAGE_DESCRIPTOR)) {
            Some(dir)
        } else {
            None
        }
    }

    /// Answers a "get package" query: cache first, one network round-trip on
    /// a miss. Only the descriptor is fetched, never library contents.
    #[tracing::instrument(skip(self))]
    pub async fn get_or_fetch_package(
        &self,
        name: &LibraryName,
        version: &semver::Version,
        repository_url: &str,
    ) -> Result<PackageConfig> {
        if let Some(dir) = self.find_cached_library(name, version) {
            debug!("Library {} {} served from cache", name, version);
            let descriptor_path = dir.join(PACKAGE_DESCRIPTOR);
            let contents = self
                .runtime
                .read_to_string(&descriptor_path)
                .map_err(|e| {
                    DistributionError::io(
                        &descriptor_path,
                        std::io::Error::other(e.to_string()),
                    )
                })?;
            return PackageConfig::from_json_str(name, version, &contents);
        }

        info!(
            "Library {} {} not cached, querying {}",
            name, version, repository_url
        );
        let descriptor = self
            .client
            .fetch_package_descriptor(repository_url, name, version)
            .await?;
        let config = PackageConfig::from_json_str(name, version, &descriptor)?;

        self.store_descriptor(name, version, &descriptor)?;
        Ok(config)
    }

    /// Answers a "get package" query for a locally available library: the
    /// newest cached version of `name`, without any network access.
    #[tracing::instrument(skip(self))]
    pub fn find_local_package(&self, name: &LibraryName) -> Result<PackageConfig> {
        let library_root = self
            .layout
            .libraries_dir()
            .join(&name.namespace)
            .join(&name.name);
        let entries = self
            .runtime
            .read_dir(&library_root)
            .unwrap_or_default();

        let newest = entries
            .iter()
            .filter_map(|entry| {
                let version = semver::Version::parse(entry.file_name()?.to_str()?).ok()?;
                self.runtime
                    .exists(&entry.join(PACKAGE_DESCRIPTOR))
                    .then_some(version)
            })
            .max()
            .ok_or_else(|| DistributionError::LibraryNotFoundLocally {
                library: name.clone(),
            })?;

        let descriptor_path = self
            .layout
            .library_dir(name, &newest)
            .join(PACKAGE_DESCRIPTOR);
        let contents = self
            .runtime
            .read_to_string(&descriptor_path)
            .map_err(|e| {
                DistributionError::io(&descriptor_path, std::io::Error::other(e.to_string()))
            })?;
        PackageConfig::from_json_str(name, &newest, &contents)
    }

    /// Publishes a fetched descriptor atomically: temp file in the entry
    /// directory, then rename into place.
    fn store_descriptor(
        &self,
        name: &LibraryName,
        version: &semver::Version,
        descriptor: &str,
    ) -> Result<()> {
        let dir = self.layout.library_dir(name, version);
        let io_err = |e: anyhow::Error| {
            DistributionError::io(&dir, std::io::Error::other(e.to_string()))
        };

        self.runtime.create_dir_all(&dir).map_err(io_err)?;
        let temp_path = dir.join(format!(".{PACKAGE_DESCRIPTOR}.partial"));
        self.runtime
            .write(&temp_path, descriptor.as_bytes())
            .map_err(io_err)?;
        self.runtime
            .rename(&temp_path, &dir.join(PACKAGE_DESCRIPTOR))
            .map_err(io_err)?;

        debug!("Cached descriptor for {} {} at {:?}", name, version, dir);
        Ok(())
    }
}
