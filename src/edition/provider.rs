//! Locating edition documents.
//!
//! Two providers share one capability contract: the filesystem provider only
//! scans the ordered search paths; the updating provider first tries to pull
//! missing editions from the configured repositories into the local cache,
//! degrading gracefully when a repository is down. Absence is `None`, not an
//! error; callers decide whether a missing edition is fatal.

use async_trait::async_trait;
use log::{debug, warn};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::RepositoryRef;
use crate::http::HttpClient;
use crate::runtime::Runtime;

/// Capability contract for edition lookup.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EditionProvider: Send + Sync {
    /// Returns the path of the document for edition `name`, if available.
    async fn find_edition(&self, name: &str) -> Option<PathBuf>;

    /// Lists the names of available editions. With `update`, remote
    /// repositories are consulted first (where the provider supports it).
    async fn list_available(&self, update: bool) -> Vec<String>;
}

fn edition_file_name(name: &str) -> String {
    format!("{name}.json")
}

fn edition_name_from_path(path: &Path) -> Option<String> {
    if path.extension()? != "json" {
        return None;
    }
    Some(path.file_stem()?.to_string_lossy().into_owned())
}

/// Scans the ordered search paths; first match wins. Never touches the
/// network.
pub struct FileSystemEditionProvider<R: Runtime> {
    runtime: Arc<R>,
    search_paths: Vec<PathBuf>,
}

impl<R: Runtime> FileSystemEditionProvider<R> {
    pub fn new(runtime: Arc<R>, search_paths: Vec<PathBuf>) -> Self {
        Self {
            runtime,
            search_paths,
        }
    }

    fn find_local(&self, name: &str) -> Option<PathBuf> {
        let file_name = edition_file_name(name);
        for dir in &self.search_paths {
            let candidate = dir.join(&file_name);
            if self.runtime.exists(&candidate) {
                debug!("Edition `{}` found at {:?}", name, candidate);
                return Some(candidate);
            }
        }
        None
    }

    fn list_local(&self) -> Vec<String> {
        let mut names = BTreeSet::new();
        for dir in &self.search_paths {
            let Ok(entries) = self.runtime.read_dir(dir) else {
                continue;
            };
            for entry in entries {
                if let Some(name) = edition_name_from_path(&entry) {
                    names.insert(name);
                }
            }
        }
        names.into_iter().collect()
    }
}

#[async_trait]
impl<R: Runtime> EditionProvider for FileSystemEditionProvider<R> {
    async fn find_edition(&self, name: &str) -> Option<PathBuf> {
        self.find_local(name)
    }

    async fn list_available(&self, _update: bool) -> Vec<String> {
        self.list_local()
    }
}

/// Manifest of editions published by a repository.
#[derive(Debug, Deserialize)]
struct EditionManifest {
    #[serde(default)]
    editions: Vec<String>,
}

/// Tries to refresh missing or requested editions from the configured
/// repositories before falling back to a filesystem scan.
///
/// A repository outage must never make a previously resolvable edition
/// unresolvable: every fetch failure is logged and the provider continues
/// with whatever is cached or local.
pub struct UpdatingEditionProvider<R: Runtime> {
    runtime: Arc<R>,
    http: HttpClient,
    repositories: Vec<RepositoryRef>,
    cache_dir: PathBuf,
    fallback: FileSystemEditionProvider<R>,
}

impl<R: Runtime> UpdatingEditionProvider<R> {
    pub fn new(
        runtime: Arc<R>,
        http: HttpClient,
        repositories: Vec<RepositoryRef>,
        cache_dir: PathBuf,
        search_paths: Vec<PathBuf>,
    ) -> Self {
        let fallback = FileSystemEditionProvider::new(Arc::clone(&runtime), search_paths);
        Self {
            runtime,
            http,
            repositories,
            cache_dir,
            fallback,
        }
    }

    /// Downloads edition `name` from `repository` into the cache directory,
    /// publishing it atomically (temp file + rename) so concurrent readers
    /// never observe a partial document.
    async fn fetch_edition(&self, repository: &RepositoryRef, name: &str) -> anyhow::Result<()> {
        let url = format!(
            "{}/editions/{}",
            repository.url.trim_end_matches('/'),
            edition_file_name(name)
        );
        let body = self.http.get_text(&url).await?;

        // Reject documents that do not even parse, so a broken repository
        // cannot shadow a good cached copy.
        super::RawEdition::from_json_str(name, &body)?;

        self.runtime.create_dir_all(&self.cache_dir)?;
        let final_path = self.cache_dir.join(edition_file_name(name));
        let temp_path = self
            .cache_dir
            .join(format!(".{}.partial", edition_file_name(name)));
        self.runtime.write(&temp_path, body.as_bytes())?;
        self.runtime.rename(&temp_path, &final_path)?;

        debug!("Cached edition `{}` from {}", name, repository.url);
        Ok(())
    }

    /// Tries each repository in order until one provides edition `name`.
    async fn try_fetch_missing(&self, name: &str) {
        for repository in &self.repositories {
            match self.fetch_edition(repository, name).await {
                Ok(()) => return,
                Err(e) => {
                    warn!(
                        "Could not fetch edition `{}` from {}: {}",
                        name, repository.url, e
                    );
                }
            }
        }
    }

    /// Pulls every edition named in each repository's manifest into the
    /// cache. Failures are logged and skipped.
    async fn refresh_all(&self) {
        for repository in &self.repositories {
            let url = format!("{}/editions/manifest.json", repository.url.trim_end_matches('/'));
            let manifest: EditionManifest = match self.http.get_json(&url).await {
                Ok(manifest) => manifest,
                Err(e) => {
                    warn!("Could not fetch edition manifest from {}: {}", repository.url, e);
                    continue;
                }
            };
            for name in &manifest.editions {
                if let Err(e) = self.fetch_edition(repository, name).await {
                    warn!(
                        "Could not fetch edition `{}` from {}: {}",
                        name, repository.url, e
                    );
                }
            }
        }
    }
}

#[async_trait]
impl<R: Runtime> EditionProvider for UpdatingEditionProvider<R> {
    async fn find_edition(&self, name: &str) -> Option<PathBuf> {
        if let Some(path) = self.fallback.find_local(name) {
            return Some(path);
        }
        self.try_fetch_missing(name).await;
        self.fallback.find_local(name)
    }

    async fn list_available(&self, update: bool) -> Vec<String> {
        if update {
            self.refresh_all().await;
        }
        self.fallback.list_local()
    }
}
