//! Release manifests for engines and their managed-execution runtimes.
//!
//! A release manifest names the runtime version an engine requires and
//! where its artifacts can be downloaded. Manifests are consumed from a
//! release provider; this crate never produces them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{DistributionError, Result};
use crate::http::{HttpClient, HttpError};

/// A downloadable artifact of a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseArtifact {
    pub name: String,
    pub url: String,
    /// Hex-encoded SHA-256 digest; verified after download when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// Manifest describing one release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseManifest {
    /// Runtime version this engine requires. Absent on runtime manifests.
    #[serde(
        rename = "runtime-version",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub runtime_version: Option<semver::Version>,

    #[serde(default)]
    pub artifacts: Vec<ReleaseArtifact>,
}

/// An engine release: a version plus its manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineRelease {
    pub version: semver::Version,
    pub manifest: ReleaseManifest,
}

/// A managed-execution-runtime release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeRelease {
    pub version: semver::Version,
    pub manifest: ReleaseManifest,
}

/// Serves release manifests and artifact downloads.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReleaseProvider: Send + Sync {
    async fn find_engine_release(&self, version: &semver::Version) -> Result<EngineRelease>;

    async fn find_runtime_release(&self, version: &semver::Version) -> Result<RuntimeRelease>;

    /// Downloads `artifact` to `target` on the local filesystem.
    async fn download_artifact(&self, artifact: &ReleaseArtifact, target: &Path) -> Result<()>;
}

/// Release provider backed by an HTTP release root.
///
/// Layout: `{root}/engines/{version}/manifest.json` and
/// `{root}/runtimes/{version}/manifest.json`.
pub struct HttpReleaseProvider {
    http: HttpClient,
    release_root: String,
}

impl HttpReleaseProvider {
    pub fn new(http: HttpClient, release_root: String) -> Self {
        let release_root = release_root.trim_end_matches('/').to_string();
        Self { http, release_root }
    }

    fn unreachable(&self, e: &HttpError) -> DistributionError {
        DistributionError::RepositoryUnreachable {
            url: self.release_root.clone(),
            reason: e.to_string(),
        }
    }
}

#[async_trait]
impl ReleaseProvider for HttpReleaseProvider {
    #[tracing::instrument(skip(self))]
    async fn find_engine_release(&self, version: &semver::Version) -> Result<EngineRelease> {
        let url = format!("{}/engines/{}/manifest.json", self.release_root, version);
        let manifest: ReleaseManifest = self.http.get_json(&url).await.map_err(|e| {
            if e.is_not_found() {
                DistributionError::EngineReleaseNotFound {
                    version: version.clone(),
                }
            } else {
                self.unreachable(&e)
            }
        })?;
        Ok(EngineRelease {
            version: version.clone(),
            manifest,
        })
    }

    #[tracing::instrument(skip(self))]
    async fn find_runtime_release(&self, version: &semver::Version) -> Result<RuntimeRelease> {
        let url = format!("{}/runtimes/{}/manifest.json", self.release_root, version);
        let manifest: ReleaseManifest = self.http.get_json(&url).await.map_err(|e| {
            if e.is_not_found() {
                DistributionError::RuntimeInstallFailed {
                    version: version.clone(),
                    reason: "no release provider could locate this runtime version".into(),
                }
            } else {
                self.unreachable(&e)
            }
        })?;
        Ok(RuntimeRelease {
            version: version.clone(),
            manifest,
        })
    }

    #[tracing::instrument(skip(self))]
    async fn download_artifact(&self, artifact: &ReleaseArtifact, target: &Path) -> Result<()> {
        self.http
            .download_file(&artifact.url, || {
                std::fs::File::create(target)
                    .map_err(|e| anyhow::anyhow!("could not create {:?}: {}", target, e))
            })
            .await
            .map_err(|e| self.unreachable(&e))?;
        Ok(())
    }
}
