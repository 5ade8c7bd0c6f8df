//! Installation lifecycle for engines and their runtimes.
//!
//! The filesystem is the source of truth: a version is installed exactly
//! when its canonical directory exists and contains a completeness marker
//! that parses. The marker is written only after the install directory has
//! been atomically moved into place, so a crash at any earlier point leaves
//! the canonical path untouched and all partial work confined to a private
//! temporary directory.
//!
//! Installation protocol, per version:
//!
//! 1. acquire the cross-process lock keyed by the canonical install path
//! 2. if the marker parses, return the recorded release without downloading
//! 3. download the artifact into a private temp dir, verify its digest,
//!    extract it, and ensure the required runtime (same protocol, its own
//!    lock key)
//! 4. atomically rename the staged tree into the canonical path, then write
//!    the marker
//! 5. release the lock

use log::{debug, info};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::release::{EngineRelease, ReleaseManifest, ReleaseProvider, RuntimeRelease};
use crate::archive::ArchiveExtractor;
use crate::error::{DistributionError, Result};
use crate::locking::{InstallLockGuard, InstallLocks};
use crate::paths::DistributionLayout;
use crate::runtime::Runtime;

/// Name of the completeness marker written last into every install.
pub const MARKER_FILE: &str = ".installed.json";

static STAGE_COUNTER: AtomicU64 = AtomicU64::new(0);

pub struct RuntimeVersionManager<R, P, E>
where
    R: Runtime + 'static,
    P: ReleaseProvider,
    E: ArchiveExtractor,
{
    runtime: Arc<R>,
    provider: P,
    extractor: E,
    layout: DistributionLayout,
    locks: InstallLocks,
}

impl<R, P, E> RuntimeVersionManager<R, P, E>
where
    R: Runtime + 'static,
    P: ReleaseProvider,
    E: ArchiveExtractor,
{
    pub fn new(runtime: Arc<R>, provider: P, extractor: E, layout: DistributionLayout) -> Self {
        let locks = InstallLocks::new(layout.locks_dir());
        Self {
            runtime,
            provider,
            extractor,
            layout,
            locks,
        }
    }

    /// Returns the installed engine matching `version`, installing it first
    /// if necessary.
    #[tracing::instrument(skip(self))]
    pub async fn find_or_install_engine(&self, version: &semver::Version) -> Result<EngineRelease> {
        let canonical = self.layout.engine_dir(version);
        let _guard = self.lock(&canonical).await?;

        if let Some(installed) = self.read_marker::<EngineRelease>(&canonical) {
            debug!("Engine {} already installed at {:?}", version, canonical);
            return Ok(installed);
        }

        let release = self.provider.find_engine_release(version).await?;
        info!("Installing engine {}...", version);

        let staged = self.stage_release(&release.manifest, version).await?;

        if let Some(runtime_version) = release.manifest.runtime_version.clone() {
            self.ensure_runtime(&runtime_version).await.map_err(|e| {
                if let Some(work_dir) = staged.parent() {
                    let _ = self.discard(work_dir);
                }
                match e {
                    e @ DistributionError::RuntimeInstallFailed { .. } => e,
                    other => DistributionError::RuntimeInstallFailed {
                        version: runtime_version.clone(),
                        reason: other.to_string(),
                    },
                }
            })?;
        }

        self.publish(&staged, &canonical, &release)?;
        info!("Engine {} installed at {:?}", version, canonical);
        Ok(release)
    }

    /// Installs the managed-execution runtime `version` unless it is already
    /// present. Same protocol as engines, under a runtime-scoped lock.
    #[tracing::instrument(skip(self))]
    pub async fn ensure_runtime(&self, version: &semver::Version) -> Result<RuntimeRelease> {
        let canonical = self.layout.runtime_dir(version);
        let _guard = self.lock(&canonical).await?;

        if let Some(installed) = self.read_marker::<RuntimeRelease>(&canonical) {
            debug!("Runtime {} already installed at {:?}", version, canonical);
            return Ok(installed);
        }

        let release = self.provider.find_runtime_release(version).await?;
        info!("Installing runtime {}...", version);

        let staged = self.stage_release(&release.manifest, version).await?;
        self.publish(&staged, &canonical, &release)?;
        info!("Runtime {} installed at {:?}", version, canonical);
        Ok(release)
    }

    /// Removes the installed engine directory tree.
    ///
    /// Fails with `EngineNotInstalled` when absent, which makes repeated
    /// uninstalls observable but harmless: the second call changes nothing.
    #[tracing::instrument(skip(self))]
    pub async fn uninstall_engine(&self, version: &semver::Version) -> Result<()> {
        let canonical = self.layout.engine_dir(version);
        let _guard = self.lock(&canonical).await?;

        if !self.runtime.exists(&canonical) {
            return Err(DistributionError::EngineNotInstalled {
                version: version.clone(),
            });
        }
        self.runtime
            .remove_dir_all(&canonical)
            .map_err(|e| DistributionError::io(&canonical, std::io::Error::other(e.to_string())))?;
        info!("Engine {} uninstalled", version);
        Ok(())
    }

    /// Removes an installed runtime.
    #[tracing::instrument(skip(self))]
    pub async fn uninstall_runtime(&self, version: &semver::Version) -> Result<()> {
        let canonical = self.layout.runtime_dir(version);
        let _guard = self.lock(&canonical).await?;

        if !self.runtime.exists(&canonical) {
            return Err(DistributionError::RuntimeNotInstalled {
                version: version.clone(),
            });
        }
        self.runtime
            .remove_dir_all(&canonical)
            .map_err(|e| DistributionError::io(&canonical, std::io::Error::other(e.to_string())))?;
        info!("Runtime {} uninstalled", version);
        Ok(())
    }

    /// Lists engines whose install passes the completeness check, sorted by
    /// version.
    pub fn list_installed_engines(&self) -> Vec<EngineRelease> {
        self.list_installed::<EngineRelease>(&self.layout.engines_dir(), |r| &r.version)
    }

    /// Lists runtimes whose install passes the completeness check.
    pub fn list_installed_runtimes(&self) -> Vec<RuntimeRelease> {
        self.list_installed::<RuntimeRelease>(&self.layout.runtimes_dir(), |r| &r.version)
    }

    fn list_installed<T: DeserializeOwned>(
        &self,
        dir: &Path,
        version_of: impl Fn(&T) -> &semver::Version,
    ) -> Vec<T> {
        let Ok(entries) = self.runtime.read_dir(dir) else {
            return Vec::new();
        };
        let mut installed: Vec<T> = entries
            .iter()
            .filter_map(|entry| self.read_marker(entry))
            .collect();
        installed.sort_by(|a, b| version_of(a).cmp(version_of(b)));
        installed
    }

    async fn lock(&self, canonical: &Path) -> Result<InstallLockGuard> {
        let locks = self.locks.clone();
        let key = canonical.to_path_buf();
        tokio::task::spawn_blocking(move || locks.acquire(&key))
            .await
            .map_err(|e| DistributionError::LockFailed {
                path: canonical.to_path_buf(),
                reason: e.to_string(),
            })?
    }

    fn read_marker<T: DeserializeOwned>(&self, dir: &Path) -> Option<T> {
        let contents = self.runtime.read_to_string(&dir.join(MARKER_FILE)).ok()?;
        serde_json::from_str(&contents).ok()
    }

    /// Downloads, verifies, and extracts the release into a fresh staging
    /// directory under the private temp root. On failure the staging area is
    /// discarded and the canonical path is never touched.
    async fn stage_release(
        &self,
        manifest: &ReleaseManifest,
        version: &semver::Version,
    ) -> Result<PathBuf> {
        let stamp = STAGE_COUNTER.fetch_add(1, Ordering::Relaxed);
        let work_dir = self
            .layout
            .tmp_dir()
            .join(format!("{}-{}-{}", version, std::process::id(), stamp));
        self.runtime
            .create_dir_all(&work_dir)
            .map_err(|e| DistributionError::io(&work_dir, std::io::Error::other(e.to_string())))?;

        match self.stage_into(manifest, &work_dir).await {
            Ok(staged) => Ok(staged),
            Err(e) => {
                let _ = self.discard(&work_dir);
                Err(e)
            }
        }
    }

    async fn stage_into(&self, manifest: &ReleaseManifest, work_dir: &Path) -> Result<PathBuf> {
        let artifact = manifest
            .artifacts
            .iter()
            .find(|a| self.extractor.can_handle(Path::new(&a.name)))
            .ok_or_else(|| DistributionError::ExtractionFailed {
                artifact: manifest
                    .artifacts
                    .iter()
                    .map(|a| a.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
                reason: "release has no artifact in a supported archive format".into(),
            })?;

        let archive_path = work_dir.join(&artifact.name);
        self.provider
            .download_artifact(artifact, &archive_path)
            .await?;

        if let Some(expected) = &artifact.sha256 {
            self.verify_checksum(&archive_path, &artifact.name, expected)?;
        }

        let staged = work_dir.join("stage");
        self.extractor
            .extract(self.runtime.as_ref(), &archive_path, &staged)
            .map_err(|e| DistributionError::ExtractionFailed {
                artifact: artifact.name.clone(),
                reason: e.to_string(),
            })?;
        Ok(staged)
    }

    fn verify_checksum(&self, path: &Path, artifact: &str, expected: &str) -> Result<()> {
        let mut reader = self
            .runtime
            .open(path)
            .map_err(|e| DistributionError::io(path, std::io::Error::other(e.to_string())))?;
        let mut hasher = Sha256::new();
        std::io::copy(&mut reader, &mut hasher)
            .map_err(|e| DistributionError::io(path, e))?;
        let actual: String = hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect();

        if !actual.eq_ignore_ascii_case(expected) {
            return Err(DistributionError::ChecksumMismatch {
                artifact: artifact.to_string(),
                expected: expected.to_string(),
                actual,
            });
        }
        debug!("Checksum verified for {}", artifact);
        Ok(())
    }

    /// Atomically moves the staged tree into the canonical path, then writes
    /// the completeness marker.
    ///
    /// Only called under the version's lock, after the marker check came up
    /// empty. A canonical directory that exists at this point is a remnant
    /// of a crash between rename and marker write; it counts as not
    /// installed and is removed so the rename can land.
    fn publish<T: Serialize>(&self, staged: &Path, canonical: &Path, marker: &T) -> Result<()> {
        if let Some(parent) = canonical.parent() {
            self.runtime
                .create_dir_all(parent)
                .map_err(|e| DistributionError::io(parent, std::io::Error::other(e.to_string())))?;
        }
        if self.runtime.exists(canonical) {
            self.runtime.remove_dir_all(canonical).map_err(|e| {
                DistributionError::io(canonical, std::io::Error::other(e.to_string()))
            })?;
        }
        self.runtime
            .rename(staged, canonical)
            .map_err(|e| DistributionError::io(canonical, std::io::Error::other(e.to_string())))?;

        let marker_json = serde_json::to_string_pretty(marker)
            .map_err(|e| DistributionError::io(canonical, std::io::Error::other(e.to_string())))?;
        self.runtime
            .write(&canonical.join(MARKER_FILE), marker_json.as_bytes())
            .map_err(|e| DistributionError::io(canonical, std::io::Error::other(e.to_string())))?;

        // The staging area's parent (downloads etc.) is no longer needed.
        if let Some(work_dir) = staged.parent() {
            let _ = self.discard(work_dir);
        }
        Ok(())
    }

    fn discard(&self, dir: &Path) -> anyhow::Result<()> {
        if self.runtime.exists(dir) {
            self.runtime.remove_dir_all(dir)?;
        }
        Ok(())
    }
}
