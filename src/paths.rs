//! Distribution layout and edition search paths.
//!
//! The surrounding distribution decides where things live; this module only
//! materializes that decision into concrete directories. The root is taken
//! from an explicit override (`--root`), the `EDIST_ROOT` environment
//! variable, or `~/.edist`, in that order.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::runtime::Runtime;
use crate::version::LibraryName;

/// Environment variable overriding the distribution root.
pub const ROOT_ENV: &str = "EDIST_ROOT";

/// Environment variable holding extra edition search directories,
/// separated by the platform path separator.
pub const EDITION_PATH_ENV: &str = "EDIST_EDITION_PATH";

/// Canonical directories under the distribution root.
///
/// Engines and runtimes install into per-version subdirectories; the
/// `RuntimeVersionManager` is the only writer under `engines/` and
/// `runtimes/`. Cache directories (`editions/`, `libraries/`) are written
/// via temp-file-plus-rename only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionLayout {
    root: PathBuf,
}

impl DistributionLayout {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Determine the distribution root: explicit override, `EDIST_ROOT`,
    /// then `~/.edist`.
    pub fn detect<R: Runtime>(runtime: &R, override_root: Option<PathBuf>) -> Result<Self> {
        if let Some(root) = override_root {
            return Ok(Self::new(root));
        }
        if let Ok(root) = runtime.env_var(ROOT_ENV) {
            return Ok(Self::new(PathBuf::from(root)));
        }
        let home = runtime
            .home_dir()
            .context("Could not determine home directory")?;
        Ok(Self::new(home.join(".edist")))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn engines_dir(&self) -> PathBuf {
        self.root.join("engines")
    }

    pub fn engine_dir(&self, version: &semver::Version) -> PathBuf {
        self.engines_dir().join(version.to_string())
    }

    pub fn runtimes_dir(&self) -> PathBuf {
        self.root.join("runtimes")
    }

    pub fn runtime_dir(&self, version: &semver::Version) -> PathBuf {
        self.runtimes_dir().join(version.to_string())
    }

    /// User-level edition cache, also the target of remote edition fetches.
    pub fn editions_dir(&self) -> PathBuf {
        self.root.join("editions")
    }

    pub fn libraries_dir(&self) -> PathBuf {
        self.root.join("libraries")
    }

    pub fn library_dir(&self, name: &LibraryName, version: &semver::Version) -> PathBuf {
        self.libraries_dir()
            .join(&name.namespace)
            .join(&name.name)
            .join(version.to_string())
    }

    /// Lock files for cross-process install synchronization.
    pub fn locks_dir(&self) -> PathBuf {
        self.root.join("locks")
    }

    /// Private scratch space for in-progress downloads and extractions.
    /// Lives under the root so the final rename stays on one filesystem.
    pub fn tmp_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }
}

/// Produces the ordered, de-duplicated list of directories searched for
/// edition documents.
///
/// Priority order: `EDIST_EDITION_PATH` entries, the user edition cache,
/// then the installation-provided edition directory (if any). The first
/// occurrence of a directory wins; later duplicates are dropped.
pub struct SearchPathResolver {
    layout: DistributionLayout,
    bundled_editions_dir: Option<PathBuf>,
}

impl SearchPathResolver {
    pub fn new(layout: DistributionLayout, bundled_editions_dir: Option<PathBuf>) -> Self {
        Self {
            layout,
            bundled_editions_dir,
        }
    }

    #[tracing::instrument(skip(self, runtime))]
    pub fn resolve<R: Runtime>(&self, runtime: &R) -> Vec<PathBuf> {
        let mut paths = Vec::new();

        if let Ok(override_path) = runtime.env_var(EDITION_PATH_ENV) {
            for entry in std::env::split_paths(&override_path) {
                if !entry.as_os_str().is_empty() {
                    paths.push(entry);
                }
            }
        }

        paths.push(self.layout.editions_dir());

        if let Some(bundled) = &self.bundled_editions_dir {
            paths.push(bundled.clone());
        }

        dedup_preserving_order(paths)
    }
}

fn dedup_preserving_order(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut seen = std::collections::HashSet::new();
    paths.into_iter().filter(|p| seen.insert(p.clone())).collect()
}
