//! Archive extraction for downloaded release artifacts.

mod tar_gz;
mod zip;

use crate::runtime::Runtime;
use anyhow::{Result, anyhow};
use std::path::Path;

pub use tar_gz::TarGzExtractor;
pub use zip::ZipExtractor;

/// Trait for format-specific archive extractors
#[cfg_attr(test, mockall::automock)]
pub trait ArchiveExtractor: Send + Sync {
    /// Check if this extractor can handle the given archive format
    fn can_handle(&self, archive_path: &Path) -> bool;

    /// Extract the archive into the specified directory
    fn extract<R: Runtime + 'static>(
        &self,
        runtime: &R,
        archive_path: &Path,
        extract_to: &Path,
    ) -> Result<()>;
}

/// Dispatcher that selects the appropriate extractor based on archive format.
pub struct ArchiveExtractorImpl {
    tar_gz: TarGzExtractor,
    zip: ZipExtractor,
}

impl Default for ArchiveExtractorImpl {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveExtractorImpl {
    pub fn new() -> Self {
        Self {
            tar_gz: TarGzExtractor,
            zip: ZipExtractor,
        }
    }
}

impl ArchiveExtractor for ArchiveExtractorImpl {
    fn can_handle(&self, archive_path: &Path) -> bool {
        self.tar_gz.can_handle(archive_path) || self.zip.can_handle(archive_path)
    }

    fn extract<R: Runtime + 'static>(
        &self,
        runtime: &R,
        archive_path: &Path,
        extract_to: &Path,
    ) -> Result<()> {
        if self.tar_gz.can_handle(archive_path) {
            self.tar_gz.extract(runtime, archive_path, extract_to)
        } else if self.zip.can_handle(archive_path) {
            self.zip.extract(runtime, archive_path, extract_to)
        } else {
            Err(anyhow!("Unsupported archive format: {:?}", archive_path))
        }
    }
}

/// Release artifacts usually wrap their contents in a single top-level
/// directory. If `dir` contains exactly one directory and nothing else,
/// hoist that directory's children up one level.
pub(crate) fn flatten_single_root<R: Runtime>(runtime: &R, dir: &Path) -> Result<()> {
    let entries = runtime.read_dir(dir)?;
    let [only] = entries.as_slice() else {
        return Ok(());
    };
    if !runtime.is_dir(only) {
        return Ok(());
    }

    for child in runtime.read_dir(only)? {
        let Some(file_name) = child.file_name() else {
            continue;
        };
        runtime.rename(&child, &dir.join(file_name))?;
    }
    runtime.remove_dir_all(only)?;
    Ok(())
}
