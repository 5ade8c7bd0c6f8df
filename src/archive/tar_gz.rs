use crate::runtime::Runtime;
use anyhow::{Context, Result, anyhow};
use flate2::read::GzDecoder;
use log::debug;
use std::io::{Read, Write};
use std::path::{Component, Path};
use tar::{Archive, EntryType};

use super::{ArchiveExtractor, flatten_single_root};

/// Extractor for .tar.gz / .tgz archives
pub struct TarGzExtractor;

impl ArchiveExtractor for TarGzExtractor {
    fn can_handle(&self, archive_path: &Path) -> bool {
        let name = archive_path.to_string_lossy().to_lowercase();
        name.ends_with(".tar.gz") || name.ends_with(".tgz")
    }

    fn extract<R: Runtime + 'static>(
        &self,
        runtime: &R,
        archive_path: &Path,
        extract_to: &Path,
    ) -> Result<()> {
        debug!("Extracting tar.gz archive to {:?}...", extract_to);
        let file = runtime
            .open(archive_path)
            .with_context(|| format!("Failed to open archive at {:?}", archive_path))?;

        runtime.create_dir_all(extract_to)?;

        let mut archive = Archive::new(GzDecoder::new(file));
        for entry in archive
            .entries()
            .with_context(|| format!("Failed to read archive {:?}", archive_path))?
        {
            let mut entry = entry.context("Failed to read tar entry")?;
            let entry_path = entry
                .path()
                .context("Tar entry has an invalid path")?
                .to_path_buf();

            if entry_path
                .components()
                .any(|c| matches!(c, Component::ParentDir | Component::RootDir))
            {
                return Err(anyhow!(
                    "Tar entry {:?} escapes the extraction directory",
                    entry_path
                ));
            }
            let target = extract_to.join(&entry_path);

            match entry.header().entry_type() {
                EntryType::Directory => {
                    runtime.create_dir_all(&target)?;
                }
                EntryType::Regular => {
                    if let Some(parent) = target.parent() {
                        runtime.create_dir_all(parent)?;
                    }
                    let mut writer = runtime
                        .create_file(&target)
                        .with_context(|| format!("Failed to create {:?}", target))?;
                    let mut contents = Vec::new();
                    entry
                        .read_to_end(&mut contents)
                        .context("Failed to read tar entry contents")?;
                    writer.write_all(&contents)?;
                    drop(writer);

                    if let Ok(mode) = entry.header().mode() {
                        if mode & 0o111 != 0 {
                            runtime.set_permissions(&target, mode)?;
                        }
                    }
                }
                other => {
                    debug!("Skipping tar entry {:?} of type {:?}", entry_path, other);
                }
            }
        }

        flatten_single_root(runtime, extract_to)
    }
}
