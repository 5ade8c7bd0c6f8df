use crate::runtime::Runtime;
use anyhow::{Context, Result, anyhow};
use log::debug;
use std::io::{Read, Write};
use std::path::Path;
use zip::ZipArchive;

use super::{ArchiveExtractor, flatten_single_root};

/// Extractor for .zip archives
pub struct ZipExtractor;

impl ArchiveExtractor for ZipExtractor {
    fn can_handle(&self, archive_path: &Path) -> bool {
        let name = archive_path.to_string_lossy().to_lowercase();
        name.ends_with(".zip")
    }

    fn extract<R: Runtime + 'static>(
        &self,
        runtime: &R,
        archive_path: &Path,
        extract_to: &Path,
    ) -> Result<()> {
        debug!("Extracting zip archive to {:?}...", extract_to);
        let mut reader = runtime
            .open(archive_path)
            .with_context(|| format!("Failed to open archive at {:?}", archive_path))?;

        // zip requires Read + Seek; Runtime::open returns a plain reader,
        // so buffer the archive in memory.
        let mut buffer = Vec::new();
        reader
            .read_to_end(&mut buffer)
            .with_context(|| format!("Failed to read archive {:?}", archive_path))?;
        let cursor = std::io::Cursor::new(buffer);

        let mut archive = ZipArchive::new(cursor).context("Failed to parse ZIP archive")?;

        runtime.create_dir_all(extract_to)?;

        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .with_context(|| format!("Failed to read ZIP entry {}", i))?;

            let entry_path = entry
                .enclosed_name()
                .ok_or_else(|| anyhow!("ZIP entry {} escapes the extraction directory", i))?;
            let target = extract_to.join(entry_path);

            if entry.is_dir() {
                runtime.create_dir_all(&target)?;
                continue;
            }

            if let Some(parent) = target.parent() {
                runtime.create_dir_all(parent)?;
            }
            let mut writer = runtime
                .create_file(&target)
                .with_context(|| format!("Failed to create {:?}", target))?;
            let mut contents = Vec::new();
            entry
                .read_to_end(&mut contents)
                .context("Failed to read ZIP entry contents")?;
            writer.write_all(&contents)?;
            drop(writer);

            if let Some(mode) = entry.unix_mode() {
                if mode & 0o111 != 0 {
                    runtime.set_permissions(&target, mode)?;
                }
            }
        }

        flatten_single_root(runtime, extract_to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RealRuntime;
    use tempfile::tempdir;
    use zip::write::{SimpleFileOptions, ZipWriter};

    fn build_zip(files: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(std::io::Cursor::new(Vec::new()));
        for (name, content) in files {
            writer
                .start_file(name.to_string(), SimpleFileOptions::default())
                .unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_can_handle() {
        assert!(ZipExtractor.can_handle(Path::new("a.zip")));
        assert!(ZipExtractor.can_handle(Path::new("a.ZIP")));
        assert!(!ZipExtractor.can_handle(Path::new("a.tar.gz")));
    }

    #[test]
    fn test_extract_zip() {
        let dir = tempdir().unwrap();
        let archive_path = dir.path().join("engine.zip");
        std::fs::write(
            &archive_path,
            build_zip(&[
                ("engine-1.0.0/manifest.json", "{}"),
                ("engine-1.0.0/bin/engine", "#!/bin/sh"),
            ]),
        )
        .unwrap();

        let out = dir.path().join("out");
        ZipExtractor
            .extract(&RealRuntime, &archive_path, &out)
            .unwrap();

        assert!(out.join("manifest.json").exists());
        assert!(out.join("bin").join("engine").exists());
    }
}
