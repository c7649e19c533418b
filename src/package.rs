// src/package.rs

//! Holon packages
//!
//! A package is a gzip-compressed tar of a holon's source tree with its
//! `holon.json` at the root. Entries are added in sorted order with a fixed
//! mtime, so packing the same tree twice yields identical bytes and the
//! same checksum.

use crate::error::{Error, Result};
use crate::manifest::{self, Artifact, MANIFEST_FILE};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs;
use std::io::Read;
use std::path::Path;
use tar::{Archive, Builder};
use tracing::debug;
use walkdir::WalkDir;

/// mtime written for every entry (2024-01-01 00:00:00 UTC)
const PACKAGE_MTIME: u64 = 1704067200;

/// Root entries regenerated or owned by the engine, never packed from disk
fn is_transient(name: &str) -> bool {
    name == MANIFEST_FILE || name == format!("{}.lock", MANIFEST_FILE) || name.ends_with(".tmp")
}

#[cfg(unix)]
fn file_mode(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode()
}

#[cfg(not(unix))]
fn file_mode(_metadata: &fs::Metadata) -> u32 {
    0o644
}

/// Pack `source` into package bytes, embedding `artifact` as the manifest
///
/// Any `holon.json` already on disk is replaced by `artifact`.
pub fn pack_dir(source: &Path, artifact: &Artifact) -> Result<Vec<u8>> {
    if !source.is_dir() {
        return Err(Error::InvalidInput(format!(
            "source directory {} does not exist",
            source.display()
        )));
    }

    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut archive = Builder::new(encoder);

    let json = artifact.to_json()?;
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Regular);
    header.set_mode(0o644);
    header.set_size(json.len() as u64);
    header.set_mtime(PACKAGE_MTIME);
    header.set_cksum();
    archive.append_data(&mut header, MANIFEST_FILE, json.as_bytes())?;

    let mut files = 0usize;
    for entry in WalkDir::new(source).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::Io(e.into()))?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| Error::InvalidInput(e.to_string()))?;
        let archive_path = relative.to_string_lossy().replace('\\', "/");
        if entry.depth() == 1 && is_transient(&archive_path) {
            continue;
        }

        let file_type = entry.file_type();
        let mut header = tar::Header::new_gnu();
        header.set_mtime(PACKAGE_MTIME);
        if file_type.is_dir() {
            header.set_entry_type(tar::EntryType::Directory);
            header.set_mode(0o755);
            header.set_size(0);
            header.set_cksum();
            archive.append_data(&mut header, &archive_path, std::io::empty())?;
        } else if file_type.is_file() {
            let content = fs::read(entry.path())?;
            header.set_entry_type(tar::EntryType::Regular);
            header.set_mode(file_mode(&entry.metadata().map_err(|e| Error::Io(e.into()))?));
            header.set_size(content.len() as u64);
            header.set_cksum();
            archive.append_data(&mut header, &archive_path, content.as_slice())?;
            files += 1;
        } else if file_type.is_symlink() {
            let target = fs::read_link(entry.path())?;
            header.set_entry_type(tar::EntryType::Symlink);
            header.set_mode(0o777);
            header.set_size(0);
            header.set_cksum();
            archive.append_link(&mut header, &archive_path, &target)?;
        }
    }

    let encoder = archive.into_inner()?;
    let bytes = encoder.finish()?;
    debug!(
        "Packed '{}' from {} ({} files, {} bytes)",
        artifact.name,
        source.display(),
        files,
        bytes.len()
    );
    Ok(bytes)
}

fn is_manifest_entry(path: &str) -> bool {
    path == MANIFEST_FILE || path.strip_prefix("./") == Some(MANIFEST_FILE)
}

/// Read the embedded manifest of a package
pub fn read_manifest(bytes: &[u8]) -> Result<Artifact> {
    let mut archive = Archive::new(GzDecoder::new(bytes));
    let entries = archive
        .entries()
        .map_err(|e| Error::ManifestCorrupt(format!("unreadable package: {}", e)))?;

    for entry in entries {
        let mut entry =
            entry.map_err(|e| Error::ManifestCorrupt(format!("unreadable package: {}", e)))?;
        let path = entry.path()?.to_string_lossy().into_owned();
        if is_manifest_entry(&path) {
            let mut json = String::new();
            entry.read_to_string(&mut json)?;
            return Artifact::from_json(&json);
        }
    }

    Err(Error::ManifestCorrupt(format!(
        "package has no {}",
        MANIFEST_FILE
    )))
}

/// Read a package file from disk, returning its manifest and bytes
pub fn read_package_file(path: &Path) -> Result<(Artifact, Vec<u8>)> {
    let bytes = fs::read(path).map_err(|e| {
        Error::InvalidInput(format!("cannot read package {}: {}", path.display(), e))
    })?;
    let artifact = read_manifest(&bytes)?;
    Ok((artifact, bytes))
}

/// Extract package bytes into `dest`, creating it if needed
///
/// Returns the manifest found at the root of the extracted tree.
pub fn extract(bytes: &[u8], dest: &Path) -> Result<Artifact> {
    fs::create_dir_all(dest)?;
    let mut archive = Archive::new(GzDecoder::new(bytes));
    archive.set_preserve_permissions(true);
    archive
        .unpack(dest)
        .map_err(|e| Error::ManifestCorrupt(format!("cannot extract package: {}", e)))?;
    debug!("Extracted package into {}", dest.display());
    manifest::read_manifest(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::hash;
    use crate::kind::HolonKind;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn source_tree(temp: &TempDir) -> std::path::PathBuf {
        let source = temp.path().join("source");
        fs::create_dir_all(source.join("bin")).unwrap();
        fs::write(source.join("bin").join("moon.sh"), "#!/bin/sh\necho moon\n").unwrap();
        fs::write(source.join("README.md"), "Moon library").unwrap();
        source
    }

    #[test]
    fn test_pack_and_extract() {
        let temp = TempDir::new().unwrap();
        let source = source_tree(&temp);
        let moon = Artifact::new("Moon", "", HolonKind::Library, Uuid::new_v4(), "tester");

        let bytes = pack_dir(&source, &moon).unwrap();
        assert_eq!(read_manifest(&bytes).unwrap().id, moon.id);

        let dest = temp.path().join("installed");
        let extracted = extract(&bytes, &dest).unwrap();
        assert_eq!(extracted, moon);
        assert_eq!(
            fs::read_to_string(dest.join("bin").join("moon.sh")).unwrap(),
            "#!/bin/sh\necho moon\n"
        );
    }

    #[test]
    fn test_packing_is_reproducible() {
        let temp = TempDir::new().unwrap();
        let source = source_tree(&temp);
        let moon = Artifact::new("Moon", "", HolonKind::Library, Uuid::new_v4(), "tester");

        let first = pack_dir(&source, &moon).unwrap();
        let second = pack_dir(&source, &moon).unwrap();
        assert_eq!(hash::sha256(&first), hash::sha256(&second));
    }

    #[test]
    fn test_stale_manifest_on_disk_is_replaced() {
        let temp = TempDir::new().unwrap();
        let source = source_tree(&temp);
        let old = Artifact::new("Old", "", HolonKind::Library, Uuid::new_v4(), "tester");
        manifest::write_manifest(&source, &old).unwrap();

        let moon = Artifact::new("Moon", "", HolonKind::Library, Uuid::new_v4(), "tester");
        let bytes = pack_dir(&source, &moon).unwrap();
        assert_eq!(read_manifest(&bytes).unwrap().name, "Moon");
    }

    #[test]
    fn test_missing_manifest_is_corrupt() {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut archive = Builder::new(encoder);
        let mut header = tar::Header::new_gnu();
        header.set_size(2);
        header.set_cksum();
        archive.append_data(&mut header, "x.txt", &b"hi"[..]).unwrap();
        let bytes = archive.into_inner().unwrap().finish().unwrap();

        assert_eq!(read_manifest(&bytes).unwrap_err().kind(), ErrorKind::ManifestCorrupt);
        assert_eq!(
            read_manifest(b"not a package").unwrap_err().kind(),
            ErrorKind::ManifestCorrupt
        );
    }

    #[test]
    fn test_missing_source_is_invalid_input() {
        let temp = TempDir::new().unwrap();
        let moon = Artifact::new("Moon", "", HolonKind::Library, Uuid::new_v4(), "tester");
        let err = pack_dir(&temp.path().join("nope"), &moon).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}
