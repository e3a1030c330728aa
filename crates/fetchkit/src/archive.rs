//! Unpacking downloaded archives.

use crate::error::{Error, Result};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Archive formats recognised by file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    TarGz,
    Tar,
    Zip,
    /// Not an archive; copied as-is.
    Plain,
}

impl ArchiveKind {
    pub fn from_name(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Self::TarGz
        } else if lower.ends_with(".tar") {
            Self::Tar
        } else if lower.ends_with(".zip") {
            Self::Zip
        } else {
            Self::Plain
        }
    }
}

/// Unpack `archive` into a fresh `dest` directory.
///
/// Returns the directory holding the sources: the single top-level directory
/// when the archive has exactly one, `dest` otherwise.
pub fn extract(archive: &Path, dest: &Path) -> Result<PathBuf> {
    if dest.exists() {
        fs::remove_dir_all(dest).map_err(|e| Error::io(dest, e))?;
    }
    fs::create_dir_all(dest).map_err(|e| Error::io(dest, e))?;

    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file = File::open(archive).map_err(|e| Error::io(archive, e))?;

    match ArchiveKind::from_name(&name) {
        ArchiveKind::TarGz => {
            let decoder = flate2::read::GzDecoder::new(BufReader::new(file));
            tar::Archive::new(decoder)
                .unpack(dest)
                .map_err(|e| Error::archive(archive, e))?;
        }
        ArchiveKind::Tar => {
            tar::Archive::new(BufReader::new(file))
                .unpack(dest)
                .map_err(|e| Error::archive(archive, e))?;
        }
        ArchiveKind::Zip => {
            zip::ZipArchive::new(BufReader::new(file))
                .and_then(|mut zip| zip.extract(dest))
                .map_err(|e| Error::archive(archive, e))?;
        }
        ArchiveKind::Plain => {
            let target = dest.join(&name);
            fs::copy(archive, &target).map_err(|e| Error::io(&target, e))?;
        }
    }

    Ok(source_root(dest))
}

/// The directory holding unpacked sources under `dest`.
pub fn source_root(dest: &Path) -> PathBuf {
    single_root(dest).unwrap_or_else(|| dest.to_path_buf())
}

fn single_root(dir: &Path) -> Option<PathBuf> {
    let mut entries = fs::read_dir(dir).ok()?.filter_map(|e| e.ok());
    let only = entries.next()?;
    if entries.next().is_some() {
        return None;
    }
    let path = only.path();
    path.is_dir().then_some(path)
}

/// Write a gzipped tarball holding `entries`.
#[cfg(test)]
pub(crate) fn write_targz(path: &Path, entries: &[(&str, &[u8])]) {
    let mut encoder =
        flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    {
        let mut builder = tar::Builder::new(&mut encoder);
        for (name, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.finish().unwrap();
    }
    fs::write(path, encoder.finish().unwrap()).unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_kind_from_name() {
        assert_eq!(ArchiveKind::from_name("jq-1.7.tar.gz"), ArchiveKind::TarGz);
        assert_eq!(ArchiveKind::from_name("x.TGZ"), ArchiveKind::TarGz);
        assert_eq!(ArchiveKind::from_name("x.tar"), ArchiveKind::Tar);
        assert_eq!(ArchiveKind::from_name("x.zip"), ArchiveKind::Zip);
        assert_eq!(ArchiveKind::from_name("install.sh"), ArchiveKind::Plain);
    }

    #[test]
    fn test_extract_targz_descends_into_single_root() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("tool-1.0.tar.gz");
        write_targz(
            &archive,
            &[
                ("tool-1.0/configure", &b"#!/bin/sh"[..]),
                ("tool-1.0/Makefile", &b"all:"[..]),
            ],
        );

        let root = extract(&archive, &tmp.path().join("build")).unwrap();
        assert_eq!(root, tmp.path().join("build").join("tool-1.0"));
        assert_eq!(fs::read(root.join("configure")).unwrap(), b"#!/bin/sh");
    }

    #[test]
    fn test_extract_zip_with_several_roots() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("bundle.zip");
        {
            let mut zip = zip::ZipWriter::new(File::create(&archive).unwrap());
            let options = zip::write::SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Stored);
            zip.start_file("a.txt", options).unwrap();
            zip.write_all(b"a").unwrap();
            zip.start_file("b/c.txt", options).unwrap();
            zip.write_all(b"c").unwrap();
            zip.finish().unwrap();
        }

        let dest = tmp.path().join("build");
        let root = extract(&archive, &dest).unwrap();
        assert_eq!(root, dest);
        assert_eq!(fs::read(dest.join("b/c.txt")).unwrap(), b"c");
    }

    #[test]
    fn test_extract_replaces_previous_contents() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("build");
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("stale"), "old").unwrap();

        let archive = tmp.path().join("script.sh");
        fs::write(&archive, "echo hi").unwrap();
        let root = extract(&archive, &dest).unwrap();

        assert_eq!(root, dest);
        assert!(!dest.join("stale").exists());
        assert!(dest.join("script.sh").exists());
    }

    #[test]
    fn test_corrupt_archive() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("broken.tar.gz");
        fs::write(&archive, b"not gzip").unwrap();
        let err = extract(&archive, &tmp.path().join("out")).unwrap_err();
        assert!(matches!(err, Error::Archive { .. }));
    }
}
