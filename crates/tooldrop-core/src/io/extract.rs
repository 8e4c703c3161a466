//! Archive extraction
//!
//! Handles the closed set in [`ArchiveFormat`]: zip, tar.gz and single-file gzip.

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tooldrop_schema::ArchiveFormat;
use zip::ZipArchive;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Unsupported archive format: {0} (expected .zip, .tar.gz, .tgz or .gz)")]
    UnsupportedFormat(String),

    #[error("Archive corrupt: {0}")]
    Archive(String),
}

/// Information about an extracted file
#[derive(Debug, Clone)]
pub struct ExtractedFile {
    /// Path relative to extraction root
    pub relative_path: PathBuf,
    /// Absolute path on disk
    pub absolute_path: PathBuf,
    /// Whether the archive recorded an execute bit
    pub is_executable: bool,
}

/// Extract a tar.gz archive to a destination directory
pub fn extract_tar_gz(
    archive_path: &Path,
    dest_dir: &Path,
) -> Result<Vec<ExtractedFile>, ExtractError> {
    let file = File::open(archive_path)?;
    let reader = BufReader::new(file);
    let gz_decoder = flate2::read::GzDecoder::new(reader);

    extract_tar(gz_decoder, dest_dir)
}

fn extract_tar<R: Read>(reader: R, dest_dir: &Path) -> Result<Vec<ExtractedFile>, ExtractError> {
    fs::create_dir_all(dest_dir)?;

    let mut archive = tar::Archive::new(reader);
    let mut extracted_files = Vec::new();

    let entries = archive
        .entries()
        .map_err(|e| ExtractError::Archive(e.to_string()))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| ExtractError::Archive(e.to_string()))?;
        if entry.header().entry_type().is_dir() {
            continue;
        }

        let relative_path = entry.path()?.into_owned();

        // unpack_in refuses paths escaping dest_dir
        let unpacked = entry
            .unpack_in(dest_dir)
            .map_err(|e| ExtractError::Archive(e.to_string()))?;
        if !unpacked {
            return Err(ExtractError::Archive(format!(
                "Invalid path in archive: {}",
                relative_path.display()
            )));
        }

        let is_executable = entry.header().mode().is_ok_and(|m| m & 0o111 != 0);

        extracted_files.push(ExtractedFile {
            absolute_path: dest_dir.join(&relative_path),
            relative_path,
            is_executable,
        });
    }

    Ok(extracted_files)
}

/// Extract a zip archive
pub fn extract_zip(
    archive_path: &Path,
    dest_dir: &Path,
) -> Result<Vec<ExtractedFile>, ExtractError> {
    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(file).map_err(|e| ExtractError::Archive(e.to_string()))?;

    fs::create_dir_all(dest_dir)?;
    let mut extracted_files = Vec::new();

    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| ExtractError::Archive(e.to_string()))?;
        let Some(relative_path) = file.enclosed_name() else {
            continue;
        };

        if file.is_dir() {
            fs::create_dir_all(dest_dir.join(&relative_path))?;
            continue;
        }

        let absolute_path = dest_dir.join(&relative_path);
        if let Some(p) = absolute_path.parent() {
            fs::create_dir_all(p)?;
        }

        let mut outfile = File::create(&absolute_path)?;
        io::copy(&mut file, &mut outfile).map_err(|e| ExtractError::Archive(e.to_string()))?;

        #[cfg(unix)]
        let is_executable = if let Some(mode) = file.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&absolute_path, fs::Permissions::from_mode(mode & 0o7777))?;
            mode & 0o111 != 0
        } else {
            false
        };
        #[cfg(not(unix))]
        let is_executable = false;

        extracted_files.push(ExtractedFile {
            relative_path,
            absolute_path,
            is_executable,
        });
    }

    Ok(extracted_files)
}

/// Decompress a single gzip-compressed file to `dest_dir/<output_name>`.
pub fn extract_gzip(
    archive_path: &Path,
    dest_dir: &Path,
    output_name: &str,
) -> Result<Vec<ExtractedFile>, ExtractError> {
    fs::create_dir_all(dest_dir)?;

    let file = File::open(archive_path)?;
    let mut decoder = flate2::read::GzDecoder::new(BufReader::new(file));

    let relative_path = PathBuf::from(output_name);
    let absolute_path = dest_dir.join(&relative_path);
    let mut outfile = File::create(&absolute_path)?;
    io::copy(&mut decoder, &mut outfile).map_err(|e| ExtractError::Archive(e.to_string()))?;

    Ok(vec![ExtractedFile {
        relative_path,
        absolute_path,
        is_executable: false,
    }])
}

/// Detect archive format from the file name.
pub fn detect_format(path: &Path) -> Result<ArchiveFormat, ExtractError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    ArchiveFormat::from_name(&name).ok_or(ExtractError::UnsupportedFormat(name))
}

/// Extract an archive, detecting the format from its name.
///
/// `single_file_name` names the output of a bare `.gz`, which carries no
/// file name of its own.
pub fn extract_auto(
    archive_path: &Path,
    dest_dir: &Path,
    single_file_name: &str,
) -> Result<Vec<ExtractedFile>, ExtractError> {
    match detect_format(archive_path)? {
        ArchiveFormat::Zip => extract_zip(archive_path, dest_dir),
        ArchiveFormat::TarGz => extract_tar_gz(archive_path, dest_dir),
        ArchiveFormat::Gzip => extract_gzip(archive_path, dest_dir, single_file_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_tar_gz(path: &Path, files: &[(&str, &[u8], u32)]) {
        let gz = GzEncoder::new(File::create(path).unwrap(), Compression::default());
        let mut builder = tar::Builder::new(gz);
        for (name, data, mode) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(*mode);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    fn write_zip(path: &Path, files: &[(&str, &[u8])]) {
        let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
        let opts = zip::write::SimpleFileOptions::default().unix_permissions(0o755);
        for (name, data) in files {
            zip.start_file(*name, opts).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_tar_gz_nested_layout() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("scip-linux-amd64.tar.gz");
        write_tar_gz(&archive, &[("pkg/bin/scip", b"\x7fELF", 0o755), ("pkg/README", b"hi", 0o644)]);

        let out = tmp.path().join("out");
        let files = extract_auto(&archive, &out, "scip").unwrap();

        assert_eq!(files.len(), 2);
        assert!(out.join("pkg/bin/scip").is_file());
        let scip = files.iter().find(|f| f.relative_path.ends_with("scip")).unwrap();
        assert!(scip.is_executable);
    }

    #[test]
    fn test_zip_extracts_files() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("z3.zip");
        write_zip(&archive, &[("z3-4.13.0/bin/z3", b"\x7fELF"), ("z3-4.13.0/LICENSE.txt", b"MIT")]);

        let out = tmp.path().join("out");
        let files = extract_auto(&archive, &out, "z3").unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(fs::read(out.join("z3-4.13.0/bin/z3")).unwrap(), b"\x7fELF");
    }

    #[test]
    fn test_single_gzip_takes_binary_name() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("rust-analyzer-x86_64-unknown-linux-gnu.gz");
        let mut gz = GzEncoder::new(File::create(&archive).unwrap(), Compression::default());
        gz.write_all(b"\x7fELF-payload").unwrap();
        gz.finish().unwrap();

        let out = tmp.path().join("out");
        extract_auto(&archive, &out, "rust-analyzer").unwrap();
        assert_eq!(fs::read(out.join("rust-analyzer")).unwrap(), b"\x7fELF-payload");
    }

    #[test]
    fn test_unknown_suffix_fails_fast() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("tool.tar.xz");
        fs::write(&archive, b"whatever").unwrap();
        assert!(matches!(
            extract_auto(&archive, tmp.path(), "tool"),
            Err(ExtractError::UnsupportedFormat(ref n)) if n == "tool.tar.xz"
        ));
    }

    #[test]
    fn test_corrupt_zip() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("broken.zip");
        fs::write(&archive, b"not a zip at all").unwrap();
        assert!(matches!(
            extract_auto(&archive, &tmp.path().join("out"), "x"),
            Err(ExtractError::Archive(_))
        ));
    }
}
