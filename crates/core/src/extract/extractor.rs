//! Archive detection and in-process extraction.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};
use zip::ZipArchive;

use crate::config::ExtractorConfig;

use super::external::run_external_extraction;
use super::{ArchiveFormat, ExtractOutcome, ExtractionError};

/// Post-download archive extractor.
///
/// Inspects the file extension and unpacks recognized archives into a
/// destination directory, preserving the archive's internal layout.
/// Unrecognized extensions are a no-op, not an error.
pub struct ArchiveExtractor {
    config: ExtractorConfig,
}

impl Default for ArchiveExtractor {
    fn default() -> Self {
        Self::new(ExtractorConfig::default())
    }
}

impl ArchiveExtractor {
    /// Create an extractor with the given configuration.
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    /// Detect the archive format from the filename (case-insensitive).
    pub fn detect_format(path: &Path) -> Option<ArchiveFormat> {
        let name = path.file_name()?.to_string_lossy().to_lowercase();

        // Compound extensions first.
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            return Some(ArchiveFormat::TarGz);
        }
        if name.ends_with(".tar.bz2") || name.ends_with(".tbz2") {
            return Some(ArchiveFormat::TarBz2);
        }

        match name.rsplit('.').next()? {
            "zip" => Some(ArchiveFormat::Zip),
            "tar" => Some(ArchiveFormat::Tar),
            "gz" => Some(ArchiveFormat::Gzip),
            "bz2" => Some(ArchiveFormat::Bzip2),
            "7z" => Some(ArchiveFormat::SevenZ),
            "rar" => Some(ArchiveFormat::Rar),
            _ => None,
        }
    }

    /// Extract `file` into `destination_dir` if it is a recognized archive.
    ///
    /// In-process extraction (zip/tar/gz/bz2) tolerates individual bad
    /// entries: they are logged and skipped while the rest of the archive is
    /// still unpacked. External extraction (7z/rar) succeeds or fails as a
    /// whole by exit code. The compressed file itself is left in place.
    pub async fn extract_if_archive(
        &self,
        file: &Path,
        destination_dir: &Path,
    ) -> Result<ExtractOutcome, ExtractionError> {
        let Some(format) = Self::detect_format(file) else {
            debug!(file = %file.display(), "Not a recognized archive, skipping extraction");
            return Ok(ExtractOutcome::not_an_archive());
        };

        debug!(
            file = %file.display(),
            format = format.as_str(),
            dest = %destination_dir.display(),
            "Extracting archive"
        );

        if format.is_external() {
            let tool = match format {
                ArchiveFormat::SevenZ => self.config.sevenzip_path.clone(),
                _ => self.config.unrar_path.clone(),
            };
            return run_external_extraction(
                format,
                &tool,
                file,
                destination_dir,
                self.config.external_timeout_secs,
            )
            .await;
        }

        // In-process decompression is blocking disk work; keep it off the
        // async workers.
        let file = file.to_path_buf();
        let dest = destination_dir.to_path_buf();
        tokio::task::spawn_blocking(move || extract_in_process(format, &file, &dest))
            .await
            .map_err(|e| {
                ExtractionError::CorruptArchive(format!("extraction task panicked: {}", e))
            })?
    }
}

fn extract_in_process(
    format: ArchiveFormat,
    file: &Path,
    dest: &Path,
) -> Result<ExtractOutcome, ExtractionError> {
    fs::create_dir_all(dest)?;

    let outcome = match format {
        ArchiveFormat::Zip => extract_zip(file, dest)?,
        ArchiveFormat::Tar => extract_tar(File::open(file)?, dest)?,
        ArchiveFormat::TarGz => extract_tar(flate2::read::GzDecoder::new(File::open(file)?), dest)?,
        ArchiveFormat::TarBz2 => {
            extract_tar(bzip2::read::BzDecoder::new(File::open(file)?), dest)?
        }
        ArchiveFormat::Gzip => {
            extract_single(flate2::read::GzDecoder::new(File::open(file)?), file, dest)?
        }
        ArchiveFormat::Bzip2 => {
            extract_single(bzip2::read::BzDecoder::new(File::open(file)?), file, dest)?
        }
        ArchiveFormat::SevenZ | ArchiveFormat::Rar => unreachable!("handled externally"),
    };

    Ok(ExtractOutcome {
        format: Some(format),
        ..outcome
    })
}

fn extract_zip(file: &Path, dest: &Path) -> Result<ExtractOutcome, ExtractionError> {
    let reader = File::open(file)?;
    let mut archive =
        ZipArchive::new(reader).map_err(|e| ExtractionError::CorruptArchive(e.to_string()))?;

    let mut outcome = ExtractOutcome::default();

    for index in 0..archive.len() {
        let mut entry = match archive.by_index(index) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(archive = %file.display(), index, error = %e, "Skipping unreadable zip entry");
                continue;
            }
        };

        let entry_path = match sanitize_entry_path(entry.name()) {
            Ok(path) => path,
            Err(e) => {
                warn!(archive = %file.display(), entry = entry.name(), error = %e, "Skipping unsafe zip entry");
                continue;
            }
        };

        let target = dest.join(&entry_path);

        if entry.name().ends_with('/') {
            fs::create_dir_all(&target)?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut output = File::create(&target)?;
        match io::copy(&mut entry, &mut output) {
            Ok(written) => {
                outcome.files_extracted += 1;
                outcome.total_bytes += written;
            }
            Err(e) => {
                warn!(archive = %file.display(), entry = entry.name(), error = %e, "Failed to extract zip entry");
            }
        }
    }

    Ok(outcome)
}

fn extract_tar<R: Read>(reader: R, dest: &Path) -> Result<ExtractOutcome, ExtractionError> {
    let mut archive = tar::Archive::new(reader);
    let mut outcome = ExtractOutcome::default();

    for entry in archive
        .entries()
        .map_err(|e| ExtractionError::CorruptArchive(e.to_string()))?
    {
        let mut entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable tar entry");
                continue;
            }
        };

        if !entry.header().entry_type().is_file() && !entry.header().entry_type().is_dir() {
            continue;
        }

        let raw_path = entry
            .path()
            .map_err(|e| ExtractionError::CorruptArchive(e.to_string()))?
            .to_string_lossy()
            .into_owned();

        let entry_path = match sanitize_entry_path(&raw_path) {
            Ok(path) => path,
            Err(e) => {
                warn!(entry = %raw_path, error = %e, "Skipping unsafe tar entry");
                continue;
            }
        };

        let target = dest.join(&entry_path);

        if entry.header().entry_type().is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut output = File::create(&target)?;
        match io::copy(&mut entry, &mut output) {
            Ok(written) => {
                outcome.files_extracted += 1;
                outcome.total_bytes += written;
            }
            Err(e) => {
                warn!(entry = %raw_path, error = %e, "Failed to extract tar entry");
            }
        }
    }

    Ok(outcome)
}

/// Decompress a single-file stream (plain .gz / .bz2) next to its original
/// name with the compression suffix stripped.
fn extract_single<R: Read>(
    mut reader: R,
    source: &Path,
    dest: &Path,
) -> Result<ExtractOutcome, ExtractionError> {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "extracted".to_string());

    let target = dest.join(stem);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut output = File::create(&target)?;
    let written = io::copy(&mut reader, &mut output)
        .map_err(|e| ExtractionError::CorruptArchive(e.to_string()))?;

    Ok(ExtractOutcome {
        format: None,
        files_extracted: 1,
        total_bytes: written,
    })
}

/// Reject absolute paths and parent-directory traversal in archive entries.
fn sanitize_entry_path(entry: &str) -> Result<PathBuf, ExtractionError> {
    let path = Path::new(entry);
    if path.is_absolute() {
        return Err(ExtractionError::UnsafeEntryPath(entry.to_string()));
    }

    let mut sanitized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(segment) => sanitized.push(segment),
            Component::CurDir => {}
            _ => return Err(ExtractionError::UnsafeEntryPath(entry.to_string())),
        }
    }

    Ok(sanitized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::FileOptions::default();

        for (name, data) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }

    fn write_tar_gz(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);

        for (name, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_detect_format() {
        assert_eq!(
            ArchiveExtractor::detect_format(Path::new("a.ZIP")),
            Some(ArchiveFormat::Zip)
        );
        assert_eq!(
            ArchiveExtractor::detect_format(Path::new("a.tar.gz")),
            Some(ArchiveFormat::TarGz)
        );
        assert_eq!(
            ArchiveExtractor::detect_format(Path::new("a.tgz")),
            Some(ArchiveFormat::TarGz)
        );
        assert_eq!(
            ArchiveExtractor::detect_format(Path::new("a.tar.bz2")),
            Some(ArchiveFormat::TarBz2)
        );
        assert_eq!(
            ArchiveExtractor::detect_format(Path::new("a.bz2")),
            Some(ArchiveFormat::Bzip2)
        );
        assert_eq!(
            ArchiveExtractor::detect_format(Path::new("a.7z")),
            Some(ArchiveFormat::SevenZ)
        );
        assert_eq!(
            ArchiveExtractor::detect_format(Path::new("a.RAR")),
            Some(ArchiveFormat::Rar)
        );
        assert_eq!(ArchiveExtractor::detect_format(Path::new("a.mkv")), None);
        assert_eq!(ArchiveExtractor::detect_format(Path::new("noext")), None);
    }

    #[test]
    fn test_sanitize_entry_path() {
        assert_eq!(
            sanitize_entry_path("a/b.txt").unwrap(),
            PathBuf::from("a/b.txt")
        );
        assert_eq!(
            sanitize_entry_path("./c.txt").unwrap(),
            PathBuf::from("c.txt")
        );
        assert!(sanitize_entry_path("/etc/passwd").is_err());
        assert!(sanitize_entry_path("../escape.txt").is_err());
    }

    #[tokio::test]
    async fn test_non_archive_is_noop() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("video.mkv");
        fs::write(&file, b"not an archive").unwrap();

        let extractor = ArchiveExtractor::default();
        let outcome = extractor
            .extract_if_archive(&file, dir.path())
            .await
            .unwrap();

        assert!(!outcome.was_archive());
        assert_eq!(outcome.files_extracted, 0);
    }

    #[tokio::test]
    async fn test_extract_zip_preserves_structure() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("payload.zip");
        write_zip(&archive, &[("a/b.txt", b"hello"), ("c.txt", b"world")]);

        let dest = dir.path().join("out");
        let extractor = ArchiveExtractor::default();
        let outcome = extractor.extract_if_archive(&archive, &dest).await.unwrap();

        assert_eq!(outcome.format, Some(ArchiveFormat::Zip));
        assert_eq!(outcome.files_extracted, 2);
        assert_eq!(fs::read_to_string(dest.join("a/b.txt")).unwrap(), "hello");
        assert_eq!(fs::read_to_string(dest.join("c.txt")).unwrap(), "world");
        // The compressed file is retained.
        assert!(archive.exists());
    }

    #[tokio::test]
    async fn test_extract_tar_gz() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("bundle.tar.gz");
        write_tar_gz(&archive, &[("sub/x.txt", b"xx"), ("y.txt", b"yyy")]);

        let dest = dir.path().join("out");
        let extractor = ArchiveExtractor::default();
        let outcome = extractor.extract_if_archive(&archive, &dest).await.unwrap();

        assert_eq!(outcome.format, Some(ArchiveFormat::TarGz));
        assert_eq!(outcome.files_extracted, 2);
        assert_eq!(outcome.total_bytes, 5);
        assert_eq!(fs::read_to_string(dest.join("sub/x.txt")).unwrap(), "xx");
    }

    #[tokio::test]
    async fn test_extract_single_gzip() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("notes.txt.gz");
        {
            let file = File::create(&archive).unwrap();
            let mut encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
            encoder.write_all(b"plain contents").unwrap();
            encoder.finish().unwrap();
        }

        let dest = dir.path().join("out");
        let extractor = ArchiveExtractor::default();
        let outcome = extractor.extract_if_archive(&archive, &dest).await.unwrap();

        assert_eq!(outcome.format, Some(ArchiveFormat::Gzip));
        assert_eq!(outcome.files_extracted, 1);
        assert_eq!(
            fs::read_to_string(dest.join("notes.txt")).unwrap(),
            "plain contents"
        );
    }

    #[tokio::test]
    async fn test_extract_single_bzip2() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("dump.sql.bz2");
        {
            let file = File::create(&archive).unwrap();
            let mut encoder = bzip2::write::BzEncoder::new(file, bzip2::Compression::default());
            encoder.write_all(b"select 1;").unwrap();
            encoder.finish().unwrap();
        }

        let dest = dir.path().join("out");
        let extractor = ArchiveExtractor::default();
        let outcome = extractor.extract_if_archive(&archive, &dest).await.unwrap();

        assert_eq!(outcome.format, Some(ArchiveFormat::Bzip2));
        assert_eq!(
            fs::read_to_string(dest.join("dump.sql")).unwrap(),
            "select 1;"
        );
    }

    #[tokio::test]
    async fn test_corrupt_zip_is_an_error() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("broken.zip");
        fs::write(&archive, b"definitely not a zip").unwrap();

        let extractor = ArchiveExtractor::default();
        let result = extractor.extract_if_archive(&archive, dir.path()).await;

        assert!(matches!(result, Err(ExtractionError::CorruptArchive(_))));
    }
}
