//! External-process extraction for formats without an in-process decoder.

use std::fs;
use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

use super::{ArchiveFormat, ExtractOutcome, ExtractionError};

/// Run `7z`/`unrar` against an archive with a hard timeout.
///
/// Unlike in-process extraction this is atomic: the whole run succeeds or
/// fails with the child's exit code. On timeout the child is killed and a
/// typed failure is returned instead of blocking indefinitely.
pub(super) async fn run_external_extraction(
    format: ArchiveFormat,
    tool: &str,
    archive: &Path,
    destination_dir: &Path,
    timeout_secs: u64,
) -> Result<ExtractOutcome, ExtractionError> {
    fs::create_dir_all(destination_dir)?;

    let args: Vec<String> = match format {
        // 7z x -y -o<dir> <archive>
        ArchiveFormat::SevenZ => vec![
            "x".to_string(),
            "-y".to_string(),
            format!("-o{}", destination_dir.display()),
            archive.display().to_string(),
        ],
        // unrar x -y <archive> <dir>/
        ArchiveFormat::Rar => vec![
            "x".to_string(),
            "-y".to_string(),
            archive.display().to_string(),
            format!("{}/", destination_dir.display()),
        ],
        _ => unreachable!("not an external format"),
    };

    debug!(tool = tool, ?args, "Spawning external extractor");

    let mut child = Command::new(tool)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ExtractionError::ToolMissing(tool.to_string())
            } else {
                ExtractionError::Io(e)
            }
        })?;

    let stderr = child.stderr.take();

    let result = timeout(Duration::from_secs(timeout_secs), async {
        let mut error_output = String::new();
        if let Some(stderr) = stderr {
            let mut reader = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                error_output.push_str(&line);
                error_output.push('\n');
            }
        }
        let status = child.wait().await?;
        Ok::<(std::process::ExitStatus, String), std::io::Error>((status, error_output))
    })
    .await;

    match result {
        Ok(Ok((status, error_output))) => {
            if !status.success() {
                return Err(ExtractionError::ExternalProcess {
                    tool: tool.to_string(),
                    code: status.code(),
                    stderr: error_output.trim().to_string(),
                });
            }
        }
        Ok(Err(e)) => return Err(ExtractionError::Io(e)),
        Err(_) => {
            warn!(tool = tool, timeout_secs, "External extraction timed out, killing process");
            let _ = child.kill().await;
            return Err(ExtractionError::Timeout { timeout_secs });
        }
    }

    // External tools don't report per-file counts; walk the destination.
    let (files, bytes) = count_extracted(destination_dir)?;

    Ok(ExtractOutcome {
        format: Some(format),
        files_extracted: files,
        total_bytes: bytes,
    })
}

fn count_extracted(dir: &Path) -> Result<(u64, u64), ExtractionError> {
    let mut files = 0u64;
    let mut bytes = 0u64;

    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        for entry in fs::read_dir(&current)? {
            let entry = entry?;
            let meta = entry.metadata()?;
            if meta.is_dir() {
                stack.push(entry.path());
            } else {
                files += 1;
                bytes += meta.len();
            }
        }
    }

    Ok((files, bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_tool_is_typed() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("a.7z");
        fs::write(&archive, b"stub").unwrap();

        let result = run_external_extraction(
            ArchiveFormat::SevenZ,
            "definitely-not-a-real-binary",
            &archive,
            &dir.path().join("out"),
            5,
        )
        .await;

        assert!(matches!(result, Err(ExtractionError::ToolMissing(_))));
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_typed() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("a.7z");
        fs::write(&archive, b"stub").unwrap();

        // `false` ignores its arguments and exits 1.
        let result = run_external_extraction(
            ArchiveFormat::SevenZ,
            "false",
            &archive,
            &dir.path().join("out"),
            5,
        )
        .await;

        match result {
            Err(ExtractionError::ExternalProcess { code, .. }) => assert_eq!(code, Some(1)),
            other => panic!("expected ExternalProcess error, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_timeout_kills_process() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("a.rar");
        fs::write(&archive, b"stub").unwrap();

        // Fake extractor that ignores its arguments and hangs.
        let tool = dir.path().join("fake-unrar");
        fs::write(&tool, "#!/bin/sh\nsleep 60\n").unwrap();
        fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).unwrap();

        let result = run_external_extraction(
            ArchiveFormat::Rar,
            &tool.display().to_string(),
            &archive,
            &dir.path().join("out"),
            1,
        )
        .await;

        assert!(matches!(
            result,
            Err(ExtractionError::Timeout { timeout_secs: 1 })
        ));
    }

    #[test]
    fn test_count_extracted() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        let mut f = fs::File::create(dir.path().join("sub/a.txt")).unwrap();
        f.write_all(b"12345").unwrap();
        fs::File::create(dir.path().join("b.txt")).unwrap();

        let (files, bytes) = count_extracted(dir.path()).unwrap();
        assert_eq!(files, 2);
        assert_eq!(bytes, 5);
    }
}
