//! Zip packaging of generated certificates.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::CertError;

const CHUNK_SIZE: usize = 64 * 1024;
/// How long a timed-out write may take to notice the abort flag.
const ABORT_GRACE: Duration = Duration::from_secs(2);

/// Archive file name for a batch.
pub fn archive_name(batch_id: &str) -> String {
    format!("certificates_{}.zip", batch_id)
}

/// Packs generated files into `certificates_<batchId>.zip` under a deadline.
#[derive(Debug, Clone)]
pub struct Archiver {
    output_dir: PathBuf,
    timeout: Duration,
}

impl Archiver {
    pub fn new(output_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            output_dir: output_dir.into(),
            timeout,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Zip `files` (names inside the output directory) and return the archive name.
    pub async fn archive(&self, files: &[String], batch_id: &str) -> Result<String, CertError> {
        let name = archive_name(batch_id);
        let destination = self.output_dir.join(&name);
        let abort = Arc::new(AtomicBool::new(false));
        let started = Instant::now();

        let mut task = tokio::task::spawn_blocking({
            let dir = self.output_dir.clone();
            let files = files.to_vec();
            let destination = destination.clone();
            let abort = Arc::clone(&abort);
            move || write_archive(&dir, &files, &destination, &abort)
        });

        match tokio::time::timeout(self.timeout, &mut task).await {
            Ok(joined) => {
                let entries = joined
                    .map_err(|e| CertError::Archive(format!("archive task failed: {}", e)))??;
                let bytes = std::fs::metadata(&destination).map(|m| m.len()).unwrap_or(0);
                info!(
                    batch_id,
                    file = %name,
                    entries,
                    bytes,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "archive written"
                );
                Ok(name)
            }
            Err(_) => {
                abort.store(true, Ordering::SeqCst);
                warn!(batch_id, file = %name, "archive exceeded deadline, aborting");
                let _ = tokio::time::timeout(ABORT_GRACE, task).await;
                match tokio::fs::remove_file(&destination).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => warn!(file = %destination.display(), error = %e, "could not remove timed-out archive"),
                }
                Err(CertError::timeout(format!("archive {}", name), self.timeout))
            }
        }
    }
}

/// Write the archive synchronously. Files that do not exist are skipped.
///
/// `abort` is checked between chunks; once raised, the partial archive is
/// removed and an error returned. Returns the number of entries written.
pub fn write_archive(
    dir: &Path,
    files: &[String],
    destination: &Path,
    abort: &AtomicBool,
) -> Result<usize, CertError> {
    let result = write_entries(dir, files, destination, abort);
    if result.is_err() {
        let _ = std::fs::remove_file(destination);
    }
    result
}

fn write_entries(
    dir: &Path,
    files: &[String],
    destination: &Path,
    abort: &AtomicBool,
) -> Result<usize, CertError> {
    let aborted = || CertError::Archive("archive aborted".to_string());
    let zip_err = |e: zip::result::ZipError| CertError::Archive(e.to_string());

    let mut zip = ZipWriter::new(File::create(destination)?);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(9));

    let mut entries = 0;
    let mut buffer = vec![0u8; CHUNK_SIZE];
    for name in files {
        let path = dir.join(name);
        let mut input = match File::open(&path) {
            Ok(file) => file,
            Err(_) => {
                debug!(file = %path.display(), "skipping missing archive input");
                continue;
            }
        };

        zip.start_file(name.as_str(), options).map_err(zip_err)?;
        loop {
            if abort.load(Ordering::SeqCst) {
                return Err(aborted());
            }
            let read = input.read(&mut buffer)?;
            if read == 0 {
                break;
            }
            zip.write_all(&buffer[..read])?;
        }
        entries += 1;
    }

    if abort.load(Ordering::SeqCst) {
        return Err(aborted());
    }
    zip.finish().map_err(zip_err)?;
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use zip::ZipArchive;

    fn entry_names(path: &Path) -> Vec<String> {
        let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
        let mut names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_archive_skips_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.png"), b"aaaa").unwrap();
        std::fs::write(dir.path().join("b.png"), b"bbbb").unwrap();

        let archiver = Archiver::new(dir.path(), Duration::from_secs(10));
        let files = vec!["a.png".to_string(), "gone.png".to_string(), "b.png".to_string()];
        let name = archiver.archive(&files, "batch_1").await.unwrap();

        assert_eq!(name, "certificates_batch_1.zip");
        assert_eq!(entry_names(&dir.path().join(&name)), vec!["a.png", "b.png"]);
    }

    #[test]
    fn test_entries_round_trip_content() {
        let dir = tempfile::tempdir().unwrap();
        let payload = vec![7u8; CHUNK_SIZE * 2 + 10];
        std::fs::write(dir.path().join("big.pdf"), &payload).unwrap();
        let dest = dir.path().join("out.zip");

        let count = write_archive(dir.path(), &["big.pdf".to_string()], &dest, &AtomicBool::new(false)).unwrap();
        assert_eq!(count, 1);

        let mut archive = ZipArchive::new(File::open(&dest).unwrap()).unwrap();
        let mut entry = archive.by_name("big.pdf").unwrap();
        let mut content = Vec::new();
        entry.read_to_end(&mut content).unwrap();
        assert_eq!(content, payload);
    }

    #[test]
    fn test_abort_removes_partial_archive() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.png"), b"aaaa").unwrap();
        let dest = dir.path().join("out.zip");

        let err = write_archive(dir.path(), &["a.png".to_string()], &dest, &AtomicBool::new(true)).unwrap_err();
        assert!(matches!(err, CertError::Archive(_)));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_timeout_leaves_no_archive() {
        let dir = tempfile::tempdir().unwrap();
        let payload: Vec<u8> = (0..8 * 1024 * 1024u32).map(|i| (i.wrapping_mul(2654435761) >> 24) as u8).collect();
        std::fs::write(dir.path().join("big.pdf"), &payload).unwrap();

        let archiver = Archiver::new(dir.path(), Duration::ZERO);
        let err = archiver.archive(&["big.pdf".to_string()], "slow").await.unwrap_err();
        assert!(matches!(err, CertError::Timeout { .. }));
        assert!(!dir.path().join(archive_name("slow")).exists());
    }

    #[tokio::test]
    async fn test_empty_archive() {
        let dir = tempfile::tempdir().unwrap();
        let archiver = Archiver::new(dir.path(), Duration::from_secs(10));
        let name = archiver.archive(&[], "empty").await.unwrap();
        assert!(entry_names(&dir.path().join(name)).is_empty());
    }
}
