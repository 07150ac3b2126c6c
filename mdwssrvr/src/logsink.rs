//! # Interaction Log Pipeline
//!
//! Rotating, size-capped interaction log. Each entry becomes one
//! `[<ISO-8601 UTC>] [S] <message>` line appended to `mcpserver.log`. When the file grows past the configured cap it is
//! renamed to `mcpserver_YYYYMMDD_HHMMSS.log`, gzip-compressed, and the raw
//! archive deleted; a fresh log starts with a rotation marker. Rotation
//! runs synchronously on the write path, so the whole sink is serialized
//! behind one mutex. Write failures are reported to stderr once and never
//! surface to clients.

use chrono::Utc;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};

pub const LOG_FILE_NAME: &str = "mcpserver.log";

pub struct LogSink {
    inner: Mutex<Inner>,
}

struct Inner {
    dir: PathBuf,
    path: PathBuf,
    max_bytes: u64,
    io_warned: bool,
}

impl LogSink {
    /// Creates the log directory if needed. `max_size_mb` caps the active
    /// file before rotation kicks in.
    pub fn new(dir: &Path, max_size_mb: u32) -> io::Result<LogSink> {
        fs::create_dir_all(dir)?;
        Ok(LogSink {
            inner: Mutex::new(Inner {
                dir: dir.to_path_buf(),
                path: dir.join(LOG_FILE_NAME),
                max_bytes: u64::from(max_size_mb) * 1024 * 1024,
                io_warned: false,
            }),
        })
    }

    pub fn path(&self) -> PathBuf {
        let inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner.path.clone()
    }

    /// Appends one timestamped line and rotates if the file crossed the
    /// size cap. Never fails: I/O errors are warned to stderr once.
    pub fn log(&self, message: &str) {
        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let line = format!(
            "[{}] [S] {message}\n",
            Utc::now().format("%Y-%m-%dT%H:%M:%SZ")
        );
        if let Err(e) = inner.append(&line) {
            if !inner.io_warned {
                eprintln!(
                    "mdwssrvr: failed to write log file {}: {e}",
                    inner.path.display()
                );
                inner.io_warned = true;
            }
            return;
        }
        inner.rotate_if_needed();
    }
}

impl Inner {
    fn append(&self, line: &str) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.flush()
    }

    fn rotate_if_needed(&self) {
        let size = match fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(_) => return,
        };
        if size <= self.max_bytes || size == 0 {
            return;
        }

        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        let archive = self.dir.join(format!("mcpserver_{stamp}.log"));
        info!(
            "log rotation triggered: {size} bytes exceeds cap of {} bytes",
            self.max_bytes
        );
        if let Err(e) = fs::rename(&self.path, &archive) {
            warn!("failed to rename log file for rotation: {e}");
            return;
        }

        match compress_file(&archive) {
            Ok(gz) => {
                if let Err(e) = fs::remove_file(&archive) {
                    warn!("failed to delete raw archive {}: {e}", archive.display());
                }
                info!("log archived to {}", gz.display());
            }
            Err(e) => {
                warn!(
                    "failed to compress rotated log {}: {e}; keeping raw archive",
                    archive.display()
                );
            }
        }

        let marker = format!(
            "[{}] [S] Log rotated. Previous log archived (approx {} MB).\n",
            Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
            size >> 20
        );
        if let Err(e) = fs::write(&self.path, marker) {
            warn!("failed to start fresh log file: {e}");
        }
    }
}

/// Gzips `path` to `<path>.gz` and returns the archive path.
fn compress_file(path: &Path) -> io::Result<PathBuf> {
    let gz_path = PathBuf::from(format!("{}.gz", path.display()));
    let mut input = File::open(path)?;
    let output = File::create(&gz_path)?;
    let mut encoder = GzEncoder::new(output, Compression::default());
    io::copy(&mut input, &mut encoder)?;
    encoder.finish()?.flush()?;
    Ok(gz_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn lines_are_timestamped_and_tagged() {
        let dir = tempdir().unwrap();
        let sink = LogSink::new(dir.path(), 1).unwrap();
        sink.log("first message");
        sink.log("second message");
        let content = fs::read_to_string(sink.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].contains("] [S] first message"));
        assert!(lines[1].contains("] [S] second message"));
    }

    #[test]
    fn oversized_log_rotates_into_gzip_archive() {
        let dir = tempdir().unwrap();
        let sink = LogSink::new(dir.path(), 1).unwrap();

        let chunk = "x".repeat(64 * 1024);
        for _ in 0..17 {
            sink.log(&chunk);
        }

        let entries: Vec<PathBuf> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        let archives: Vec<&PathBuf> = entries
            .iter()
            .filter(|p| {
                let name = p.file_name().unwrap().to_string_lossy();
                name.starts_with("mcpserver_") && name.ends_with(".log.gz")
            })
            .collect();
        assert_eq!(archives.len(), 1, "expected exactly one archive: {entries:?}");

        // no raw (uncompressed) archive left behind
        assert!(!entries.iter().any(|p| {
            let name = p.file_name().unwrap().to_string_lossy();
            name.starts_with("mcpserver_") && name.ends_with(".log")
        }));

        let current = fs::read_to_string(sink.path()).unwrap();
        assert!(current.contains("Log rotated."));
    }

    #[test]
    fn log_survives_unwritable_directory() {
        let dir = tempdir().unwrap();
        let sink = LogSink::new(dir.path(), 1).unwrap();
        drop(fs::remove_dir_all(dir.path()));
        // must not panic
        sink.log("into the void");
        sink.log("still alive");
    }
}
