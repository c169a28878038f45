//! Append-only audit log for consumed records
//!
//! One line per event:
//!
//! ```text
//! [2024-05-01 12:00:00] [SISTEMA] session started, binding '#'
//! [2024-05-01 12:00:03] [DADOS.NORTE] [norte | 25.30 | 60.10 | 1013.25 | 500.10]
//! [2024-05-01 12:00:04] [ERRO] invalid record: ...
//! ```

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use parking_lot::Mutex;
use tracing::warn;

/// Tag for lifecycle lines
pub const SYSTEM_TAG: &str = "SISTEMA";
/// Tag for rejected records
pub const ERROR_TAG: &str = "ERRO";

/// Line-oriented audit file, flushed after every line
pub struct AuditLog {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl AuditLog {
    /// Open `path` for appending, creating it if needed
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    /// File being written
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `[timestamp] [TAG] message`; write failures are logged, not returned
    pub fn record(&self, tag: &str, message: &str) {
        let line = format_line(&Local::now().format("%Y-%m-%d %H:%M:%S").to_string(), tag, message);
        let mut writer = self.writer.lock();
        if let Err(e) = write_line(&mut *writer, &line) {
            warn!(error = %e, path = %self.path.display(), "Audit log write failed");
        }
    }

    /// Lifecycle line
    pub fn system(&self, message: &str) {
        self.record(SYSTEM_TAG, message);
    }

    /// Rejection line
    pub fn error(&self, message: &str) {
        self.record(ERROR_TAG, message);
    }
}

fn write_line(writer: &mut impl Write, line: &str) -> io::Result<()> {
    writer.write_all(line.as_bytes())?;
    writer.flush()
}

fn format_line(timestamp: &str, tag: &str, message: &str) -> String {
    format!("[{}] [{}] {}\n", timestamp, tag.to_uppercase(), message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_line() {
        assert_eq!(
            format_line("2024-05-01 12:00:00", "dados.norte", "[norte | 1.00 | 2.00 | 3.00 | 4.00]"),
            "[2024-05-01 12:00:00] [DADOS.NORTE] [norte | 1.00 | 2.00 | 3.00 | 4.00]\n"
        );
    }

    #[test]
    fn test_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");

        let log = AuditLog::open(&path).unwrap();
        log.system("session started");
        log.record("dados.sul", "payload");
        log.error("bad record");
        drop(log);

        let reopened = AuditLog::open(&path).unwrap();
        reopened.system("session started again");

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].ends_with("[SISTEMA] session started"));
        assert!(lines[1].ends_with("[DADOS.SUL] payload"));
        assert!(lines[2].ends_with("[ERRO] bad record"));
        assert!(lines[0].starts_with('['));
    }
}
