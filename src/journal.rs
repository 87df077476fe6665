//! Append-only detection log.
//!
//! One `"{timestamp} - {message}"` line per alert, local time. The file is
//! opened in append mode for every entry so external rotation is safe.

use anyhow::{anyhow, Result};
use chrono::Local;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

#[derive(Clone, Debug)]
pub struct DetectionLog {
    path: PathBuf,
}

impl DetectionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, message: &str) -> Result<()> {
        let line = format!(
            "{} - {}\n",
            Local::now().format(TIMESTAMP_FORMAT),
            message.replace('\n', " ")
        );
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| anyhow!("failed to open detection log {}: {}", self.path.display(), e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| anyhow!("failed to append detection log {}: {}", self.path.display(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_are_appended_one_per_line() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let log = DetectionLog::new(dir.path().join("detections.log"));
        log.append("Forgotten object: backpack (100, 100)")?;
        log.append("multi\nline")?;

        let text = std::fs::read_to_string(log.path())?;
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" - Forgotten object: backpack (100, 100)"));
        assert!(lines[1].ends_with(" - multi line"));
        Ok(())
    }
}
