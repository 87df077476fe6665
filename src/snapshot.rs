//! Alert snapshots.
//!
//! Snapshots are JPEG files named `{label}_{unix_seconds}.jpg`. When two alerts
//! for the same label land in the same second, later ones get `_1`, `_2`, ...
//! appended instead of overwriting the first.

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::time::Duration;

const MAX_SUFFIX: u32 = 1000;

#[derive(Clone, Debug)]
pub struct SnapshotWriter {
    dir: PathBuf,
}

impl SnapshotWriter {
    /// Create the writer, creating the directory when missing.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("create snapshot directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Encode `image` as JPEG under a fresh deterministic name.
    pub fn write(&self, label: &str, at: Duration, image: &RgbImage) -> Result<PathBuf> {
        let path = self.next_path(label, at.as_secs())?;
        image
            .save_with_format(&path, image::ImageFormat::Jpeg)
            .with_context(|| format!("write snapshot {}", path.display()))?;
        Ok(path)
    }

    fn next_path(&self, label: &str, secs: u64) -> Result<PathBuf> {
        let stem = format!("{}_{}", sanitize_label(label), secs);
        let first = self.dir.join(format!("{stem}.jpg"));
        if !first.exists() {
            return Ok(first);
        }
        (1..MAX_SUFFIX)
            .map(|n| self.dir.join(format!("{stem}_{n}.jpg")))
            .find(|candidate| !candidate.exists())
            .ok_or_else(|| anyhow!("too many snapshots named {}", stem))
    }
}

/// Keep labels like "cell phone" filesystem friendly.
fn sanitize_label(label: &str) -> String {
    label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
