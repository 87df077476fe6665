//! Frame ingestion sources.
//!
//! This module provides different sources for decoded frames:
//! - Synthetic `stub://` source (tests, demos)
//! - USB/V4L2 capture devices by index (feature: ingest-v4l2)
//! - Local video files (feature: ingest-file-ffmpeg)
//!
//! Every source yields `Frame`s in RGB24. `next_frame` returns `Ok(None)` at
//! end of stream, which ends the worker loop normally; errors are fatal for
//! the worker.

#[cfg(feature = "ingest-file-ffmpeg")]
mod file_ffmpeg;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::Result;

#[cfg(feature = "ingest-file-ffmpeg")]
pub use file_ffmpeg::FfmpegFileSource;
pub use synthetic::{SyntheticConfig, SyntheticSource};
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::{V4l2Config, V4l2Source};

use crate::config::VideoSource;
use crate::frame::Frame;

/// Statistics for a frame source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub source: String,
}

/// A stream of decoded frames.
pub trait FrameSource: Send {
    /// Open the device or file. Must be called before `next_frame`.
    fn connect(&mut self) -> Result<()>;

    /// Next frame, or `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    fn is_healthy(&self) -> bool;

    fn stats(&self) -> SourceStats;
}

/// Open the source named by the configuration (not yet connected).
pub fn open_source(source: &VideoSource) -> Result<Box<dyn FrameSource>> {
    match source {
        VideoSource::Path(path) if path.starts_with("stub://") => {
            Ok(Box::new(SyntheticSource::new(SyntheticConfig::from_url(path)?)))
        }
        VideoSource::Device(index) => open_device(*index),
        VideoSource::Path(path) => open_file(path),
    }
}

#[cfg(feature = "ingest-v4l2")]
fn open_device(index: u32) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(V4l2Source::new(V4l2Config {
        device: format!("/dev/video{index}"),
        ..V4l2Config::default()
    })))
}

#[cfg(not(feature = "ingest-v4l2"))]
fn open_device(index: u32) -> Result<Box<dyn FrameSource>> {
    anyhow::bail!(
        "capture device {} requires the ingest-v4l2 feature",
        index
    )
}

#[cfg(feature = "ingest-file-ffmpeg")]
fn open_file(path: &str) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(FfmpegFileSource::new(path)?))
}

#[cfg(not(feature = "ingest-file-ffmpeg"))]
fn open_file(path: &str) -> Result<Box<dyn FrameSource>> {
    anyhow::bail!(
        "video file {} requires the ingest-file-ffmpeg feature",
        path
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_paths_open_synthetic_sources() -> Result<()> {
        let mut source = open_source(&VideoSource::Path("stub://lobby?frames=2".into()))?;
        source.connect()?;
        assert!(source.next_frame()?.is_some());
        assert!(source.next_frame()?.is_some());
        assert!(source.next_frame()?.is_none());
        assert_eq!(source.stats().frames_captured, 2);
        Ok(())
    }

    #[cfg(not(feature = "ingest-v4l2"))]
    #[test]
    fn devices_need_the_v4l2_feature() {
        let err = open_source(&VideoSource::Device(0)).err().expect("error");
        assert!(err.to_string().contains("ingest-v4l2"));
    }
}
