//! Synthetic frame source (`stub://` URLs).
//!
//! `stub://name?frames=N&width=W&height=H` produces a moving gradient. With
//! `frames` set the stream ends after N frames; otherwise it never ends.

use anyhow::{anyhow, Context, Result};
use url::Url;

use super::{FrameSource, SourceStats};
use crate::frame::Frame;

#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    pub url: String,
    pub width: u32,
    pub height: u32,
    /// Frames before end of stream; `None` is endless.
    pub max_frames: Option<u64>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            url: "stub://camera".to_string(),
            width: 640,
            height: 480,
            max_frames: None,
        }
    }
}

impl SyntheticConfig {
    pub fn from_url(raw: &str) -> Result<Self> {
        let url = Url::parse(raw).context("parse stub url")?;
        if url.scheme() != "stub" {
            return Err(anyhow!("synthetic source needs a stub:// url, got '{}'", raw));
        }
        let mut cfg = Self {
            url: raw.to_string(),
            ..Self::default()
        };
        for (key, value) in url.query_pairs() {
            let parse = |v: &str| -> Result<u64> {
                v.parse()
                    .map_err(|_| anyhow!("stub url parameter {}={} is not a number", key, v))
            };
            match key.as_ref() {
                "frames" => cfg.max_frames = Some(parse(&value)?),
                "width" | "height" => {
                    let dim = u32::try_from(parse(&value)?)
                        .map_err(|_| anyhow!("stub url parameter {}={} is too large", key, value))?;
                    if key == "width" {
                        cfg.width = dim;
                    } else {
                        cfg.height = dim;
                    }
                }
                other => log::warn!("ignoring unknown stub url parameter '{}'", other),
            }
        }
        if cfg.width == 0 || cfg.height == 0 {
            return Err(anyhow!("stub source dimensions must be non-zero"));
        }
        (cfg.width as usize)
            .checked_mul(cfg.height as usize)
            .and_then(|n| n.checked_mul(3))
            .ok_or_else(|| anyhow!("stub source dimensions {}x{} are too large", cfg.width, cfg.height))?;
        Ok(cfg)
    }
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    frame_count: u64,
    connected: bool,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            frame_count: 0,
            connected: false,
        }
    }

    fn generate_pixels(&self) -> Vec<u8> {
        let pixel_count = self.config.width as usize * self.config.height as usize * 3;
        let shift = self.frame_count / 50;
        (0..pixel_count)
            .map(|i| ((i as u64 / 3 + shift) % 256) as u8)
            .collect()
    }
}

impl FrameSource for SyntheticSource {
    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        log::info!("SyntheticSource: connected to {}", self.config.url);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if !self.connected {
            return Err(anyhow!("synthetic source not connected; call connect() first"));
        }
        if self
            .config
            .max_frames
            .is_some_and(|max| self.frame_count >= max)
        {
            return Ok(None);
        }
        let pixels = self.generate_pixels();
        self.frame_count += 1;
        Frame::new(
            pixels,
            self.config.width,
            self.config.height,
            self.frame_count,
        )
        .map(Some)
    }

    fn is_healthy(&self) -> bool {
        self.connected
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.config.url.clone(),
        }
    }
}
