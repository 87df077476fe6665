//! Local video file source using FFmpeg.
//!
//! Frames are decoded from the best video stream and scaled to RGB24. When
//! the demuxer runs dry the decoder is drained, then `next_frame` reports
//! end of stream.

use anyhow::{Context, Result};
use ffmpeg_next as ffmpeg;
use std::time::{Duration, Instant};

use super::{FrameSource, SourceStats};
use crate::frame::Frame;

pub struct FfmpegFileSource {
    path: String,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    frame_count: u64,
    connected_at: Option<Instant>,
    last_frame_at: Option<Instant>,
    draining: bool,
    finished: bool,
}

impl FfmpegFileSource {
    pub fn new(path: &str) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(&path)
            .with_context(|| format!("failed to open file input '{}' with ffmpeg", path))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow::anyhow!("file {} has no video track", path))?;
        let stream_index = input_stream.index();
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        Ok(Self {
            path: path.to_string(),
            input,
            stream_index,
            decoder,
            scaler,
            frame_count: 0,
            connected_at: None,
            last_frame_at: None,
            draining: false,
            finished: false,
        })
    }

    /// Pull one decoded frame out of the decoder, if it has one ready.
    fn receive(&mut self) -> Result<Option<Frame>> {
        let mut decoded = ffmpeg::frame::Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }
        let mut rgb_frame = ffmpeg::frame::Video::empty();
        self.scaler
            .run(&decoded, &mut rgb_frame)
            .context("scale frame to RGB")?;
        let (pixels, width, height) = frame_to_pixels(&rgb_frame)?;

        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());
        Frame::new(pixels, width, height, self.frame_count).map(Some)
    }
}

impl FrameSource for FfmpegFileSource {
    fn connect(&mut self) -> Result<()> {
        self.connected_at = Some(Instant::now());
        log::info!(
            "FileSource: connected to {} ({}x{})",
            self.path,
            self.decoder.width(),
            self.decoder.height()
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.finished {
            return Ok(None);
        }
        if let Some(frame) = self.receive()? {
            return Ok(Some(frame));
        }

        while !self.draining {
            let Some((stream, packet)) = self.input.packets().next() else {
                self.decoder.send_eof().context("flush ffmpeg decoder")?;
                self.draining = true;
                break;
            };
            if stream.index() != self.stream_index {
                continue;
            }
            self.decoder
                .send_packet(&packet)
                .context("send packet to ffmpeg decoder")?;
            if let Some(frame) = self.receive()? {
                return Ok(Some(frame));
            }
        }

        let frame = self.receive()?;
        if frame.is_none() {
            self.finished = true;
            log::info!(
                "FileSource: {} ended after {} frames",
                self.path,
                self.frame_count
            );
        }
        Ok(frame)
    }

    fn is_healthy(&self) -> bool {
        let Some(connected_at) = self.connected_at else {
            return false;
        };
        match self.last_frame_at {
            Some(last_frame_at) => last_frame_at.elapsed() <= Duration::from_secs(2),
            None => connected_at.elapsed() <= Duration::from_secs(5),
        }
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.path.clone(),
        }
    }
}

fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> Result<(Vec<u8>, u32, u32)> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        let pixels = data
            .get(..row_bytes * height as usize)
            .context("ffmpeg frame is shorter than its dimensions")?;
        return Ok((pixels.to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }

    Ok((pixels, width, height))
}
