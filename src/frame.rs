//! Decoded video frames.
//!
//! - `Frame`: RGB24 pixels plus dimensions, produced by a `FrameSource`.
//!
//! Frames are consumed once per loop iteration: the detector reads them, the
//! engine may copy one into a snapshot, and then they are dropped. Nothing in
//! the pipeline retains a frame across iterations.

use anyhow::{anyhow, Result};
use image::RgbImage;

/// A single decoded frame in packed RGB24 layout.
pub struct Frame {
    pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Monotonic frame counter assigned by the source (1-based).
    pub index: u64,
}

impl Frame {
    /// Create a frame, checking that the buffer matches the dimensions.
    pub fn new(pixels: Vec<u8>, width: u32, height: u32, index: u64) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                width,
                height,
                pixels.len()
            ));
        }
        Ok(Self {
            pixels,
            width,
            height,
            index,
        })
    }

    /// Solid-color frame, handy for tests and the synthetic source.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3], index: u64) -> Self {
        let pixels = rgb
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 3)
            .collect();
        Self {
            pixels,
            width,
            height,
            index,
        }
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Copy the frame into an `image` buffer for annotation and encoding.
    pub fn to_rgb_image(&self) -> Result<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.pixels.clone())
            .ok_or_else(|| anyhow!("frame buffer does not match {}x{}", self.width, self.height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_rejects_mismatched_buffer() {
        assert!(Frame::new(vec![0u8; 10], 2, 2, 1).is_err());
        assert!(Frame::new(vec![0u8; 12], 2, 2, 1).is_ok());
    }

    #[test]
    fn filled_frame_converts_to_image() -> Result<()> {
        let frame = Frame::filled(4, 3, [10, 20, 30], 7);
        let image = frame.to_rgb_image()?;
        assert_eq!(image.dimensions(), (4, 3));
        assert_eq!(image.get_pixel(3, 2).0, [10, 20, 30]);
        assert_eq!(frame.index, 7);
        Ok(())
    }
}
