//! Overlay annotations.
//!
//! The engine emits one `Overlay` per accepted detection per frame: green while
//! Fresh, red once Forgotten. Overlays are drawn on alert snapshots here; a
//! display layer may draw them on live frames too. Nothing in this module
//! feeds back into classification.

use image::{Rgb, RgbImage};

use crate::detect::BoundingBox;
use crate::dwell::DwellState;

pub const FRESH_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const FORGOTTEN_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const STROKE: i32 = 2;

#[derive(Clone, Debug, PartialEq)]
pub struct Overlay {
    pub bbox: BoundingBox,
    pub label: String,
    pub state: DwellState,
}

impl Overlay {
    pub fn color(&self) -> Rgb<u8> {
        match self.state {
            DwellState::Fresh => FRESH_COLOR,
            DwellState::Forgotten => FORGOTTEN_COLOR,
        }
    }

    /// Caption for display layers; only forgotten objects get one.
    pub fn caption(&self) -> Option<String> {
        match self.state {
            DwellState::Fresh => None,
            DwellState::Forgotten => Some(format!("Forgotten: {}", self.label)),
        }
    }
}

pub fn draw_overlays(image: &mut RgbImage, overlays: &[Overlay]) {
    for overlay in overlays {
        draw_rect(image, overlay.bbox, overlay.color());
    }
}

/// Hollow rectangle, clipped to the image.
pub fn draw_rect(image: &mut RgbImage, bbox: BoundingBox, color: Rgb<u8>) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if bbox.width <= 0 || bbox.height <= 0 || w == 0 || h == 0 {
        return;
    }
    let x0 = bbox.x;
    let y0 = bbox.y;
    let x1 = bbox.x.saturating_add(bbox.width - 1);
    let y1 = bbox.y.saturating_add(bbox.height - 1);
    for y in y0.max(0)..=y1.min(h - 1) {
        for x in x0.max(0)..=x1.min(w - 1) {
            let on_edge = x.saturating_sub(x0) < STROKE
                || x1 - x < STROKE
                || y.saturating_sub(y0) < STROKE
                || y1 - y < STROKE;
            if on_edge {
                image.put_pixel(x as u32, y as u32, color);
            }
        }
    }
}
