//! Identity resolution.
//!
//! Turns a raw detection into an `IdentityKey`: label plus integer box center,
//! optionally snapped to a coarse grid. Detections that fail the confidence,
//! label or area filters are dropped silently; that is ordinary filtering.

use std::collections::HashSet;
use std::fmt;

use crate::config::WatchConfig;
use crate::detect::Detection;

/// Identity of a tracked object across frames.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityKey {
    pub center_x: i32,
    pub center_y: i32,
    pub label: String,
}

impl IdentityKey {
    pub fn new(center_x: i32, center_y: i32, label: impl Into<String>) -> Self {
        Self {
            center_x,
            center_y,
            label: label.into(),
        }
    }

    /// Chebyshev distance between centers, or `None` for different labels.
    pub fn distance(&self, other: &IdentityKey) -> Option<u32> {
        if self.label != other.label {
            return None;
        }
        let dx = self.center_x.abs_diff(other.center_x);
        let dy = self.center_y.abs_diff(other.center_y);
        Some(dx.max(dy))
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.center_x, self.center_y, self.label)
    }
}

/// Stateless filter + keying function over static configuration.
#[derive(Clone, Debug)]
pub struct IdentityResolver {
    confidence_threshold: f32,
    min_area: i64,
    targets: HashSet<String>,
    grid_cell: u32,
}

impl IdentityResolver {
    pub fn new(
        confidence_threshold: f32,
        min_area: i64,
        targets: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            confidence_threshold,
            min_area,
            targets: targets.into_iter().collect(),
            grid_cell: 1,
        }
    }

    pub fn from_config(cfg: &WatchConfig) -> Self {
        Self::new(
            cfg.confidence_threshold,
            cfg.min_area,
            cfg.target_objects.iter().cloned(),
        )
        .with_grid_cell(cfg.grid_cell)
    }

    /// Snap centers to the middle of `cell`-sized grid squares. `1` disables it.
    pub fn with_grid_cell(mut self, cell: u32) -> Self {
        self.grid_cell = cell.max(1);
        self
    }

    /// Key for a detection, or `None` when it is filtered out.
    pub fn resolve(
        &self,
        detection: &Detection,
        frame_width: u32,
        frame_height: u32,
    ) -> Option<IdentityKey> {
        if detection.confidence.is_nan() || detection.confidence <= self.confidence_threshold {
            return None;
        }
        if !self.targets.contains(&detection.label) {
            return None;
        }
        if detection.bbox.area() < self.min_area {
            return None;
        }

        let (cx, cy) = detection.bbox.center();
        let cx = clamp_axis(cx, frame_width);
        let cy = clamp_axis(cy, frame_height);
        Some(IdentityKey::new(
            self.quantize(cx),
            self.quantize(cy),
            detection.label.clone(),
        ))
    }

    fn quantize(&self, value: i32) -> i32 {
        if self.grid_cell == 1 {
            return value;
        }
        let cell = self.grid_cell as i32;
        value.div_euclid(cell) * cell + cell / 2
    }
}

fn clamp_axis(value: i32, extent: u32) -> i32 {
    let max = extent.saturating_sub(1).min(i32::MAX as u32) as i32;
    value.clamp(0, max)
}
