use serde::{Deserialize, Serialize};

/// Axis-aligned box in integer pixel coordinates (top-left origin).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl BoundingBox {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Box from corner coordinates, as detectors usually report them.
    pub fn from_corners(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self::new(x1, y1, x2.saturating_sub(x1), y2.saturating_sub(y1))
    }

    /// Area in px². Inverted boxes (negative extent) count as zero.
    pub fn area(&self) -> i64 {
        if self.width <= 0 || self.height <= 0 {
            return 0;
        }
        self.width as i64 * self.height as i64
    }

    /// Integer center, `x + width / 2`, saturating at the `i32` range.
    pub fn center(&self) -> (i32, i32) {
        (
            self.x.saturating_add(self.width / 2),
            self.y.saturating_add(self.height / 2),
        )
    }
}

impl From<[i32; 4]> for BoundingBox {
    fn from(v: [i32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BoundingBox> for [i32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x, b.y, b.width, b.height]
    }
}

/// One raw detection for one frame. Carries no identity across frames.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_uses_integer_division() {
        let b = BoundingBox::new(100, 100, 51, 49);
        assert_eq!(b.center(), (125, 124));
        assert_eq!(b.area(), 51 * 49);
    }

    #[test]
    fn inverted_box_has_zero_area() {
        let b = BoundingBox::from_corners(10, 10, 5, 20);
        assert_eq!(b.width, -5);
        assert_eq!(b.area(), 0);
    }

    #[test]
    fn extreme_corners_saturate() {
        let b = BoundingBox::from_corners(i32::MIN, 0, i32::MAX, 10);
        assert_eq!(b.width, i32::MAX);
        assert_eq!(b.center().0, i32::MIN + i32::MAX / 2);
        let far = BoundingBox::new(i32::MAX, i32::MAX, i32::MAX, 2);
        assert_eq!(far.center(), (i32::MAX, i32::MAX));
    }

    #[test]
    fn detection_parses_from_script_json() {
        let det: Detection =
            serde_json::from_str(r#"{"label":"backpack","confidence":0.9,"bbox":[1,2,3,4]}"#)
                .expect("detection json");
        assert_eq!(det.bbox, BoundingBox::new(1, 2, 3, 4));
        assert_eq!(det.label, "backpack");
    }
}
