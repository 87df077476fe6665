//! MobileNet-SSD class table and output decoding.

use crate::detect::result::{BoundingBox, Detection};

/// Class labels in model output order. Index 0 is the background class.
pub const SSD_CLASSES: [&str; 27] = [
    "background",
    "aeroplane",
    "bicycle",
    "bird",
    "boat",
    "bottle",
    "bus",
    "car",
    "cat",
    "chair",
    "cow",
    "diningtable",
    "dog",
    "horse",
    "motorbike",
    "person",
    "pottedplant",
    "sheep",
    "sofa",
    "train",
    "tvmonitor",
    "laptop",
    "backpack",
    "handbag",
    "suitcase",
    "cell phone",
    "book",
];

/// Values per detection row: `[image_id, class, score, x1, y1, x2, y2]`.
pub const SSD_ROW_LEN: usize = 7;

/// Label for a raw class index; out-of-range indices map to `"unknown"`.
pub fn label_for_class(index: f32) -> &'static str {
    if !index.is_finite() || index < 0.0 {
        return "unknown";
    }
    SSD_CLASSES.get(index as usize).copied().unwrap_or("unknown")
}

/// Decode flattened SSD output rows into pixel-space detections.
///
/// Corner coordinates are normalized to `0..1` by the model and are scaled to
/// the frame, then truncated to integers. No confidence filtering happens
/// here; that belongs to the identity resolver. Rows with any non-finite
/// class, score or corner value are skipped. Trailing partial rows are ignored.
pub fn decode_ssd_rows(rows: &[f32], frame_width: u32, frame_height: u32) -> Vec<Detection> {
    let w = frame_width as f32;
    let h = frame_height as f32;
    rows.chunks_exact(SSD_ROW_LEN)
        .filter(|row| row[1..].iter().all(|v| v.is_finite()))
        .map(|row| {
            let bbox = BoundingBox::from_corners(
                (row[3] * w) as i32,
                (row[4] * h) as i32,
                (row[5] * w) as i32,
                (row[6] * h) as i32,
            );
            Detection::new(label_for_class(row[1]), row[2], bbox)
        })
        .collect()
}
