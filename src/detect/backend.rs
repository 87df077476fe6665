use anyhow::Result;

use crate::detect::result::Detection;
use crate::frame::Frame;

/// Detector backend trait.
///
/// A backend turns one frame into zero or more raw detections. Detections
/// carry no identity; the engine derives identity keys from them afterwards.
///
/// Backends run on the worker thread, once per frame, synchronously. They may
/// block (model inference), but must not retain the frame beyond the call.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
