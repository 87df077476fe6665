use std::collections::VecDeque;
use std::path::Path;

use anyhow::{anyhow, Result};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::frame::Frame;

/// Scripted backend for testing and demos.
///
/// Replays one list of detections per frame, in order. Once the script is
/// exhausted every further frame yields no detections.
#[derive(Default)]
pub struct ScriptedBackend {
    frames: VecDeque<Vec<Detection>>,
    /// Repeat the last scripted frame forever instead of going quiet.
    hold_last: bool,
    last: Vec<Detection>,
}

impl ScriptedBackend {
    pub fn new(frames: Vec<Vec<Detection>>) -> Self {
        Self {
            frames: frames.into(),
            hold_last: false,
            last: Vec::new(),
        }
    }

    /// Keep returning the final scripted frame after the script runs out.
    pub fn holding_last(mut self) -> Self {
        self.hold_last = true;
        self
    }

    /// Load a script of the form `[[{"label":..,"confidence":..,"bbox":[x,y,w,h]}], ...]`.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("failed to read detection script {}: {}", path.display(), e))?;
        let frames: Vec<Vec<Detection>> = serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid detection script {}: {}", path.display(), e))?;
        Ok(Self::new(frames))
    }

    /// Frames left in the script.
    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        match self.frames.pop_front() {
            Some(dets) => {
                if self.hold_last {
                    self.last = dets.clone();
                }
                Ok(dets)
            }
            None if self.hold_last => Ok(self.last.clone()),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::BoundingBox;

    fn backpack() -> Detection {
        Detection::new("backpack", 0.9, BoundingBox::new(100, 100, 50, 50))
    }

    #[test]
    fn scripted_backend_replays_then_goes_quiet() -> Result<()> {
        let frame = Frame::filled(8, 8, [0, 0, 0], 1);
        let mut backend = ScriptedBackend::new(vec![vec![backpack()], vec![]]);

        assert_eq!(backend.detect(&frame)?, vec![backpack()]);
        assert!(backend.detect(&frame)?.is_empty());
        assert!(backend.detect(&frame)?.is_empty());
        assert_eq!(backend.remaining(), 0);
        Ok(())
    }

    #[test]
    fn holding_backend_repeats_final_frame() -> Result<()> {
        let frame = Frame::filled(8, 8, [0, 0, 0], 1);
        let mut backend = ScriptedBackend::new(vec![vec![backpack()]]).holding_last();

        backend.detect(&frame)?;
        assert_eq!(backend.detect(&frame)?, vec![backpack()]);
        Ok(())
    }

    #[test]
    fn loads_script_from_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("script.json");
        std::fs::write(
            &path,
            r#"[[{"label":"suitcase","confidence":0.8,"bbox":[0,0,90,90]}],[]]"#,
        )?;
        let backend = ScriptedBackend::from_json_file(&path)?;
        assert_eq!(backend.remaining(), 2);
        Ok(())
    }
}
