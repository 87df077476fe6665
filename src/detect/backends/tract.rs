#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::classes::{decode_ssd_rows, SSD_ROW_LEN};
use crate::detect::result::Detection;
use crate::frame::Frame;

/// Square input edge expected by MobileNet-SSD.
const SSD_INPUT: u32 = 300;
const SSD_SCALE: f32 = 0.007843;
const SSD_MEAN: f32 = 127.5;

/// Tract-based backend for MobileNet-SSD ONNX models.
///
/// Loads a local model file once; every frame is resized to 300x300,
/// normalized and run through the network. Output rows are decoded into
/// frame-space detections.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let model_path = model_path.as_ref();
        let side = SSD_INPUT as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self { model })
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        let image = frame.to_rgb_image()?;
        let resized = imageops::resize(&image, SSD_INPUT, SSD_INPUT, FilterType::Triangle);
        let side = SSD_INPUT as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
            let px = resized.get_pixel(x as u32, y as u32);
            (px.0[c] as f32 - SSD_MEAN) * SSD_SCALE
        });
        Ok(input.into_tensor())
    }

    fn extract_rows(&self, outputs: TVec<TValue>) -> Result<Vec<f32>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        if view.shape().last().copied() != Some(SSD_ROW_LEN) {
            return Err(anyhow!(
                "unexpected SSD output shape {:?}; last axis must be {}",
                view.shape(),
                SSD_ROW_LEN
            ));
        }
        Ok(view.iter().copied().collect())
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let rows = self.extract_rows(outputs)?;
        Ok(decode_ssd_rows(&rows, frame.width, frame.height))
    }
}
