mod backend;
mod backends;
mod classes;
mod result;

use anyhow::Result;

pub use backend::DetectorBackend;
pub use backends::ScriptedBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use classes::{decode_ssd_rows, label_for_class, SSD_CLASSES};
pub use result::{BoundingBox, Detection};

use crate::config::DetectorSettings;

/// Build the detector backend named by the configuration.
///
/// A model path selects the ONNX backend; otherwise a script path selects the
/// scripted backend. With neither, the scripted backend runs empty, which
/// keeps the pipeline alive but never detects anything.
pub fn open_backend(settings: &DetectorSettings) -> Result<Box<dyn DetectorBackend>> {
    if let Some(model_path) = &settings.model_path {
        #[cfg(feature = "backend-tract")]
        {
            return Ok(Box::new(TractBackend::new(model_path)?));
        }
        #[cfg(not(feature = "backend-tract"))]
        {
            return Err(anyhow::anyhow!(
                "detector model {} requires the backend-tract feature",
                model_path.display()
            ));
        }
    }
    if let Some(script_path) = &settings.script_path {
        return Ok(Box::new(ScriptedBackend::from_json_file(script_path)?));
    }
    log::warn!("no detector configured; running with an empty scripted backend");
    Ok(Box::new(ScriptedBackend::default()))
}
