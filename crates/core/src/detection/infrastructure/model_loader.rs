//! Background loading of the ONNX expression models.

use std::path::PathBuf;

use crate::detection::domain::expression_detector::ExpressionDetector;
use crate::detection::infrastructure::deferred_detector::DeferredDetector;
use crate::detection::infrastructure::onnx_face_landmarker::{
    LandmarkerModels, OnnxFaceLandmarker,
};
use crate::shared::constants::{
    BLENDSHAPE_MODEL_NAME, FACE_DETECTOR_MODEL_NAME, FACE_MESH_MODEL_NAME,
};
use crate::shared::model_resolver::{self, ModelSource, ProgressFn};

/// Download progress reporter shared by the three model downloads.
pub type DownloadProgress = fn(u64, u64);

/// Resolve the face detector, mesh and blendshape models and load the
/// landmarker on a background thread. The returned handle stays pending
/// until all three are loaded.
pub fn spawn_onnx_detector(
    source: ModelSource,
    max_faces: usize,
    progress: Option<DownloadProgress>,
) -> DeferredDetector {
    DeferredDetector::spawn(move || {
        let models = LandmarkerModels {
            face_detector: resolve_model(FACE_DETECTOR_MODEL_NAME, &source, progress)?,
            face_mesh: resolve_model(FACE_MESH_MODEL_NAME, &source, progress)?,
            blendshapes: resolve_model(BLENDSHAPE_MODEL_NAME, &source, progress)?,
        };
        let detector: Box<dyn ExpressionDetector> =
            Box::new(OnnxFaceLandmarker::load(&models, max_faces)?);
        Ok(detector)
    })
}

fn resolve_model(
    name: &str,
    source: &ModelSource,
    progress: Option<DownloadProgress>,
) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let callback = progress.map(|report| Box::new(report) as ProgressFn);
    let path = model_resolver::resolve(name, source, callback)?;
    log::debug!("Model {name}: {}", path.display());
    Ok(path)
}
