//! Expression adapter built from three ONNX models: BlazeFace boxes, the
//! 478-point face mesh, and the 52-category blendshape regressor.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use ndarray::Array3;
use ort::session::Session;

use crate::detection::domain::detected_face::{DetectedFace, NormalizedPoint, LANDMARK_COUNT};
use crate::detection::domain::expression_detector::ExpressionDetector;
use crate::detection::infrastructure::onnx_blazeface_detector::{
    FaceBox, OnnxBlazefaceDetector, DEFAULT_CONFIDENCE,
};
use crate::detection::infrastructure::onnx_session::{
    build_session, image_tensor, input_geometry, sigmoid, CropRect, TensorLayout,
};
use crate::shared::frame::Frame;

const MESH_INPUT_SIZE: u32 = 256;

/// Crop side relative to the longer side of the detected box.
const CROP_SCALE: f32 = 1.5;

/// Mesh-only topology without iris refinement.
const MESH_ONLY_COUNT: usize = 468;

const PRESENCE_THRESHOLD: f32 = 0.5;

/// Category names in blendshape model output order.
pub const BLENDSHAPE_NAMES: [&str; 52] = [
    "_neutral",
    "browDownLeft",
    "browDownRight",
    "browInnerUp",
    "browOuterUpLeft",
    "browOuterUpRight",
    "cheekPuff",
    "cheekSquintLeft",
    "cheekSquintRight",
    "eyeBlinkLeft",
    "eyeBlinkRight",
    "eyeLookDownLeft",
    "eyeLookDownRight",
    "eyeLookInLeft",
    "eyeLookInRight",
    "eyeLookOutLeft",
    "eyeLookOutRight",
    "eyeLookUpLeft",
    "eyeLookUpRight",
    "eyeSquintLeft",
    "eyeSquintRight",
    "eyeWideLeft",
    "eyeWideRight",
    "jawForward",
    "jawLeft",
    "jawOpen",
    "jawRight",
    "mouthClose",
    "mouthDimpleLeft",
    "mouthDimpleRight",
    "mouthFrownLeft",
    "mouthFrownRight",
    "mouthFunnel",
    "mouthLeft",
    "mouthLowerDownLeft",
    "mouthLowerDownRight",
    "mouthPressLeft",
    "mouthPressRight",
    "mouthPucker",
    "mouthRight",
    "mouthRollLower",
    "mouthRollUpper",
    "mouthShrugLower",
    "mouthShrugUpper",
    "mouthSmileLeft",
    "mouthSmileRight",
    "mouthStretchLeft",
    "mouthStretchRight",
    "mouthUpperUpLeft",
    "mouthUpperUpRight",
    "noseSneerLeft",
    "noseSneerRight",
];

/// Landmarks fed to the blendshape model, in input order.
pub const BLENDSHAPE_LANDMARKS: [usize; 146] = [
    0, 1, 4, 5, 6, 7, 8, 10, 13, 14, 17, 21, 33, 37, 39, 40, 46, 52, 53, 54, 55, 58, 61, 63, 65,
    66, 67, 70, 78, 80, 81, 82, 84, 87, 88, 91, 93, 95, 103, 105, 107, 109, 127, 132, 133, 136,
    144, 145, 146, 148, 149, 150, 152, 153, 154, 155, 157, 158, 159, 160, 161, 162, 163, 168, 172,
    173, 176, 178, 181, 185, 191, 195, 197, 234, 246, 249, 251, 263, 267, 269, 270, 276, 282, 283,
    284, 285, 288, 291, 293, 295, 296, 297, 300, 308, 310, 311, 312, 314, 317, 318, 321, 323, 324,
    332, 334, 336, 338, 356, 361, 362, 365, 373, 374, 375, 377, 378, 379, 380, 381, 382, 384, 385,
    386, 387, 388, 389, 390, 397, 398, 400, 402, 405, 409, 415, 454, 466, 468, 469, 470, 471, 472,
    473, 474, 475, 476, 477,
];

#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    #[error("timestamp {current:?} does not advance past {previous:?}")]
    NonMonotonicTimestamp { previous: Duration, current: Duration },
    #[error("{model} model output has {actual} values, expected {expected}")]
    OutputShape {
        model: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Resolved model files for [`OnnxFaceLandmarker::load`].
#[derive(Clone, Debug)]
pub struct LandmarkerModels {
    pub face_detector: PathBuf,
    pub face_mesh: PathBuf,
    pub blendshapes: PathBuf,
}

pub struct OnnxFaceLandmarker {
    face_detector: OnnxBlazefaceDetector,
    mesh: Session,
    mesh_layout: TensorLayout,
    mesh_size: u32,
    blendshapes: Session,
    max_faces: usize,
    last_timestamp: Option<Duration>,
}

impl OnnxFaceLandmarker {
    pub fn load(
        models: &LandmarkerModels,
        max_faces: usize,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let face_detector = OnnxBlazefaceDetector::new(&models.face_detector, DEFAULT_CONFIDENCE)?;
        let mesh = build_session(&models.face_mesh)?;
        let (mesh_layout, mesh_size) = input_geometry(&mesh, MESH_INPUT_SIZE);
        let blendshapes = build_session(&models.blendshapes)?;
        log::debug!("Face mesh input: {mesh_size}x{mesh_size} {mesh_layout:?}");
        Ok(Self {
            face_detector,
            mesh,
            mesh_layout,
            mesh_size,
            blendshapes,
            max_faces: max_faces.max(1),
            last_timestamp: None,
        })
    }
}

impl ExpressionDetector for OnnxFaceLandmarker {
    fn detect(
        &mut self,
        frame: &Frame,
        timestamp: Duration,
    ) -> Result<Vec<DetectedFace>, Box<dyn std::error::Error>> {
        advance_timestamp(&mut self.last_timestamp, timestamp)?;

        let boxes = self.face_detector.detect(frame)?;
        let mut faces = Vec::with_capacity(self.max_faces);

        for face_box in boxes.iter().take(self.max_faces) {
            let crop = face_crop(face_box, frame.width(), frame.height());
            let Some(landmarks) =
                run_mesh(&mut self.mesh, frame, crop, self.mesh_size, self.mesh_layout)?
            else {
                continue;
            };
            let blendshapes = if landmarks.len() >= LANDMARK_COUNT {
                run_blendshapes(&mut self.blendshapes, &landmarks, frame.width(), frame.height())?
            } else {
                HashMap::new()
            };
            faces.push(DetectedFace::new(landmarks, blendshapes));
        }

        Ok(faces)
    }

    fn set_max_faces(&mut self, max_faces: usize) {
        self.max_faces = max_faces.max(1);
    }
}

fn advance_timestamp(last: &mut Option<Duration>, timestamp: Duration) -> Result<(), DetectError> {
    if let Some(previous) = *last {
        if timestamp <= previous {
            return Err(DetectError::NonMonotonicTimestamp {
                previous,
                current: timestamp,
            });
        }
    }
    *last = Some(timestamp);
    Ok(())
}

/// Square pixel crop centred on the box, [`CROP_SCALE`] times its longer side.
fn face_crop(face_box: &FaceBox, frame_w: u32, frame_h: u32) -> CropRect {
    let (cx, cy) = face_box.center();
    let w = face_box.width() * frame_w as f32;
    let h = face_box.height() * frame_h as f32;
    let side = w.max(h) * CROP_SCALE;
    CropRect {
        x: cx * frame_w as f32 - side / 2.0,
        y: cy * frame_h as f32 - side / 2.0,
        side,
    }
}

/// Mesh landmarks in normalized frame coordinates, or `None` when the
/// presence score says the crop holds no face.
fn run_mesh(
    session: &mut Session,
    frame: &Frame,
    crop: CropRect,
    size: u32,
    layout: TensorLayout,
) -> Result<Option<Vec<NormalizedPoint>>, Box<dyn std::error::Error>> {
    let input = image_tensor(frame, crop, size, layout, (0.0, 1.0));
    let outputs = session.run(ort::inputs![ort::value::Tensor::from_array(input)?])?;

    let mut coords: Option<Vec<f32>> = None;
    let mut presence: Option<f32> = None;
    for i in 0..outputs.len() {
        let values: Vec<f32> = outputs[i].try_extract_array::<f32>()?.iter().copied().collect();
        match values.len() {
            n if n == LANDMARK_COUNT * 3 || n == MESH_ONLY_COUNT * 3 => coords = Some(values),
            1 => presence = Some(values[0]),
            _ => {}
        }
    }

    let coords = coords.ok_or(DetectError::OutputShape {
        model: "face mesh",
        expected: LANDMARK_COUNT * 3,
        actual: 0,
    })?;
    if presence.is_some_and(|logit| sigmoid(logit) < PRESENCE_THRESHOLD) {
        return Ok(None);
    }

    Ok(Some(crop_to_frame(&coords, crop, size, frame.width(), frame.height())))
}

/// Map `(x, y, z)` triples in crop-input pixels to normalized frame points.
fn crop_to_frame(
    coords: &[f32],
    crop: CropRect,
    size: u32,
    frame_w: u32,
    frame_h: u32,
) -> Vec<NormalizedPoint> {
    let scale = crop.side / size as f32;
    coords
        .chunks_exact(3)
        .map(|p| {
            NormalizedPoint::new(
                (crop.x + p[0] * scale) / frame_w as f32,
                (crop.y + p[1] * scale) / frame_h as f32,
            )
        })
        .collect()
}

fn blendshape_input(landmarks: &[NormalizedPoint], frame_w: u32, frame_h: u32) -> Array3<f32> {
    let mut input = Array3::<f32>::zeros((1, BLENDSHAPE_LANDMARKS.len(), 2));
    for (row, &index) in BLENDSHAPE_LANDMARKS.iter().enumerate() {
        let point = landmarks[index];
        input[[0, row, 0]] = point.x * frame_w as f32;
        input[[0, row, 1]] = point.y * frame_h as f32;
    }
    input
}

fn run_blendshapes(
    session: &mut Session,
    landmarks: &[NormalizedPoint],
    frame_w: u32,
    frame_h: u32,
) -> Result<HashMap<String, f32>, Box<dyn std::error::Error>> {
    let input = blendshape_input(landmarks, frame_w, frame_h);
    let outputs = session.run(ort::inputs![ort::value::Tensor::from_array(input)?])?;
    let scores = outputs[0].try_extract_array::<f32>()?;
    if scores.len() != BLENDSHAPE_NAMES.len() {
        return Err(DetectError::OutputShape {
            model: "blendshape",
            expected: BLENDSHAPE_NAMES.len(),
            actual: scores.len(),
        }
        .into());
    }
    Ok(BLENDSHAPE_NAMES
        .iter()
        .zip(scores.iter())
        .map(|(name, &score)| (name.to_string(), score))
        .collect())
}
