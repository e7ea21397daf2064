//! BlazeFace short-range face detector using ONNX Runtime via `ort`.
//!
//! First stage of the expression pipeline: finds face boxes that the mesh
//! model then crops around.

use std::path::Path;

use crate::detection::infrastructure::onnx_session::{
    build_session, image_tensor, input_geometry, sigmoid, CropRect, TensorLayout,
};
use crate::shared::frame::Frame;

/// BlazeFace model input resolution.
const INPUT_SIZE: u32 = 128;

pub const DEFAULT_CONFIDENCE: f32 = 0.5;

const NMS_IOU_THRESH: f32 = 0.3;

/// Number of BlazeFace anchors (short-range model).
const NUM_ANCHORS: usize = 896;

/// Values per anchor in the regressor output: box (4) + six keypoints (12).
const REGRESSOR_STRIDE: usize = 16;

/// Face box in normalized frame coordinates, `(x1, y1)` top-left.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FaceBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub score: f32,
}

impl FaceBox {
    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    fn iou(&self, other: &FaceBox) -> f32 {
        let x1 = self.x1.max(other.x1);
        let y1 = self.y1.max(other.y1);
        let x2 = self.x2.min(other.x2);
        let y2 = self.y2.min(other.y2);

        let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        if inter == 0.0 {
            return 0.0;
        }
        let area_a = self.width() * self.height();
        let area_b = other.width() * other.height();
        inter / (area_a + area_b - inter)
    }
}

pub struct OnnxBlazefaceDetector {
    session: ort::session::Session,
    layout: TensorLayout,
    confidence: f32,
    anchors: Vec<[f32; 2]>,
}

impl OnnxBlazefaceDetector {
    pub fn new(model_path: &Path, confidence: f32) -> Result<Self, Box<dyn std::error::Error>> {
        let session = build_session(model_path)?;
        let (layout, size) = input_geometry(&session, INPUT_SIZE);
        if size != INPUT_SIZE {
            return Err(format!(
                "BlazeFace model expects {INPUT_SIZE}x{INPUT_SIZE} input, got {size}x{size}"
            )
            .into());
        }
        Ok(Self {
            session,
            layout,
            confidence,
            anchors: generate_anchors(),
        })
    }

    /// Detect faces, highest score first.
    pub fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceBox>, Box<dyn std::error::Error>> {
        // The frame is letterboxed into a square so the aspect ratio survives
        let crop = CropRect::full_frame(frame);
        let input_tensor = image_tensor(frame, crop, INPUT_SIZE, self.layout, (-1.0, 1.0));

        let input_value = ort::value::Tensor::from_array(input_tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;

        // - regressors: [1, 896, 16]
        // - classificators: [1, 896, 1]
        if outputs.len() < 2 {
            return Err(
                format!("BlazeFace model expected 2 outputs, got {}", outputs.len()).into(),
            );
        }

        let regressors = outputs[0].try_extract_array::<f32>()?;
        let scores = outputs[1].try_extract_array::<f32>()?;
        let reg_data = regressors.as_slice().ok_or("Cannot get regressor slice")?;
        let score_data = scores.as_slice().ok_or("Cannot get score slice")?;

        let mut raw = decode(
            reg_data,
            score_data,
            &self.anchors,
            self.confidence,
            letterbox_scale(frame),
        );
        Ok(nms(&mut raw, NMS_IOU_THRESH))
    }
}

/// Ratio of the letterbox square to each frame axis.
fn letterbox_scale(frame: &Frame) -> (f32, f32) {
    let side = frame.width().max(frame.height()) as f32;
    (side / frame.width() as f32, side / frame.height() as f32)
}

fn decode(
    reg_data: &[f32],
    score_data: &[f32],
    anchors: &[[f32; 2]],
    confidence: f32,
    (sx, sy): (f32, f32),
) -> Vec<FaceBox> {
    let mut dets = Vec::new();
    let num_anchors = anchors.len().min(NUM_ANCHORS);

    for (i, &raw_score) in score_data.iter().enumerate().take(num_anchors) {
        let score = sigmoid(raw_score);
        if score < confidence {
            continue;
        }

        let offset = i * REGRESSOR_STRIDE;
        if offset + 4 > reg_data.len() {
            break;
        }

        let anchor = anchors[i];
        let cx = anchor[0] + reg_data[offset] / INPUT_SIZE as f32;
        let cy = anchor[1] + reg_data[offset + 1] / INPUT_SIZE as f32;
        let w = reg_data[offset + 2] / INPUT_SIZE as f32;
        let h = reg_data[offset + 3] / INPUT_SIZE as f32;

        // Letterbox square -> frame-normalized
        dets.push(FaceBox {
            x1: ((cx - w / 2.0) * sx).clamp(0.0, 1.0),
            y1: ((cy - h / 2.0) * sy).clamp(0.0, 1.0),
            x2: ((cx + w / 2.0) * sx).clamp(0.0, 1.0),
            y2: ((cy + h / 2.0) * sy).clamp(0.0, 1.0),
            score,
        });
    }

    dets
}

/// Short-range anchors: a 16x16 grid with 2 anchors per cell followed by an
/// 8x8 grid with 6 per cell.
fn generate_anchors() -> Vec<[f32; 2]> {
    let strides = [(8, 2), (16, 6)]; // (stride, anchors_per_cell)
    let mut anchors = Vec::with_capacity(NUM_ANCHORS);

    for &(stride, num) in &strides {
        let grid_size = INPUT_SIZE as usize / stride;
        for y in 0..grid_size {
            for x in 0..grid_size {
                let cx = (x as f32 + 0.5) / grid_size as f32;
                let cy = (y as f32 + 0.5) / grid_size as f32;
                for _ in 0..num {
                    anchors.push([cx, cy]);
                }
            }
        }
    }

    anchors
}

fn nms(dets: &mut [FaceBox], iou_thresh: f32) -> Vec<FaceBox> {
    dets.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<FaceBox> = Vec::new();
    for det in dets.iter() {
        if keep.iter().all(|k| k.iou(det) <= iou_thresh) {
            keep.push(*det);
        }
    }
    keep
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn face_box(x1: f32, y1: f32, x2: f32, y2: f32, score: f32) -> FaceBox {
        FaceBox { x1, y1, x2, y2, score }
    }

    #[test]
    fn test_generate_anchors_count() {
        // 16x16 grid x 2 anchors + 8x8 grid x 6 anchors = 512 + 384 = 896
        assert_eq!(generate_anchors().len(), NUM_ANCHORS);
    }

    #[test]
    fn test_anchors_in_unit_range() {
        for a in &generate_anchors() {
            assert!(a[0] > 0.0 && a[0] < 1.0);
            assert!(a[1] > 0.0 && a[1] < 1.0);
        }
    }

    #[test]
    fn test_decode_filters_low_scores() {
        let anchors = vec![[0.5, 0.5], [0.25, 0.25]];
        let mut reg = vec![0.0f32; 2 * REGRESSOR_STRIDE];
        reg[2] = 32.0;
        reg[3] = 32.0;
        let scores = vec![5.0, -5.0];
        let dets = decode(&reg, &scores, &anchors, 0.5, (1.0, 1.0));
        assert_eq!(dets.len(), 1);
        assert_relative_eq!(dets[0].x1, 0.375);
        assert_relative_eq!(dets[0].x2, 0.625);
    }

    #[test]
    fn test_decode_undoes_letterbox() {
        // Wide frame: the square side equals the width, so y is stretched
        let anchors = vec![[0.5, 0.5]];
        let mut reg = vec![0.0f32; REGRESSOR_STRIDE];
        reg[2] = 32.0;
        reg[3] = 32.0;
        let dets = decode(&reg, &[5.0], &anchors, 0.5, (1.0, 2.0));
        assert_relative_eq!(dets[0].y1, 0.75);
        assert_relative_eq!(dets[0].y2, 1.0);
    }

    #[test]
    fn test_nms_suppresses_overlap_and_sorts_by_score() {
        let mut dets = vec![
            face_box(0.0, 0.0, 0.4, 0.4, 0.7),
            face_box(0.02, 0.02, 0.42, 0.42, 0.9),
            face_box(0.6, 0.6, 0.9, 0.9, 0.8),
        ];
        let kept = nms(&mut dets, 0.3);
        assert_eq!(kept.len(), 2);
        assert_relative_eq!(kept[0].score, 0.9);
        assert_relative_eq!(kept[1].score, 0.8);
    }

    #[test]
    fn test_letterbox_scale() {
        let frame = Frame::new(vec![0u8; 40 * 20 * 3], 40, 20, 3, 0);
        assert_eq!(letterbox_scale(&frame), (1.0, 2.0));
    }

    #[test]
    fn test_face_box_center() {
        let (cx, cy) = face_box(0.2, 0.4, 0.6, 0.8, 1.0).center();
        assert_relative_eq!(cx, 0.4, epsilon = 1e-6);
        assert_relative_eq!(cy, 0.6, epsilon = 1e-6);
    }
}
