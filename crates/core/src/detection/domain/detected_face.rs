//! One face as reported by the expression adapter for a single tick.
//!
//! Landmarks follow the 478-point face mesh topology (468 mesh points plus
//! 10 iris points). Only a handful of indices carry meaning in this crate.

use std::collections::HashMap;

/// Total landmark count of the face mesh with iris refinement.
pub const LANDMARK_COUNT: usize = 478;

pub const NOSE_TIP: usize = 1;
pub const MOUTH_CENTER: usize = 13;
pub const LEFT_CHEEKBONE: usize = 234;
pub const RIGHT_CHEEKBONE: usize = 454;
pub const LEFT_EYE: usize = 468;
pub const RIGHT_EYE: usize = 473;

/// A 2D point in normalized frame coordinates (`0..1`, origin top-left).
///
/// `(0, 0)` doubles as the "no face" marker in shader inputs.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct NormalizedPoint {
    pub x: f32,
    pub y: f32,
}

impl NormalizedPoint {
    pub const ORIGIN: NormalizedPoint = NormalizedPoint { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn is_origin(&self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }

    pub fn distance(&self, other: NormalizedPoint) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectedFace {
    landmarks: Vec<NormalizedPoint>,
    /// Scores are clamped to `[0, 1]` on construction.
    blendshapes: HashMap<String, f32>,
}

impl DetectedFace {
    pub fn new(landmarks: Vec<NormalizedPoint>, blendshapes: HashMap<String, f32>) -> Self {
        let blendshapes = blendshapes
            .into_iter()
            .map(|(name, score)| (name, sanitize_score(score)))
            .collect();
        Self {
            landmarks,
            blendshapes,
        }
    }

    pub fn landmarks(&self) -> &[NormalizedPoint] {
        &self.landmarks
    }

    pub fn landmark(&self, index: usize) -> Option<NormalizedPoint> {
        self.landmarks.get(index).copied()
    }

    pub fn blendshapes(&self) -> &HashMap<String, f32> {
        &self.blendshapes
    }

    pub fn blendshape(&self, name: &str) -> Option<f32> {
        self.blendshapes.get(name).copied()
    }

    /// Horizontal face centre: cheekbone midpoint, falling back to the nose tip.
    pub fn horizontal_center(&self) -> Option<f32> {
        match (self.landmark(LEFT_CHEEKBONE), self.landmark(RIGHT_CHEEKBONE)) {
            (Some(l), Some(r)) => Some((l.x + r.x) / 2.0),
            _ => self.landmark(NOSE_TIP).map(|p| p.x),
        }
    }
}

fn sanitize_score(score: f32) -> f32 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn mesh_with(points: &[(usize, f32, f32)]) -> Vec<NormalizedPoint> {
        let mut mesh = vec![NormalizedPoint::new(0.5, 0.5); LANDMARK_COUNT];
        for &(i, x, y) in points {
            mesh[i] = NormalizedPoint::new(x, y);
        }
        mesh
    }

    #[test]
    fn test_blendshape_scores_are_clamped() {
        let mut scores = HashMap::new();
        scores.insert("mouthSmileLeft".to_string(), 1.4);
        scores.insert("mouthSmileRight".to_string(), -0.2);
        scores.insert("jawOpen".to_string(), f32::NAN);
        let face = DetectedFace::new(vec![], scores);
        assert_eq!(face.blendshape("mouthSmileLeft"), Some(1.0));
        assert_eq!(face.blendshape("mouthSmileRight"), Some(0.0));
        assert_eq!(face.blendshape("jawOpen"), Some(0.0));
        assert_eq!(face.blendshape("cheekPuff"), None);
    }

    #[test]
    fn test_landmark_out_of_range_is_none() {
        let face = DetectedFace::new(vec![NormalizedPoint::new(0.1, 0.2); 468], HashMap::new());
        assert!(face.landmark(NOSE_TIP).is_some());
        assert!(face.landmark(LEFT_EYE).is_none());
    }

    #[test]
    fn test_horizontal_center_uses_cheekbones() {
        let face = DetectedFace::new(
            mesh_with(&[(LEFT_CHEEKBONE, 0.2, 0.5), (RIGHT_CHEEKBONE, 0.4, 0.5), (NOSE_TIP, 0.9, 0.5)]),
            HashMap::new(),
        );
        assert_relative_eq!(face.horizontal_center().unwrap(), 0.3);
    }

    #[test]
    fn test_horizontal_center_falls_back_to_nose() {
        let mut short = vec![NormalizedPoint::ORIGIN; 10];
        short[NOSE_TIP] = NormalizedPoint::new(0.7, 0.4);
        let face = DetectedFace::new(short, HashMap::new());
        assert_relative_eq!(face.horizontal_center().unwrap(), 0.7);
    }

    #[test]
    fn test_horizontal_center_empty_face_is_none() {
        assert!(DetectedFace::default().horizontal_center().is_none());
    }

    #[test]
    fn test_origin_marker() {
        assert!(NormalizedPoint::ORIGIN.is_origin());
        assert!(!NormalizedPoint::new(0.0, 0.1).is_origin());
    }

    #[test]
    fn test_distance() {
        let a = NormalizedPoint::new(0.0, 0.0);
        let b = NormalizedPoint::new(0.3, 0.4);
        assert_relative_eq!(a.distance(b), 0.5, epsilon = 1e-6);
    }
}
