use std::time::Duration;

use crate::detection::domain::detected_face::DetectedFace;
use crate::shared::frame::Frame;

/// Domain interface for the facial landmark / blendshape model.
///
/// Called at most once per tick. Faces come back in the model's internal
/// detection order, which is neither left-to-right nor stable across ticks.
/// `timestamp` must increase monotonically between calls.
pub trait ExpressionDetector: Send {
    fn detect(
        &mut self,
        frame: &Frame,
        timestamp: Duration,
    ) -> Result<Vec<DetectedFace>, Box<dyn std::error::Error>>;

    /// Number of simultaneous faces to report (1 or 2, following game mode).
    fn set_max_faces(&mut self, max_faces: usize);
}
