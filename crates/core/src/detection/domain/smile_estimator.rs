use crate::detection::domain::detected_face::DetectedFace;
use crate::detection::domain::player_assignment::Assignment;
use crate::shared::player_slot::PlayerSlot;

pub const SMILE_LEFT: &str = "mouthSmileLeft";
pub const SMILE_RIGHT: &str = "mouthSmileRight";

/// Mean of the two mouth-corner smile blendshapes; a missing category scores 0.
pub fn smile_intensity(face: &DetectedFace) -> f32 {
    let left = face.blendshape(SMILE_LEFT).unwrap_or(0.0);
    let right = face.blendshape(SMILE_RIGHT).unwrap_or(0.0);
    ((left + right) / 2.0).clamp(0.0, 1.0)
}

/// Per-slot smile intensity for one tick. Unoccupied slots score exactly 0.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SmileScores {
    scores: [f32; 2],
}

impl SmileScores {
    pub fn new(p1: f32, p2: f32) -> Self {
        Self {
            scores: [p1.clamp(0.0, 1.0), p2.clamp(0.0, 1.0)],
        }
    }

    pub fn from_assignment(assignment: &Assignment<'_>) -> Self {
        let score = |slot| assignment.face(slot).map(smile_intensity).unwrap_or(0.0);
        Self::new(score(PlayerSlot::P1), score(PlayerSlot::P2))
    }

    pub fn get(&self, slot: PlayerSlot) -> f32 {
        self.scores[slot.index()]
    }
}
