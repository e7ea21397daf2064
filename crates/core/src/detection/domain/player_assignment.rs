use crate::detection::domain::detected_face::DetectedFace;
use crate::shared::player_slot::PlayerSlot;

/// Faces mapped to player slots for one tick. Recomputed every tick.
#[derive(Clone, Copy, Debug, Default)]
pub struct Assignment<'a> {
    slots: [Option<&'a DetectedFace>; 2],
}

impl<'a> Assignment<'a> {
    pub fn new(p1: Option<&'a DetectedFace>, p2: Option<&'a DetectedFace>) -> Self {
        Self { slots: [p1, p2] }
    }

    pub fn face(&self, slot: PlayerSlot) -> Option<&'a DetectedFace> {
        self.slots[slot.index()]
    }

    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

/// Maps an unordered detection set to stable player slots.
///
/// Implementations must leave a slot empty when there are not enough faces;
/// extra faces beyond two are ignored.
pub trait PlayerAssigner: Send {
    fn assign<'a>(&self, faces: &'a [DetectedFace]) -> Assignment<'a>;
}

/// Adapter output index 0 is P1, index 1 is P2.
///
/// Identity is purely positional: if the adapter reorders its detections
/// between ticks, the players swap.
#[derive(Clone, Copy, Debug, Default)]
pub struct PositionalAssigner;

impl PlayerAssigner for PositionalAssigner {
    fn assign<'a>(&self, faces: &'a [DetectedFace]) -> Assignment<'a> {
        Assignment::new(faces.first(), faces.get(1))
    }
}

/// Leftmost face (by horizontal face centre) is P1.
///
/// With `mirrored` set the comparison is flipped so that P1 is the player on
/// the left of a mirrored preview. Faces without a usable centre keep
/// adapter order behind those that have one.
#[derive(Clone, Copy, Debug, Default)]
pub struct HorizontalAssigner {
    mirrored: bool,
}

impl HorizontalAssigner {
    pub fn new(mirrored: bool) -> Self {
        Self { mirrored }
    }
}

impl PlayerAssigner for HorizontalAssigner {
    fn assign<'a>(&self, faces: &'a [DetectedFace]) -> Assignment<'a> {
        let mut ordered: Vec<(f32, &'a DetectedFace)> = faces
            .iter()
            .take(2)
            .map(|f| {
                let x = f.horizontal_center().unwrap_or(f32::INFINITY);
                let key = if self.mirrored && x.is_finite() { -x } else { x };
                (key, f)
            })
            .collect();
        ordered.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        let mut iter = ordered.into_iter().map(|(_, f)| f);
        Assignment::new(iter.next(), iter.next())
    }
}
