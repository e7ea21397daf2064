//! Shader inputs for the radial bulge effect and the reference math behind it.

use std::f32::consts::TAU;
use std::time::Duration;

use crate::detection::domain::detected_face::{NormalizedPoint, NOSE_TIP};
use crate::detection::domain::player_assignment::Assignment;
use crate::shared::player_slot::PlayerSlot;

pub const MAX_CENTERS: usize = 2;

/// Effect radius in normalized frame units.
pub const EFFECT_RADIUS: f32 = 0.35;

#[derive(Clone, Debug, PartialEq)]
pub struct DistortionConfig {
    pub radius: f32,
    pub period: Duration,
    pub min_intensity: f32,
    pub max_intensity: f32,
    /// Landmark index each center is taken from.
    pub anchor_landmark: usize,
}

impl Default for DistortionConfig {
    fn default() -> Self {
        Self {
            radius: EFFECT_RADIUS,
            period: Duration::from_millis(1250),
            min_intensity: 0.2,
            max_intensity: 0.6,
            anchor_landmark: NOSE_TIP,
        }
    }
}

/// Up to two bulge centers plus one shared intensity.
///
/// A center at exactly `(0, 0)` means "no face" and is skipped by both
/// renderers.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DistortionState {
    centers: [NormalizedPoint; MAX_CENTERS],
    intensity: f32,
}

impl DistortionState {
    pub fn new(centers: [NormalizedPoint; MAX_CENTERS], intensity: f32) -> Self {
        Self { centers, intensity }
    }

    /// Centers in slot order, taken from `anchor` on each assigned face.
    pub fn from_assignment(assignment: &Assignment<'_>, anchor: usize, intensity: f32) -> Self {
        let center = |slot| {
            assignment
                .face(slot)
                .and_then(|face| face.landmark(anchor))
                .unwrap_or(NormalizedPoint::ORIGIN)
        };
        Self::new([center(PlayerSlot::P1), center(PlayerSlot::P2)], intensity)
    }

    pub fn centers(&self) -> &[NormalizedPoint; MAX_CENTERS] {
        &self.centers
    }

    pub fn active_centers(&self) -> impl Iterator<Item = NormalizedPoint> + '_ {
        self.centers.iter().copied().filter(|c| !c.is_origin())
    }

    pub fn intensity(&self) -> f32 {
        self.intensity
    }

    /// True when rendering would reproduce the input unchanged.
    pub fn is_identity(&self) -> bool {
        self.intensity == 0.0 || self.active_centers().next().is_none()
    }
}

/// Sine oscillation of the effect magnitude over wall-clock time.
#[derive(Clone, Copy, Debug)]
pub struct IntensityOscillator {
    period: Duration,
    min: f32,
    max: f32,
}

impl IntensityOscillator {
    pub fn new(config: &DistortionConfig) -> Self {
        Self {
            period: config.period,
            min: config.min_intensity,
            max: config.max_intensity,
        }
    }

    pub fn at(&self, elapsed: Duration) -> f32 {
        let mid = (self.min + self.max) / 2.0;
        let amplitude = (self.max - self.min) / 2.0;
        let period = self.period.as_secs_f32();
        if period <= 0.0 {
            return mid;
        }
        mid + amplitude * (TAU * elapsed.as_secs_f32() / period).sin()
    }
}

/// Hermite falloff: 1 at the center, 0 at `radius` and beyond.
pub fn falloff(dist: f32, radius: f32) -> f32 {
    let t = ((dist - radius) / (0.0 - radius)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Sample coordinate for output pixel `uv`: each active center in index
/// order pulls the coordinate toward itself.
pub fn displace(uv: NormalizedPoint, state: &DistortionState, radius: f32) -> NormalizedPoint {
    let mut uv = uv;
    for center in state.active_centers() {
        let dist = uv.distance(center);
        if dist < radius {
            let amount = falloff(dist, radius) * state.intensity();
            uv.x -= (uv.x - center.x) * amount;
            uv.y -= (uv.y - center.y) * amount;
        }
    }
    uv
}
