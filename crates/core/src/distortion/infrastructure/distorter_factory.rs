use crate::distortion::domain::frame_distorter::FrameDistorter;

use super::cpu_bulge_distorter::CpuBulgeDistorter;
use super::gpu_bulge_distorter::GpuBulgeDistorter;
use super::gpu_context::GpuContext;

/// Creates the bulge renderer, preferring GPU when allowed and available.
///
/// Probes for a wgpu adapter once; falls back to the CPU renderer and
/// logs which backend is selected.
pub fn create_distorter(prefer_gpu: bool, radius: f32) -> Box<dyn FrameDistorter> {
    if prefer_gpu {
        if let Some(ctx) = GpuContext::new() {
            log::info!("Using GPU backend for bulge distortion (radius={radius})");
            return Box::new(GpuBulgeDistorter::new(ctx, radius));
        }
        log::info!("No GPU available, using CPU backend for bulge distortion (radius={radius})");
    } else {
        log::info!("Using CPU backend for bulge distortion (radius={radius})");
    }
    Box::new(CpuBulgeDistorter::new(radius))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::detected_face::NormalizedPoint;
    use crate::distortion::domain::distortion_state::{DistortionState, EFFECT_RADIUS};
    use crate::shared::frame::Frame;

    fn make_frame(width: u32, height: u32, value: u8) -> Frame {
        Frame::new(vec![value; (width * height * 3) as usize], width, height, 3, 0)
    }

    #[test]
    fn test_cpu_distorter_renders_rgba() {
        let mut distorter = create_distorter(false, EFFECT_RADIUS);
        let out = distorter
            .distort(&make_frame(20, 10, 90), &DistortionState::default())
            .unwrap();
        assert_eq!(out.channels(), 4);
        assert_eq!(out.data().len(), 20 * 10 * 4);
    }

    #[test]
    fn test_preferred_distorter_renders() {
        let mut distorter = create_distorter(true, EFFECT_RADIUS);
        let state = DistortionState::new([NormalizedPoint::new(0.5, 0.5), NormalizedPoint::ORIGIN], 0.5);
        let out = distorter.distort(&make_frame(32, 32, 128), &state).unwrap();
        // Uniform input stays uniform under any displacement
        assert!(out.data().chunks_exact(4).all(|px| px[0].abs_diff(128) <= 1));
    }
}
