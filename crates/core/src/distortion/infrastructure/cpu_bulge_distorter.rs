use crate::detection::domain::detected_face::NormalizedPoint;
use crate::distortion::domain::distortion_state::{displace, DistortionState};
use crate::distortion::domain::frame_distorter::{FrameDistorter, RenderError};
use crate::shared::frame::Frame;

/// CPU rendition of the bulge shader.
///
/// Samples with bilinear filtering and clamp-to-edge addressing at pixel
/// centres, matching the GPU sampler configuration.
pub struct CpuBulgeDistorter {
    radius: f32,
}

impl CpuBulgeDistorter {
    pub fn new(radius: f32) -> Self {
        Self { radius }
    }
}

impl FrameDistorter for CpuBulgeDistorter {
    fn distort(
        &mut self,
        frame: &Frame,
        state: &DistortionState,
    ) -> Result<Frame, Box<dyn std::error::Error>> {
        if !matches!(frame.channels(), 3 | 4) {
            return Err(RenderError::UnsupportedChannels(frame.channels()).into());
        }
        if frame.width() == 0 || frame.height() == 0 {
            return Err(RenderError::EmptyFrame.into());
        }

        let rgba = frame.to_rgba();
        let output = if state.is_identity() {
            rgba
        } else {
            render(&rgba, frame.width() as usize, frame.height() as usize, state, self.radius)
        };

        Ok(Frame::new(output, frame.width(), frame.height(), 4, frame.index())
            .with_timestamp(frame.timestamp()))
    }
}

fn render(src: &[u8], w: usize, h: usize, state: &DistortionState, radius: f32) -> Vec<u8> {
    let mut out = vec![0u8; w * h * 4];
    for y in 0..h {
        let v = (y as f32 + 0.5) / h as f32;
        for x in 0..w {
            let u = (x as f32 + 0.5) / w as f32;
            let uv = displace(NormalizedPoint::new(u, v), state, radius);
            let px = sample_bilinear(src, w, h, uv);
            let idx = (y * w + x) * 4;
            out[idx..idx + 4].copy_from_slice(&px);
        }
    }
    out
}

fn sample_bilinear(src: &[u8], w: usize, h: usize, uv: NormalizedPoint) -> [u8; 4] {
    let fx = (uv.x * w as f32 - 0.5).clamp(0.0, (w - 1) as f32);
    let fy = (uv.y * h as f32 - 0.5).clamp(0.0, (h - 1) as f32);
    let x0 = fx.floor() as usize;
    let y0 = fy.floor() as usize;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let tx = fx - x0 as f32;
    let ty = fy - y0 as f32;

    let at = |x: usize, y: usize, c: usize| src[(y * w + x) * 4 + c] as f32;
    let mut px = [0u8; 4];
    for (c, out) in px.iter_mut().enumerate() {
        let top = at(x0, y0, c) * (1.0 - tx) + at(x1, y0, c) * tx;
        let bottom = at(x0, y1, c) * (1.0 - tx) + at(x1, y1, c) * tx;
        *out = (top * (1.0 - ty) + bottom * ty).round().clamp(0.0, 255.0) as u8;
    }
    px
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distortion::domain::distortion_state::EFFECT_RADIUS;
    use std::time::Duration;

    /// Horizontal gradient so displacement along x changes pixel values.
    fn gradient_frame(w: u32, h: u32) -> Frame {
        let mut data = Vec::with_capacity((w * h * 3) as usize);
        for _y in 0..h {
            for x in 0..w {
                let v = (x * 255 / (w - 1)) as u8;
                data.extend_from_slice(&[v, 255 - v, 128]);
            }
        }
        Frame::new(data, w, h, 3, 7).with_timestamp(Duration::from_millis(500))
    }

    fn pixel(frame: &Frame, x: usize, y: usize) -> &[u8] {
        let idx = (y * frame.width() as usize + x) * 4;
        &frame.data()[idx..idx + 4]
    }

    #[test]
    fn test_no_face_passes_frame_through() {
        let frame = gradient_frame(32, 16);
        let mut distorter = CpuBulgeDistorter::new(EFFECT_RADIUS);
        let out = distorter.distort(&frame, &DistortionState::default()).unwrap();
        assert_eq!(out.channels(), 4);
        assert_eq!(out.data(), &frame.to_rgba()[..]);
        assert_eq!(out.index(), 7);
        assert_eq!(out.timestamp(), Duration::from_millis(500));
    }

    #[test]
    fn test_far_pixel_unaffected_near_pixel_displaced() {
        let frame = gradient_frame(64, 64);
        let reference = frame.to_rgba();
        let state = DistortionState::new(
            [NormalizedPoint::new(0.25, 0.5), NormalizedPoint::ORIGIN],
            0.6,
        );
        let out = CpuBulgeDistorter::new(EFFECT_RADIUS).distort(&frame, &state).unwrap();

        // Right edge lies outside the radius
        let far = (32 * 64 + 63) * 4;
        assert_eq!(pixel(&out, 63, 32), &reference[far..far + 4]);

        // Just right of the center samples closer to it, so red drops
        let near = (32 * 64 + 20) * 4;
        assert!(pixel(&out, 20, 32)[0] < reference[near]);
    }

    #[test]
    fn test_identical_pixels_at_exact_center() {
        let frame = gradient_frame(65, 65);
        let state = DistortionState::new(
            [NormalizedPoint::new(32.5 / 65.0, 32.5 / 65.0), NormalizedPoint::ORIGIN],
            0.6,
        );
        let out = CpuBulgeDistorter::new(EFFECT_RADIUS).distort(&frame, &state).unwrap();
        assert_eq!(pixel(&out, 32, 32), &frame.to_rgba()[(32 * 65 + 32) * 4..(32 * 65 + 32) * 4 + 4]);
    }

    #[test]
    fn test_rejects_single_channel() {
        let frame = Frame::new(vec![0u8; 4], 2, 2, 1, 0);
        let result = CpuBulgeDistorter::new(EFFECT_RADIUS).distort(&frame, &DistortionState::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_sample_bilinear_clamps_to_edge() {
        let src = vec![10, 20, 30, 255, 50, 60, 70, 255];
        assert_eq!(sample_bilinear(&src, 2, 1, NormalizedPoint::new(-1.0, 0.5)), [10, 20, 30, 255]);
        assert_eq!(sample_bilinear(&src, 2, 1, NormalizedPoint::new(2.0, 0.5)), [50, 60, 70, 255]);
        assert_eq!(sample_bilinear(&src, 2, 1, NormalizedPoint::new(0.5, 0.5)), [30, 40, 50, 255]);
    }
}
