use crate::distortion::domain::distortion_state::DistortionState;
use crate::shared::frame::Frame;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("unsupported channel count: {0}")]
    UnsupportedChannels(u8),
    #[error("frame has no pixels")]
    EmptyFrame,
    #[error("{width}x{height} frame exceeds the {max}px texture limit")]
    FrameTooLarge { width: u32, height: u32, max: u32 },
    #[error("failed to map readback buffer: {0}")]
    BufferMap(String),
    #[error("readback returned {actual} bytes, expected {expected}")]
    ReadbackSize { expected: usize, actual: usize },
}

/// Domain interface for rendering a video frame through the bulge effect.
///
/// Returns a new RGBA frame with the input's dimensions, index and timestamp.
pub trait FrameDistorter: Send {
    fn distort(
        &mut self,
        frame: &Frame,
        state: &DistortionState,
    ) -> Result<Frame, Box<dyn std::error::Error>>;
}
