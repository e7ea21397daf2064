use crate::shared::frame::Frame;

/// Domain interface for a live frame stream.
///
/// Frames are produced asynchronously; consumers only ever look at the most
/// recent one.
pub trait VideoSource: Send {
    /// True once the stream has delivered its first frame.
    fn is_ready(&self) -> bool;

    /// Most recent frame, or `None` before the first one arrives. Returns the
    /// same frame again until a newer one is available.
    fn latest_frame(&mut self) -> Option<&Frame>;

    /// True when the stream has ended and no further frames will arrive.
    fn is_finished(&self) -> bool;
}
