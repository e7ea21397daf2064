//! Session construction and tensor packing shared by the ONNX adapters.

use std::path::Path;

use ndarray::Array4;
use ort::session::Session;

use crate::shared::frame::Frame;

/// Memory layout of a model's image input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TensorLayout {
    /// `[1, 3, H, W]`
    Nchw,
    /// `[1, H, W, 3]`
    Nhwc,
}

/// Square pixel region of a frame. May extend past the frame edges; samples
/// outside the frame read as black.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CropRect {
    pub x: f32,
    pub y: f32,
    pub side: f32,
}

impl CropRect {
    pub fn full_frame(frame: &Frame) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            side: frame.width().max(frame.height()) as f32,
        }
    }
}

/// Platform execution providers, best first. CPU is always the implicit fallback.
pub fn preferred_execution_providers() -> Vec<ort::execution_providers::ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    {
        vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
    }
    #[cfg(target_os = "windows")]
    {
        vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        vec![]
    }
}

pub fn build_session(model_path: &Path) -> Result<Session, Box<dyn std::error::Error>> {
    let session = Session::builder()?
        .with_execution_providers(preferred_execution_providers())?
        .commit_from_file(model_path)?;
    log::info!("Loaded model {}", model_path.display());
    Ok(session)
}

/// Input layout and square side length read from the first input tensor.
///
/// Dynamic or unreadable shapes fall back to NCHW at `default_size`.
pub fn input_geometry(session: &Session, default_size: u32) -> (TensorLayout, u32) {
    let shape: Option<Vec<i64>> = session.inputs().first().and_then(|input| {
        if let ort::value::ValueType::Tensor { ref shape, .. } = input.dtype() {
            Some(shape.iter().copied().collect())
        } else {
            None
        }
    });
    match shape.as_deref() {
        Some([_, 3, h, _]) if *h > 0 => (TensorLayout::Nchw, *h as u32),
        Some([_, h, _, 3]) if *h > 0 => (TensorLayout::Nhwc, *h as u32),
        Some([_, _, _, 3]) => (TensorLayout::Nhwc, default_size),
        _ => (TensorLayout::Nchw, default_size),
    }
}

/// Sample `crop` into a `size x size` float tensor, mapping bytes
/// `0..=255` linearly onto `range`.
pub fn image_tensor(
    frame: &Frame,
    crop: CropRect,
    size: u32,
    layout: TensorLayout,
    range: (f32, f32),
) -> Array4<f32> {
    let src = frame.as_ndarray();
    let src_w = frame.width() as i64;
    let src_h = frame.height() as i64;
    let s = size as usize;
    let scale = crop.side / size as f32;
    let (lo, hi) = range;

    let mut tensor = match layout {
        TensorLayout::Nchw => Array4::<f32>::from_elem((1, 3, s, s), lo),
        TensorLayout::Nhwc => Array4::<f32>::from_elem((1, s, s, 3), lo),
    };

    for y in 0..s {
        let src_y = (crop.y + (y as f32 + 0.5) * scale).floor() as i64;
        if src_y < 0 || src_y >= src_h {
            continue;
        }
        for x in 0..s {
            let src_x = (crop.x + (x as f32 + 0.5) * scale).floor() as i64;
            if src_x < 0 || src_x >= src_w {
                continue;
            }
            for c in 0..3 {
                let v = lo + src[[src_y as usize, src_x as usize, c]] as f32 / 255.0 * (hi - lo);
                match layout {
                    TensorLayout::Nchw => tensor[[0, c, y, x]] = v,
                    TensorLayout::Nhwc => tensor[[0, y, x, c]] = v,
                }
            }
        }
    }

    tensor
}

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
