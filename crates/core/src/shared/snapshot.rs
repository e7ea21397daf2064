use std::path::Path;

use crate::shared::frame::Frame;

/// Save a rendered frame to disk; the format follows the file extension.
pub fn save_frame(frame: &Frame, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let (w, h) = (frame.width(), frame.height());
    match frame.channels() {
        3 => {
            let img = image::RgbImage::from_raw(w, h, frame.data().to_vec())
                .ok_or("frame buffer does not match its dimensions")?;
            img.save(path)?;
        }
        4 => {
            let img = image::RgbaImage::from_raw(w, h, frame.data().to_vec())
                .ok_or("frame buffer does not match its dimensions")?;
            img.save(path)?;
        }
        c => return Err(format!("unsupported channel count for snapshot: {c}").into()),
    }
    log::info!("Snapshot written to {}", path.display());
    Ok(())
}
