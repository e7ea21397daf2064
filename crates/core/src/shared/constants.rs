pub const FACE_DETECTOR_MODEL_NAME: &str = "blazeface_short_range.onnx";
pub const FACE_MESH_MODEL_NAME: &str = "face_landmarks_detector.onnx";
pub const BLENDSHAPE_MODEL_NAME: &str = "face_blendshapes.onnx";

/// Environment variable holding a base URL that model files can be downloaded from.
pub const MODEL_URL_ENV: &str = "FACEOFF_MODEL_URL";

pub const MAX_HEALTH: f64 = 100.0;
pub const SMILE_THRESHOLD: f32 = 0.5;
pub const DAMAGE_RATE: f64 = 0.5;
pub const DAMAGE_MULTIPLIER: f64 = 5.0;

/// Elapsed-time counter period; reported seconds are `ticks / 10`.
pub const COUNTER_PERIOD_MS: u64 = 100;

/// Health below which the HUD flags a player as in danger.
pub const LOW_HEALTH: f64 = 30.0;

pub const DEFAULT_REFRESH_HZ: u32 = 60;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];
