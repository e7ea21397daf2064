use std::env;

use faceoff_core::detection::domain::player_assignment::{
    HorizontalAssigner, PlayerAssigner, PositionalAssigner,
};
use faceoff_core::detection::infrastructure::model_loader::spawn_onnx_detector;
use faceoff_core::distortion::domain::distortion_state::DistortionConfig;
use faceoff_core::distortion::infrastructure::distorter_factory::create_distorter;
use faceoff_core::pipeline::frame_loop::FrameLoop;
use faceoff_core::pipeline::pipeline_logger::NullPipelineLogger;
use faceoff_core::shared::constants::MODEL_URL_ENV;
use faceoff_core::shared::model_resolver::ModelSource;
use faceoff_core::video::infrastructure::ffmpeg_video_source::{
    default_camera_format, FfmpegVideoSource, SourceSpec,
};

use crate::settings::{AssignmentPolicy, Settings};

/// Open the camera and wire up the frame loop. Models load in the
/// background; the loop skips ticks until they are ready.
pub fn build_frame_loop(settings: &Settings) -> Result<FrameLoop, Box<dyn std::error::Error>> {
    let source = FfmpegVideoSource::open(camera_spec(settings))?;
    let info = source.info();
    log::info!("Camera: {}x{} @ {:.1} fps", info.width, info.height, info.fps);

    let max_faces = settings.mode.game_mode().player_count();
    let detector = spawn_onnx_detector(model_source(settings), max_faces, None);
    let distortion = DistortionConfig::default();
    let distorter = create_distorter(settings.prefer_gpu, distortion.radius);

    let mut frame_loop = FrameLoop::new(
        Box::new(source),
        detector,
        assigner(settings),
        distorter,
        Box::new(NullPipelineLogger),
        &distortion,
    );
    frame_loop.set_max_faces(max_faces);
    Ok(frame_loop)
}

fn camera_spec(settings: &Settings) -> SourceSpec {
    SourceSpec::Camera {
        device: settings.camera_device.clone(),
        format: settings
            .camera_format
            .clone()
            .filter(|f| !f.is_empty())
            .unwrap_or_else(|| default_camera_format().to_string()),
    }
}

fn assigner(settings: &Settings) -> Box<dyn PlayerAssigner> {
    match settings.assignment {
        AssignmentPolicy::Positional => Box::new(PositionalAssigner),
        AssignmentPolicy::Horizontal => Box::new(HorizontalAssigner::new(settings.mirrored)),
    }
}

fn model_source(settings: &Settings) -> ModelSource {
    ModelSource {
        bundled_dir: settings.models_dir.clone(),
        base_url: env::var(MODEL_URL_ENV).ok().filter(|url| !url.is_empty()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_spec_uses_platform_format_by_default() {
        let settings = Settings {
            camera_device: "/dev/video1".into(),
            camera_format: Some(String::new()),
            ..Settings::default()
        };
        assert_eq!(
            camera_spec(&settings),
            SourceSpec::Camera {
                device: "/dev/video1".into(),
                format: default_camera_format().into(),
            }
        );
    }

    #[test]
    fn test_camera_spec_honours_explicit_format() {
        let settings = Settings {
            camera_format: Some("avfoundation".into()),
            ..Settings::default()
        };
        let SourceSpec::Camera { format, .. } = camera_spec(&settings) else {
            panic!("expected a camera source");
        };
        assert_eq!(format, "avfoundation");
    }

    #[test]
    fn test_model_source_uses_models_dir() {
        let settings = Settings {
            models_dir: Some("/opt/faceoff/models".into()),
            ..Settings::default()
        };
        assert_eq!(
            model_source(&settings).bundled_dir.as_deref(),
            Some(std::path::Path::new("/opt/faceoff/models"))
        );
    }
}
