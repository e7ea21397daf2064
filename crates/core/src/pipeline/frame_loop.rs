//! One perception → render pass per tick.
//!
//! The loop never blocks on readiness: a tick whose detector or video
//! source is not ready yet is skipped, and any detection or render failure
//! abandons only that tick. It never touches game state; the host feeds
//! [`TickOutput::smiles`] into the game session.

use std::time::{Duration, Instant};

use crate::detection::domain::detected_face::DetectedFace;
use crate::detection::domain::player_assignment::PlayerAssigner;
use crate::detection::domain::smile_estimator::SmileScores;
use crate::detection::infrastructure::deferred_detector::DeferredDetector;
use crate::distortion::domain::distortion_state::{
    DistortionConfig, DistortionState, IntensityOscillator,
};
use crate::distortion::domain::frame_distorter::FrameDistorter;
use crate::pipeline::pipeline_logger::PipelineLogger;
use crate::shared::frame::Frame;
use crate::video::domain::video_source::VideoSource;

/// Log the first abandoned tick, then one in this many.
const ABANDON_LOG_EVERY: u64 = 100;

/// Smallest step between detector timestamps.
const MIN_TIMESTAMP_STEP: Duration = Duration::from_micros(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    DetectorPending,
    SourcePending,
    /// The latest frame sits at playback position zero.
    NoPlaybackPosition,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::DetectorPending => "detector pending",
            SkipReason::SourcePending => "source pending",
            SkipReason::NoPlaybackPosition => "no playback position",
        }
    }
}

/// Everything one tick derived from a single detection set.
#[derive(Clone, Debug)]
pub struct TickOutput {
    pub faces: Vec<DetectedFace>,
    pub smiles: SmileScores,
    pub distortion: DistortionState,
    pub rendered: Frame,
}

#[derive(Clone, Debug)]
pub enum TickOutcome {
    Skipped(SkipReason),
    Processed(TickOutput),
    /// Detection or rendering failed; prior values stay in effect.
    Abandoned(String),
}

pub struct FrameLoop {
    source: Box<dyn VideoSource>,
    detector: DeferredDetector,
    assigner: Box<dyn PlayerAssigner>,
    distorter: Box<dyn FrameDistorter>,
    logger: Box<dyn PipelineLogger>,
    anchor_landmark: usize,
    oscillator: IntensityOscillator,
    started: Instant,
    last_timestamp: Option<Duration>,
    processed: u64,
    abandoned: u64,
}

impl FrameLoop {
    pub fn new(
        source: Box<dyn VideoSource>,
        detector: DeferredDetector,
        assigner: Box<dyn PlayerAssigner>,
        distorter: Box<dyn FrameDistorter>,
        logger: Box<dyn PipelineLogger>,
        config: &DistortionConfig,
    ) -> Self {
        Self {
            source,
            detector,
            assigner,
            distorter,
            logger,
            anchor_landmark: config.anchor_landmark,
            oscillator: IntensityOscillator::new(config),
            started: Instant::now(),
            last_timestamp: None,
            processed: 0,
            abandoned: 0,
        }
    }

    /// Follows the game mode: 1 face for single player, 2 for versus.
    pub fn set_max_faces(&mut self, max_faces: usize) {
        self.detector.set_max_faces(max_faces);
    }

    pub fn is_detector_ready(&self) -> bool {
        self.detector.is_ready()
    }

    pub fn detector_error(&self) -> Option<&str> {
        self.detector.load_error()
    }

    pub fn is_source_ready(&self) -> bool {
        self.source.is_ready()
    }

    pub fn is_source_finished(&self) -> bool {
        self.source.is_finished()
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    pub fn abandoned(&self) -> u64 {
        self.abandoned
    }

    pub fn summary(&self) {
        self.logger.summary();
    }

    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        let Some(detector) = self.detector.poll() else {
            return self.skip(SkipReason::DetectorPending);
        };
        if !self.source.is_ready() {
            return self.skip(SkipReason::SourcePending);
        }
        let Some(frame) = self.source.latest_frame() else {
            return self.skip(SkipReason::SourcePending);
        };
        if !frame.has_playback_position() {
            return self.skip(SkipReason::NoPlaybackPosition);
        }

        let elapsed = now.saturating_duration_since(self.started);
        let timestamp = match self.last_timestamp {
            Some(last) if elapsed <= last => last + MIN_TIMESTAMP_STEP,
            _ => elapsed,
        };
        self.last_timestamp = Some(timestamp);

        let t0 = Instant::now();
        let faces = match detector.detect(frame, timestamp) {
            Ok(faces) => faces,
            Err(e) => return self.abandon(format!("detection failed: {e}")),
        };
        self.logger.timing("detect", ms_since(t0));
        self.logger.metric("faces", faces.len() as f64);

        // Smiles and distortion both come from this one assignment
        let assignment = self.assigner.assign(&faces);
        let smiles = SmileScores::from_assignment(&assignment);
        let distortion = DistortionState::from_assignment(
            &assignment,
            self.anchor_landmark,
            self.oscillator.at(elapsed),
        );

        let t0 = Instant::now();
        let rendered = match self.distorter.distort(frame, &distortion) {
            Ok(rendered) => rendered,
            Err(e) => return self.abandon(format!("render failed: {e}")),
        };
        self.logger.timing("render", ms_since(t0));

        self.processed += 1;
        self.logger.tick(self.processed);
        TickOutcome::Processed(TickOutput {
            faces,
            smiles,
            distortion,
            rendered,
        })
    }

    fn skip(&mut self, reason: SkipReason) -> TickOutcome {
        self.logger.skipped(reason.as_str());
        TickOutcome::Skipped(reason)
    }

    fn abandon(&mut self, message: String) -> TickOutcome {
        self.abandoned += 1;
        if self.abandoned == 1 || self.abandoned % ABANDON_LOG_EVERY == 0 {
            log::warn!("Tick abandoned ({} so far): {message}", self.abandoned);
        }
        self.logger.skipped("abandoned");
        TickOutcome::Abandoned(message)
    }
}

fn ms_since(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::detected_face::{NormalizedPoint, LANDMARK_COUNT, NOSE_TIP};
    use crate::detection::domain::expression_detector::ExpressionDetector;
    use crate::detection::domain::player_assignment::{HorizontalAssigner, PositionalAssigner};
    use crate::detection::domain::smile_estimator::{SMILE_LEFT, SMILE_RIGHT};
    use crate::distortion::infrastructure::cpu_bulge_distorter::CpuBulgeDistorter;
    use crate::game::domain::game_config::{GameConfig, GameMode};
    use crate::game::domain::game_session::{GameCommand, GameSession, GameState};
    use crate::pipeline::pipeline_logger::NullPipelineLogger;
    use crate::shared::player_slot::PlayerSlot;
    use approx::assert_relative_eq;
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Arc, Mutex};

    struct FakeSource {
        ready: bool,
        frame: Option<Frame>,
    }

    impl FakeSource {
        fn with_frame(timestamp: Duration) -> Self {
            let frame = Frame::new(vec![90u8; 32 * 24 * 3], 32, 24, 3, 1).with_timestamp(timestamp);
            Self {
                ready: true,
                frame: Some(frame),
            }
        }
    }

    impl VideoSource for FakeSource {
        fn is_ready(&self) -> bool {
            self.ready
        }

        fn latest_frame(&mut self) -> Option<&Frame> {
            self.frame.as_ref()
        }

        fn is_finished(&self) -> bool {
            false
        }
    }

    type Script = VecDeque<Result<Vec<DetectedFace>, String>>;

    /// Replays canned results; records each timestamp it is called with.
    struct ScriptedDetector {
        script: Script,
        calls: Arc<Mutex<Vec<Duration>>>,
    }

    impl ExpressionDetector for ScriptedDetector {
        fn detect(
            &mut self,
            _frame: &Frame,
            timestamp: Duration,
        ) -> Result<Vec<DetectedFace>, Box<dyn std::error::Error>> {
            self.calls.lock().unwrap().push(timestamp);
            match self.script.pop_front() {
                Some(Ok(faces)) => Ok(faces),
                Some(Err(e)) => Err(e.into()),
                None => Ok(vec![]),
            }
        }

        fn set_max_faces(&mut self, _max_faces: usize) {}
    }

    struct FailingDistorter;

    impl FrameDistorter for FailingDistorter {
        fn distort(
            &mut self,
            _frame: &Frame,
            _state: &DistortionState,
        ) -> Result<Frame, Box<dyn std::error::Error>> {
            Err("device lost".into())
        }
    }

    fn face(nose_x: f32, smile: f32) -> DetectedFace {
        let mut landmarks = vec![NormalizedPoint::new(0.5, 0.5); LANDMARK_COUNT];
        landmarks[NOSE_TIP] = NormalizedPoint::new(nose_x, 0.4);
        let blendshapes = HashMap::from([
            (SMILE_LEFT.to_string(), smile),
            (SMILE_RIGHT.to_string(), smile),
        ]);
        DetectedFace::new(landmarks, blendshapes)
    }

    fn build(
        source: FakeSource,
        script: Script,
        distorter: Box<dyn FrameDistorter>,
    ) -> (FrameLoop, Arc<Mutex<Vec<Duration>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let detector = ScriptedDetector {
            script,
            calls: calls.clone(),
        };
        let frame_loop = FrameLoop::new(
            Box::new(source),
            DeferredDetector::ready(Box::new(detector)),
            Box::new(PositionalAssigner),
            distorter,
            Box::new(NullPipelineLogger),
            &DistortionConfig::default(),
        );
        (frame_loop, calls)
    }

    fn cpu() -> Box<dyn FrameDistorter> {
        Box::new(CpuBulgeDistorter::new(DistortionConfig::default().radius))
    }

    fn expect_processed(outcome: TickOutcome) -> TickOutput {
        match outcome {
            TickOutcome::Processed(out) => out,
            other => panic!("expected processed tick, got {other:?}"),
        }
    }

    #[test]
    fn test_pending_detector_skips_without_touching_source() {
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);
        let detector = DeferredDetector::spawn(move || {
            let _ = release_rx.recv();
            Err("never loads".into())
        });
        let mut frame_loop = FrameLoop::new(
            Box::new(FakeSource::with_frame(Duration::from_millis(40))),
            detector,
            Box::new(PositionalAssigner),
            cpu(),
            Box::new(NullPipelineLogger),
            &DistortionConfig::default(),
        );
        for _ in 0..3 {
            assert!(matches!(
                frame_loop.tick(Instant::now()),
                TickOutcome::Skipped(SkipReason::DetectorPending)
            ));
        }
        assert_eq!(frame_loop.processed(), 0);
        drop(release_tx);
    }

    #[test]
    fn test_unready_source_skips() {
        let source = FakeSource {
            ready: false,
            frame: None,
        };
        let (mut frame_loop, calls) = build(source, Script::new(), cpu());
        assert!(matches!(
            frame_loop.tick(Instant::now()),
            TickOutcome::Skipped(SkipReason::SourcePending)
        ));
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_frame_at_position_zero_skips() {
        let (mut frame_loop, calls) = build(FakeSource::with_frame(Duration::ZERO), Script::new(), cpu());
        assert!(matches!(
            frame_loop.tick(Instant::now()),
            TickOutcome::Skipped(SkipReason::NoPlaybackPosition)
        ));
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_processed_tick_derives_smiles_and_centers_from_same_faces() {
        let script = Script::from([Ok(vec![face(0.3, 0.9), face(0.7, 0.2)])]);
        let (mut frame_loop, calls) = build(FakeSource::with_frame(Duration::from_millis(33)), script, cpu());

        let out = expect_processed(frame_loop.tick(Instant::now()));
        assert_eq!(calls.lock().unwrap().len(), 1);
        assert_eq!(out.faces.len(), 2);
        assert_relative_eq!(out.smiles.get(PlayerSlot::P1), 0.9);
        assert_relative_eq!(out.smiles.get(PlayerSlot::P2), 0.2);
        assert_eq!(out.distortion.centers()[0], NormalizedPoint::new(0.3, 0.4));
        assert_eq!(out.distortion.centers()[1], NormalizedPoint::new(0.7, 0.4));
        let intensity = out.distortion.intensity();
        assert!((0.2..=0.6).contains(&intensity));
        assert_eq!((out.rendered.width(), out.rendered.height()), (32, 24));
        assert_eq!(frame_loop.processed(), 1);
    }

    #[test]
    fn test_no_faces_zero_smiles_and_no_centers() {
        let (mut frame_loop, _) = build(
            FakeSource::with_frame(Duration::from_millis(33)),
            Script::from([Ok(vec![])]),
            cpu(),
        );
        let out = expect_processed(frame_loop.tick(Instant::now()));
        assert_eq!(out.smiles, SmileScores::default());
        assert!(out.distortion.is_identity());
    }

    #[test]
    fn test_detection_failure_abandons_tick_and_loop_continues() {
        let script = Script::from([Err("inference crashed".to_string()), Ok(vec![face(0.5, 1.0)])]);
        let (mut frame_loop, _) = build(FakeSource::with_frame(Duration::from_millis(33)), script, cpu());

        match frame_loop.tick(Instant::now()) {
            TickOutcome::Abandoned(message) => assert!(message.contains("inference crashed")),
            other => panic!("expected abandoned tick, got {other:?}"),
        }
        let out = expect_processed(frame_loop.tick(Instant::now()));
        assert_relative_eq!(out.smiles.get(PlayerSlot::P1), 1.0);
        assert_eq!(frame_loop.abandoned(), 1);
    }

    #[test]
    fn test_render_failure_abandons_tick() {
        let (mut frame_loop, _) = build(
            FakeSource::with_frame(Duration::from_millis(33)),
            Script::from([Ok(vec![face(0.5, 1.0)])]),
            Box::new(FailingDistorter),
        );
        assert!(matches!(frame_loop.tick(Instant::now()), TickOutcome::Abandoned(_)));
        assert_eq!(frame_loop.processed(), 0);
    }

    #[test]
    fn test_detector_timestamps_strictly_increase() {
        let (mut frame_loop, calls) = build(FakeSource::with_frame(Duration::from_millis(33)), Script::new(), cpu());
        let now = Instant::now();
        for _ in 0..4 {
            frame_loop.tick(now);
        }
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 4);
        assert!(calls.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_horizontal_assigner_is_pluggable() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let detector = ScriptedDetector {
            script: Script::from([Ok(vec![face(0.8, 0.0), face(0.2, 1.0)])]),
            calls,
        };
        let mut frame_loop = FrameLoop::new(
            Box::new(FakeSource::with_frame(Duration::from_millis(33))),
            DeferredDetector::ready(Box::new(detector)),
            Box::new(HorizontalAssigner::new(false)),
            cpu(),
            Box::new(NullPipelineLogger),
            &DistortionConfig::default(),
        );
        let out = expect_processed(frame_loop.tick(Instant::now()));
        // The left face smiles and is P1 despite arriving second
        assert_relative_eq!(out.smiles.get(PlayerSlot::P1), 1.0);
        assert_eq!(out.distortion.centers()[0].x, 0.2);
    }

    #[test]
    fn test_abandoned_tick_leaves_game_untouched() {
        let script = Script::from([
            Ok(vec![face(0.5, 1.0)]),
            Err("flaky".to_string()),
            Ok(vec![]),
        ]);
        let (mut frame_loop, _) = build(FakeSource::with_frame(Duration::from_millis(33)), script, cpu());
        let mut session = GameSession::new(GameConfig::default().with_mode(GameMode::Single));
        session.apply(GameCommand::Start);

        for _ in 0..3 {
            if let TickOutcome::Processed(out) = frame_loop.tick(Instant::now()) {
                session.apply(GameCommand::SmileScores(out.smiles));
            }
        }
        assert_relative_eq!(session.health(PlayerSlot::P1), 97.5);
        assert_eq!(session.state(), GameState::Playing);
        assert_eq!(session.smile(PlayerSlot::P1), 0.0);
    }
}
