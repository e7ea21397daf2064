use std::env;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::process;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use crossbeam_channel::Sender;

use faceoff_core::detection::domain::player_assignment::{
    HorizontalAssigner, PlayerAssigner, PositionalAssigner,
};
use faceoff_core::detection::infrastructure::model_loader::spawn_onnx_detector;
use faceoff_core::distortion::domain::distortion_state::DistortionConfig;
use faceoff_core::distortion::infrastructure::distorter_factory::create_distorter;
use faceoff_core::game::domain::game_config::{GameConfig, GameMode};
use faceoff_core::game::domain::game_session::{GameEvent, GameSession, GameSnapshot, GameState};
use faceoff_core::pipeline::frame_loop::{FrameLoop, TickOutcome};
use faceoff_core::pipeline::pipeline_logger::StdoutPipelineLogger;
use faceoff_core::pipeline::tick_scheduler::{HostCommand, SchedulerEvent, TickScheduler};
use faceoff_core::shared::constants::{DEFAULT_REFRESH_HZ, IMAGE_EXTENSIONS, MODEL_URL_ENV};
use faceoff_core::shared::frame::Frame;
use faceoff_core::shared::model_resolver::ModelSource;
use faceoff_core::shared::player_slot::PlayerSlot;
use faceoff_core::shared::snapshot::save_frame;
use faceoff_core::video::infrastructure::ffmpeg_video_source::{
    default_camera_format, FfmpegVideoSource, SourceSpec,
};

const LOGGER_THROTTLE_TICKS: u64 = 300;
const HUD_INTERVAL: Duration = Duration::from_secs(1);

/// Don't-laugh game against a camera or a video file, without a window.
///
/// Press Enter to (re)start a round, `q` then Enter to quit.
#[derive(Parser)]
#[command(name = "faceoff")]
struct Cli {
    /// Play against a video file instead of a camera.
    #[arg(long, conflicts_with = "camera")]
    input: Option<PathBuf>,

    /// Camera device, e.g. /dev/video0 (v4l2), 0 (avfoundation) or "video=Name" (dshow).
    #[arg(long)]
    camera: Option<String>,

    /// libavdevice input format; defaults to the platform capture API.
    #[arg(long)]
    camera_format: Option<String>,

    /// Number of players: 1 (single) or 2 (versus).
    #[arg(long, default_value = "1")]
    players: u8,

    /// How faces map to players: positional or horizontal.
    #[arg(long, default_value = "positional")]
    assignment: String,

    /// With horizontal assignment, treat the picture as a mirrored preview.
    #[arg(long)]
    mirrored: bool,

    /// Frame loop refresh rate in Hz.
    #[arg(long, default_value_t = DEFAULT_REFRESH_HZ)]
    refresh_hz: u32,

    /// Directory searched for model files after the user cache.
    #[arg(long)]
    models_dir: Option<PathBuf>,

    /// Base URL to download missing models from (overrides $FACEOFF_MODEL_URL).
    #[arg(long)]
    model_url: Option<String>,

    /// Render the bulge effect on the CPU even when a GPU is available.
    #[arg(long)]
    cpu: bool,

    /// Write the last rendered frame to this image file on exit.
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Keep running after game over until quit or the input ends.
    #[arg(long)]
    keep_open: bool,

    /// Wait for Enter before the first round instead of starting immediately.
    #[arg(long)]
    manual_start: bool,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;

    let mode = parse_mode(cli.players)?;
    let spec = source_spec(&cli);
    let source = FfmpegVideoSource::open(spec)?;
    let info = source.info();
    log::info!("Input: {}x{} @ {:.1} fps", info.width, info.height, info.fps);

    let detector = spawn_onnx_detector(
        model_source(&cli),
        mode.player_count(),
        Some(download_progress),
    );
    let distortion = DistortionConfig::default();
    let distorter = create_distorter(!cli.cpu, distortion.radius);
    let assigner = build_assigner(&cli.assignment, cli.mirrored)?;

    let mut frame_loop = FrameLoop::new(
        Box::new(source),
        detector,
        assigner,
        distorter,
        Box::new(StdoutPipelineLogger::new(LOGGER_THROTTLE_TICKS)),
        &distortion,
    );
    frame_loop.set_max_faces(mode.player_count());

    let mut session = GameSession::new(GameConfig::default().with_mode(mode));
    let (control_tx, control_rx) = crossbeam_channel::unbounded();
    spawn_stdin_reader(control_tx)?;
    let mut scheduler = TickScheduler::new(
        cli.refresh_hz,
        session.config().counter_period,
        control_rx,
    );

    if cli.manual_start {
        eprintln!("Press Enter to start, q to quit");
    } else {
        on_game_event(session.start(), &mut scheduler);
    }

    let last_frame = host_loop(&mut frame_loop, &mut session, &mut scheduler, cli.keep_open);
    scheduler.cancel_all();

    if let Some(path) = &cli.snapshot {
        match &last_frame {
            Some(frame) => save_frame(frame, path)?,
            None => log::warn!("No frame was rendered; snapshot not written"),
        }
    }

    frame_loop.summary();
    println!("{}", final_report(&session.snapshot()));
    Ok(())
}

/// Drive ticks, counter and host commands until the input ends, the round
/// is over (unless `keep_open`) or a quit arrives. Returns the last rendered
/// frame.
fn host_loop(
    frame_loop: &mut FrameLoop,
    session: &mut GameSession,
    scheduler: &mut TickScheduler,
    keep_open: bool,
) -> Option<Frame> {
    let mut last_frame = None;
    let mut last_hud = Instant::now();
    let mut load_error_reported = false;
    scheduler.arm_refresh();

    loop {
        match scheduler.next_event() {
            SchedulerEvent::Refresh(at) => {
                match frame_loop.tick(at) {
                    TickOutcome::Processed(output) => {
                        if let Some(event) = session.update_smiles(output.smiles) {
                            on_game_event(event, scheduler);
                        }
                        last_frame = Some(output.rendered);
                    }
                    TickOutcome::Skipped(_) | TickOutcome::Abandoned(_) => {}
                }

                if !load_error_reported {
                    if let Some(e) = frame_loop.detector_error() {
                        eprintln!("Expression model failed to load ({e}); no faces will be detected");
                        load_error_reported = true;
                    }
                }
                if frame_loop.is_source_finished() {
                    log::info!("Input ended after {} processed ticks", frame_loop.processed());
                    break;
                }
                if session.state() == GameState::GameOver && !keep_open {
                    break;
                }
                if last_hud.elapsed() >= HUD_INTERVAL {
                    log::info!("{}", hud_line(&session.snapshot()));
                    last_hud = Instant::now();
                }
                scheduler.arm_refresh();
            }
            SchedulerEvent::Counter(_) => {
                if let Some(event) = session.counter_tick() {
                    on_game_event(event, scheduler);
                }
            }
            SchedulerEvent::Control(HostCommand::Start) => {
                on_game_event(session.start(), scheduler);
            }
            SchedulerEvent::Control(HostCommand::Quit) => {
                log::info!("Quit requested");
                break;
            }
            SchedulerEvent::Disconnected => {
                log::debug!("stdin closed; commands disabled");
            }
        }
    }

    last_frame
}

fn on_game_event(event: GameEvent, scheduler: &mut TickScheduler) {
    match event {
        GameEvent::Started => {
            // Restart the counter so the first period is a full one
            scheduler.stop_counter();
            scheduler.start_counter();
        }
        GameEvent::Finished(outcome) => {
            scheduler.stop_counter();
            eprintln!("GAME OVER: {outcome}");
        }
    }
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    match (&cli.input, &cli.camera) {
        (None, None) => return Err("Either --input or --camera is required".into()),
        (Some(input), _) if !input.exists() => {
            return Err(format!("Input file not found: {}", input.display()).into());
        }
        (Some(input), _) if is_image(input) => {
            return Err(format!("Input must be a video, got image {}", input.display()).into());
        }
        _ => {}
    }
    if cli.camera_format.is_some() && cli.camera.is_none() {
        return Err("--camera-format requires --camera".into());
    }
    parse_mode(cli.players)?;
    if cli.assignment != "positional" && cli.assignment != "horizontal" {
        return Err(format!(
            "Assignment must be 'positional' or 'horizontal', got '{}'",
            cli.assignment
        )
        .into());
    }
    if !(1..=240).contains(&cli.refresh_hz) {
        return Err(format!("Refresh rate must be between 1 and 240 Hz, got {}", cli.refresh_hz).into());
    }
    if let Some(snapshot) = &cli.snapshot {
        if !is_image(snapshot) {
            return Err(format!(
                "Snapshot must be an image file ({}), got {}",
                IMAGE_EXTENSIONS.join(", "),
                snapshot.display()
            )
            .into());
        }
    }
    if let Some(dir) = &cli.models_dir {
        if !dir.is_dir() {
            return Err(format!("Models directory not found: {}", dir.display()).into());
        }
    }
    Ok(())
}

fn parse_mode(players: u8) -> Result<GameMode, Box<dyn std::error::Error>> {
    GameMode::from_player_count(players)
        .ok_or_else(|| format!("Players must be 1 or 2, got {players}").into())
}

fn build_assigner(
    assignment: &str,
    mirrored: bool,
) -> Result<Box<dyn PlayerAssigner>, Box<dyn std::error::Error>> {
    match assignment {
        "positional" => Ok(Box::new(PositionalAssigner)),
        "horizontal" => Ok(Box::new(HorizontalAssigner::new(mirrored))),
        other => Err(format!("Unknown assignment '{other}'").into()),
    }
}

fn source_spec(cli: &Cli) -> SourceSpec {
    match (&cli.input, &cli.camera) {
        (Some(input), _) => SourceSpec::File(input.clone()),
        (None, device) => SourceSpec::Camera {
            device: device.clone().unwrap_or_default(),
            format: cli
                .camera_format
                .clone()
                .unwrap_or_else(|| default_camera_format().to_string()),
        },
    }
}

fn model_source(cli: &Cli) -> ModelSource {
    ModelSource {
        bundled_dir: cli.models_dir.clone(),
        base_url: cli
            .model_url
            .clone()
            .or_else(|| env::var(MODEL_URL_ENV).ok().filter(|url| !url.is_empty())),
    }
}

fn spawn_stdin_reader(commands: Sender<HostCommand>) -> io::Result<()> {
    thread::Builder::new()
        .name("stdin-commands".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                let Some(command) = parse_command(&line) else {
                    eprintln!("Unknown command '{}': Enter starts, q quits", line.trim());
                    continue;
                };
                if commands.send(command).is_err() {
                    break;
                }
            }
        })?;
    Ok(())
}

fn parse_command(line: &str) -> Option<HostCommand> {
    match line.trim().to_lowercase().as_str() {
        "" | "s" | "start" => Some(HostCommand::Start),
        "q" | "quit" | "exit" => Some(HostCommand::Quit),
        _ => None,
    }
}

fn hud_line(snapshot: &GameSnapshot) -> String {
    let players: Vec<String> = PlayerSlot::ALL
        .iter()
        .filter(|&&slot| snapshot.is_active(slot))
        .map(|&slot| {
            let marker = if snapshot.is_low_health(slot) { "!" } else { "" };
            format!(
                "{slot} {}{marker} (smile {:.2})",
                snapshot.displayed_health(slot),
                snapshot.smile.get(slot)
            )
        })
        .collect();
    format!(
        "{} {}s | {}",
        snapshot.state,
        snapshot.elapsed_seconds(),
        players.join(" | ")
    )
}

fn final_report(snapshot: &GameSnapshot) -> String {
    match snapshot.outcome {
        Some(outcome) => format!("{outcome} after {}s", snapshot.elapsed_seconds()),
        None => format!("{} after {}s", snapshot.state, snapshot.elapsed_seconds()),
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading expression model... {pct}%");
        if downloaded >= total {
            eprintln!();
        }
    } else {
        eprint!("\rDownloading expression model... {downloaded} bytes");
    }
}
