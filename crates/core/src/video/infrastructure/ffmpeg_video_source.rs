//! Camera or file frames decoded via ffmpeg-next on a capture thread.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};

use crate::shared::frame::Frame;
use crate::video::domain::video_source::VideoSource;

/// Frames buffered between the capture thread and the consumer. When full,
/// the oldest queued frame is dropped to make room for the new one.
const FRAME_QUEUE: usize = 2;

const FALLBACK_FPS: f64 = 30.0;

#[derive(Debug, thiserror::Error)]
pub enum VideoSourceError {
    #[error("failed to initialise ffmpeg: {0}")]
    Init(#[source] ffmpeg_next::Error),
    #[error("unknown capture format `{0}`")]
    UnknownFormat(String),
    #[error("failed to open {input}: {source}")]
    Open {
        input: String,
        #[source]
        source: ffmpeg_next::Error,
    },
    #[error("no video stream in {0}")]
    NoVideoStream(String),
    #[error("failed to create decoder: {0}")]
    Decoder(#[source] ffmpeg_next::Error),
    #[error("failed to start capture thread: {0}")]
    Thread(#[source] std::io::Error),
    #[error("capture thread exited before opening the input")]
    Exited,
}

/// Where frames come from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceSpec {
    /// libavdevice input: `format` is e.g. `v4l2`, `device` e.g. `/dev/video0`.
    Camera { device: String, format: String },
    File(PathBuf),
}

impl SourceSpec {
    pub fn camera(device: impl Into<String>) -> Self {
        SourceSpec::Camera {
            device: device.into(),
            format: default_camera_format().to_string(),
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, SourceSpec::Camera { .. })
    }

    fn describe(&self) -> String {
        match self {
            SourceSpec::Camera { device, format } => format!("{format}:{device}"),
            SourceSpec::File(path) => path.display().to_string(),
        }
    }
}

/// Platform capture API name as known to libavdevice.
pub fn default_camera_format() -> &'static str {
    if cfg!(target_os = "macos") {
        "avfoundation"
    } else if cfg!(target_os = "windows") {
        "dshow"
    } else {
        "v4l2"
    }
}

/// Stream properties reported once the input is open.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

pub struct FfmpegVideoSource {
    frames: Receiver<Frame>,
    latest: Option<Frame>,
    info: StreamInfo,
    ready: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    finished: bool,
    handle: Option<JoinHandle<()>>,
}

impl FfmpegVideoSource {
    /// Open `spec` on a new capture thread. Returns once the input is open
    /// (or failed to open); frames arrive asynchronously afterwards.
    pub fn open(spec: SourceSpec) -> Result<Self, VideoSourceError> {
        let (open_tx, open_rx) = crossbeam_channel::bounded(1);
        let (frame_tx, frame_rx) = crossbeam_channel::bounded(FRAME_QUEUE);
        let ready = Arc::new(AtomicBool::new(false));
        let stop = Arc::new(AtomicBool::new(false));

        let thread_ready = ready.clone();
        let thread_stop = stop.clone();
        let thread_frames = frame_rx.clone();
        let handle = thread::Builder::new()
            .name("video-capture".into())
            .spawn(move || match Capture::open(&spec) {
                Ok(capture) => {
                    let _ = open_tx.send(Ok(capture.info));
                    capture.run(&frame_tx, &thread_frames, &thread_stop, &thread_ready);
                }
                Err(e) => {
                    let _ = open_tx.send(Err(e));
                }
            })
            .map_err(VideoSourceError::Thread)?;

        let info = open_rx.recv().map_err(|_| VideoSourceError::Exited)??;
        log::info!(
            "Video source open: {}x{} @ {:.1} fps",
            info.width,
            info.height,
            info.fps
        );

        Ok(Self {
            frames: frame_rx,
            latest: None,
            info,
            ready,
            stop,
            finished: false,
            handle: Some(handle),
        })
    }

    pub fn info(&self) -> StreamInfo {
        self.info
    }
}

impl VideoSource for FfmpegVideoSource {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    fn latest_frame(&mut self) -> Option<&Frame> {
        loop {
            match self.frames.try_recv() {
                Ok(frame) => self.latest = Some(frame),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !self.finished {
                        log::info!("Video source finished");
                    }
                    self.finished = true;
                    break;
                }
            }
        }
        self.latest.as_ref()
    }

    fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Drop for FfmpegVideoSource {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Decoder state owned by the capture thread.
struct Capture {
    ictx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    stream_index: usize,
    info: StreamInfo,
    live: bool,
}

impl Capture {
    fn open(spec: &SourceSpec) -> Result<Self, VideoSourceError> {
        ffmpeg_next::init().map_err(VideoSourceError::Init)?;

        let open_err = |source| VideoSourceError::Open {
            input: spec.describe(),
            source,
        };
        let ictx = match spec {
            SourceSpec::File(path) => ffmpeg_next::format::input(path).map_err(open_err)?,
            SourceSpec::Camera { device, format } => {
                ffmpeg_next::device::register_all();
                let input_format = ffmpeg_next::device::input::video()
                    .find(|f| f.name() == format.as_str())
                    .ok_or_else(|| VideoSourceError::UnknownFormat(format.clone()))?;
                match ffmpeg_next::format::open_with(
                    device,
                    &input_format,
                    ffmpeg_next::Dictionary::new(),
                )
                .map_err(open_err)?
                {
                    ffmpeg_next::format::context::Context::Input(input) => input,
                    ffmpeg_next::format::context::Context::Output(_) => {
                        return Err(VideoSourceError::UnknownFormat(format.clone()))
                    }
                }
            }
        };

        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| VideoSourceError::NoVideoStream(spec.describe()))?;
        let stream_index = stream.index();
        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
            .map_err(VideoSourceError::Decoder)?;
        let decoder = codec_ctx.decoder().video().map_err(VideoSourceError::Decoder)?;

        let rate = stream.rate();
        let fps = if rate.denominator() != 0 && rate.numerator() > 0 {
            rate.numerator() as f64 / rate.denominator() as f64
        } else {
            FALLBACK_FPS
        };

        let (width, height) = (decoder.width(), decoder.height());
        let scaler = ffmpeg_next::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )
        .map_err(VideoSourceError::Decoder)?;

        Ok(Self {
            ictx,
            decoder,
            scaler,
            stream_index,
            info: StreamInfo { width, height, fps },
            live: spec.is_live(),
        })
    }

    fn run(
        self,
        tx: &Sender<Frame>,
        rx: &Receiver<Frame>,
        stop: &AtomicBool,
        ready: &AtomicBool,
    ) {
        let Capture {
            mut ictx,
            mut decoder,
            mut scaler,
            stream_index,
            info,
            live,
        } = self;
        let mut out = FrameSink {
            tx,
            rx,
            ready,
            stop,
            info,
            live,
            started: Instant::now(),
            index: 0,
        };

        for (stream, packet) in ictx.packets() {
            if out.stopped() {
                return;
            }
            if stream.index() != stream_index {
                continue;
            }
            if decoder.send_packet(&packet).is_err() {
                continue;
            }
            if !receive_frames(&mut decoder, &mut scaler, &mut out) {
                return;
            }
        }

        let _ = decoder.send_eof();
        receive_frames(&mut decoder, &mut scaler, &mut out);
        log::debug!("Capture thread done after {} frames", out.index);
    }
}

/// Pacing and delivery side of the capture loop.
struct FrameSink<'a> {
    tx: &'a Sender<Frame>,
    /// Capture side handle on the queue, used to evict stale frames.
    rx: &'a Receiver<Frame>,
    ready: &'a AtomicBool,
    stop: &'a AtomicBool,
    info: StreamInfo,
    live: bool,
    started: Instant,
    index: usize,
}

impl FrameSink<'_> {
    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Playback position of the next frame. Live streams use wall-clock time
    /// since capture began; files use the frame index at the stream rate.
    fn position(&self) -> Duration {
        if self.live {
            self.started.elapsed()
        } else {
            Duration::from_secs_f64(self.index as f64 / self.info.fps)
        }
    }

    /// Returns false once the consumer is gone or a stop was requested.
    fn deliver(&mut self, pixels: Vec<u8>) -> bool {
        let position = self.position();
        if !self.live {
            // Files play back in real time
            let due = self.started + position;
            let now = Instant::now();
            if due > now {
                thread::sleep(due - now);
            }
        }
        if self.stopped() {
            return false;
        }

        let mut frame = Frame::new(pixels, self.info.width, self.info.height, 3, self.index)
            .with_timestamp(position);
        self.index += 1;
        if !self.ready.swap(true, Ordering::AcqRel) {
            log::info!("Video source ready");
        }
        loop {
            match self.tx.try_send(frame) {
                Ok(()) => return true,
                Err(TrySendError::Full(rejected)) => {
                    let _ = self.rx.try_recv();
                    frame = rejected;
                }
                Err(TrySendError::Disconnected(_)) => return false,
            }
        }
    }
}

fn receive_frames(
    decoder: &mut ffmpeg_next::decoder::Video,
    scaler: &mut ffmpeg_next::software::scaling::Context,
    out: &mut FrameSink<'_>,
) -> bool {
    let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
    while decoder.receive_frame(&mut decoded).is_ok() {
        let mut rgb_frame = ffmpeg_next::util::frame::video::Video::empty();
        if let Err(e) = scaler.run(&decoded, &mut rgb_frame) {
            log::warn!("Dropping frame that failed to convert: {e}");
            continue;
        }
        let pixels = extract_rgb_pixels(&rgb_frame, out.info.width, out.info.height);
        if !out.deliver(pixels) {
            return false;
        }
    }
    true
}

/// Copies pixel data from an ffmpeg frame into a contiguous RGB buffer,
/// stripping per-row stride padding.
fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let w = width as usize;
    let h = height as usize;

    let mut pixels = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        let row_start = row * stride;
        pixels.extend_from_slice(&data[row_start..row_start + w * 3]);
    }
    pixels
}
