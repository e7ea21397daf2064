use std::path::PathBuf;
use std::time::Instant;

use iced::widget::{column, container, image, pick_list, row, text, Space};
use iced::{window, ContentFit, Element, Length, Subscription, Task, Theme};

use faceoff_core::game::domain::game_config::GameConfig;
use faceoff_core::game::domain::game_session::{GameSession, GameSnapshot, GameState};
use faceoff_core::pipeline::frame_loop::{FrameLoop, TickOutcome};
use faceoff_core::shared::frame::Frame;
use faceoff_core::shared::player_slot::PlayerSlot;

use crate::host;
use crate::settings::{PlayMode, Settings};
use crate::theme::{self, muted_color};
use crate::widgets::player_panel::player_panel;
use crate::widgets::primary_button::primary_button;

#[derive(Debug, Clone)]
pub enum Message {
    /// Display refresh: run one frame loop tick.
    Frame(Instant),
    CounterTick,
    Start,
    ModeSelected(PlayMode),
}

pub struct App {
    settings: Settings,
    settings_path: Option<PathBuf>,
    session: GameSession,
    frame_loop: Option<FrameLoop>,
    startup_error: Option<String>,
    video: Option<image::Handle>,
    waiting_for: Option<&'static str>,
}

impl App {
    pub fn new() -> (Self, Task<Message>) {
        let settings_path = Settings::default_path();
        let settings = settings_path
            .as_deref()
            .map(Settings::load_from)
            .unwrap_or_default();

        let mut app = Self::with_settings(settings, settings_path);
        match host::build_frame_loop(&app.settings) {
            Ok(frame_loop) => app.frame_loop = Some(frame_loop),
            Err(e) => {
                log::error!("Could not start the camera: {e}");
                app.startup_error = Some(e.to_string());
            }
        }
        (app, Task::none())
    }

    fn with_settings(settings: Settings, settings_path: Option<PathBuf>) -> Self {
        let config = GameConfig::default().with_mode(settings.mode.game_mode());
        Self {
            settings,
            settings_path,
            session: GameSession::new(config),
            frame_loop: None,
            startup_error: None,
            video: None,
            waiting_for: Some("Starting camera..."),
        }
    }

    pub fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::Frame(now) => {
                let Some(frame_loop) = self.frame_loop.as_mut() else {
                    return Task::none();
                };
                match frame_loop.tick(now) {
                    TickOutcome::Processed(output) => {
                        self.session.update_smiles(output.smiles);
                        self.video = Some(frame_handle(output.rendered, self.settings.mirrored));
                        self.waiting_for = None;
                    }
                    TickOutcome::Skipped(reason) => {
                        if self.video.is_none() {
                            self.waiting_for = Some(waiting_label(reason.as_str()));
                        }
                    }
                    TickOutcome::Abandoned(_) => {}
                }
            }
            Message::CounterTick => {
                self.session.counter_tick();
            }
            Message::Start => {
                self.session.start();
            }
            Message::ModeSelected(mode) => {
                self.settings.mode = mode;
                self.session.set_mode(mode.game_mode());
                if let Some(frame_loop) = self.frame_loop.as_mut() {
                    frame_loop.set_max_faces(mode.game_mode().player_count());
                }
                self.save_settings();
            }
        }
        Task::none()
    }

    fn save_settings(&self) {
        if let Some(path) = &self.settings_path {
            if let Err(e) = self.settings.save_to(path) {
                log::warn!("Could not save settings to {}: {e}", path.display());
            }
        }
    }

    pub fn view(&self) -> Element<'_, Message> {
        let theme = theme::game_theme();
        let snapshot = self.session.snapshot();

        let start_label = match snapshot.state {
            GameState::Idle => "Start",
            GameState::Playing => "Restart",
            GameState::GameOver => "Play again",
        };
        let start = primary_button(
            text(start_label).size(15),
            self.frame_loop.as_ref().map(|_| Message::Start),
            [8, 22],
        );

        let top_bar = row![
            text("FACE OFF").size(22).font(iced::Font {
                weight: iced::font::Weight::Bold,
                ..iced::Font::DEFAULT
            }),
            Space::new().width(Length::Fill),
            pick_list(PlayMode::ALL, Some(self.settings.mode), Message::ModeSelected),
            start,
        ]
        .spacing(12)
        .align_y(iced::Alignment::Center);

        let status = text(status_line(&snapshot)).size(14).color(muted_color(&theme));

        let panels = row(snapshot
            .mode
            .active_slots()
            .iter()
            .map(|&slot| player_panel(&snapshot, slot, &theme))
            .collect::<Vec<_>>())
        .spacing(12);

        column![top_bar, status, self.video_view(), panels]
            .spacing(12)
            .padding(16)
            .height(Length::Fill)
            .into()
    }

    fn video_view(&self) -> Element<'_, Message> {
        if let Some(handle) = &self.video {
            return image(handle.clone())
                .width(Length::Fill)
                .height(Length::Fill)
                .content_fit(ContentFit::Contain)
                .into();
        }

        let message = match (&self.startup_error, self.detector_error()) {
            (Some(e), _) => format!("Camera unavailable: {e}"),
            (None, Some(e)) => format!("Expression model failed to load: {e}"),
            (None, None) => self.waiting_for.unwrap_or("").to_string(),
        };
        container(text(message).size(16))
            .width(Length::Fill)
            .height(Length::Fill)
            .center_x(Length::Fill)
            .center_y(Length::Fill)
            .into()
    }

    fn detector_error(&self) -> Option<&str> {
        self.frame_loop.as_ref().and_then(|l| l.detector_error())
    }

    pub fn theme(&self) -> Theme {
        theme::game_theme()
    }

    pub fn subscription(&self) -> Subscription<Message> {
        let mut subscriptions = Vec::new();
        if self.frame_loop.is_some() {
            subscriptions.push(window::frames().map(Message::Frame));
        }
        if self.session.state() == GameState::Playing {
            subscriptions.push(
                iced::time::every(self.session.config().counter_period)
                    .map(|_| Message::CounterTick),
            );
        }
        Subscription::batch(subscriptions)
    }
}

/// Mirrored previews are flipped so the picture behaves like a mirror and
/// P1 on the left of the view matches horizontal assignment.
fn frame_handle(frame: Frame, mirrored: bool) -> image::Handle {
    let (width, height) = (frame.width(), frame.height());
    let mut pixels = if frame.channels() == 4 {
        frame.into_data()
    } else {
        frame.to_rgba()
    };
    if mirrored {
        mirror_rows(&mut pixels, width as usize);
    }
    image::Handle::from_rgba(width, height, pixels)
}

/// Reverse the pixel order of every RGBA row in place.
fn mirror_rows(pixels: &mut [u8], width: usize) {
    if width == 0 {
        return;
    }
    for row in pixels.chunks_exact_mut(width * 4) {
        for x in 0..width / 2 {
            let (left, right) = row.split_at_mut((width - 1 - x) * 4);
            left[x * 4..x * 4 + 4].swap_with_slice(&mut right[..4]);
        }
    }
}

fn waiting_label(reason: &str) -> &'static str {
    match reason {
        "detector pending" => "Loading expression model...",
        _ => "Waiting for camera...",
    }
}

fn status_line(snapshot: &GameSnapshot) -> String {
    match (snapshot.state, snapshot.outcome) {
        (GameState::GameOver, Some(outcome)) => {
            format!("GAME OVER: {outcome} ({}s)", snapshot.elapsed_seconds())
        }
        (GameState::Playing, _) => {
            let smiling = PlayerSlot::ALL
                .iter()
                .any(|&slot| snapshot.is_active(slot) && snapshot.pain_opacity(slot) > 0.0);
            let hint = if smiling { "  Don't laugh!" } else { "" };
            format!("{}s{hint}", snapshot.elapsed_seconds())
        }
        _ => "Press Start, then keep a straight face".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faceoff_core::detection::domain::smile_estimator::SmileScores;
    use faceoff_core::game::domain::game_config::GameMode;

    fn app_in(dir: &tempfile::TempDir) -> App {
        App::with_settings(Settings::default(), Some(dir.path().join("settings.json")))
    }

    #[test]
    fn test_start_and_counter_ticks() {
        let tmp = tempfile::tempdir().unwrap();
        let mut app = app_in(&tmp);
        let _ = app.update(Message::CounterTick);
        assert_eq!(app.session.elapsed_ticks(), 0);

        let _ = app.update(Message::Start);
        let _ = app.update(Message::CounterTick);
        let _ = app.update(Message::CounterTick);
        assert_eq!(app.session.state(), GameState::Playing);
        assert_eq!(app.session.elapsed_ticks(), 2);
    }

    #[test]
    fn test_frame_without_camera_is_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        let mut app = app_in(&tmp);
        let _ = app.update(Message::Frame(Instant::now()));
        assert!(app.video.is_none());
    }

    #[test]
    fn test_mode_change_resets_round_and_persists() {
        let tmp = tempfile::tempdir().unwrap();
        let mut app = app_in(&tmp);
        let _ = app.update(Message::Start);
        let _ = app.update(Message::ModeSelected(PlayMode::Versus));

        assert_eq!(app.session.state(), GameState::Idle);
        assert_eq!(app.session.mode(), GameMode::Versus);
        let saved = Settings::load_from(&tmp.path().join("settings.json"));
        assert_eq!(saved.mode, PlayMode::Versus);
    }

    #[test]
    fn test_status_line_reports_outcome() {
        let mut session = GameSession::new(GameConfig::default());
        session.start();
        for _ in 0..40 {
            session.update_smiles(SmileScores::new(1.0, 0.0));
        }
        assert_eq!(status_line(&session.snapshot()), "GAME OVER: failed (0.0s)");
    }

    #[test]
    fn test_status_line_warns_while_smiling() {
        let mut session = GameSession::new(GameConfig::default());
        session.start();
        session.update_smiles(SmileScores::new(0.8, 0.0));
        assert!(status_line(&session.snapshot()).ends_with("Don't laugh!"));
    }

    #[test]
    fn test_rgb_frame_is_expanded_for_display() {
        let frame = Frame::new(vec![10u8; 2 * 2 * 3], 2, 2, 3, 0);
        // Handle ids are opaque; building one from RGB must not panic on the
        // length check inside iced
        let _ = frame_handle(frame, true);
    }

    #[test]
    fn test_mirror_rows_flips_each_row() {
        // 3x2 RGBA, pixel value = column + 10 * row
        let mut pixels: Vec<u8> = (0..2u8)
            .flat_map(|y| (0..3u8).flat_map(move |x| [x + 10 * y, 0, 0, 255]))
            .collect();
        mirror_rows(&mut pixels, 3);
        let reds: Vec<u8> = pixels.chunks_exact(4).map(|px| px[0]).collect();
        assert_eq!(reds, vec![2, 1, 0, 12, 11, 10]);
    }

    #[test]
    fn test_mirror_rows_twice_is_identity() {
        let original: Vec<u8> = (0..4 * 4 * 2).map(|i| i as u8).collect();
        let mut pixels = original.clone();
        mirror_rows(&mut pixels, 4);
        assert_ne!(pixels, original);
        mirror_rows(&mut pixels, 4);
        assert_eq!(pixels, original);
    }
}
