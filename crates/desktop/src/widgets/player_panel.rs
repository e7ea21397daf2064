use iced::border::Border;
use iced::widget::{column, container, progress_bar, row, text, Space};
use iced::{Element, Length, Theme};

use faceoff_core::game::domain::game_session::GameSnapshot;
use faceoff_core::shared::constants::MAX_HEALTH;
use faceoff_core::shared::player_slot::PlayerSlot;

use crate::theme::{muted_color, pain_color, surface_color};

const CORNER_RADIUS: f32 = 12.0;

/// Health and smile bars for one slot, tinted red while the player is
/// smiling past the damage threshold.
pub fn player_panel<'a, Message: 'a>(
    snapshot: &GameSnapshot,
    slot: PlayerSlot,
    theme: &Theme,
) -> Element<'a, Message> {
    let muted = muted_color(theme);
    let surface = surface_color(theme);
    let pain = pain_color(theme, snapshot.pain_opacity(slot));
    let low = snapshot.is_low_health(slot);

    let health_bar = progress_bar(0.0..=MAX_HEALTH as f32, snapshot.health(slot) as f32).style(
        if low {
            progress_bar::danger
        } else {
            progress_bar::success
        },
    );
    let smile_bar = progress_bar(0.0..=1.0, snapshot.smile.get(slot)).style(progress_bar::primary);

    let header = row![
        text(slot.to_string()).size(18).font(iced::Font {
            weight: iced::font::Weight::Bold,
            ..iced::Font::DEFAULT
        }),
        Space::new().width(Length::Fill),
        text(format!("{} HP", snapshot.displayed_health(slot))).size(18),
    ]
    .align_y(iced::Alignment::Center);

    let content = column![
        header,
        health_bar,
        Space::new().height(4),
        text("Smile").size(12).color(muted),
        smile_bar,
    ]
    .spacing(6);

    container(content)
        .padding([12, 16])
        .width(Length::Fill)
        .style(move |_theme: &Theme| container::Style {
            background: Some(iced::Background::Color(if pain.a > 0.0 { pain } else { surface })),
            border: Border {
                radius: CORNER_RADIUS.into(),
                ..Border::default()
            },
            ..container::Style::default()
        })
        .into()
}
