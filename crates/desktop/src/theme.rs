use iced::color;
use iced::theme::Palette;
use iced::{Color, Theme};

/// Dark arcade palette; the camera view dominates the window.
pub fn game_theme() -> Theme {
    Theme::custom(
        "Face Off",
        Palette {
            background: color!(0x14, 0x12, 0x1c),
            text: color!(0xee, 0xea, 0xf4),
            primary: color!(0xff, 0x5c, 0x8a),
            success: color!(0x3d, 0xd6, 0x8c),
            warning: color!(0xff, 0xc8, 0x3d),
            danger: color!(0xff, 0x3b, 0x30),
        },
    )
}

/// Panel background behind each player's bars.
pub fn surface_color(theme: &Theme) -> Color {
    let p = theme.palette();
    Color { a: 0.06, ..p.text }
}

pub fn muted_color(theme: &Theme) -> Color {
    let p = theme.palette();
    Color { a: 0.55, ..p.text }
}

/// Red wash over a panel whose player is smiling past the threshold.
pub fn pain_color(theme: &Theme, opacity: f32) -> Color {
    let p = theme.palette();
    Color {
        a: 0.45 * opacity.clamp(0.0, 1.0),
        ..p.danger
    }
}
