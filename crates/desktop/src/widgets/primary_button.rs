use iced::border::Border;
use iced::widget::button;
use iced::{Color, Element, Shadow, Theme, Vector};

const HOVER_DARKEN: f32 = 0.05;
const CORNER_RADIUS: f32 = 10.0;
const SHADOW_BLUR: f32 = 12.0;
const SHADOW_ALPHA: f32 = 0.3;

/// Filled accent button. `on_press: None` renders it disabled.
pub fn primary_button<'a, Message: Clone + 'a>(
    content: impl Into<Element<'a, Message>>,
    on_press: Option<Message>,
    padding: [u16; 2],
) -> button::Button<'a, Message> {
    button(content)
        .on_press_maybe(on_press)
        .padding(padding)
        .style(|theme: &Theme, status: button::Status| {
            let base = theme.extended_palette().primary.base.color;
            match status {
                button::Status::Active => styled(base, 0.0),
                button::Status::Hovered => styled(base, 1.0),
                button::Status::Pressed => styled(base, 2.0),
                button::Status::Disabled => button::Style {
                    background: Some(Color { a: 0.35, ..base }.into()),
                    text_color: Color { a: 0.6, ..Color::WHITE },
                    border: Border {
                        radius: CORNER_RADIUS.into(),
                        ..Border::default()
                    },
                    ..button::Style::default()
                },
            }
        })
}

fn styled(base: Color, darken_steps: f32) -> button::Style {
    button::Style {
        background: Some(darken(base, darken_steps).into()),
        text_color: Color::WHITE,
        border: Border {
            radius: CORNER_RADIUS.into(),
            ..Border::default()
        },
        shadow: Shadow {
            color: Color { a: SHADOW_ALPHA, ..base },
            offset: Vector::new(0.0, 3.0),
            blur_radius: SHADOW_BLUR,
        },
        ..button::Style::default()
    }
}

fn darken(color: Color, steps: f32) -> Color {
    let shift = HOVER_DARKEN * steps;
    Color {
        r: (color.r - shift).max(0.0),
        g: (color.g - shift).max(0.0),
        b: (color.b - shift).max(0.0),
        a: 1.0,
    }
}
