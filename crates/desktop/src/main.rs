mod app;
mod host;
mod settings;
mod theme;
mod widgets;

use app::App;

fn main() -> iced::Result {
    env_logger::init();

    iced::application(App::new, App::update, App::view)
        .title("Face Off")
        .theme(App::theme)
        .subscription(App::subscription)
        .window(iced::window::Settings {
            size: iced::Size::new(900.0, 720.0),
            min_size: Some(iced::Size::new(480.0, 420.0)),
            ..Default::default()
        })
        .run()
}
