pub mod player_panel;
pub mod primary_button;
