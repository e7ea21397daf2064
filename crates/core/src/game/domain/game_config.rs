use std::time::Duration;

use crate::shared::constants::{
    COUNTER_PERIOD_MS, DAMAGE_MULTIPLIER, DAMAGE_RATE, MAX_HEALTH, SMILE_THRESHOLD,
};
use crate::shared::player_slot::PlayerSlot;

/// `Single` tracks P1 only; `Versus` tracks both slots.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GameMode {
    #[default]
    Single,
    Versus,
}

impl GameMode {
    pub fn from_player_count(players: u8) -> Option<Self> {
        match players {
            1 => Some(GameMode::Single),
            2 => Some(GameMode::Versus),
            _ => None,
        }
    }

    pub fn player_count(self) -> usize {
        match self {
            GameMode::Single => 1,
            GameMode::Versus => 2,
        }
    }

    pub fn active_slots(self) -> &'static [PlayerSlot] {
        match self {
            GameMode::Single => &[PlayerSlot::P1],
            GameMode::Versus => &PlayerSlot::ALL,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GameConfig {
    pub mode: GameMode,
    /// Damage applies only strictly above this score.
    pub smile_threshold: f32,
    pub damage_rate: f64,
    pub damage_multiplier: f64,
    pub max_health: f64,
    pub counter_period: Duration,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            mode: GameMode::default(),
            smile_threshold: SMILE_THRESHOLD,
            damage_rate: DAMAGE_RATE,
            damage_multiplier: DAMAGE_MULTIPLIER,
            max_health: MAX_HEALTH,
            counter_period: Duration::from_millis(COUNTER_PERIOD_MS),
        }
    }
}

impl GameConfig {
    pub fn with_mode(mut self, mode: GameMode) -> Self {
        self.mode = mode;
        self
    }

    /// Health lost in one tick at `smile`; zero at or below the threshold.
    pub fn damage_for(&self, smile: f32) -> f64 {
        if smile > self.smile_threshold {
            smile as f64 * self.damage_rate * self.damage_multiplier
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[rstest]
    #[case(1, Some(GameMode::Single))]
    #[case(2, Some(GameMode::Versus))]
    #[case(0, None)]
    #[case(3, None)]
    fn test_from_player_count(#[case] players: u8, #[case] expected: Option<GameMode>) {
        assert_eq!(GameMode::from_player_count(players), expected);
    }

    #[test]
    fn test_active_slots() {
        assert_eq!(GameMode::Single.active_slots(), &[PlayerSlot::P1]);
        assert_eq!(GameMode::Versus.active_slots(), &[PlayerSlot::P1, PlayerSlot::P2]);
    }

    #[rstest]
    #[case::zero(0.0, 0.0)]
    #[case::at_threshold(0.5, 0.0)]
    #[case::above(0.9, 2.25)]
    #[case::full(1.0, 2.5)]
    fn test_damage_for(#[case] smile: f32, #[case] expected: f64) {
        assert_relative_eq!(GameConfig::default().damage_for(smile), expected, epsilon = 1e-6);
    }
}
