//! The authoritative survival-mode game.
//!
//! All inputs arrive as [`GameCommand`]s; presentation reads
//! [`GameSnapshot`]s. Nothing else mutates health or state.

use std::fmt;

use crate::detection::domain::smile_estimator::SmileScores;
use crate::game::domain::game_config::{GameConfig, GameMode};
use crate::shared::constants::LOW_HEALTH;
use crate::shared::player_slot::PlayerSlot;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GameState {
    #[default]
    Idle,
    Playing,
    GameOver,
}

impl fmt::Display for GameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameState::Idle => write!(f, "IDLE"),
            GameState::Playing => write!(f, "PLAYING"),
            GameState::GameOver => write!(f, "GAMEOVER"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Winner(PlayerSlot),
    Draw,
    /// Single-player loss.
    Failed,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Winner(slot) => write!(f, "{slot} wins"),
            Outcome::Draw => write!(f, "draw"),
            Outcome::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GameCommand {
    Start,
    /// Smile scores derived from one perception tick.
    SmileScores(SmileScores),
    /// One period of the elapsed-time counter.
    CounterTick,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GameEvent {
    Started,
    Finished(Outcome),
}

/// Read-only view of the session for presentation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GameSnapshot {
    pub state: GameState,
    pub mode: GameMode,
    pub health: [f64; 2],
    pub smile: SmileScores,
    pub elapsed_ticks: u64,
    pub outcome: Option<Outcome>,
    pub smile_threshold: f32,
}

impl GameSnapshot {
    pub fn health(&self, slot: PlayerSlot) -> f64 {
        self.health[slot.index()]
    }

    /// Health rounded up, so a sliver above zero never reads as 0.
    pub fn displayed_health(&self, slot: PlayerSlot) -> u32 {
        self.health(slot).ceil().max(0.0) as u32
    }

    pub fn is_low_health(&self, slot: PlayerSlot) -> bool {
        self.health(slot) < LOW_HEALTH
    }

    pub fn is_active(&self, slot: PlayerSlot) -> bool {
        self.mode.active_slots().contains(&slot)
    }

    /// Elapsed counter as seconds with one decimal, e.g. `"12.3"`.
    pub fn elapsed_seconds(&self) -> String {
        format!("{:.1}", self.elapsed_ticks as f64 / 10.0)
    }

    /// Overlay opacity growing with the smile above the damage threshold.
    pub fn pain_opacity(&self, slot: PlayerSlot) -> f32 {
        ((self.smile.get(slot) - self.smile_threshold) * 2.0).clamp(0.0, 1.0)
    }
}

pub struct GameSession {
    config: GameConfig,
    state: GameState,
    health: [f64; 2],
    smile: SmileScores,
    elapsed_ticks: u64,
    outcome: Option<Outcome>,
}

impl GameSession {
    pub fn new(config: GameConfig) -> Self {
        let health = [config.max_health; 2];
        Self {
            config,
            state: GameState::Idle,
            health,
            smile: SmileScores::default(),
            elapsed_ticks: 0,
            outcome: None,
        }
    }

    pub fn apply(&mut self, command: GameCommand) -> Option<GameEvent> {
        match command {
            GameCommand::Start => Some(self.start()),
            GameCommand::SmileScores(scores) => self.update_smiles(scores),
            GameCommand::CounterTick => self.counter_tick(),
        }
    }

    /// Valid from any state: full health for every slot, counter at zero, PLAYING.
    pub fn start(&mut self) -> GameEvent {
        self.health = [self.config.max_health; 2];
        self.elapsed_ticks = 0;
        self.outcome = None;
        self.state = GameState::Playing;
        log::info!("Game started ({:?})", self.config.mode);
        GameEvent::Started
    }

    /// Record this tick's smiles; while PLAYING, apply damage then check for
    /// game over.
    pub fn update_smiles(&mut self, scores: SmileScores) -> Option<GameEvent> {
        self.smile = scores;
        if self.state != GameState::Playing {
            return None;
        }
        for &slot in self.config.mode.active_slots() {
            let damage = self.config.damage_for(scores.get(slot));
            if damage > 0.0 {
                let health = &mut self.health[slot.index()];
                *health = (*health - damage).max(0.0);
            }
        }
        self.check_game_over()
    }

    /// Advance the elapsed counter unless an active player is already down.
    pub fn counter_tick(&mut self) -> Option<GameEvent> {
        if self.state != GameState::Playing {
            return None;
        }
        if let Some(event) = self.check_game_over() {
            return Some(event);
        }
        self.elapsed_ticks += 1;
        None
    }

    /// Switching mode abandons any round in progress.
    pub fn set_mode(&mut self, mode: GameMode) {
        if mode == self.config.mode {
            return;
        }
        self.config.mode = mode;
        self.state = GameState::Idle;
        self.health = [self.config.max_health; 2];
        self.elapsed_ticks = 0;
        self.outcome = None;
        log::info!("Game mode set to {mode:?}");
    }

    fn check_game_over(&mut self) -> Option<GameEvent> {
        let active = self.config.mode.active_slots();
        let down: Vec<PlayerSlot> = active
            .iter()
            .copied()
            .filter(|slot| self.health[slot.index()] <= 0.0)
            .collect();

        let outcome = match (self.config.mode, down.as_slice()) {
            (_, []) => return None,
            (GameMode::Single, _) => Outcome::Failed,
            (GameMode::Versus, [loser]) => Outcome::Winner(loser.opponent()),
            (GameMode::Versus, _) => Outcome::Draw,
        };

        self.state = GameState::GameOver;
        self.outcome = Some(outcome);
        log::info!(
            "Game over after {:.1}s: {outcome}",
            self.elapsed_ticks as f64 / 10.0
        );
        Some(GameEvent::Finished(outcome))
    }

    pub fn state(&self) -> GameState {
        self.state
    }

    pub fn mode(&self) -> GameMode {
        self.config.mode
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn health(&self, slot: PlayerSlot) -> f64 {
        self.health[slot.index()]
    }

    pub fn smile(&self, slot: PlayerSlot) -> f32 {
        self.smile.get(slot)
    }

    pub fn elapsed_ticks(&self) -> u64 {
        self.elapsed_ticks
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            state: self.state,
            mode: self.config.mode,
            health: self.health,
            smile: self.smile,
            elapsed_ticks: self.elapsed_ticks,
            outcome: self.outcome,
            smile_threshold: self.config.smile_threshold,
        }
    }
}
