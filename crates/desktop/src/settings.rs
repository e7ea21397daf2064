use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use faceoff_core::game::domain::game_config::GameMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayMode {
    Single,
    Versus,
}

impl PlayMode {
    pub const ALL: &[PlayMode] = &[PlayMode::Single, PlayMode::Versus];

    pub fn game_mode(self) -> GameMode {
        match self {
            PlayMode::Single => GameMode::Single,
            PlayMode::Versus => GameMode::Versus,
        }
    }
}

impl std::fmt::Display for PlayMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayMode::Single => write!(f, "1 Player"),
            PlayMode::Versus => write!(f, "2 Players"),
        }
    }
}

/// How detected faces are mapped onto P1 / P2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentPolicy {
    Positional,
    Horizontal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub mode: PlayMode,
    /// Empty selects the capture API's default device.
    pub camera_device: String,
    /// `None` uses the platform capture API.
    pub camera_format: Option<String>,
    pub assignment: AssignmentPolicy,
    /// Horizontal assignment only: P1 is on the left of the mirrored view.
    pub mirrored: bool,
    pub prefer_gpu: bool,
    pub models_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: PlayMode::Single,
            camera_device: default_camera_device().to_string(),
            camera_format: None,
            assignment: AssignmentPolicy::Positional,
            mirrored: true,
            prefer_gpu: true,
            models_dir: None,
        }
    }
}

fn default_camera_device() -> &'static str {
    if cfg!(target_os = "macos") {
        "0"
    } else if cfg!(target_os = "windows") {
        ""
    } else {
        "/dev/video0"
    }
}

impl Settings {
    /// `<config dir>/Face Off/settings.json`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("Face Off").join("settings.json"))
    }

    /// Falls back to defaults when the file is missing or unreadable.
    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                log::warn!("Ignoring unreadable settings {}: {e}", path.display());
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
