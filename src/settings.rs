use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};

pub const PREDICT_URL_ENV: &str = "PAGESOUND_PREDICT_URL";
pub const DEBUG_ENV: &str = "PAGESOUND_DEBUG";
pub const SETTINGS_PATH_ENV: &str = "PAGESOUND_SETTINGS";

/// Tunables for the synchronization engine. Every field has a default, so a
/// settings file only needs the keys it wants to change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineSettings {
    pub predict_url: String,
    pub effects_base_url: String,
    pub music_base_url: String,
    pub request_timeout_secs: u64,
    /// Characters per chunk fed to the predictor.
    pub chunk_size: usize,
    pub chunk_advance_secs: u64,
    pub effect_stagger_secs: u64,
    /// Page visits between two music re-evaluations.
    pub music_page_turn_threshold: u32,
    pub effects_volume: f32,
    pub music_volume: f32,
    pub narration_wpm: f32,
    pub verbose: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            predict_url: "http://10.1.131.216:8000/predict".into(),
            effects_base_url: "https://Kom-X.github.io/Book-Reader/Effects/".into(),
            music_base_url: "https://Kom-X.github.io/Book-Reader/audio/".into(),
            request_timeout_secs: 10,
            chunk_size: 500,
            chunk_advance_secs: 37,
            effect_stagger_secs: 11,
            music_page_turn_threshold: 3,
            effects_volume: 1.0,
            music_volume: 1.0,
            narration_wpm: 150.0,
            verbose: false,
        }
    }
}

impl EngineSettings {
    /// Read settings from `path`. A missing file yields the defaults and a
    /// malformed one is reported and replaced by the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;

        Ok(serde_json::from_str(&contents).unwrap_or_else(|err| {
            warn!(
                "Ignoring malformed settings in {}: {}; using defaults",
                path.display(),
                err
            );
            Self::default()
        }))
    }

    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup(PREDICT_URL_ENV).filter(|url| !url.trim().is_empty()) {
            self.predict_url = url;
        }
        if let Some(value) = lookup(DEBUG_ENV) {
            self.verbose = value == "1" || value.eq_ignore_ascii_case("true");
        }
        self
    }

    pub fn chunk_advance(&self) -> Duration {
        Duration::from_secs(self.chunk_advance_secs)
    }

    pub fn effect_stagger(&self) -> Duration {
        Duration::from_secs(self.effect_stagger_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
