use crate::prediction::{EffectId, TrackId};

/// Resolves effect and music identifiers to `{base}/{id}.mp3` URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetCatalog {
    effects_base: String,
    music_base: String,
}

impl AssetCatalog {
    pub fn new(effects_base: impl Into<String>, music_base: impl Into<String>) -> Self {
        Self {
            effects_base: effects_base.into(),
            music_base: music_base.into(),
        }
    }

    pub fn effect_url(&self, effect: &EffectId) -> String {
        join_clip(&self.effects_base, effect)
    }

    pub fn music_url(&self, track: &TrackId) -> String {
        join_clip(&self.music_base, track)
    }
}

fn join_clip(base: &str, id: &str) -> String {
    format!("{}/{}.mp3", base.trim_end_matches('/'), id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_use_separate_bases() {
        let catalog = AssetCatalog::new(
            "https://Kom-X.github.io/Book-Reader/Effects/",
            "https://Kom-X.github.io/Book-Reader/audio",
        );

        assert_eq!(
            catalog.effect_url(&"door_creak".to_string()),
            "https://Kom-X.github.io/Book-Reader/Effects/door_creak.mp3"
        );
        assert_eq!(
            catalog.music_url(&"calm".to_string()),
            "https://Kom-X.github.io/Book-Reader/audio/calm.mp3"
        );
    }
}
