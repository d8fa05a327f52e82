pub mod driver;
pub mod paced;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

pub use driver::NarrationDriver;
pub use paced::PacedSpeech;

/// Text-to-speech backend.
#[async_trait]
pub trait SpeechSynth: Send + Sync {
    /// Speak `text` as one utterance; resolves when it ends naturally.
    async fn speak(&self, text: &str) -> Result<()>;

    /// Silence whatever is being spoken.
    fn cancel(&self);
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum NarrationState {
    Idle,
    Speaking,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NarrationEvent {
    /// The utterance for `page` ended on its own.
    PageComplete { page: u32 },
}
