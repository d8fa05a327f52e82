pub mod assets;
pub mod engine;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

pub use assets::AssetCatalog;
pub use engine::AudioEngineHandle;

/// A loaded clip that is ready to play but has not started yet.
#[async_trait]
pub trait MediaPlayer: Send + Sync {
    fn play(&self) -> Result<()>;

    fn set_volume(&self, volume: f32);

    /// Resolves once playback has finished on its own, or the player has been
    /// released.
    async fn ended(&self);

    /// Stop playback and drop the decoded source. Idempotent.
    fn release(&self);
}

/// Fetches a clip by URL and resolves once it is playable.
#[async_trait]
pub trait MediaLoader: Send + Sync {
    async fn load(&self, url: &str) -> Result<Arc<dyn MediaPlayer>>;
}
