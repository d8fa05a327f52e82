mod audio;
mod chunking;
mod document;
mod effects;
mod music;
mod narration;
mod prediction;
mod reader;
mod settings;
mod utils;

#[cfg(test)]
mod test_support;

pub use audio::{AssetCatalog, AudioEngineHandle, MediaLoader, MediaPlayer};
pub use chunking::{leading_segment, split_into_segments, ChunkCursor, ChunkPipeline, TextSegment};
pub use document::{DocumentProvider, TextDocument};
pub use effects::{EffectPlayback, EffectScheduler, PlaybackId};
pub use music::{MusicController, MusicSession, MusicSettings};
pub use narration::{NarrationDriver, NarrationEvent, NarrationState, PacedSpeech, SpeechSynth};
pub use prediction::{EffectId, HttpPredictor, Prediction, Predictor, TrackId};
pub use reader::{Collaborators, PageCursor, ReaderSession, ReaderSnapshot};
pub use settings::EngineSettings;

use anyhow::Context;
use log::info;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const DEFAULT_SETTINGS_FILE: &str = "pagesound.json";

/// Entry point of the `pagesound` binary: read the document named on the
/// command line aloud with ambient audio until Ctrl-C.
pub fn run() -> anyhow::Result<()> {
    let settings_path = std::env::var_os(settings::SETTINGS_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE));
    let settings = EngineSettings::load(&settings_path)?.with_env_overrides();

    utils::logging::init(settings.verbose);
    info!("pagesound starting up...");

    let document_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .context("usage: pagesound <document.txt>")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;

    runtime.block_on(read_aloud(&document_path, settings))
}

async fn read_aloud(document_path: &Path, settings: EngineSettings) -> anyhow::Result<()> {
    let document = TextDocument::load(document_path).await?;
    let predictor = HttpPredictor::new(settings.predict_url.clone(), settings.request_timeout())?;
    let loader = AudioEngineHandle::new(settings.request_timeout())?;

    let session = ReaderSession::open(
        Collaborators {
            document: Arc::new(document),
            predictor: Arc::new(predictor),
            loader: Arc::new(loader),
            speech: Arc::new(PacedSpeech::new(settings.narration_wpm)),
        },
        &settings,
    )
    .await?;

    session.set_listening(true).await;
    info!("listening to {} (Ctrl-C to stop)", document_path.display());

    tokio::signal::ctrl_c()
        .await
        .context("failed to wait for Ctrl-C")?;

    let snapshot = session.snapshot().await;
    info!(
        "stopping on page {}/{}",
        snapshot.cursor.page_number, snapshot.cursor.total_pages
    );
    session.shutdown();
    Ok(())
}
