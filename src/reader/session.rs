use std::sync::{Arc, Mutex as StdMutex, Weak};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::audio::{AssetCatalog, MediaLoader};
use crate::chunking::{leading_segment, ChunkPipeline};
use crate::document::DocumentProvider;
use crate::effects::EffectScheduler;
use crate::music::{MusicController, MusicSettings};
use crate::narration::{NarrationDriver, NarrationEvent, NarrationState, SpeechSynth};
use crate::prediction::{Predictor, TrackId};
use crate::settings::EngineSettings;

use super::PageCursor;

/// The external services a session talks to.
pub struct Collaborators {
    pub document: Arc<dyn DocumentProvider>,
    pub predictor: Arc<dyn Predictor>,
    pub loader: Arc<dyn MediaLoader>,
    pub speech: Arc<dyn SpeechSynth>,
}

/// Point-in-time view of a session. `cursor` plus `page_turn_count` make up
/// the full page state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReaderSnapshot {
    pub cursor: PageCursor,
    pub listening: bool,
    pub narration: NarrationState,
    pub page_turn_count: u32,
    pub music_track: Option<TrackId>,
    pub active_effects: usize,
    pub opened_at: DateTime<Utc>,
}

struct PageState {
    cursor: PageCursor,
    listening: bool,
    page_text: String,
}

struct SessionInner {
    document: Arc<dyn DocumentProvider>,
    chunk_size: usize,
    state: Mutex<PageState>,
    narration: NarrationDriver,
    pipeline: ChunkPipeline,
    music: MusicController,
    opened_at: DateTime<Utc>,
}

impl SessionInner {
    /// Fetch `page`, make it current and feed it to narration, the chunk
    /// pipeline and the music controller.
    async fn show_page(&self, state: &mut PageState, page: u32) -> Result<()> {
        let text = self
            .document
            .page_text(page)
            .await
            .with_context(|| format!("failed to extract text of page {page}"))?;

        state.cursor.page_number = page;
        state.page_text = text;
        debug!(
            "showing page {}/{} ({} chars)",
            page,
            state.cursor.total_pages,
            state.page_text.chars().count()
        );

        let script = leading_segment(&state.page_text, self.chunk_size);
        // The evaluation runs detached; its handle is only useful to tests.
        let _ = self.music.record_page_visit(page, script);

        self.apply_listening(state);
        Ok(())
    }

    fn apply_listening(&self, state: &PageState) {
        let page = state.cursor.page_number;
        self.narration
            .speak_page(page, &state.page_text, state.listening);
        self.pipeline.rebuild(&state.page_text, state.listening);
    }

    async fn finish_page(&self, page: u32) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.listening || state.cursor.page_number != page {
            debug!("ignoring stale narration completion for page {page}");
            return Ok(());
        }

        match state.cursor.next_page() {
            Some(next) => self.show_page(&mut state, next).await,
            None => {
                info!("finished narrating the last page ({page})");
                Ok(())
            }
        }
    }

    fn teardown(&self) {
        self.narration.cancel();
        self.pipeline.shutdown();
        self.music.stop();
    }
}

/// One open document: page navigation plus the listening-mode audio engine.
pub struct ReaderSession {
    inner: Arc<SessionInner>,
    pump: StdMutex<Option<JoinHandle<()>>>,
}

impl ReaderSession {
    /// Open `collaborators.document` at page 1 in reading mode.
    pub async fn open(collaborators: Collaborators, settings: &EngineSettings) -> Result<Self> {
        let Collaborators {
            document,
            predictor,
            loader,
            speech,
        } = collaborators;

        let total_pages = document.page_count();
        if total_pages == 0 {
            bail!("document has no pages");
        }

        let assets = AssetCatalog::new(
            settings.effects_base_url.clone(),
            settings.music_base_url.clone(),
        );
        let scheduler = EffectScheduler::new(
            Arc::clone(&loader),
            assets.clone(),
            settings.effect_stagger(),
            settings.effects_volume,
        );
        let pipeline = ChunkPipeline::new(
            Arc::clone(&predictor),
            scheduler,
            settings.chunk_size,
            settings.chunk_advance(),
        );
        let music = MusicController::new(
            predictor,
            loader,
            Arc::clone(&document),
            MusicSettings {
                assets,
                chunk_size: settings.chunk_size,
                page_turn_threshold: settings.music_page_turn_threshold,
                volume: settings.music_volume,
            },
        );
        let (narration, events) = NarrationDriver::new(speech);

        let inner = Arc::new(SessionInner {
            document,
            chunk_size: settings.chunk_size,
            state: Mutex::new(PageState {
                cursor: PageCursor::new(total_pages),
                listening: false,
                page_text: String::new(),
            }),
            narration,
            pipeline,
            music,
            opened_at: Utc::now(),
        });

        {
            let mut state = inner.state.lock().await;
            inner.show_page(&mut state, 1).await?;
        }

        let pump = tokio::spawn(pump_narration_events(Arc::downgrade(&inner), events));
        info!("opened document with {total_pages} page(s)");

        Ok(Self {
            inner,
            pump: StdMutex::new(Some(pump)),
        })
    }

    pub async fn set_listening(&self, listening: bool) {
        let mut state = self.inner.state.lock().await;
        if state.listening == listening {
            return;
        }

        info!(
            "switching to {} mode",
            if listening { "listening" } else { "reading" }
        );
        state.listening = listening;
        self.inner.music.set_active(listening);
        self.inner.apply_listening(&state);
    }

    /// Returns `false` when already on the last page.
    pub async fn next_page(&self) -> Result<bool> {
        let mut state = self.inner.state.lock().await;
        match state.cursor.next_page() {
            Some(next) => self.inner.show_page(&mut state, next).await.map(|_| true),
            None => Ok(false),
        }
    }

    /// Returns `false` when already on the first page.
    pub async fn previous_page(&self) -> Result<bool> {
        let mut state = self.inner.state.lock().await;
        match state.cursor.previous_page() {
            Some(previous) => self.inner.show_page(&mut state, previous).await.map(|_| true),
            None => Ok(false),
        }
    }

    pub async fn go_to_page(&self, page: u32) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        if !state.cursor.contains(page) {
            bail!(
                "page {page} is out of range (document has {})",
                state.cursor.total_pages
            );
        }
        self.inner.show_page(&mut state, page).await
    }

    pub async fn snapshot(&self) -> ReaderSnapshot {
        let state = self.inner.state.lock().await;
        ReaderSnapshot {
            cursor: state.cursor,
            listening: state.listening,
            narration: self.inner.narration.state(),
            page_turn_count: self.inner.music.page_turns(),
            music_track: self.inner.music.current_track(),
            active_effects: self.inner.pipeline.scheduler().active_count(),
            opened_at: self.inner.opened_at,
        }
    }

    /// Stop narration, cancel every pending timer and release all audio.
    pub fn shutdown(&self) {
        if let Some(pump) = self.pump.lock().unwrap_or_else(|e| e.into_inner()).take() {
            pump.abort();
        }
        self.inner.teardown();
    }
}

impl Drop for ReaderSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn pump_narration_events(
    inner: Weak<SessionInner>,
    mut events: mpsc::UnboundedReceiver<NarrationEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        match event {
            NarrationEvent::PageComplete { page } => {
                if let Err(err) = inner.finish_page(page).await {
                    warn!("could not advance after page {page}: {err:#}");
                }
            }
        }
    }
}
