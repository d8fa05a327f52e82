use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use tokio::task::JoinHandle;

use crate::audio::{AssetCatalog, MediaLoader, MediaPlayer};
use crate::chunking::leading_segment;
use crate::document::DocumentProvider;
use crate::prediction::{predict_or_none, Prediction, Predictor, TrackId};

/// The background track currently playing.
pub struct MusicSession {
    pub track_id: TrackId,
    pub started_at: DateTime<Utc>,
    seq: u64,
    player: Arc<dyn MediaPlayer>,
}

pub struct MusicSettings {
    pub assets: AssetCatalog,
    pub chunk_size: usize,
    pub page_turn_threshold: u32,
    pub volume: f32,
}

struct MusicInner {
    predictor: Arc<dyn Predictor>,
    loader: Arc<dyn MediaLoader>,
    document: Arc<dyn DocumentProvider>,
    settings: MusicSettings,
    page_turns: AtomicU32,
    active: AtomicBool,
    evaluating: AtomicBool,
    /// Bumped by `stop`; an install started under an older epoch is discarded.
    epoch: AtomicU64,
    session_seq: AtomicU64,
    session: Mutex<Option<MusicSession>>,
}

impl MusicInner {
    fn session(&self) -> MutexGuard<'_, Option<MusicSession>> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Clears the evaluation flag however the evaluation task ends.
struct EvaluationGuard(Arc<MusicInner>);

impl Drop for EvaluationGuard {
    fn drop(&mut self) {
        self.0.evaluating.store(false, Ordering::SeqCst);
    }
}

/// Re-picks the background track every few page visits, walking back through
/// earlier pages when the current one yields no suggestion.
#[derive(Clone)]
pub struct MusicController {
    inner: Arc<MusicInner>,
}

impl MusicController {
    pub fn new(
        predictor: Arc<dyn Predictor>,
        loader: Arc<dyn MediaLoader>,
        document: Arc<dyn DocumentProvider>,
        settings: MusicSettings,
    ) -> Self {
        Self {
            inner: Arc::new(MusicInner {
                predictor,
                loader,
                document,
                settings,
                page_turns: AtomicU32::new(0),
                active: AtomicBool::new(false),
                evaluating: AtomicBool::new(false),
                epoch: AtomicU64::new(0),
                session_seq: AtomicU64::new(0),
                session: Mutex::new(None),
            }),
        }
    }

    /// Music only plays while active; deactivating stops the current track.
    pub fn set_active(&self, active: bool) {
        self.inner.active.store(active, Ordering::SeqCst);
        if !active {
            self.stop();
        }
    }

    /// Count a page visit and start a re-evaluation once the threshold is
    /// reached. `script` is the leading text of the visited page.
    pub fn record_page_visit(&self, page: u32, script: &str) -> Option<JoinHandle<()>> {
        let inner = &self.inner;
        let turns = inner.page_turns.fetch_add(1, Ordering::SeqCst) + 1;

        if turns < inner.settings.page_turn_threshold
            || script.is_empty()
            || !inner.active.load(Ordering::SeqCst)
        {
            return None;
        }

        if inner
            .evaluating
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("music evaluation already running; page {page} visit deferred");
            return None;
        }

        let guard = EvaluationGuard(Arc::clone(inner));
        inner.page_turns.store(0, Ordering::SeqCst);
        info!("re-evaluating music at page {page} after {turns} page turn(s)");

        let script = script.to_string();
        Some(tokio::spawn(async move {
            let inner = Arc::clone(&guard.0);
            let epoch = inner.epoch.load(Ordering::SeqCst);
            match find_track(&inner, page, &script).await {
                Some(track) => install(&inner, track, epoch).await,
                None => info!("no music track found from page {page} back to page 1"),
            }
            drop(guard);
        }))
    }

    /// Release the current track and discard any install still loading.
    pub fn stop(&self) {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        let previous = self.inner.session().take();
        if let Some(previous) = previous {
            info!("stopping music track {}", previous.track_id);
            previous.player.release();
        }
    }

    pub fn current_track(&self) -> Option<TrackId> {
        self.inner
            .session()
            .as_ref()
            .map(|session| session.track_id.clone())
    }

    pub fn page_turns(&self) -> u32 {
        self.inner.page_turns.load(Ordering::SeqCst)
    }

    pub fn is_evaluating(&self) -> bool {
        self.inner.evaluating.load(Ordering::SeqCst)
    }
}

async fn find_track(inner: &MusicInner, page: u32, script: &str) -> Option<TrackId> {
    let mut page_to_check = page;
    let mut prediction = predict_or_none(inner.predictor.as_ref(), script).await;

    loop {
        if let Some(track) = prediction.as_ref().and_then(Prediction::first_track) {
            info!("music track {track} predicted for page {page_to_check}");
            return Some(track.clone());
        }
        if page_to_check <= 1 {
            return None;
        }

        debug!("no music predicted for page {page_to_check}, checking previous page");
        page_to_check -= 1;

        prediction = match inner.document.page_text(page_to_check).await {
            Ok(text) => {
                let script = leading_segment(&text, inner.settings.chunk_size);
                if script.is_empty() {
                    None
                } else {
                    predict_or_none(inner.predictor.as_ref(), script).await
                }
            }
            Err(err) => {
                warn!("could not read page {page_to_check} for music fallback: {err:#}");
                None
            }
        };
    }
}

async fn install(inner: &Arc<MusicInner>, track: TrackId, epoch: u64) {
    let previous = inner.session().take();
    if let Some(previous) = previous {
        info!("replacing music track {} with {}", previous.track_id, track);
        previous.player.release();
    }

    let url = inner.settings.assets.music_url(&track);
    let player = match inner.loader.load(&url).await {
        Ok(player) => player,
        Err(err) => {
            error!("failed to load music track {track}: {err:#}");
            return;
        }
    };

    if inner.epoch.load(Ordering::SeqCst) != epoch || !inner.active.load(Ordering::SeqCst) {
        debug!("music stopped while {track} was loading; discarding it");
        player.release();
        return;
    }

    player.set_volume(inner.settings.volume);
    if let Err(err) = player.play() {
        error!("failed to start music track {track}: {err:#}");
        player.release();
        return;
    }

    let seq = inner.session_seq.fetch_add(1, Ordering::SeqCst) + 1;
    let stale = {
        let mut slot = inner.session();
        // `stop` bumps the epoch before taking the slot, so a stop that raced
        // with `play` is visible here.
        if inner.epoch.load(Ordering::SeqCst) != epoch || !inner.active.load(Ordering::SeqCst) {
            drop(slot);
            debug!("music stopped while {track} was starting; discarding it");
            player.release();
            return;
        }
        slot.replace(MusicSession {
            track_id: track.clone(),
            started_at: Utc::now(),
            seq,
            player: Arc::clone(&player),
        })
    };
    if let Some(stale) = stale {
        stale.player.release();
    }
    info!("music track {track} playing");

    let inner = Arc::clone(inner);
    tokio::spawn(async move {
        player.ended().await;
        let mut slot = inner.session();
        if slot.as_ref().is_some_and(|session| session.seq == seq) {
            debug!("music track {track} ended");
            if let Some(ended) = slot.take() {
                ended.player.release();
            }
        }
    });
}
