use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::audio::{AssetCatalog, MediaLoader, MediaPlayer};
use crate::prediction::EffectId;

// Set to false to silence per-effect lifecycle logs
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

pub type PlaybackId = u64;

/// A started effect clip. Lives in the scheduler's active set until it ends,
/// is stopped, or the scheduler tears down.
pub struct EffectPlayback {
    pub effect_id: EffectId,
    pub started_at: Instant,
    player: Arc<dyn MediaPlayer>,
    stop: CancellationToken,
}

#[derive(Default)]
struct ActiveEffects {
    next_id: PlaybackId,
    entries: HashMap<PlaybackId, EffectPlayback>,
}

struct SchedulerInner {
    loader: Arc<dyn MediaLoader>,
    assets: AssetCatalog,
    stagger: Duration,
    volume: f32,
    active: Mutex<ActiveEffects>,
    /// Shared by every stagger timer not yet fired; swapped on cancel.
    pending: Mutex<CancellationToken>,
}

impl SchedulerInner {
    fn active(&self) -> MutexGuard<'_, ActiveEffects> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Adds a started clip to the active set unless its batch was cancelled.
    /// Cancellation always precedes `stop_all`, so checking under the lock
    /// means nothing lands after the set was drained.
    fn register(
        &self,
        effect_id: EffectId,
        player: Arc<dyn MediaPlayer>,
        batch: &CancellationToken,
    ) -> Option<(PlaybackId, CancellationToken)> {
        let stop = CancellationToken::new();
        let mut active = self.active();
        if batch.is_cancelled() {
            return None;
        }
        active.next_id += 1;
        let id = active.next_id;
        active.entries.insert(
            id,
            EffectPlayback {
                effect_id,
                started_at: Instant::now(),
                player,
                stop: stop.clone(),
            },
        );
        Some((id, stop))
    }

    fn remove(&self, id: PlaybackId) -> bool {
        let removed = self.active().entries.remove(&id);
        match removed {
            Some(entry) => {
                entry.stop.cancel();
                entry.player.release();
                true
            }
            None => false,
        }
    }
}

/// Stages the effects predicted for a chunk, staggered one `stagger` apart,
/// and owns every effect player it starts.
#[derive(Clone)]
pub struct EffectScheduler {
    inner: Arc<SchedulerInner>,
}

impl EffectScheduler {
    pub fn new(
        loader: Arc<dyn MediaLoader>,
        assets: AssetCatalog,
        stagger: Duration,
        volume: f32,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                loader,
                assets,
                stagger,
                volume,
                active: Mutex::new(ActiveEffects::default()),
                pending: Mutex::new(CancellationToken::new()),
            }),
        }
    }

    /// Effect `i` begins loading `i * stagger` after this call. Batches are
    /// independent of each other.
    pub fn schedule(&self, effect_ids: Vec<EffectId>) {
        self.stage(effect_ids, None);
    }

    /// Like `schedule`, but only while `run` is live. Returns false, staging
    /// nothing, once `run` has been cancelled. Callers cancel `run` before
    /// `cancel_pending`, so a superseded run never stages under a newer token.
    pub fn schedule_for(&self, effect_ids: Vec<EffectId>, run: &CancellationToken) -> bool {
        self.stage(effect_ids, Some(run))
    }

    fn stage(&self, effect_ids: Vec<EffectId>, run: Option<&CancellationToken>) -> bool {
        let token = {
            let pending = self.inner.pending.lock().unwrap_or_else(|e| e.into_inner());
            if run.is_some_and(CancellationToken::is_cancelled) {
                return false;
            }
            pending.clone()
        };

        if effect_ids.is_empty() {
            return true;
        }

        let batch_start = Instant::now();
        log_info!("scheduling {} effect(s): {:?}", effect_ids.len(), effect_ids);

        for (index, effect_id) in effect_ids.into_iter().enumerate() {
            let offset = self.inner.stagger * index as u32;
            let inner = Arc::clone(&self.inner);
            let token = token.clone();
            tokio::spawn(run_effect(inner, effect_id, batch_start + offset, token));
        }
        true
    }

    /// Cancel stagger timers that have not fired yet. Effects already playing
    /// are left alone.
    pub fn cancel_pending(&self) {
        let mut pending = self.inner.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.cancel();
        *pending = CancellationToken::new();
    }

    pub fn stop(&self, id: PlaybackId) -> bool {
        self.inner.remove(id)
    }

    /// Stop and release every active effect. Safe to call repeatedly.
    pub fn stop_all(&self) {
        let drained: Vec<EffectPlayback> = {
            let mut active = self.inner.active();
            active.entries.drain().map(|(_, entry)| entry).collect()
        };

        if drained.is_empty() {
            return;
        }

        log_info!("stopping {} active effect(s)", drained.len());
        for entry in drained {
            entry.stop.cancel();
            entry.player.release();
        }
    }

    /// Tear down: cancel pending timers and stop everything playing.
    pub fn shutdown(&self) {
        self.cancel_pending();
        self.stop_all();
    }

    pub fn active_count(&self) -> usize {
        self.inner.active().entries.len()
    }

    /// `(id, effect, started_at)` for each active effect, oldest first.
    pub fn active_effects(&self) -> Vec<(PlaybackId, EffectId, Instant)> {
        let active = self.inner.active();
        let mut effects: Vec<_> = active
            .entries
            .iter()
            .map(|(id, entry)| (*id, entry.effect_id.clone(), entry.started_at))
            .collect();
        effects.sort_by_key(|(id, _, _)| *id);
        effects
    }
}

async fn run_effect(
    inner: Arc<SchedulerInner>,
    effect_id: EffectId,
    start_at: Instant,
    token: CancellationToken,
) {
    tokio::select! {
        _ = token.cancelled() => {
            log_debug!("effect {} cancelled before its slot", effect_id);
            return;
        }
        _ = time::sleep_until(start_at) => {}
    }

    let url = inner.assets.effect_url(&effect_id);
    log_info!("loading effect {} from {}", effect_id, url);

    let player = tokio::select! {
        _ = token.cancelled() => {
            log_debug!("effect {} cancelled while loading", effect_id);
            return;
        }
        loaded = inner.loader.load(&url) => match loaded {
            Ok(player) => player,
            Err(err) => {
                log_warn!("effect {} could not be loaded: {err:#}", effect_id);
                return;
            }
        }
    };

    if token.is_cancelled() {
        player.release();
        return;
    }

    player.set_volume(inner.volume);
    if let Err(err) = player.play() {
        log_warn!("effect {} failed to start: {err:#}", effect_id);
        player.release();
        return;
    }

    let Some((id, stop)) = inner.register(effect_id.clone(), Arc::clone(&player), &token) else {
        log_debug!("effect {} cancelled while starting", effect_id);
        player.release();
        return;
    };
    log_info!("effect {} playing (playback {})", effect_id, id);

    tokio::select! {
        _ = stop.cancelled() => {}
        _ = player.ended() => {
            if inner.remove(id) {
                log_info!("effect {} finished", effect_id);
            }
        }
    }
}
