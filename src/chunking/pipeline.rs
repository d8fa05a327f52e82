use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::effects::EffectScheduler;
use crate::prediction::Predictor;

use super::{split_into_segments, ChunkCursor, TextSegment};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

struct PipelineRun {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Walks a page's chunks on a fixed cadence, asking the predictor about each
/// one and handing the suggested effects to the scheduler. The cadence does
/// not wait on the predictor.
pub struct ChunkPipeline {
    predictor: Arc<dyn Predictor>,
    scheduler: EffectScheduler,
    chunk_size: usize,
    advance_every: Duration,
    run: Mutex<Option<PipelineRun>>,
}

impl ChunkPipeline {
    pub fn new(
        predictor: Arc<dyn Predictor>,
        scheduler: EffectScheduler,
        chunk_size: usize,
        advance_every: Duration,
    ) -> Self {
        Self {
            predictor,
            scheduler,
            chunk_size,
            advance_every,
            run: Mutex::new(None),
        }
    }

    pub fn scheduler(&self) -> &EffectScheduler {
        &self.scheduler
    }

    /// React to a new page text or listening-mode flag. Always drops the
    /// previous run first; starts a new one only when listening with text.
    pub fn rebuild(&self, text: &str, listening: bool) {
        self.cancel_run();
        self.scheduler.cancel_pending();
        self.scheduler.stop_all();

        if !listening || text.is_empty() {
            log_debug!("chunk pipeline idle (listening={}, empty={})", listening, text.is_empty());
            return;
        }

        let cursor = ChunkCursor::new(split_into_segments(text, self.chunk_size));
        log_info!("extracted {} chunk(s) from page text", cursor.len());

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(chunk_loop(
            cursor,
            Arc::clone(&self.predictor),
            self.scheduler.clone(),
            self.advance_every,
            cancel.clone(),
        ));

        *self.run.lock().unwrap_or_else(|e| e.into_inner()) = Some(PipelineRun { cancel, handle });
    }

    pub fn is_running(&self) -> bool {
        self.run
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|run| !run.handle.is_finished())
    }

    /// Cancel the chunk walk and stop every effect it started.
    pub fn shutdown(&self) {
        self.cancel_run();
        self.scheduler.shutdown();
    }

    fn cancel_run(&self) {
        if let Some(run) = self.run.lock().unwrap_or_else(|e| e.into_inner()).take() {
            run.cancel.cancel();
            run.handle.abort();
        }
    }
}

impl Drop for ChunkPipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn chunk_loop(
    mut cursor: ChunkCursor,
    predictor: Arc<dyn Predictor>,
    scheduler: EffectScheduler,
    advance_every: Duration,
    cancel: CancellationToken,
) {
    let total = cursor.len();

    while let Some(segment) = cursor.advance().cloned() {
        log_info!(
            "processing chunk {}/{} (offset {})",
            cursor.next_index(),
            total,
            segment.start_offset
        );
        dispatch(segment, &predictor, &scheduler, &cancel);

        if cursor.is_exhausted() {
            break;
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                log_debug!("chunk advance cancelled");
                return;
            }
            _ = tokio::time::sleep(advance_every) => {}
        }
    }

    log_info!("all {} chunk(s) processed", total);
}

fn dispatch(
    segment: TextSegment,
    predictor: &Arc<dyn Predictor>,
    scheduler: &EffectScheduler,
    cancel: &CancellationToken,
) {
    let predictor = Arc::clone(predictor);
    let scheduler = scheduler.clone();
    let cancel = cancel.clone();

    tokio::spawn(async move {
        let prediction = tokio::select! {
            _ = cancel.cancelled() => return,
            result = predictor.predict(&segment.content) => result,
        };

        match prediction {
            Ok(prediction) if prediction.effects.is_empty() => {
                log_debug!("no effects predicted for chunk at {}", segment.start_offset);
            }
            Ok(prediction) => {
                let count = prediction.effects.len();
                if !scheduler.schedule_for(prediction.effects, &cancel) {
                    log_debug!("dropping {} effect(s) for a stale chunk", count);
                }
            }
            Err(err) => {
                log_warn!("effect prediction failed for chunk at {}: {err:#}", segment.start_offset);
            }
        }
    });
}
