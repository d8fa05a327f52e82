use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{NarrationEvent, NarrationState, SpeechSynth};

struct Utterance {
    id: u64,
    page: u32,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Speaks one page at a time and reports when a page has been read to the end.
pub struct NarrationDriver {
    synth: Arc<dyn SpeechSynth>,
    events: mpsc::UnboundedSender<NarrationEvent>,
    current: Arc<Mutex<Option<Utterance>>>,
    next_id: AtomicU64,
}

fn lock(current: &Mutex<Option<Utterance>>) -> MutexGuard<'_, Option<Utterance>> {
    current.lock().unwrap_or_else(|e| e.into_inner())
}

impl NarrationDriver {
    pub fn new(synth: Arc<dyn SpeechSynth>) -> (Self, mpsc::UnboundedReceiver<NarrationEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let driver = Self {
            synth,
            events,
            current: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(0),
        };
        (driver, rx)
    }

    /// Replace whatever is being spoken with `text`. Nothing is spoken unless
    /// listening mode is on and the page has text.
    pub fn speak_page(&self, page: u32, text: &str, listening: bool) {
        self.cancel();

        if !listening || text.is_empty() {
            return;
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancellationToken::new();

        // Hold the slot while spawning so the task cannot finish before it is
        // recorded as current.
        let mut slot = lock(&self.current);
        let handle = tokio::spawn(speak(
            Arc::clone(&self.synth),
            text.to_string(),
            id,
            page,
            cancel.clone(),
            Arc::clone(&self.current),
            self.events.clone(),
        ));
        *slot = Some(Utterance {
            id,
            page,
            cancel,
            handle,
        });
        debug!("narration started for page {page}");
    }

    /// Force the driver back to idle. The cancelled utterance never reports
    /// completion.
    pub fn cancel(&self) {
        let previous = lock(&self.current).take();
        if let Some(utterance) = previous {
            debug!("cancelling narration of page {}", utterance.page);
            utterance.cancel.cancel();
            utterance.handle.abort();
        }
        self.synth.cancel();
    }

    pub fn state(&self) -> NarrationState {
        if lock(&self.current).is_some() {
            NarrationState::Speaking
        } else {
            NarrationState::Idle
        }
    }

    pub fn speaking_page(&self) -> Option<u32> {
        lock(&self.current).as_ref().map(|utterance| utterance.page)
    }
}

impl Drop for NarrationDriver {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn speak(
    synth: Arc<dyn SpeechSynth>,
    text: String,
    id: u64,
    page: u32,
    cancel: CancellationToken,
    current: Arc<Mutex<Option<Utterance>>>,
    events: mpsc::UnboundedSender<NarrationEvent>,
) {
    let outcome = tokio::select! {
        _ = cancel.cancelled() => return,
        outcome = synth.speak(&text) => outcome,
    };

    {
        let mut slot = lock(&current);
        if slot.as_ref().map(|utterance| utterance.id) != Some(id) {
            return;
        }
        *slot = None;
    }

    match outcome {
        Ok(()) => {
            info!("narration of page {page} finished");
            let _ = events.send(NarrationEvent::PageComplete { page });
        }
        Err(err) => warn!("narration of page {page} failed: {err:#}"),
    }
}
