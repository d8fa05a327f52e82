//! In-process stand-ins for the remote classifier, the audio backend and the
//! speech synthesizer.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::audio::{MediaLoader, MediaPlayer};
use crate::narration::SpeechSynth;
use crate::prediction::{Prediction, Predictor};

pub fn effects(ids: &[&str]) -> Prediction {
    Prediction {
        effects: ids.iter().map(|id| id.to_string()).collect(),
        music_tracks: Vec::new(),
    }
}

pub fn music(ids: &[&str]) -> Prediction {
    Prediction {
        effects: Vec::new(),
        music_tracks: ids.iter().map(|id| id.to_string()).collect(),
    }
}

#[derive(Default)]
pub struct FakePredictor {
    responses: Mutex<HashMap<String, Prediction>>,
    failing: Mutex<HashSet<String>>,
    fallback: Mutex<Prediction>,
    calls: Mutex<Vec<(String, Instant)>>,
    latency: Mutex<Duration>,
}

impl FakePredictor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, script: &str, prediction: Prediction) {
        self.responses
            .lock()
            .unwrap()
            .insert(script.to_string(), prediction);
    }

    pub fn respond_to_all(&self, prediction: Prediction) {
        *self.fallback.lock().unwrap() = prediction;
    }

    pub fn fail(&self, script: &str) {
        self.failing.lock().unwrap().insert(script.to_string());
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(script, _)| script.clone())
            .collect()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }
}

#[async_trait]
impl Predictor for FakePredictor {
    async fn predict(&self, segment: &str) -> Result<Prediction> {
        self.calls
            .lock()
            .unwrap()
            .push((segment.to_string(), Instant::now()));

        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if self.failing.lock().unwrap().contains(segment) {
            bail!("prediction service answered 500 Internal Server Error");
        }

        let canned = self.responses.lock().unwrap().get(segment).cloned();
        Ok(canned.unwrap_or_else(|| self.fallback.lock().unwrap().clone()))
    }
}

type PlayHook = Arc<dyn Fn() + Send + Sync>;

pub struct FakePlayer {
    pub url: String,
    on_play: Option<PlayHook>,
    playing: AtomicBool,
    released: AtomicBool,
    volume: Mutex<f32>,
    ended: watch::Sender<bool>,
}

impl FakePlayer {
    fn new(url: &str, on_play: Option<PlayHook>) -> Self {
        let (ended, _) = watch::channel(false);
        Self {
            url: url.to_string(),
            on_play,
            playing: AtomicBool::new(false),
            released: AtomicBool::new(false),
            volume: Mutex::new(1.0),
            ended,
        }
    }

    /// Simulate the clip reaching its natural end.
    pub fn finish(&self) {
        self.playing.store(false, Ordering::SeqCst);
        self.ended.send_replace(true);
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    pub fn volume(&self) -> f32 {
        *self.volume.lock().unwrap()
    }
}

#[async_trait]
impl MediaPlayer for FakePlayer {
    fn play(&self) -> Result<()> {
        if self.is_released() {
            bail!("player for {} was already released", self.url);
        }
        self.playing.store(true, Ordering::SeqCst);
        if let Some(hook) = &self.on_play {
            hook();
        }
        Ok(())
    }

    fn set_volume(&self, volume: f32) {
        *self.volume.lock().unwrap() = volume;
    }

    async fn ended(&self) {
        let mut ended = self.ended.subscribe();
        let _ = ended.wait_for(|done| *done).await;
    }

    fn release(&self) {
        self.playing.store(false, Ordering::SeqCst);
        self.released.store(true, Ordering::SeqCst);
        self.ended.send_replace(true);
    }
}

#[derive(Default)]
pub struct FakeLoader {
    loads: Mutex<Vec<(String, Instant)>>,
    players: Mutex<Vec<Arc<FakePlayer>>>,
    failing: Mutex<HashSet<String>>,
    delay: Mutex<Duration>,
    on_play: Mutex<Option<PlayHook>>,
}

impl FakeLoader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self, url: &str) {
        self.failing.lock().unwrap().insert(url.to_string());
    }

    /// Run `hook` inside every later player's `play()`.
    pub fn on_play(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.on_play.lock().unwrap() = Some(Arc::new(hook));
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn loads(&self) -> Vec<(String, Instant)> {
        self.loads.lock().unwrap().clone()
    }

    pub fn players(&self) -> Vec<Arc<FakePlayer>> {
        self.players.lock().unwrap().clone()
    }

    pub fn player(&self, url: &str) -> Option<Arc<FakePlayer>> {
        self.players
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|player| player.url == url)
            .cloned()
    }
}

#[async_trait]
impl MediaLoader for FakeLoader {
    async fn load(&self, url: &str) -> Result<Arc<dyn MediaPlayer>> {
        self.loads
            .lock()
            .unwrap()
            .push((url.to_string(), Instant::now()));

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.failing.lock().unwrap().contains(url) {
            return Err(anyhow!("GET {url} was rejected"));
        }

        let hook = self.on_play.lock().unwrap().clone();
        let player = Arc::new(FakePlayer::new(url, hook));
        self.players.lock().unwrap().push(Arc::clone(&player));
        Ok(player)
    }
}

pub struct FakeSpeech {
    duration: Duration,
    spoken: Mutex<Vec<String>>,
    cancels: AtomicUsize,
}

impl FakeSpeech {
    pub fn new(duration: Duration) -> Arc<Self> {
        Arc::new(Self {
            duration,
            spoken: Mutex::new(Vec::new()),
            cancels: AtomicUsize::new(0),
        })
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }

    pub fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechSynth for FakeSpeech {
    async fn speak(&self, text: &str) -> Result<()> {
        self.spoken.lock().unwrap().push(text.to_string());
        tokio::time::sleep(self.duration).await;
        Ok(())
    }

    fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
    }
}
