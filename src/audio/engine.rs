use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use rodio::{source::EmptyCallback, Decoder, OutputStream, OutputStreamHandle, Sink};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    mpsc::{self, Sender},
    Arc, Mutex,
};
use std::thread;
use std::time::Duration;
use tokio::sync::{oneshot, watch};

use super::{MediaLoader, MediaPlayer};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

enum AudioCommand {
    Open {
        bytes: Vec<u8>,
        ended: watch::Sender<bool>,
        reply: oneshot::Sender<Result<u64, String>>,
    },
    Play(u64),
    SetVolume(u64, f32),
    Release(u64),
}

/// Hand the opened clip's key to the waiting loader. If the loader gave up,
/// nobody can release the clip later, so its sink is returned for stopping.
fn deliver_open<S>(
    sinks: &mut HashMap<u64, S>,
    reply: oneshot::Sender<Result<u64, String>>,
    result: Result<u64, String>,
) -> Option<S> {
    match reply.send(result) {
        Err(Ok(key)) => {
            log_debug!("open request for clip {} abandoned", key);
            sinks.remove(&key)
        }
        _ => None,
    }
}

/// Loads clips over HTTP and plays them on a dedicated audio thread, one
/// rodio `Sink` per clip.
#[derive(Clone)]
pub struct AudioEngineHandle {
    tx: Arc<Mutex<Option<Sender<AudioCommand>>>>,
    http: reqwest::Client,
}

impl AudioEngineHandle {
    pub fn new(fetch_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(fetch_timeout)
            .build()
            .context("failed to build audio http client")?;

        Ok(Self {
            tx: Arc::new(Mutex::new(None)),
            http,
        })
    }

    fn ensure_thread(&self) -> Result<Sender<AudioCommand>> {
        let mut slot = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(tx) = slot.as_ref() {
            return Ok(tx.clone());
        }

        let (tx, rx) = mpsc::channel::<AudioCommand>();

        // The output stream is not Send, so it lives and dies on this thread.
        thread::Builder::new()
            .name("audio-engine".to_string())
            .spawn(move || {
                let mut stream: Option<(OutputStream, OutputStreamHandle)> = None;
                let mut sinks: HashMap<u64, Sink> = HashMap::new();
                let mut next_key: u64 = 0;

                fn open_sink(
                    stream: &mut Option<(OutputStream, OutputStreamHandle)>,
                    bytes: Vec<u8>,
                    ended: watch::Sender<bool>,
                ) -> Result<Sink, String> {
                    if stream.is_none() {
                        let pair = OutputStream::try_default()
                            .map_err(|e| format!("Failed to create audio output stream: {}", e))?;
                        *stream = Some(pair);
                    }
                    let (_, handle) = stream
                        .as_ref()
                        .ok_or_else(|| "audio output stream unavailable".to_string())?;

                    let source = Decoder::new(Cursor::new(bytes))
                        .map_err(|e| format!("clip is not playable: {}", e))?;
                    let sink = Sink::try_new(handle)
                        .map_err(|e| format!("Failed to create audio sink: {}", e))?;

                    sink.pause();
                    sink.append(source);
                    sink.append(EmptyCallback::<f32>::new(Box::new(move || {
                        let _ = ended.send(true);
                    })));
                    Ok(sink)
                }

                while let Ok(cmd) = rx.recv() {
                    match cmd {
                        AudioCommand::Open { bytes, ended, reply } => {
                            let result = open_sink(&mut stream, bytes, ended).map(|sink| {
                                next_key += 1;
                                sinks.insert(next_key, sink);
                                next_key
                            });
                            if let Some(orphan) = deliver_open(&mut sinks, reply, result) {
                                orphan.stop();
                            }
                        }
                        AudioCommand::Play(key) => {
                            if let Some(sink) = sinks.get(&key) {
                                sink.play();
                            }
                        }
                        AudioCommand::SetVolume(key, volume) => {
                            if let Some(sink) = sinks.get(&key) {
                                sink.set_volume(volume.clamp(0.0, 1.0));
                            }
                        }
                        AudioCommand::Release(key) => {
                            if let Some(sink) = sinks.remove(&key) {
                                sink.stop();
                            }
                        }
                    }
                }
            })
            .context("failed to spawn audio engine thread")?;

        *slot = Some(tx.clone());
        Ok(tx)
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {url} failed"))?
            .error_for_status()
            .with_context(|| format!("GET {url} was rejected"))?;

        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("failed to read body of {url}"))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl MediaLoader for AudioEngineHandle {
    async fn load(&self, url: &str) -> Result<Arc<dyn MediaPlayer>> {
        let bytes = self.fetch(url).await?;
        log_debug!("fetched {} bytes from {}", bytes.len(), url);

        let tx = self.ensure_thread()?;
        let (ended_tx, ended_rx) = watch::channel(false);
        let (reply_tx, reply_rx) = oneshot::channel();

        tx.send(AudioCommand::Open {
            bytes,
            ended: ended_tx,
            reply: reply_tx,
        })
        .map_err(|_| anyhow!("audio engine thread is gone"))?;

        let key = reply_rx
            .await
            .context("audio engine dropped the open request")?
            .map_err(|e| anyhow!(e))
            .with_context(|| format!("failed to open {url}"))?;

        Ok(Arc::new(EnginePlayer {
            key,
            tx,
            ended: ended_rx,
            released: AtomicBool::new(false),
        }))
    }
}

struct EnginePlayer {
    key: u64,
    tx: Sender<AudioCommand>,
    ended: watch::Receiver<bool>,
    released: AtomicBool,
}

#[async_trait]
impl MediaPlayer for EnginePlayer {
    fn play(&self) -> Result<()> {
        self.tx
            .send(AudioCommand::Play(self.key))
            .map_err(|_| anyhow!("audio engine thread is gone"))
    }

    fn set_volume(&self, volume: f32) {
        if self.tx.send(AudioCommand::SetVolume(self.key, volume)).is_err() {
            log_warn!("volume change for clip {} dropped: audio engine is gone", self.key);
        }
    }

    async fn ended(&self) {
        let mut ended = self.ended.clone();
        // The sender lives inside the sink queue, so an error means released.
        let _ = ended.wait_for(|done| *done).await;
    }

    fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            let _ = self.tx.send(AudioCommand::Release(self.key));
        }
    }
}

impl Drop for EnginePlayer {
    fn drop(&mut self) {
        self.release();
    }
}
