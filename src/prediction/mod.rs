pub mod client;

use anyhow::Result;
use async_trait::async_trait;
use log::warn;
use serde::{Deserialize, Serialize};

pub use client::HttpPredictor;

pub type EffectId = String;
pub type TrackId = String;

/// What the classifier suggests for one text segment. Either list may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    pub effects: Vec<EffectId>,
    pub music_tracks: Vec<TrackId>,
}

impl Prediction {
    pub fn first_track(&self) -> Option<&TrackId> {
        self.music_tracks.first()
    }
}

/// A remote text classifier. One request per call, no retries.
#[async_trait]
pub trait Predictor: Send + Sync {
    async fn predict(&self, segment: &str) -> Result<Prediction>;
}

/// Run `predictor` and fold any failure into "no prediction".
pub async fn predict_or_none(predictor: &dyn Predictor, segment: &str) -> Option<Prediction> {
    match predictor.predict(segment).await {
        Ok(prediction) => Some(prediction),
        Err(err) => {
            warn!("prediction unavailable: {err:#}");
            None
        }
    }
}
