use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{Prediction, Predictor};

#[derive(Serialize)]
struct PredictRequest<'a> {
    script: &'a str,
}

#[derive(Deserialize, Default)]
struct PredictResponse {
    #[serde(default)]
    predicted_effects: Option<Vec<String>>,
    #[serde(default)]
    predicted_music: Option<Vec<String>>,
}

impl From<PredictResponse> for Prediction {
    fn from(response: PredictResponse) -> Self {
        Self {
            effects: response.predicted_effects.unwrap_or_default(),
            music_tracks: response.predicted_music.unwrap_or_default(),
        }
    }
}

/// Talks to the `/predict` endpoint: POST `{ "script": ... }`, JSON reply.
#[derive(Clone)]
pub struct HttpPredictor {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpPredictor {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build prediction http client")?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Predictor for HttpPredictor {
    async fn predict(&self, segment: &str) -> Result<Prediction> {
        if segment.is_empty() {
            bail!("refusing to predict an empty segment");
        }

        let response = self
            .client
            .post(&self.endpoint)
            .json(&PredictRequest { script: segment })
            .send()
            .await
            .with_context(|| format!("POST {} failed", self.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            bail!("prediction service answered {status}");
        }

        let body: PredictResponse = response
            .json()
            .await
            .context("prediction response was not valid json")?;

        Ok(body.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve exactly one request with a canned status line and body, handing
    /// the received request body back through the join handle.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut buf = [0u8; 4096];

            let header_end = loop {
                let n = socket.read(&mut buf).await.unwrap();
                received.extend_from_slice(&buf[..n]);
                if let Some(pos) = received.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
                assert!(n > 0, "client closed before sending headers");
            };

            let headers = String::from_utf8_lossy(&received[..header_end]).to_ascii_lowercase();
            let content_length = headers
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .map(|value| value.trim().parse::<usize>().unwrap())
                .unwrap_or(0);

            while received.len() < header_end + content_length {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                received.extend_from_slice(&buf[..n]);
            }

            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();

            String::from_utf8_lossy(&received[header_end..]).into_owned()
        });

        (format!("http://{addr}/predict"), handle)
    }

    #[tokio::test]
    async fn parses_effects_and_music() {
        let (url, server) = serve_once(
            "200 OK",
            r#"{"predicted_effects":["rain","thunder"],"predicted_music":["calm"]}"#,
        )
        .await;
        let predictor = HttpPredictor::new(url, Duration::from_secs(5)).unwrap();

        let prediction = predictor.predict("It was a dark and stormy night").await.unwrap();

        assert_eq!(prediction.effects, vec!["rain", "thunder"]);
        assert_eq!(prediction.first_track().map(String::as_str), Some("calm"));

        let sent: serde_json::Value = serde_json::from_str(&server.await.unwrap()).unwrap();
        assert_eq!(sent["script"], "It was a dark and stormy night");
    }

    #[tokio::test]
    async fn missing_and_null_fields_become_empty() {
        let (url, server) = serve_once("200 OK", r#"{"predicted_music":null}"#).await;
        let predictor = HttpPredictor::new(url, Duration::from_secs(5)).unwrap();

        let prediction = predictor.predict("quiet page").await.unwrap();

        assert_eq!(prediction, Prediction::default());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn non_success_status_is_a_failure() {
        let (url, server) = serve_once("503 Service Unavailable", "{}").await;
        let predictor = HttpPredictor::new(url, Duration::from_secs(5)).unwrap();

        assert!(predictor.predict("anything").await.is_err());
        server.await.unwrap();

        // Nothing listens any more, so this goes through the transport-error path.
        let fallback = crate::prediction::predict_or_none(&predictor, "anything").await;
        assert!(fallback.is_none());
    }

    #[tokio::test]
    async fn empty_segment_is_rejected_without_a_request() {
        let predictor =
            HttpPredictor::new("http://127.0.0.1:9/predict", Duration::from_secs(1)).unwrap();
        assert!(predictor.predict("").await.is_err());
    }
}
