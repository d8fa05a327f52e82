use anyhow::Result;
use async_trait::async_trait;
use log::info;
use std::time::Duration;

use super::SpeechSynth;

/// Rough reading pace: half a word per character.
const WORDS_PER_CHAR: f64 = 0.5;

/// How long `chars` characters take to read aloud at `wpm` words per minute.
pub fn estimate_duration(wpm: f32, chars: usize) -> Duration {
    if wpm.is_nan() || wpm <= 0.0 {
        return Duration::ZERO;
    }
    let words = chars as f64 * WORDS_PER_CHAR;
    let minutes = words / wpm as f64;
    Duration::try_from_secs_f64(minutes * 60.0).unwrap_or(Duration::MAX)
}

/// A silent synthesizer that logs each utterance and "finishes" after the
/// estimated reading time. Stands in where no speech engine is available.
pub struct PacedSpeech {
    wpm: f32,
}

impl PacedSpeech {
    pub fn new(wpm: f32) -> Self {
        Self { wpm }
    }
}

#[async_trait]
impl SpeechSynth for PacedSpeech {
    async fn speak(&self, text: &str) -> Result<()> {
        let chars = text.chars().count();
        let duration = estimate_duration(self.wpm, chars);
        info!("narrating {} chars (~{}s)", chars, duration.as_secs());
        tokio::time::sleep(duration).await;
        Ok(())
    }

    fn cancel(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_uses_half_a_word_per_char() {
        // 600 chars -> 300 words -> 2 minutes at 150 wpm.
        assert_eq!(estimate_duration(150.0, 600), Duration::from_secs(120));
        assert_eq!(estimate_duration(0.0, 600), Duration::ZERO);
    }

    #[test]
    fn absurdly_slow_pace_saturates() {
        assert_eq!(estimate_duration(1e-30, 600), Duration::MAX);
        assert_eq!(estimate_duration(f32::NAN, 600), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn speak_takes_the_estimated_time() {
        let speech = PacedSpeech::new(50.0);
        let started = tokio::time::Instant::now();
        speech.speak(&"x".repeat(100)).await.unwrap();
        assert_eq!(started.elapsed(), Duration::from_secs(60));
    }
}
