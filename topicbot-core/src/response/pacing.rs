//! Reply pacing.
//!
//! Multi-message replies are drip-fed: each reply waits roughly as long as
//! a person would need to type it.

use rand::Rng;
use rand_distr::{Distribution, Normal};
use std::time::Duration;

use super::RawOutput;
use topicbot_common::config::PacingConfig;
use topicbot_common::util::count_words;
use topicbot_common::{Error, Result};

/// Computes delivery delays for raw outputs.
#[derive(Debug, Clone)]
pub struct Pacer {
    per_word_ms: u64,
    jitter: Option<Normal<f64>>,
    max_ms: u64,
}

impl Pacer {
    pub fn new(config: &PacingConfig) -> Result<Self> {
        let jitter = if config.jitter_std_ms > 0.0 {
            Some(
                Normal::new(0.0, config.jitter_std_ms)
                    .map_err(|e| Error::Config(format!("pacing.jitter_std_ms: {e}")))?,
            )
        } else {
            None
        };

        Ok(Self {
            per_word_ms: config.per_word_delay_ms,
            jitter,
            max_ms: config.max_delay_ms,
        })
    }

    /// Pacer that delivers everything immediately unless a delay is explicit.
    pub fn immediate() -> Self {
        Self {
            per_word_ms: 0,
            jitter: None,
            max_ms: u64::MAX,
        }
    }

    /// Delay for `raw` using the thread-local generator.
    pub fn delay_for(&self, raw: &RawOutput) -> Duration {
        self.delay_with(raw, &mut rand::thread_rng())
    }

    /// Delay for `raw`: explicit, zero when `no_delay`, otherwise computed
    /// from the reply's word count plus normal jitter, clamped to
    /// `[0, max_delay_ms]`.
    pub fn delay_with<R: Rng + ?Sized>(&self, raw: &RawOutput, rng: &mut R) -> Duration {
        if raw.no_delay {
            return Duration::ZERO;
        }
        if let Some(ms) = raw.delay_ms {
            return Duration::from_millis(ms);
        }

        let words = raw.reply_text().map(count_words).unwrap_or(0);
        if words == 0 {
            return Duration::ZERO;
        }

        let base = (words as u64).saturating_mul(self.per_word_ms) as f64;
        let jitter = self.jitter.map(|n| n.sample(rng)).unwrap_or(0.0);
        let ms = (base + jitter).clamp(0.0, self.max_ms as f64);
        Duration::from_millis(ms.round() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn config(per_word: u64, jitter: f64, max: u64) -> PacingConfig {
        PacingConfig {
            per_word_delay_ms: per_word,
            jitter_std_ms: jitter,
            max_delay_ms: max,
        }
    }

    #[test]
    fn test_explicit_and_no_delay() {
        let pacer = Pacer::new(&config(300, 100.0, 10_000)).unwrap();
        let explicit = RawOutput::text("one two three").with_delay(Duration::from_millis(1234));
        assert_eq!(pacer.delay_for(&explicit), Duration::from_millis(1234));

        let instant = RawOutput::text("one two three")
            .with_delay(Duration::from_millis(1234))
            .without_delay();
        assert_eq!(pacer.delay_for(&instant), Duration::ZERO);
    }

    #[test]
    fn test_word_count_without_jitter() {
        let pacer = Pacer::new(&config(300, 0.0, 10_000)).unwrap();
        assert_eq!(
            pacer.delay_for(&RawOutput::text("your bill is due")),
            Duration::from_millis(1200)
        );
        assert_eq!(pacer.delay_for(&RawOutput::text("")), Duration::ZERO);
    }

    #[test]
    fn test_clamped_to_bounds() {
        let pacer = Pacer::new(&config(1_000, 0.0, 2_500)).unwrap();
        assert_eq!(
            pacer.delay_for(&RawOutput::text("a b c d e f")),
            Duration::from_millis(2_500)
        );

        let noisy = Pacer::new(&config(1, 10_000.0, 5_000)).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let d = noisy.delay_with(&RawOutput::text("hi"), &mut rng);
            assert!(d <= Duration::from_millis(5_000));
        }
    }

    #[test]
    fn test_immediate() {
        let pacer = Pacer::immediate();
        assert_eq!(
            pacer.delay_for(&RawOutput::text("many words in this reply")),
            Duration::ZERO
        );
    }
}
