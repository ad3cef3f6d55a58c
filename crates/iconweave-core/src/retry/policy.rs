//! Retry policy: decides backoff delays and the attempt ceiling.

use std::time::Duration;

use crate::config::RetryConfig;
use crate::ports::NetworkQuality;

/// Retry policy for failed fetch / produce operations.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,

    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,

    /// Hard ceiling on retries per item.
    pub max_retries: u32,

    /// Items attempted per scheduler tick.
    pub batch_size: usize,

    /// Delay multiplier on a 2g link.
    pub quality_slowdown: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            base_delay: config.base_delay(),
            multiplier: config.growth_factor,
            max_retries: config.max_retries,
            batch_size: config.batch_size.max(1),
            quality_slowdown: config.quality_slowdown,
        }
    }

    /// Delay before retry number `attempt` (1-indexed).
    ///
    /// delay = base_delay * multiplier^(attempt - 1)
    ///
    /// With base_delay=1s, multiplier=2.0:
    /// - attempt 1: 1s
    /// - attempt 2: 2s
    /// - attempt 3: 4s
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        duration_from_secs(secs)
    }

    /// `next_delay`, lengthened when the link is known to be slow.
    pub fn delay_with_quality(&self, attempt: u32, quality: Option<NetworkQuality>) -> Duration {
        let base = self.next_delay(attempt);
        match quality {
            Some(q) => duration_from_secs(base.as_secs_f64() * q.delay_factor(self.quality_slowdown)),
            None => base,
        }
    }

    pub fn allows(&self, attempt: u32) -> bool {
        attempt <= self.max_retries
    }
}

fn duration_from_secs(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}
