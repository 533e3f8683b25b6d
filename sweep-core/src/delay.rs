use rand::rngs::OsRng;
use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;

pub const DEFAULT_ACTION_DELAY: Duration = Duration::from_millis(1000);

/// Suspend for exactly `duration`.
pub async fn delay(duration: Duration) {
    if !duration.is_zero() {
        sleep(duration).await;
    }
}

/// Suspend for a random duration between `min` and `max` (inclusive).
pub async fn jittered_delay(min: Duration, max: Duration) {
    delay(jitter_between(min, max)).await;
}

fn jitter_between(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let mut rng = OsRng;
    let ms = rng.gen_range(min.as_millis() as u64..=max.as_millis() as u64);
    Duration::from_millis(ms)
}

/// Pause applied after each interaction so the walk reads like a person browsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub base: Duration,
    pub jitter: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            base: DEFAULT_ACTION_DELAY,
            jitter: Duration::ZERO,
        }
    }
}

impl Pacing {
    pub fn new(base: Duration, jitter: Duration) -> Self {
        Self { base, jitter }
    }

    pub fn fixed(base: Duration) -> Self {
        Self::new(base, Duration::ZERO)
    }

    /// No pause at all; handy in tests and for chained primitives.
    pub fn none() -> Self {
        Self::fixed(Duration::ZERO)
    }

    /// The duration the next [`Pacing::pause`] may take at most.
    pub fn upper_bound(&self) -> Duration {
        self.base + self.jitter
    }

    pub async fn pause(&self) {
        jittered_delay(self.base, self.upper_bound()).await;
    }
}
