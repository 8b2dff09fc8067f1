use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Pacing for one stream of store writes. Both limits may be combined.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Limits {
    /// Fixed gap enforced between consecutive writes
    pub min_interval: Option<Duration>,
    /// Token bucket refilled continuously over a minute
    pub writes_per_min: Option<u64>,
}

impl Limits {
    pub fn is_unlimited(&self) -> bool {
        self.min_interval.is_none() && self.writes_per_min.unwrap_or(0) == 0
    }
}

/// Backpressure gate awaited before every write of an entity kind
#[derive(Debug)]
pub struct WriteThrottle {
    limits: Limits,
    last_write: Mutex<Option<Instant>>,
    // token bucket modeled by the current tokens and the time of last refill
    tokens: Mutex<(f64, Instant)>,
}

impl WriteThrottle {
    pub fn new(limits: Limits) -> Self {
        let capacity = limits.writes_per_min.unwrap_or(0) as f64;
        Self {
            limits,
            last_write: Mutex::new(None),
            tokens: Mutex::new((capacity, Instant::now())),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(Limits::default())
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Wait until the next write is allowed
    pub async fn acquire(&self) {
        if let Some(per_min) = self.limits.writes_per_min {
            if per_min > 0 {
                self.consume_token(per_min as f64, 60.0).await;
            }
        }

        if let Some(interval) = self.limits.min_interval {
            let mut last = self.last_write.lock().await;
            if let Some(previous) = *last {
                let ready_at = previous + interval;
                if ready_at > Instant::now() {
                    tokio::time::sleep_until(ready_at).await;
                }
            }
            *last = Some(Instant::now());
        }
    }

    async fn consume_token(&self, capacity: f64, period_secs: f64) {
        // Refill continuously, wait until a whole token has accumulated
        loop {
            let mut guard = self.tokens.lock().await;
            let (ref mut tokens, ref mut last) = *guard;
            let now = Instant::now();
            let elapsed = now.duration_since(*last).as_secs_f64();
            let refill_rate = capacity / period_secs;
            *tokens = (*tokens + elapsed * refill_rate).min(capacity);
            *last = now;
            if *tokens >= 1.0 {
                *tokens -= 1.0;
                break;
            }
            let secs = (1.0 - *tokens) / refill_rate;
            drop(guard);
            tokio::time::sleep(Duration::from_secs_f64(secs.max(0.001))).await;
        }
    }
}
