use std::time::Duration;

use tokio::time::Instant;

/// A token bucket holding up to `capacity` tokens, refilled continuously at `refill_per_sec`.
///
/// Besides the bucket itself, a minimum spacing between consecutive grants can be enforced, which smooths out bursts
/// for upstream APIs that dislike them even when tokens are available.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    min_interval: Duration,
    last_refill: Instant,
    last_grant: Option<Instant>,
}

impl TokenBucket {
    pub fn new(capacity: u32, refill_per_sec: f64, min_interval: Duration) -> Self {
        let capacity = f64::from(capacity.max(1));
        Self {
            capacity,
            tokens: capacity,
            refill_per_sec: refill_per_sec.max(f64::EPSILON),
            min_interval,
            last_refill: Instant::now(),
            last_grant: None,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    /// Takes a token if one is available and the minimum spacing has elapsed. Otherwise returns how long the caller
    /// should wait before trying again.
    pub fn try_take(&mut self, now: Instant) -> Result<(), Duration> {
        self.refill(now);
        let mut wait = Duration::ZERO;
        if let Some(last) = self.last_grant {
            wait = (last + self.min_interval).saturating_duration_since(now);
        }
        if self.tokens < 1.0 {
            let deficit = Duration::from_secs_f64((1.0 - self.tokens) / self.refill_per_sec);
            wait = wait.max(deficit);
        }
        if wait.is_zero() {
            self.tokens -= 1.0;
            self.last_grant = Some(now);
            Ok(())
        } else {
            Err(wait)
        }
    }

    pub fn available_tokens(&self) -> f64 {
        self.tokens
    }
}
