//! Token bucket state for a single client.

use std::time::{Duration, Instant};

/// Allowance tracked for one client identity.
///
/// `tokens` always stays within `[0, burst]`: refill is capped at `burst`
/// and a token is only spent when at least one whole token is available.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClientBucket {
    tokens: f64,
    last_refill: Instant,
    last_seen: Instant,
}

impl ClientBucket {
    /// Creates a bucket holding the full allowance.
    #[must_use]
    pub const fn full(burst: f64, now: Instant) -> Self {
        Self {
            tokens: burst,
            last_refill: now,
            last_seen: now,
        }
    }

    /// Refills for the time elapsed since the last refill, then tries to
    /// spend one token.
    ///
    /// `last_seen` is updated whatever the outcome. An instant earlier than
    /// the previous one refills nothing and leaves both timestamps in place.
    pub fn try_take(&mut self, rate: f64, burst: f64, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.tokens = elapsed.as_secs_f64().mul_add(rate, self.tokens).min(burst);
        self.last_refill = self.last_refill.max(now);
        self.last_seen = self.last_seen.max(now);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Returns true when the client has been silent for longer than
    /// `idle_threshold`.
    #[must_use]
    pub fn is_idle(&self, now: Instant, idle_threshold: Duration) -> bool {
        now.saturating_duration_since(self.last_seen) > idle_threshold
    }

    /// Returns the current allowance (without refilling).
    #[must_use]
    pub const fn tokens(&self) -> f64 {
        self.tokens
    }

    /// Returns the instant of the most recent admission attempt.
    #[must_use]
    pub const fn last_seen(&self) -> Instant {
        self.last_seen
    }
}
