//! Per-client admission control.
//!
//! [`AdmissionGate`] keeps one token bucket per [`ClientId`] and decides,
//! for each inbound request, whether it may proceed. Buckets are created on
//! first contact with a full allowance, refilled continuously at `rate`
//! tokens per second up to `burst`, and reclaimed by a periodic sweep once a
//! client has been silent for longer than the idle threshold.
//!
//! # Concurrency
//!
//! The client table is split into a fixed number of shards, each guarded by
//! its own mutex. A client always maps to the same shard, so the
//! lookup-or-create, refill, decrement and `last_seen` update for one client
//! happen under a single lock while unrelated clients rarely contend. The
//! sweep visits one shard at a time.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use greenlight_api::admission::{AdmissionConfig, AdmissionGate, ClientId, ManualClock};
//!
//! let clock = ManualClock::default();
//! let gate = AdmissionGate::with_clock(AdmissionConfig::new(2.0, 4), Arc::new(clock)).unwrap();
//! let client = ClientId::new("203.0.113.7").unwrap();
//!
//! assert!((0..4).all(|_| gate.admit(&client)));
//! assert!(!gate.admit(&client));
//! ```

mod bucket;
mod clock;
mod identity;
mod sweeper;

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use siphasher::sip::SipHasher24;
use thiserror::Error;

pub use bucket::ClientBucket;
pub use clock::{Clock, ManualClock, SystemClock};
pub use identity::{ClientId, IdentityError};
pub use sweeper::SweeperHandle;

const SHARD_COUNT: usize = 16;

// =============================================================================
// Configuration
// =============================================================================

/// Invalid admission settings.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AdmissionError {
    /// Refill rate must be a positive, finite number.
    #[error("admission rate must be positive and finite, got {0}")]
    InvalidRate(f64),

    /// Burst must allow at least one request.
    #[error("admission burst must be at least 1")]
    ZeroBurst,

    /// Sweep interval must be non-zero.
    #[error("sweep interval must be greater than zero")]
    ZeroSweepInterval,

    /// The idle threshold must outlive a full refill of the bucket.
    #[error(
        "idle threshold {idle_threshold:?} is shorter than the refill window {refill_window:?}"
    )]
    IdleThresholdTooShort {
        /// Configured idle threshold.
        idle_threshold: Duration,
        /// Time needed to refill an empty bucket (`burst / rate`).
        refill_window: Duration,
    },
}

/// Settings recognised by [`AdmissionGate`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdmissionConfig {
    /// When false every request is admitted and no state is kept.
    pub enabled: bool,
    /// Tokens added per second.
    pub rate: f64,
    /// Maximum tokens, also the allowance on first contact.
    pub burst: u32,
    /// Time between eviction sweeps.
    pub sweep_interval: Duration,
    /// Silence after which a client's bucket is evicted.
    pub idle_threshold: Duration,
}

impl AdmissionConfig {
    /// Default sweep interval.
    pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
    /// Default idle threshold.
    pub const DEFAULT_IDLE_THRESHOLD: Duration = Duration::from_secs(180);

    /// Creates an enabled configuration with default sweep timings.
    #[must_use]
    pub const fn new(rate: f64, burst: u32) -> Self {
        Self {
            enabled: true,
            rate,
            burst,
            sweep_interval: Self::DEFAULT_SWEEP_INTERVAL,
            idle_threshold: Self::DEFAULT_IDLE_THRESHOLD,
        }
    }

    /// Creates a configuration that admits everything.
    #[must_use]
    pub const fn disabled() -> Self {
        let mut config = Self::new(2.0, 4);
        config.enabled = false;
        config
    }

    /// Overrides the sweep interval.
    #[must_use]
    pub const fn with_sweep_interval(mut self, sweep_interval: Duration) -> Self {
        self.sweep_interval = sweep_interval;
        self
    }

    /// Overrides the idle threshold.
    #[must_use]
    pub const fn with_idle_threshold(mut self, idle_threshold: Duration) -> Self {
        self.idle_threshold = idle_threshold;
        self
    }

    /// Time for an empty bucket to refill completely.
    #[must_use]
    pub fn refill_window(&self) -> Duration {
        Duration::try_from_secs_f64(f64::from(self.burst) / self.rate).unwrap_or(Duration::MAX)
    }

    /// Validates the settings. A disabled configuration is always valid.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError`] when rate, burst or the sweep timings are
    /// unusable.
    pub fn validate(&self) -> Result<(), AdmissionError> {
        if !self.enabled {
            return Ok(());
        }
        if !(self.rate.is_finite() && self.rate > 0.0) {
            return Err(AdmissionError::InvalidRate(self.rate));
        }
        if self.burst == 0 {
            return Err(AdmissionError::ZeroBurst);
        }
        if self.sweep_interval.is_zero() {
            return Err(AdmissionError::ZeroSweepInterval);
        }
        let refill_window = self.refill_window();
        if self.idle_threshold.is_zero() || self.idle_threshold < refill_window {
            return Err(AdmissionError::IdleThresholdTooShort {
                idle_threshold: self.idle_threshold,
                refill_window,
            });
        }
        Ok(())
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self::new(2.0, 4)
    }
}

// =============================================================================
// Admission Gate
// =============================================================================

type Shard = Mutex<HashMap<ClientId, ClientBucket>>;

/// Sharded per-client token-bucket rate limiter.
#[derive(Debug)]
pub struct AdmissionGate {
    config: AdmissionConfig,
    clock: Arc<dyn Clock>,
    shards: Box<[Shard]>,
    hash_key: [u8; 16],
    sweeper: Mutex<Option<SweeperHandle>>,
}

impl AdmissionGate {
    /// Creates a gate using the system clock. No sweeper is started.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError`] if `config` fails validation.
    pub fn new(config: AdmissionConfig) -> Result<Self, AdmissionError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a gate reading time from `clock`. No sweeper is started.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError`] if `config` fails validation.
    pub fn with_clock(
        config: AdmissionConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AdmissionError> {
        config.validate()?;

        let shard_count = if config.enabled { SHARD_COUNT } else { 0 };
        let shards = (0..shard_count)
            .map(|_| Mutex::new(HashMap::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Ok(Self {
            config,
            clock,
            shards,
            hash_key: rand::random(),
            sweeper: Mutex::new(None),
        })
    }

    /// Creates a shared gate and, when enabled, starts its eviction sweeper.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError`] if `config` fails validation.
    pub fn start(
        config: AdmissionConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Arc<Self>, AdmissionError> {
        let gate = Arc::new(Self::with_clock(config, clock)?);

        if gate.config.enabled {
            let handle = SweeperHandle::spawn(Arc::downgrade(&gate), gate.config.sweep_interval);
            *gate.sweeper.lock() = Some(handle);
            tracing::info!(
                rate = gate.config.rate,
                burst = gate.config.burst,
                sweep_interval = ?gate.config.sweep_interval,
                idle_threshold = ?gate.config.idle_threshold,
                "Admission gate started"
            );
        } else {
            tracing::info!("Admission gate disabled, all requests admitted");
        }

        Ok(gate)
    }

    /// Stops the eviction sweeper if one is running.
    pub async fn stop(&self) {
        let handle = self.sweeper.lock().take();
        if let Some(handle) = handle {
            handle.shutdown().await;
        }
    }

    /// Returns true while a sweeper task is attached and running.
    #[must_use]
    pub fn is_sweeping(&self) -> bool {
        self.sweeper
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Decides whether `client` may proceed now.
    pub fn admit(&self, client: &ClientId) -> bool {
        self.admit_at(client, self.clock.now())
    }

    /// Decides whether `client` may proceed at `now`.
    pub fn admit_at(&self, client: &ClientId, now: Instant) -> bool {
        if !self.config.enabled {
            return true;
        }

        let rate = self.config.rate;
        let burst = f64::from(self.config.burst);
        let mut table = self.shard_for(client).lock();

        if let Some(bucket) = table.get_mut(client) {
            return bucket.try_take(rate, burst, now);
        }

        let mut bucket = ClientBucket::full(burst, now);
        let admitted = bucket.try_take(rate, burst, now);
        table.insert(client.clone(), bucket);
        admitted
    }

    /// Removes buckets idle at the clock's current instant.
    ///
    /// Returns the number of evicted clients.
    pub fn sweep(&self) -> usize {
        self.sweep_at(self.clock.now())
    }

    /// Removes buckets whose client has been silent for longer than the
    /// idle threshold at `now`.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let threshold = self.config.idle_threshold;
        self.shards
            .iter()
            .map(|shard| {
                let mut table = shard.lock();
                let before = table.len();
                table.retain(|_, bucket| !bucket.is_idle(now, threshold));
                before - table.len()
            })
            .sum()
    }

    /// Returns the number of clients currently tracked.
    #[must_use]
    pub fn tracked_clients(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().len()).sum()
    }

    /// Returns a snapshot of the bucket for `client`, if tracked.
    #[must_use]
    pub fn bucket(&self, client: &ClientId) -> Option<ClientBucket> {
        if self.shards.is_empty() {
            return None;
        }
        self.shard_for(client).lock().get(client).copied()
    }

    /// Returns the active configuration.
    #[must_use]
    pub const fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    /// Returns true if admission control is enabled.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    fn shard_for(&self, client: &ClientId) -> &Shard {
        let mut hasher = SipHasher24::new_with_key(&self.hash_key);
        client.hash(&mut hasher);
        // Truncation is fine, only the low bits pick the shard.
        #[allow(clippy::cast_possible_truncation)]
        let index = (hasher.finish() as usize) % self.shards.len();
        &self.shards[index]
    }
}

// =============================================================================
// Tests
// =============================================================================
