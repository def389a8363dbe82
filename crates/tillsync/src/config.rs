//! Engine configuration.

use std::time::Duration;

use tillsync_core::ReferenceKind;
use tillsync_sync::QueueConfig;

const HOUR: Duration = Duration::from_secs(60 * 60);

/// Maximum age of each kind of reference data before a pull is due.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreshnessConfig {
    pub products: Duration,
    pub contacts: Duration,
    /// Zero: settings are pulled on every cycle.
    pub settings: Duration,
}

impl Default for FreshnessConfig {
    fn default() -> Self {
        Self {
            products: 24 * HOUR,
            contacts: 6 * HOUR,
            settings: Duration::ZERO,
        }
    }
}

impl FreshnessConfig {
    pub fn threshold(&self, kind: ReferenceKind) -> Duration {
        match kind {
            ReferenceKind::Products => self.products,
            ReferenceKind::Contacts => self.contacts,
            ReferenceKind::Settings => self.settings,
        }
    }

    /// Whether data last fetched at `last_fetch` (Unix ms) is stale at `now`.
    ///
    /// Never-fetched data is always due.
    pub fn is_due(&self, kind: ReferenceKind, last_fetch: Option<i64>, now: i64) -> bool {
        let Some(last_fetch) = last_fetch else {
            return true;
        };
        let threshold = self.threshold(kind);
        if threshold.is_zero() {
            return true;
        }
        let age_ms = now.saturating_sub(last_fetch);
        age_ms < 0 || age_ms as u128 >= threshold.as_millis()
    }
}

/// Configuration for the [`Engine`](crate::Engine).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Queue retry and retention behavior.
    pub queue: QueueConfig,
    /// Pull thresholds per reference kind.
    pub freshness: FreshnessConfig,
    /// Period of the background cycle while online.
    pub background_sync_interval: Duration,
    /// Schedule an immediate push after each local mutation while online.
    pub push_on_write: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue: QueueConfig::default(),
            freshness: FreshnessConfig::default(),
            background_sync_interval: Duration::from_secs(5 * 60),
            push_on_write: true,
        }
    }
}

impl EngineConfig {
    pub fn with_queue(mut self, queue: QueueConfig) -> Self {
        self.queue = queue;
        self
    }

    pub fn with_freshness(mut self, freshness: FreshnessConfig) -> Self {
        self.freshness = freshness;
        self
    }

    pub fn with_background_sync_interval(mut self, interval: Duration) -> Self {
        self.background_sync_interval = interval;
        self
    }

    pub fn with_push_on_write(mut self, push: bool) -> Self {
        self.push_on_write = push;
        self
    }
}
