//! Process-wide reader availability cache.
//!
//! Lifecycle: created at startup (pinned to simulation when forced),
//! filled by a probe, invalidated after a hardware `Error` or
//! `DeviceUnavailable`, re-probed lazily by the next operation. Status
//! queries only read it.

use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use gymtap_core::{ReaderMode, ReaderStatus};
use serde::{Deserialize, Serialize};

/// Cached view of which reader is serving operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderAvailability {
    pub mode: ReaderMode,

    /// An adapter has been selected and is ready.
    pub available: bool,

    /// Simulation pinned by configuration.
    pub forced: bool,

    /// Why simulation is in use after a failed hardware probe.
    pub last_fallback_reason: Option<String>,

    /// When the reader was last probed, `None` if never.
    pub last_checked_at: Option<DateTime<Utc>>,

    /// The next operation must probe before using the reader.
    pub needs_probe: bool,
}

impl ReaderAvailability {
    fn initial(forced: bool) -> Self {
        Self {
            mode: ReaderMode::Simulation,
            available: forced,
            forced,
            last_fallback_reason: None,
            last_checked_at: None,
            needs_probe: !forced,
        }
    }
}

impl From<ReaderAvailability> for ReaderStatus {
    fn from(availability: ReaderAvailability) -> Self {
        Self {
            mode: availability.mode,
            available: availability.available,
            forced: availability.forced,
            last_fallback_reason: availability.last_fallback_reason,
            last_checked_at: availability.last_checked_at,
        }
    }
}

/// Thread-safe holder of the [`ReaderAvailability`].
#[derive(Debug)]
pub struct AvailabilityCache {
    state: RwLock<ReaderAvailability>,
}

impl AvailabilityCache {
    /// Fresh cache. When `forced`, the mode is pinned to simulation and
    /// no probe will ever be requested.
    pub fn new(forced: bool) -> Self {
        Self {
            state: RwLock::new(ReaderAvailability::initial(forced)),
        }
    }

    pub fn snapshot(&self) -> ReaderAvailability {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn status(&self) -> ReaderStatus {
        self.snapshot().into()
    }

    pub fn needs_probe(&self) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .needs_probe
    }

    /// Record a completed probe and return the state it replaced.
    pub fn record_probe(
        &self,
        mode: ReaderMode,
        fallback_reason: Option<String>,
    ) -> ReaderAvailability {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let previous = state.clone();

        if !state.forced {
            state.mode = mode;
            state.last_fallback_reason = fallback_reason;
        }
        state.available = true;
        state.needs_probe = false;
        state.last_checked_at = Some(Utc::now());

        previous
    }

    /// Request a re-probe before the next operation. No-op when forced.
    ///
    /// Returns whether the cache was actually invalidated.
    pub fn invalidate(&self) -> bool {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.forced {
            return false;
        }
        state.needs_probe = true;
        state.available = false;
        true
    }
}
