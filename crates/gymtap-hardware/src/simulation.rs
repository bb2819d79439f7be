//! Simulated NFC reader.
//!
//! Used when no hardware is attached, when simulation is forced by
//! configuration, and as the fallback after a failed hardware probe. It
//! performs no I/O: every operation waits an artificial delay that emulates
//! a person placing a card, then succeeds with a synthetic card id.
//!
//! The simulated session remembers the last payload written so that a
//! following read returns exactly those bytes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gymtap_core::constants::{
    DEFAULT_SIMULATION_DELAY_MS, SIMULATED_CARD_PREFIX, SIMULATED_READER_NAME,
};
use tracing::{debug, info};

use crate::error::{HardwareError, Result};
use crate::traits::NfcDevice;
use crate::types::{CardData, CardRead, CardWrite, ReaderInfo, TagType};

/// Simulated NFC reader.
///
/// # Examples
///
/// ```
/// use gymtap_hardware::simulation::SimulatedNfc;
/// use gymtap_hardware::traits::NfcDevice;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> gymtap_hardware::Result<()> {
///     let mut reader = SimulatedNfc::with_delay(Duration::from_millis(10));
///
///     let written = reader.write(b"hello", Duration::from_secs(30)).await?;
///     assert_eq!(written.card.card_id, "SIM0001");
///
///     let read = reader.read(Duration::from_secs(30)).await?;
///     assert_eq!(read.payload, b"hello");
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct SimulatedNfc {
    delay: Duration,
    stats: Arc<SimulationStats>,
    session: Arc<Mutex<Option<StoredCard>>>,
}

#[derive(Debug, Clone)]
struct StoredCard {
    card_id: String,
    payload: Vec<u8>,
}

#[derive(Debug, Default)]
struct SimulationStats {
    writes: AtomicU64,
    reads: AtomicU64,
    next_card: AtomicU64,
}

impl SimulatedNfc {
    /// Create a simulated reader with the default delay.
    pub fn new() -> Self {
        Self::with_delay(Duration::from_millis(DEFAULT_SIMULATION_DELAY_MS))
    }

    /// Create a simulated reader with a custom card-placement delay.
    pub fn with_delay(delay: Duration) -> Self {
        Self::with_counters(delay, &SimulationCounters::default())
    }

    /// Create a simulated reader that reports into existing counters.
    ///
    /// Readers sharing counters also share the card id sequence.
    pub fn with_counters(delay: Duration, counters: &SimulationCounters) -> Self {
        Self {
            delay,
            stats: Arc::clone(&counters.stats),
            session: Arc::new(Mutex::new(None)),
        }
    }

    /// Configured artificial delay.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Observer for the reader's counters that stays valid after the reader
    /// has been moved into an orchestrator.
    pub fn counters(&self) -> SimulationCounters {
        SimulationCounters {
            stats: Arc::clone(&self.stats),
        }
    }

    fn next_card_id(&self) -> String {
        let n = self.stats.next_card.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{SIMULATED_CARD_PREFIX}{n:04}")
    }

    /// Wait for the simulated card, bounded by the caller's timeout.
    ///
    /// Returns `false` when the timeout is shorter than the simulated
    /// placement delay: nobody "placed" the card in time.
    async fn wait_for_card(&self, timeout: Duration) -> bool {
        if timeout < self.delay {
            tokio::time::sleep(timeout).await;
            return false;
        }
        tokio::time::sleep(self.delay).await;
        true
    }

    fn stored(&self) -> Option<StoredCard> {
        match self.session.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn store(&self, card: StoredCard) {
        match self.session.lock() {
            Ok(mut guard) => *guard = Some(card),
            Err(poisoned) => *poisoned.into_inner() = Some(card),
        }
    }
}

impl Default for SimulatedNfc {
    fn default() -> Self {
        Self::new()
    }
}

impl NfcDevice for SimulatedNfc {
    async fn detect(&mut self) -> Result<ReaderInfo> {
        Ok(self.reader_info())
    }

    async fn write(&mut self, payload: &[u8], timeout: Duration) -> Result<CardWrite> {
        self.stats.writes.fetch_add(1, Ordering::SeqCst);
        debug!(bytes = payload.len(), "Simulating card write");

        if !self.wait_for_card(timeout).await {
            return Err(HardwareError::timeout(timeout.as_millis() as u64));
        }

        let capacity = TagType::Simulated.user_memory_bytes().unwrap_or_default();
        if payload.len() > capacity {
            return Err(HardwareError::incompatible_card(
                None,
                format!(
                    "payload of {} bytes exceeds {} bytes of card memory",
                    payload.len(),
                    capacity
                ),
            ));
        }

        let card_id = self.next_card_id();
        self.store(StoredCard {
            card_id: card_id.clone(),
            payload: payload.to_vec(),
        });

        info!(card_id = %card_id, "Simulated write committed");

        Ok(CardWrite {
            card: CardData::synthetic(card_id),
            bytes_written: payload.len(),
        })
    }

    async fn read(&mut self, timeout: Duration) -> Result<CardRead> {
        self.stats.reads.fetch_add(1, Ordering::SeqCst);
        debug!("Simulating card read");

        if !self.wait_for_card(timeout).await {
            return Err(HardwareError::timeout(timeout.as_millis() as u64));
        }

        // A read before any write sees a blank card.
        let stored = self.stored().unwrap_or_else(|| StoredCard {
            card_id: format!("{SIMULATED_CARD_PREFIX}0000"),
            payload: Vec::new(),
        });

        Ok(CardRead {
            card: CardData::synthetic(stored.card_id),
            payload: stored.payload,
        })
    }

    fn reader_info(&self) -> ReaderInfo {
        ReaderInfo::new(SIMULATED_READER_NAME, vec!["ISO14443A".to_string()]).simulated()
    }
}

/// Activity counters of one or more [`SimulatedNfc`] readers.
#[derive(Debug, Clone, Default)]
pub struct SimulationCounters {
    stats: Arc<SimulationStats>,
}

impl SimulationCounters {
    /// Number of write attempts that reached the simulated reader.
    pub fn writes(&self) -> u64 {
        self.stats.writes.load(Ordering::SeqCst)
    }

    /// Number of read attempts that reached the simulated reader.
    pub fn reads(&self) -> u64 {
        self.stats.reads.load(Ordering::SeqCst)
    }
}
