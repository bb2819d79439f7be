//! Constants shared across the GymTap workspace.
//!
//! Timeouts are expressed in milliseconds unless the name says otherwise.
//!
//! ```
//! use gymtap_core::constants::*;
//! use std::time::Duration;
//!
//! let timeout = Duration::from_millis(DEFAULT_OPERATION_TIMEOUT_MS);
//! assert_eq!(timeout.as_secs(), 30);
//! ```

// ============================================================================
// Token constants
// ============================================================================

/// Length of a generated token value, in characters.
///
/// Values are drawn from the 62-character alphanumeric alphabet, so 32
/// characters carry roughly 190 bits of entropy.
pub const TOKEN_LENGTH: usize = 32;

/// Maximum accepted token length when parsing caller input or card payloads.
pub const MAX_TOKEN_LENGTH: usize = 64;

/// Maximum lifetime accepted for a token, in days.
pub const MAX_TOKEN_TTL_DAYS: u32 = 3650;

/// Attempts made to draw a non-colliding token value before giving up.
pub const MAX_GENERATION_ATTEMPTS: usize = 8;

// ============================================================================
// NFC operation constants
// ============================================================================

/// Default time a write or read waits for a card to be presented.
pub const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 30_000;

/// Longest card-placement timeout a caller may request.
pub const MAX_OPERATION_TIMEOUT_MS: u64 = 120_000;

/// Extra time the orchestrator grants an adapter beyond the requested timeout
/// before it reports `Timeout` on the adapter's behalf.
pub const DEFAULT_TIMEOUT_GRACE_MS: u64 = 2_000;

/// How long a request waits for the reader to become free before it is
/// rejected with `DeviceBusy`.
pub const DEFAULT_ADMISSION_TIMEOUT_MS: u64 = 250;

/// Artificial card-placement latency of the simulated reader.
pub const DEFAULT_SIMULATION_DELAY_MS: u64 = 2_500;

/// Upper bound accepted for the simulated delay.
pub const MAX_SIMULATION_DELAY_MS: u64 = 5_000;

/// Prefix of simulated card identifiers (`SIM0001`, `SIM0002`, ...).
pub const SIMULATED_CARD_PREFIX: &str = "SIM";

/// Human-readable name reported by the simulated reader.
pub const SIMULATED_READER_NAME: &str = "GymTap Simulated Reader";

// ============================================================================
// Storage constants
// ============================================================================

/// Database file used when no `DATABASE_URL` is configured.
pub const DEFAULT_DATABASE_PATH: &str = "gymtap.db";
