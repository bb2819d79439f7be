//! Error types for NFC reader operations.
//!
//! Adapters report failures with [`HardwareError`], which carries the
//! adapter-specific detail. [`HardwareError::outcome`] classifies every error
//! into the normalized [`NfcOutcome`] vocabulary so nothing adapter-specific
//! has to cross the adapter boundary.

use gymtap_core::NfcOutcome;

/// Result type alias for hardware operations.
pub type Result<T> = std::result::Result<T, HardwareError>;

/// Errors that can occur during NFC reader operations.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// No reader reachable: not attached, driver or permission failure, busy.
    #[error("Reader unavailable: {reason}")]
    Unavailable { reason: String },

    /// No compatible card was presented within the timeout.
    #[error("Operation timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// A card was presented but cannot be used (wrong technology, locked,
    /// too small for the payload, foreign content).
    #[error("Incompatible card{}: {}", card_suffix(.card_id), .reason)]
    IncompatibleCard {
        card_id: Option<String>,
        reason: String,
    },

    /// Reader disconnected mid-operation.
    #[error("Device disconnected: {device}")]
    Disconnected { device: String },

    /// Reader or card communication error.
    #[error("Communication error: {message}")]
    CommunicationError { message: String },

    /// Malformed data received from the reader.
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with custom message.
    #[error("{0}")]
    Other(String),
}

fn card_suffix(card_id: &Option<String>) -> String {
    card_id
        .as_ref()
        .map(|id| format!(" {id}"))
        .unwrap_or_default()
}

impl HardwareError {
    /// Create a new unavailable error.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Create a new timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Create a new incompatible card error.
    pub fn incompatible_card(card_id: Option<String>, reason: impl Into<String>) -> Self {
        Self::IncompatibleCard {
            card_id,
            reason: reason.into(),
        }
    }

    /// Create a new disconnected error.
    pub fn disconnected(device: impl Into<String>) -> Self {
        Self::Disconnected {
            device: device.into(),
        }
    }

    /// Create a new communication error.
    pub fn communication(message: impl Into<String>) -> Self {
        Self::CommunicationError {
            message: message.into(),
        }
    }

    /// Create a new invalid data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Create a generic error with custom message.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Normalized outcome for this error.
    pub fn outcome(&self) -> NfcOutcome {
        match self {
            Self::Unavailable { .. } => NfcOutcome::DeviceUnavailable,
            Self::Timeout { .. } => NfcOutcome::Timeout,
            Self::IncompatibleCard { .. } | Self::InvalidData { .. } => NfcOutcome::Mismatch,
            Self::Disconnected { .. }
            | Self::CommunicationError { .. }
            | Self::Io(_)
            | Self::Other(_) => NfcOutcome::Error,
        }
    }

    /// Whether this error means the reader itself is suspect and availability
    /// should be probed again before the next operation.
    pub fn invalidates_reader(&self) -> bool {
        matches!(
            self.outcome(),
            NfcOutcome::Error | NfcOutcome::DeviceUnavailable
        )
    }
}
