use crate::{Result, constants::MAX_TOKEN_LENGTH, error::Error};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use subtle::ConstantTimeEq;

/// Member identifier (positive database key owned by the member directory).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(i64);

impl MemberId {
    /// Create a new member ID with validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidInput` if the ID is not positive.
    pub fn new(id: i64) -> Result<Self> {
        if id <= 0 {
            return Err(Error::InvalidInput(format!(
                "Member ID must be positive, got {id}"
            )));
        }
        Ok(MemberId(id))
    }

    /// Get the raw ID.
    #[must_use]
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<i64> for MemberId {
    type Error = Error;

    fn try_from(id: i64) -> Result<Self> {
        MemberId::new(id)
    }
}

impl std::str::FromStr for MemberId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let id: i64 = s
            .trim()
            .parse()
            .map_err(|_| Error::InvalidInput(format!("Invalid member ID: {s}")))?;
        MemberId::new(id)
    }
}

/// Opaque token value (ASCII alphanumeric, 1-64 characters).
///
/// # Security
/// Equality is constant-time so that looking up or comparing a presented
/// token does not leak how many leading characters matched.
#[derive(Clone, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TokenValue(String);

impl TokenValue {
    /// Create a new token value with validation.
    ///
    /// Surrounding whitespace is trimmed; case is preserved.
    ///
    /// # Errors
    /// Returns `Error::InvalidInput` if the value is empty, longer than
    /// [`MAX_TOKEN_LENGTH`], or contains anything but ASCII letters and digits.
    pub fn new(value: &str) -> Result<Self> {
        let value = value.trim();

        if value.is_empty() || value.len() > MAX_TOKEN_LENGTH {
            return Err(Error::InvalidInput(format!(
                "Token must be 1-{MAX_TOKEN_LENGTH} chars, got {}",
                value.len()
            )));
        }

        if !value.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(Error::InvalidInput(
                "Token must be ASCII alphanumeric".to_string(),
            ));
        }

        Ok(TokenValue(value.to_string()))
    }

    /// Get the token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short, log-safe prefix of the token (first 6 characters).
    #[must_use]
    pub fn redacted(&self) -> String {
        let visible: String = self.0.chars().take(6).collect();
        format!("{visible}…")
    }
}

impl PartialEq for TokenValue {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_bytes().ct_eq(other.0.as_bytes()).into()
    }
}

impl std::hash::Hash for TokenValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

// Tokens are credentials: never print them whole in debug output.
impl fmt::Debug for TokenValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TokenValue").field(&self.redacted()).finish()
    }
}

impl fmt::Display for TokenValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TokenValue {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        TokenValue::new(s)
    }
}

impl TryFrom<String> for TokenValue {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        TokenValue::new(&value)
    }
}

impl From<TokenValue> for String {
    fn from(value: TokenValue) -> Self {
        value.0
    }
}

/// Lifecycle state of a token, derived from its stored fields.
///
/// Precedence: `Revoked` wins over `Expired`, which wins over `Valid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenState {
    /// Usable for access and for card writes.
    Valid,
    /// `expires_at` has passed.
    Expired,
    /// Explicitly revoked. Irreversible.
    Revoked,
}

impl TokenState {
    /// Derive the state from stored fields at a given instant.
    ///
    /// A token whose `expires_at` equals `now` is already expired.
    pub fn derive(revoked: bool, expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        if revoked {
            Self::Revoked
        } else if expires_at.is_some_and(|exp| exp <= now) {
            Self::Expired
        } else {
            Self::Valid
        }
    }

    /// Check if the token may be used.
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Expired => "expired",
            Self::Revoked => "revoked",
        }
    }
}

impl fmt::Display for TokenState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which adapter family serves NFC operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReaderMode {
    /// A physical contactless reader.
    Hardware,
    /// Synthetic responses, no physical I/O.
    Simulation,
}

impl fmt::Display for ReaderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hardware => write!(f, "hardware"),
            Self::Simulation => write!(f, "simulation"),
        }
    }
}

/// Normalized outcome of one NFC write or read.
///
/// Every variant needs a different instruction for the front-desk operator,
/// so they are never collapsed into a generic failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NfcOutcome {
    /// Payload committed to (or read from) a card.
    Success,
    /// No compatible card was presented in time.
    Timeout,
    /// No reader reachable.
    DeviceUnavailable,
    /// Another operation is using the reader.
    DeviceBusy,
    /// A card was presented but has the wrong technology, is locked, too
    /// small, or carries content in an unexpected format.
    Mismatch,
    /// Any other fault (permission denied, disconnect mid-operation, ...).
    Error,
}

impl NfcOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Short instruction for the operator at the desk.
    pub fn operator_hint(&self) -> &'static str {
        match self {
            Self::Success => "Done",
            Self::Timeout => "No card detected, place the card on the reader and try again",
            Self::DeviceUnavailable => "Reader not reachable, check the USB connection",
            Self::DeviceBusy => "Reader is busy with another card, wait a moment and retry",
            Self::Mismatch => "This card cannot be used, try a different card",
            Self::Error => "Reader error, check the hardware before retrying",
        }
    }
}

impl fmt::Display for NfcOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Success => "success",
            Self::Timeout => "timeout",
            Self::DeviceUnavailable => "device_unavailable",
            Self::DeviceBusy => "device_busy",
            Self::Mismatch => "mismatch",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Result of one orchestrated NFC operation. Ephemeral, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NfcOperationResult {
    pub outcome: NfcOutcome,

    /// Identifier of the card involved, present on success.
    pub card_id: Option<String>,

    /// Bytes written or read, when applicable.
    pub payload: Option<Vec<u8>>,

    /// Wall-clock time the operation took.
    pub duration_ms: u64,

    /// Reader mode that served the operation.
    pub mode: ReaderMode,

    /// Operator-facing description.
    pub message: String,
}

impl NfcOperationResult {
    /// Successful operation on `card_id`.
    pub fn success(
        mode: ReaderMode,
        card_id: impl Into<String>,
        payload: Vec<u8>,
        duration_ms: u64,
    ) -> Self {
        let card_id = card_id.into();
        Self {
            outcome: NfcOutcome::Success,
            message: format!("Card {card_id} processed ({mode} mode)"),
            card_id: Some(card_id),
            payload: Some(payload),
            duration_ms,
            mode,
        }
    }

    /// Failed operation with the given outcome and detail.
    pub fn failure(
        mode: ReaderMode,
        outcome: NfcOutcome,
        message: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        debug_assert!(!outcome.is_success(), "failure() requires a non-success outcome");
        Self {
            outcome,
            card_id: None,
            payload: None,
            duration_ms,
            mode,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }
}

/// Snapshot of the cached reader availability, cheap to produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderStatus {
    pub mode: ReaderMode,

    /// Whether an adapter is ready to serve operations.
    pub available: bool,

    /// Simulation pinned by configuration.
    pub forced: bool,

    /// Why simulation is in use after a failed hardware probe.
    pub last_fallback_reason: Option<String>,

    /// When the reader was last probed, `None` if never.
    pub last_checked_at: Option<DateTime<Utc>>,
}
