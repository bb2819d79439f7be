//! Common types shared across NFC adapter implementations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::HardwareError;
use crate::error::Result;

/// Minimum UID length in bytes (per ISO 14443 specification).
pub const MIN_UID_LENGTH: usize = 4;

/// Maximum UID length in bytes (per ISO 14443 specification).
pub const MAX_UID_LENGTH: usize = 10;

/// Reader information.
///
/// Contains reader-specific metadata such as name and supported protocols.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderInfo {
    /// Reader name (e.g., "ACS ACR122U PICC Interface").
    pub name: String,

    /// List of supported protocols (e.g., ["ISO14443A"]).
    pub protocols: Vec<String>,

    /// Whether the reader is simulated.
    pub simulated: bool,
}

impl ReaderInfo {
    /// Create a new ReaderInfo for a physical reader.
    pub fn new(name: impl Into<String>, protocols: Vec<String>) -> Self {
        Self {
            name: name.into(),
            protocols,
            simulated: false,
        }
    }

    /// Mark the reader as simulated.
    pub fn simulated(mut self) -> Self {
        self.simulated = true;
        self
    }
}

/// NFC tag technology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum TagType {
    /// NXP NTAG213 (144 bytes user memory).
    Ntag213,

    /// NXP NTAG215 (504 bytes user memory).
    Ntag215,

    /// NXP NTAG216 (888 bytes user memory).
    Ntag216,

    /// Mifare Ultralight (48 bytes user memory).
    MifareUltralight,

    /// Mifare Classic 1K; sector-authenticated, not NDEF writable here.
    MifareClassic1K,

    /// Card produced by the simulated reader (behaves like an NTAG215).
    Simulated,

    /// Unknown tag with raw identification bytes.
    Unknown(Vec<u8>),
}

impl TagType {
    /// Get a human-readable name for the tag type.
    pub fn name(&self) -> &str {
        match self {
            Self::Ntag213 => "NTAG213",
            Self::Ntag215 => "NTAG215",
            Self::Ntag216 => "NTAG216",
            Self::MifareUltralight => "Mifare Ultralight",
            Self::MifareClassic1K => "Mifare Classic 1K",
            Self::Simulated => "Simulated",
            Self::Unknown(_) => "Unknown",
        }
    }

    /// Writable user memory in bytes, `None` if the tag cannot hold a
    /// page-addressed NDEF payload.
    pub fn user_memory_bytes(&self) -> Option<usize> {
        match self {
            Self::Ntag213 => Some(144),
            Self::Ntag215 | Self::Simulated => Some(504),
            Self::Ntag216 => Some(888),
            Self::MifareUltralight => Some(48),
            Self::MifareClassic1K | Self::Unknown(_) => None,
        }
    }

    /// Map an NDEF capability-container size byte (`CC[2]`, memory / 8)
    /// to the matching NTAG family member.
    pub fn from_capability_size(size_byte: u8) -> Self {
        match size_byte {
            0x12 => Self::Ntag213,
            0x3E => Self::Ntag215,
            0x6D => Self::Ntag216,
            0x06 => Self::MifareUltralight,
            other => Self::Unknown(vec![other]),
        }
    }
}

/// A card seen by a reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardData {
    /// Card identifier: upper-case hex UID, or a synthetic id for simulated cards.
    pub card_id: String,

    /// Tag technology.
    pub tag_type: TagType,

    /// When the card was seen.
    pub timestamp: DateTime<Utc>,
}

impl CardData {
    /// Card data for a physical UID.
    ///
    /// # Errors
    ///
    /// Returns an error if the UID length is not within the valid range
    /// of 4-10 bytes as specified by ISO 14443.
    ///
    /// # Examples
    ///
    /// ```
    /// use gymtap_hardware::types::{CardData, TagType};
    ///
    /// let card = CardData::from_uid(&[0x04, 0xAB, 0xCD, 0xEF], TagType::Ntag215).unwrap();
    /// assert_eq!(card.card_id, "04ABCDEF");
    /// ```
    pub fn from_uid(uid: &[u8], tag_type: TagType) -> Result<Self> {
        if !(MIN_UID_LENGTH..=MAX_UID_LENGTH).contains(&uid.len()) {
            return Err(HardwareError::invalid_data(format!(
                "Card UID length must be between {} and {} bytes, got {}",
                MIN_UID_LENGTH,
                MAX_UID_LENGTH,
                uid.len()
            )));
        }

        Ok(Self {
            card_id: uid.iter().map(|b| format!("{:02X}", b)).collect(),
            tag_type,
            timestamp: Utc::now(),
        })
    }

    /// Card data for a synthetic identifier.
    pub fn synthetic(card_id: impl Into<String>) -> Self {
        Self {
            card_id: card_id.into(),
            tag_type: TagType::Simulated,
            timestamp: Utc::now(),
        }
    }
}

/// Outcome of a committed write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardWrite {
    pub card: CardData,
    pub bytes_written: usize,
}

/// Outcome of a completed read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardRead {
    pub card: CardData,

    /// Raw payload found on the card; empty for a blank card.
    pub payload: Vec<u8>,
}
