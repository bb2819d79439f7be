//! Card payload format.
//!
//! Version 1 layout, all integers big-endian:
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 2 | magic `"GT"` |
//! | 2 | 1 | version `0x01` |
//! | 3 | 8 | member id (u64) |
//! | 11 | 8 | issued at (i64 unix seconds) |
//! | 19 | 1 | token length N (1..=64) |
//! | 20 | N | token (ASCII alphanumeric) |
//! | 20+N | 1 | XOR of all preceding bytes |
//!
//! The payload is not encrypted: the token is a bearer credential that the
//! database can revoke, and the card only carries what the front desk
//! already printed on the member's account.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};
use gymtap_core::constants::MAX_TOKEN_LENGTH;
use gymtap_core::{MemberId, TokenValue};
use thiserror::Error;

/// Payload magic bytes.
pub const MAGIC: [u8; 2] = *b"GT";

/// Current payload version.
pub const VERSION: u8 = 0x01;

/// Bytes before the token: magic, version, member id, timestamp, length.
const HEADER_LEN: usize = 20;

/// Errors produced while decoding a card payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    /// Card is blank.
    #[error("card is blank")]
    Empty,

    #[error("payload truncated: need {needed} bytes, got {available}")]
    Truncated { needed: usize, available: usize },

    #[error("payload has {0} trailing bytes")]
    TrailingBytes(usize),

    #[error("not a GymTap payload (magic {0:02X?})")]
    BadMagic([u8; 2]),

    #[error("unsupported payload version {0}")]
    UnsupportedVersion(u8),

    #[error("invalid token length {0}")]
    InvalidTokenLength(u8),

    #[error("checksum mismatch: expected {expected:02X}, got {actual:02X}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    #[error("invalid member id {0}")]
    InvalidMemberId(u64),

    #[error("invalid timestamp {0}")]
    InvalidTimestamp(i64),

    #[error("token is not ASCII alphanumeric")]
    InvalidToken,
}

/// Decoded contents of a GymTap card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardPayload {
    pub member_id: MemberId,
    pub token: TokenValue,

    /// Issue time, second precision.
    pub issued_at: DateTime<Utc>,
}

impl CardPayload {
    /// Build a payload; `issued_at` is truncated to whole seconds.
    pub fn new(member_id: MemberId, token: TokenValue, issued_at: DateTime<Utc>) -> Self {
        let issued_at =
            DateTime::from_timestamp(issued_at.timestamp(), 0).unwrap_or(DateTime::UNIX_EPOCH);
        Self {
            member_id,
            token,
            issued_at,
        }
    }

    /// Serialize to the version 1 layout.
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::Utc;
    /// use gymtap_core::{MemberId, TokenValue};
    /// use gymtap_nfc::payload::CardPayload;
    ///
    /// let payload = CardPayload::new(
    ///     MemberId::new(42).unwrap(),
    ///     TokenValue::new("abc123").unwrap(),
    ///     Utc::now(),
    /// );
    /// let bytes = payload.encode();
    /// assert_eq!(&bytes[..3], b"GT\x01");
    /// assert_eq!(CardPayload::decode(&bytes).unwrap(), payload);
    /// ```
    pub fn encode(&self) -> Bytes {
        let token = self.token.as_str().as_bytes();
        let mut buf = BytesMut::with_capacity(HEADER_LEN + token.len() + 1);

        buf.put_slice(&MAGIC);
        buf.put_u8(VERSION);
        buf.put_u64(self.member_id.get() as u64);
        buf.put_i64(self.issued_at.timestamp());
        // TokenValue guarantees 1..=64 bytes
        buf.put_u8(token.len() as u8);
        buf.put_slice(token);

        let checksum = xor_checksum(&buf);
        buf.put_u8(checksum);

        buf.freeze()
    }

    /// Parse a version 1 payload.
    ///
    /// # Errors
    ///
    /// Returns a [`PayloadError`] for blank, foreign, truncated or corrupted
    /// input. Never panics.
    pub fn decode(input: &[u8]) -> Result<Self, PayloadError> {
        if input.is_empty() {
            return Err(PayloadError::Empty);
        }
        if input.len() < 3 {
            return Err(PayloadError::Truncated {
                needed: HEADER_LEN + 2,
                available: input.len(),
            });
        }

        let magic = [input[0], input[1]];
        if magic != MAGIC {
            return Err(PayloadError::BadMagic(magic));
        }
        if input[2] != VERSION {
            return Err(PayloadError::UnsupportedVersion(input[2]));
        }
        if input.len() < HEADER_LEN {
            return Err(PayloadError::Truncated {
                needed: HEADER_LEN + 2,
                available: input.len(),
            });
        }

        let token_len = input[HEADER_LEN - 1];
        if token_len == 0 || token_len as usize > MAX_TOKEN_LENGTH {
            return Err(PayloadError::InvalidTokenLength(token_len));
        }

        let total = HEADER_LEN + token_len as usize + 1;
        if input.len() < total {
            return Err(PayloadError::Truncated {
                needed: total,
                available: input.len(),
            });
        }
        if input.len() > total {
            return Err(PayloadError::TrailingBytes(input.len() - total));
        }

        let expected = xor_checksum(&input[..total - 1]);
        let actual = input[total - 1];
        if expected != actual {
            return Err(PayloadError::ChecksumMismatch { expected, actual });
        }

        let mut buf = &input[3..total - 1];
        let raw_member = buf.get_u64();
        let issued_secs = buf.get_i64();
        buf.advance(1);
        let token_bytes = buf.chunk();

        let member_id = i64::try_from(raw_member)
            .ok()
            .and_then(|id| MemberId::new(id).ok())
            .ok_or(PayloadError::InvalidMemberId(raw_member))?;

        let issued_at = DateTime::from_timestamp(issued_secs, 0)
            .ok_or(PayloadError::InvalidTimestamp(issued_secs))?;

        if !token_bytes.iter().all(u8::is_ascii_alphanumeric) {
            return Err(PayloadError::InvalidToken);
        }
        let token = std::str::from_utf8(token_bytes)
            .ok()
            .and_then(|s| TokenValue::new(s).ok())
            .ok_or(PayloadError::InvalidToken)?;

        Ok(Self {
            member_id,
            token,
            issued_at,
        })
    }
}

fn xor_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc ^ b)
}
