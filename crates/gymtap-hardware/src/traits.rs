//! NFC reader trait definition.
//!
//! [`NfcDevice`] is the single capability set every reader variant exposes:
//! detect, blocking write, blocking read. The physical and simulated variants
//! implement it with identical result shapes and the same error vocabulary,
//! so callers work unmodified against either.
//!
//! The trait uses native `async fn` methods (Rust 1.90 + Edition 2024 RPITIT),
//! eliminating the need for the `async_trait` macro.

#![allow(async_fn_in_trait)]

use std::time::Duration;

use crate::error::Result;
use crate::types::{CardRead, CardWrite, ReaderInfo};

/// NFC reader device abstraction.
///
/// # Object Safety and Dynamic Dispatch
///
/// **NOTE**: This trait is NOT object-safe because `async fn` methods return
/// `impl Future`. For dynamic dispatch use
/// [`AnyNfcDevice`](crate::devices::AnyNfcDevice), which keeps the concrete
/// future types visible (and therefore `Send`) to the compiler.
///
/// # Examples
///
/// ```no_run
/// use gymtap_hardware::traits::NfcDevice;
/// use gymtap_hardware::error::Result;
/// use std::time::Duration;
///
/// async fn issue<D: NfcDevice>(reader: &mut D, payload: &[u8]) -> Result<String> {
///     reader.detect().await?;
///     let written = reader.write(payload, Duration::from_secs(30)).await?;
///     Ok(written.card.card_id)
/// }
/// ```
pub trait NfcDevice: Send + Sync {
    /// Open or verify the reader.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::Unavailable`](crate::HardwareError::Unavailable)
    /// if no device is attached, the driver or permissions fail, or the
    /// device is held by another process.
    async fn detect(&mut self) -> Result<ReaderInfo>;

    /// Write `payload` to the next compatible card presented.
    ///
    /// Blocks asynchronously until a card is presented and the payload is
    /// committed, or `timeout` elapses.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No card is presented within `timeout` (`Timeout`)
    /// - The card has the wrong technology, is locked, or is too small
    ///   (`IncompatibleCard`)
    /// - The reader fails or disconnects mid-operation
    async fn write(&mut self, payload: &[u8], timeout: Duration) -> Result<CardWrite>;

    /// Read the payload of the next card presented.
    ///
    /// # Errors
    ///
    /// Same conditions as [`write`](Self::write).
    async fn read(&mut self, timeout: Duration) -> Result<CardRead>;

    /// Get reader information without touching the device.
    fn reader_info(&self) -> ReaderInfo;
}
