//! NFC reader abstraction layer for GymTap.
//!
//! This crate defines the [`NfcDevice`] trait and its variants:
//!
//! - [`SimulatedNfc`](simulation::SimulatedNfc): no I/O, fixed artificial
//!   delay, synthetic card ids. Always available.
//! - [`MockNfc`](mock::MockNfc): scriptable reader for tests.
//! - `PcscNfc`: PC/SC USB readers, behind the `hardware-pcsc` feature.
//!
//! [`AnyNfcDevice`](devices::AnyNfcDevice) dispatches between them.
//!
//! # Error Handling
//!
//! All operations return [`Result<T>`][error::Result] with a
//! [`HardwareError`]. Errors never leave the NFC layer raw: callers classify
//! them with [`HardwareError::outcome`] into the shared outcome vocabulary.
//!
//! # Example
//!
//! ```no_run
//! use gymtap_hardware::traits::NfcDevice;
//! use gymtap_hardware::error::Result;
//! use std::time::Duration;
//!
//! async fn issue<D: NfcDevice>(reader: &mut D) -> Result<String> {
//!     let written = reader.write(b"payload", Duration::from_secs(30)).await?;
//!     Ok(written.card.card_id)
//! }
//! ```
//!
//! [`NfcDevice`]: traits::NfcDevice

pub mod devices;
pub mod error;
pub mod mock;
pub mod ndef;
#[cfg(feature = "hardware-pcsc")]
pub mod pcsc_reader;
pub mod simulation;
pub mod traits;
pub mod types;

// Re-export commonly used types for convenience
pub use devices::{AnyNfcDevice, open_hardware};
pub use error::{HardwareError, Result};
pub use traits::NfcDevice;
pub use types::{CardData, CardRead, CardWrite, ReaderInfo, TagType};
