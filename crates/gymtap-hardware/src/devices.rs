//! Enum wrapper for NFC reader dispatch.
//!
//! Native `async fn` in traits is not object-safe, so `Box<dyn NfcDevice>`
//! is unavailable. [`AnyNfcDevice`] provides concrete dispatch instead, with
//! the hardware variant behind the `hardware-pcsc` feature.
//!
//! # Examples
//!
//! ```
//! use gymtap_hardware::devices::AnyNfcDevice;
//! use gymtap_hardware::simulation::SimulatedNfc;
//!
//! let reader = AnyNfcDevice::Simulated(SimulatedNfc::new());
//! assert!(reader.is_simulated());
//! ```

use std::time::Duration;

use gymtap_core::ReaderMode;

use crate::mock::MockNfc;
#[cfg(feature = "hardware-pcsc")]
use crate::pcsc_reader::PcscNfc;
use crate::simulation::SimulatedNfc;
use crate::traits::NfcDevice;
use crate::types::{CardRead, CardWrite, ReaderInfo};
use crate::Result;

/// Enum wrapper for NFC reader dispatch.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyNfcDevice {
    /// Software reader with an artificial delay.
    Simulated(SimulatedNfc),

    /// Scriptable reader for development and testing.
    Mock(MockNfc),

    /// PC/SC attached USB reader.
    #[cfg(feature = "hardware-pcsc")]
    Pcsc(PcscNfc),
}

impl AnyNfcDevice {
    /// Mode reported in operation results.
    ///
    /// The mock stands in for hardware, so it reports
    /// [`ReaderMode::Hardware`].
    pub fn mode(&self) -> ReaderMode {
        match self {
            Self::Simulated(_) => ReaderMode::Simulation,
            Self::Mock(_) => ReaderMode::Hardware,
            #[cfg(feature = "hardware-pcsc")]
            Self::Pcsc(_) => ReaderMode::Hardware,
        }
    }

    /// Whether this is the simulated variant.
    pub fn is_simulated(&self) -> bool {
        matches!(self, Self::Simulated(_))
    }
}

impl NfcDevice for AnyNfcDevice {
    async fn detect(&mut self) -> Result<ReaderInfo> {
        match self {
            Self::Simulated(device) => device.detect().await,
            Self::Mock(device) => device.detect().await,
            #[cfg(feature = "hardware-pcsc")]
            Self::Pcsc(device) => device.detect().await,
        }
    }

    async fn write(&mut self, payload: &[u8], timeout: Duration) -> Result<CardWrite> {
        match self {
            Self::Simulated(device) => device.write(payload, timeout).await,
            Self::Mock(device) => device.write(payload, timeout).await,
            #[cfg(feature = "hardware-pcsc")]
            Self::Pcsc(device) => device.write(payload, timeout).await,
        }
    }

    async fn read(&mut self, timeout: Duration) -> Result<CardRead> {
        match self {
            Self::Simulated(device) => device.read(timeout).await,
            Self::Mock(device) => device.read(timeout).await,
            #[cfg(feature = "hardware-pcsc")]
            Self::Pcsc(device) => device.read(timeout).await,
        }
    }

    fn reader_info(&self) -> ReaderInfo {
        match self {
            Self::Simulated(device) => device.reader_info(),
            Self::Mock(device) => device.reader_info(),
            #[cfg(feature = "hardware-pcsc")]
            Self::Pcsc(device) => device.reader_info(),
        }
    }
}

/// Open the physical reader selected by `device_index`.
///
/// # Errors
///
/// Returns [`HardwareError::Unavailable`](crate::HardwareError::Unavailable)
/// when no reader can be opened, including when the crate was built
/// without the `hardware-pcsc` feature.
pub fn open_hardware(device_index: Option<usize>) -> Result<AnyNfcDevice> {
    #[cfg(feature = "hardware-pcsc")]
    {
        PcscNfc::open(device_index).map(AnyNfcDevice::Pcsc)
    }

    #[cfg(not(feature = "hardware-pcsc"))]
    {
        let _ = device_index;
        Err(crate::HardwareError::unavailable(
            "hardware support not compiled in",
        ))
    }
}
