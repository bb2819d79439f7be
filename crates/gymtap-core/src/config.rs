//! Runtime configuration for NFC operations.
//!
//! Values are injected at startup by the binary (flags, environment, `.env`);
//! the core never reads the environment itself.

use crate::constants::{
    DEFAULT_ADMISSION_TIMEOUT_MS, DEFAULT_OPERATION_TIMEOUT_MS, DEFAULT_SIMULATION_DELAY_MS,
    DEFAULT_TIMEOUT_GRACE_MS, MAX_SIMULATION_DELAY_MS,
};
use crate::{Error, Result};
use std::time::Duration;

/// NFC reader configuration.
///
/// # Examples
///
/// ```
/// use gymtap_core::NfcConfig;
/// use std::time::Duration;
///
/// let config = NfcConfig::default()
///     .force_simulation(true)
///     .simulation_delay(Duration::from_millis(2000));
///
/// assert!(config.force_simulation);
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NfcConfig {
    /// Never touch hardware; pin the reader to simulation mode.
    pub force_simulation: bool,

    /// Card-placement timeout used when the caller does not pass one.
    pub default_timeout: Duration,

    /// Index of the reader to open when several are attached.
    pub device_index: Option<usize>,

    /// Artificial latency of the simulated reader.
    pub simulation_delay: Duration,

    /// Slack granted to an adapter beyond the requested timeout.
    pub timeout_grace: Duration,

    /// Bound on waiting for the reader to become free.
    pub admission_timeout: Duration,
}

impl Default for NfcConfig {
    fn default() -> Self {
        Self {
            force_simulation: false,
            default_timeout: Duration::from_millis(DEFAULT_OPERATION_TIMEOUT_MS),
            device_index: None,
            simulation_delay: Duration::from_millis(DEFAULT_SIMULATION_DELAY_MS),
            timeout_grace: Duration::from_millis(DEFAULT_TIMEOUT_GRACE_MS),
            admission_timeout: Duration::from_millis(DEFAULT_ADMISSION_TIMEOUT_MS),
        }
    }
}

impl NfcConfig {
    /// Set whether simulation mode is forced
    pub fn force_simulation(mut self, force: bool) -> Self {
        self.force_simulation = force;
        self
    }

    /// Set the default card-placement timeout
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Select a reader by index
    pub fn device_index(mut self, index: usize) -> Self {
        self.device_index = Some(index);
        self
    }

    /// Set the simulated card-placement latency
    pub fn simulation_delay(mut self, delay: Duration) -> Self {
        self.simulation_delay = delay;
        self
    }

    /// Set the grace period added to every device timeout
    pub fn timeout_grace(mut self, grace: Duration) -> Self {
        self.timeout_grace = grace;
        self
    }

    /// Set how long a request may queue for the reader
    pub fn admission_timeout(mut self, timeout: Duration) -> Self {
        self.admission_timeout = timeout;
        self
    }

    /// Check value ranges.
    ///
    /// # Errors
    /// Returns `Error::Config` for a zero default timeout or a simulation
    /// delay above [`MAX_SIMULATION_DELAY_MS`].
    pub fn validate(&self) -> Result<()> {
        if self.default_timeout.is_zero() {
            return Err(Error::Config(
                "Default operation timeout must be greater than zero".to_string(),
            ));
        }

        if self.simulation_delay > Duration::from_millis(MAX_SIMULATION_DELAY_MS) {
            return Err(Error::Config(format!(
                "Simulation delay must be at most {MAX_SIMULATION_DELAY_MS}ms, got {}ms",
                self.simulation_delay.as_millis()
            )));
        }

        Ok(())
    }
}
