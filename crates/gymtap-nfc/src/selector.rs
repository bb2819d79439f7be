//! Reader selection with simulation fallback.

use std::fmt;
use std::sync::Arc;

use gymtap_core::NfcConfig;
use gymtap_hardware::simulation::{SimulatedNfc, SimulationCounters};
use gymtap_hardware::{AnyNfcDevice, NfcDevice};
use tracing::debug;

/// Opens the hardware reader for a configuration.
pub type DeviceFactory =
    Arc<dyn Fn(&NfcConfig) -> gymtap_hardware::Result<AnyNfcDevice> + Send + Sync>;

/// Result of a probe.
#[derive(Debug)]
pub struct Selection {
    pub device: AnyNfcDevice,

    /// Set when hardware was wanted but simulation had to be used.
    pub fallback_reason: Option<String>,
}

/// Chooses the adapter: simulation when forced, otherwise hardware if it
/// opens and detects, otherwise simulation with a fallback reason.
#[derive(Clone)]
pub struct DeviceSelector {
    config: NfcConfig,
    factory: DeviceFactory,
    counters: SimulationCounters,
}

impl fmt::Debug for DeviceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceSelector")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DeviceSelector {
    /// Selector that opens the PC/SC reader at `config.device_index`.
    pub fn new(config: NfcConfig) -> Self {
        Self::with_factory(
            config,
            Arc::new(|config: &NfcConfig| gymtap_hardware::open_hardware(config.device_index)),
        )
    }

    /// Selector with a custom hardware factory.
    pub fn with_factory(config: NfcConfig, factory: DeviceFactory) -> Self {
        Self {
            config,
            factory,
            counters: SimulationCounters::default(),
        }
    }

    pub fn config(&self) -> &NfcConfig {
        &self.config
    }

    /// A fresh simulated reader with the configured delay.
    pub fn simulated(&self) -> AnyNfcDevice {
        AnyNfcDevice::Simulated(SimulatedNfc::with_counters(
            self.config.simulation_delay,
            &self.counters,
        ))
    }

    /// Counters of every simulated reader this selector has created.
    pub fn simulation_counters(&self) -> SimulationCounters {
        self.counters.clone()
    }

    /// Probe for hardware, falling back to simulation.
    ///
    /// Never touches hardware when simulation is forced.
    pub async fn select(&self) -> Selection {
        if self.config.force_simulation {
            return Selection {
                device: self.simulated(),
                fallback_reason: None,
            };
        }

        let probed = match (self.factory)(&self.config) {
            Ok(mut device) => device.detect().await.map(|info| (device, info)),
            Err(e) => Err(e),
        };

        match probed {
            Ok((device, info)) => {
                debug!(reader = %info.name, "Hardware reader detected");
                Selection {
                    device,
                    fallback_reason: None,
                }
            }
            Err(e) => {
                debug!(error = %e, "Hardware probe failed");
                Selection {
                    device: self.simulated(),
                    fallback_reason: Some(e.to_string()),
                }
            }
        }
    }
}
