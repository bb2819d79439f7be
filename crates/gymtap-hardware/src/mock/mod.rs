//! Mock device implementations for testing and development.
//!
//! This module provides simulated device implementations that can be controlled
//! programmatically without requiring physical hardware. Unlike
//! [`SimulatedNfc`](crate::simulation::SimulatedNfc), the mock stands in for a
//! physical reader: nothing happens until a test presents a card or injects
//! a fault through the handle.

pub mod nfc;

// Re-export commonly used types
pub use nfc::{MockCard, MockFault, MockNfc, MockNfcHandle};
