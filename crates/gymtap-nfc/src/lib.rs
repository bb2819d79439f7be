//! NFC operations for GymTap.
//!
//! - [`payload`] - versioned card payload format
//! - [`availability`] - cached reader availability
//! - [`selector`] - hardware probe with simulation fallback
//! - [`NfcOrchestrator`] - serialized, timeout-bounded card operations
//! - [`FrontDesk`] - facade consumed by the API layer
//!
//! Token validation always happens before the reader is engaged; a write
//! for an unknown, foreign, expired or revoked token never reaches the
//! device.

pub mod availability;
pub mod front_desk;
pub mod orchestrator;
pub mod payload;
pub mod selector;

pub use availability::{AvailabilityCache, ReaderAvailability};
pub use front_desk::FrontDesk;
pub use orchestrator::{CardVerification, NfcOrchestrator, PayloadVerification};
pub use payload::{CardPayload, PayloadError};
pub use selector::{DeviceFactory, DeviceSelector, Selection};
