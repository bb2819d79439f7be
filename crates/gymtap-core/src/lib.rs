//! Shared domain types for the GymTap front-desk system.
//!
//! Every other crate in the workspace speaks in these types: member and
//! token identifiers, the derived token lifecycle state, the normalized
//! outcome vocabulary of NFC operations, reader status, and the error
//! taxonomy surfaced to the API layer.

pub mod config;
pub mod constants;
pub mod error;
pub mod types;

pub use config::NfcConfig;
pub use error::{Error, Result};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
