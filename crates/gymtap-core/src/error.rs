use thiserror::Error;

/// Error taxonomy surfaced to the API layer.
///
/// Validation failures are reported as errors before any device is engaged.
/// Device outcomes (`Timeout`, card `Mismatch`, `DeviceBusy`, ...) travel
/// inside [`NfcOperationResult`](crate::NfcOperationResult) instead, so the
/// variants below that mirror them are only produced by callers that need to
/// turn an outcome into a hard failure.
#[derive(Error, Debug)]
pub enum Error {
    /// Bad request shape or unknown member. Not retried.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Unknown token.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Token/member binding failed, or card content did not match.
    #[error("Mismatch: {0}")]
    Mismatch(String),

    /// No card presented in time.
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// No reader reachable.
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Another operation holds the reader.
    #[error("Device busy: {0}")]
    DeviceBusy(String),

    /// Configuration value out of range.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Everything else. Surfaced, never swallowed, never retried.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the caller is at fault (and retrying the same request is pointless).
    pub fn is_caller_fault(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_) | Self::NotFound(_) | Self::Mismatch(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            Error::InvalidInput("unknown member 7".to_string()).to_string(),
            "Invalid input: unknown member 7"
        );
        assert_eq!(
            Error::Timeout { duration_ms: 30000 }.to_string(),
            "Operation timed out after 30000ms"
        );
    }

    #[test]
    fn test_caller_fault_classification() {
        assert!(Error::NotFound("t".into()).is_caller_fault());
        assert!(Error::Mismatch("t".into()).is_caller_fault());
        assert!(!Error::DeviceBusy("reader".into()).is_caller_fault());
        assert!(!Error::Internal("boom".into()).is_caller_fault());
    }
}
