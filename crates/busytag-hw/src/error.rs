//! Error types for the Busy Tag client library.

use std::time::Duration;
use thiserror::Error;

use crate::protocol::ErrorCode;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to a Busy Tag.
#[derive(Error, Debug)]
pub enum Error {
    /// Serial device path does not exist or could not be opened.
    #[error("Busy Tag not found at {0}")]
    DeviceNotFound(String),

    /// Serial port communication error.
    #[error("Serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// Serial I/O error.
    #[error("Serial I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No complete response arrived before the deadline.
    #[error("Timed out after {0:?} waiting for a response")]
    Timeout(Duration),

    /// Device answered with an `ERROR:<code>` token.
    #[error("Device error: {0}")]
    Device(ErrorCode),

    /// Response line could not be parsed.
    #[error("Malformed response: {0:?}")]
    MalformedResponse(String),

    /// Response parsed, but it was not the acknowledgment the command expects.
    #[error("Unexpected response (expected {expected}): {line:?}")]
    UnexpectedResponse { expected: String, line: String },

    /// Invalid RGB color value.
    #[error("Invalid color (expected RRGGBB hex): {0:?}")]
    InvalidColor(String),

    /// Invalid LED pin selector.
    #[error("Invalid LED pin selector: {0}")]
    InvalidPin(String),

    /// Display brightness out of range.
    #[error("Invalid brightness (must be 1-100): {0}")]
    InvalidBrightness(u8),

    /// File name that cannot be expressed in the command grammar.
    #[error("Invalid file name: {0:?}")]
    InvalidFileName(String),

    /// Configuration file could not be read, parsed or written.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Returns true if the device could not be reached.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            Error::DeviceNotFound(_) | Error::Serial(_) | Error::Io(_)
        )
    }

    /// Returns true if the device did not answer in time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }

    /// Returns true if the device answered with an error or unparseable line.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            Error::Device(_) | Error::MalformedResponse(_) | Error::UnexpectedResponse { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(Error::DeviceNotFound("/dev/ttyACM0".into()).is_connection());
        assert!(Error::Timeout(Duration::from_secs(1)).is_timeout());
        assert!(Error::Device(ErrorCode::InvalidArgument).is_protocol());
        assert!(Error::MalformedResponse("ERROR:x".into()).is_protocol());
        assert!(!Error::InvalidBrightness(0).is_protocol());
        assert!(!Error::InvalidBrightness(0).is_connection());
    }

    #[test]
    fn test_display() {
        let err = Error::Device(ErrorCode::FileNotFound);
        assert_eq!(err.to_string(), "Device error: file not found");
    }
}
