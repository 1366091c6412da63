//! Error types for link operations

use thiserror::Error;

/// Link and upload errors
#[derive(Debug, Error)]
pub enum LinkError {
    /// Failed to connect or accept a connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// I/O error during communication
    #[error("I/O error: {0}")]
    IoError(String),

    /// Timeout during communication
    #[error("Communication timeout")]
    Timeout,

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Serial port error
    #[error("Serial port error: {0}")]
    SerialError(#[from] serialport::Error),

    /// Flash or sequencer error on the device side
    #[error("Flash error: {0}")]
    Flash(#[from] fwup_core::Error),
}

/// Result type for link operations
pub type Result<T> = core::result::Result<T, LinkError>;

impl From<std::io::Error> for LinkError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => LinkError::Timeout,
            _ => LinkError::IoError(e.to_string()),
        }
    }
}

impl embedded_io::Error for LinkError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            LinkError::Timeout => embedded_io::ErrorKind::TimedOut,
            LinkError::InvalidParameter(_) => embedded_io::ErrorKind::InvalidInput,
            _ => embedded_io::ErrorKind::Other,
        }
    }
}
