//! Error types for fwup-core
//!
//! This module provides a no_std compatible error type that can be used
//! throughout the crate.

use core::fmt;

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    // SPI errors
    /// SPI transfer failed
    SpiTransferFailed,
    /// Opcode is not supported by the SPI master
    OpcodeNotSupported,

    // Device errors
    /// The busy bit did not clear within the configured timeout
    Timeout,
    /// Flash chip rejected a program or erase (write enable latch not set)
    WriteProtected,

    // Address/size errors
    /// Address is beyond the flash capacity
    AddressOutOfBounds,
    /// Operation requires an aligned address or must stay within one page
    InvalidAlignment,

    // Configuration errors
    /// Flash configuration is inconsistent
    InvalidConfig,

    // I/O errors
    /// The link to the host failed
    IoError,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SpiTransferFailed => write!(f, "SPI transfer failed"),
            Self::OpcodeNotSupported => write!(f, "SPI opcode not supported"),
            Self::Timeout => write!(f, "flash stayed busy past the timeout"),
            Self::WriteProtected => write!(f, "flash chip is write protected"),
            Self::AddressOutOfBounds => write!(f, "address out of bounds"),
            Self::InvalidAlignment => write!(f, "invalid alignment"),
            Self::InvalidConfig => write!(f, "invalid flash configuration"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
