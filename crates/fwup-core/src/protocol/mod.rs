//! Protocol implementations
//!
//! This module contains the SPI25 command sequences the storage driver is
//! built from.

mod spi25;

pub use spi25::*;
