//! SPI types and command structures
//!
//! This module provides types for representing SPI transactions and the
//! standard JEDEC opcodes used by the upload sequencer.

mod address;
mod command;
pub mod opcodes;
mod status;

pub use address::AddressWidth;
pub use command::SpiCommand;
pub use opcodes::*;
pub use status::Status;
