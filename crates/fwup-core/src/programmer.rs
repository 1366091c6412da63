//! SPI master abstraction
//!
//! The storage driver talks to the flash chip through this trait. On the
//! target it wraps the SPI peripheral and chip-select pin; in tests and
//! host tools it is backed by an in-memory emulator.

use crate::error::Result;
use crate::spi::SpiCommand;

/// SPI Master trait
///
/// This trait represents a bus that can execute complete SPI transactions:
/// chip select is asserted for the duration of [`execute`](Self::execute)
/// and released afterwards.
///
/// Implementations are driven from a single thread of control. Every call
/// blocks until the transaction has been clocked out.
pub trait SpiMaster {
    /// Get the maximum number of bytes that can be read in a single transaction
    fn max_read_len(&self) -> usize;

    /// Get the maximum number of bytes that can be written in a single transaction
    fn max_write_len(&self) -> usize;

    /// Execute a single SPI command
    ///
    /// The command contains all the information needed for the transaction:
    /// - `opcode`: The SPI command opcode
    /// - `address`: Optional address (with width)
    /// - `write_data`: Data to write after the header
    /// - `read_buf`: Buffer to read data into
    fn execute(&mut self, cmd: &mut SpiCommand<'_>) -> Result<()>;

    /// Delay for the specified number of microseconds
    fn delay_us(&mut self, us: u32);
}

impl<M: SpiMaster + ?Sized> SpiMaster for &mut M {
    fn max_read_len(&self) -> usize {
        (**self).max_read_len()
    }

    fn max_write_len(&self) -> usize {
        (**self).max_write_len()
    }

    fn execute(&mut self, cmd: &mut SpiCommand<'_>) -> Result<()> {
        (**self).execute(cmd)
    }

    fn delay_us(&mut self, us: u32) {
        (**self).delay_us(us)
    }
}
