//! Storage driver
//!
//! [`FlashStorage`] is the capability interface the upload sequencer is
//! written against. Each call is synchronous: it returns once the device
//! has finished the operation (or the busy-wait timed out).
//!
//! [`SpiFlash`] implements it for a SPI NOR chip behind any
//! [`SpiMaster`].

mod config;
#[cfg(feature = "std")]
mod toml;

pub use config::{FlashConfig, Timing};
#[cfg(feature = "std")]
pub use self::toml::ConfigError;

use crate::error::{Error, Result};
use crate::programmer::SpiMaster;
use crate::protocol;

/// Primitive operations of an erasable, page-programmed storage device
pub trait FlashStorage {
    /// Geometry and opcodes of the device
    ///
    /// The sequencer validates it at the start of every session and fails
    /// with [`Error::InvalidConfig`] if it is inconsistent.
    fn config(&self) -> &FlashConfig;

    /// Erase the erase unit starting at `addr`
    ///
    /// `addr` must be aligned to [`FlashConfig::erase_size`].
    fn erase_sector(&mut self, addr: u32) -> Result<()>;

    /// Program `data` at `addr`
    ///
    /// `[addr, addr + data.len())` must lie inside one page and must have
    /// been erased since it was last written.
    fn program_page(&mut self, addr: u32, data: &[u8]) -> Result<()>;

    /// Read the raw status register
    fn read_status(&mut self) -> Result<u8>;

    /// Read the manufacturer/device identification
    fn read_id(&mut self) -> Result<[u8; 3]>;
}

impl<S: FlashStorage + ?Sized> FlashStorage for &mut S {
    fn config(&self) -> &FlashConfig {
        (**self).config()
    }

    fn erase_sector(&mut self, addr: u32) -> Result<()> {
        (**self).erase_sector(addr)
    }

    fn program_page(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        (**self).program_page(addr, data)
    }

    fn read_status(&mut self) -> Result<u8> {
        (**self).read_status()
    }

    fn read_id(&mut self) -> Result<[u8; 3]> {
        (**self).read_id()
    }
}

/// SPI NOR flash driven through SPI25 command sequences
#[derive(Debug)]
pub struct SpiFlash<M> {
    master: M,
    config: FlashConfig,
}

impl<M: SpiMaster> SpiFlash<M> {
    /// Wrap a SPI master, validating the configuration first
    pub fn new(master: M, config: FlashConfig) -> Result<Self> {
        config.validate()?;
        if master.max_write_len() < config.page_size as usize {
            log::error!(
                "SPI master can write {} bytes per transaction, page needs {}",
                master.max_write_len(),
                config.page_size
            );
            return Err(Error::InvalidConfig);
        }
        Ok(Self { master, config })
    }

    /// Access the underlying SPI master
    pub fn master(&self) -> &M {
        &self.master
    }

    /// Mutable access to the underlying SPI master
    pub fn master_mut(&mut self) -> &mut M {
        &mut self.master
    }

    /// Release the SPI master
    pub fn into_inner(self) -> M {
        self.master
    }

    /// Read back flash contents, used for verification
    pub fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
        let end = addr as u64 + buf.len() as u64;
        if end > self.config.capacity as u64 {
            return Err(Error::AddressOutOfBounds);
        }
        protocol::read(&mut self.master, addr, buf)
    }
}

impl<M: SpiMaster> FlashStorage for SpiFlash<M> {
    fn config(&self) -> &FlashConfig {
        &self.config
    }

    fn erase_sector(&mut self, addr: u32) -> Result<()> {
        if !self.config.is_erase_aligned(addr) {
            return Err(Error::InvalidAlignment);
        }
        if addr >= self.config.capacity {
            return Err(Error::AddressOutOfBounds);
        }
        log::trace!("erase 0x{:06X}", addr);
        protocol::erase_sector(&mut self.master, &self.config, addr)
    }

    fn program_page(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        if data.is_empty() || data.len() > self.config.page_remaining(addr) as usize {
            return Err(Error::InvalidAlignment);
        }
        if addr as u64 + data.len() as u64 > self.config.capacity as u64 {
            return Err(Error::AddressOutOfBounds);
        }
        log::trace!("program 0x{:06X} len {}", addr, data.len());
        protocol::program_page(&mut self.master, &self.config, addr, data)
    }

    fn read_status(&mut self) -> Result<u8> {
        protocol::read_status(&mut self.master, self.config.read_status_opcode)
    }

    fn read_id(&mut self) -> Result<[u8; 3]> {
        protocol::read_jedec_id(&mut self.master, self.config.read_id_opcode)
    }
}
