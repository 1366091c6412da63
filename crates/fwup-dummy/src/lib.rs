//! fwup-dummy - In-memory SPI NOR flash emulator
//!
//! This crate provides a SPI master that emulates a flash chip in memory.
//! It backs the `serve` and `simulate` commands and the end-to-end tests,
//! so it models the parts of real NOR behaviour the sequencer relies on:
//!
//! - programming can only clear bits (1 -> 0), erase sets them back to 0xFF
//! - program and erase need a preceding Write Enable
//! - a page program that runs past the end of its page wraps to the page
//!   start
//! - the busy bit stays set for a configurable number of status polls after
//!   each program/erase, and can be forced on permanently

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "alloc")]
use alloc::vec;
#[cfg(feature = "alloc")]
use alloc::vec::Vec;

use fwup_core::error::{Error, Result};
use fwup_core::programmer::SpiMaster;
use fwup_core::spi::{opcodes, SpiCommand, Status};

/// Configuration for the dummy flash
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// JEDEC manufacturer ID
    pub manufacturer_id: u8,
    /// JEDEC device ID
    pub device_id: u16,
    /// Flash size in bytes
    pub size: usize,
    /// Page size for programming
    pub page_size: usize,
    /// Status polls that report busy after each program/erase
    pub busy_polls: u32,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            manufacturer_id: 0xEF, // Winbond
            device_id: 0x4018,     // W25Q128FV
            size: 16 * 1024 * 1024,
            page_size: 256,
            busy_polls: 0,
        }
    }
}

/// Counters of state-changing operations performed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpCounters {
    /// Sector/block/chip erases
    pub erases: u32,
    /// Page programs
    pub programs: u32,
    /// Page programs that wrapped around inside their page
    pub wrapped_programs: u32,
}

/// Dummy flash chip
///
/// Emulates a flash chip in memory for testing purposes.
#[cfg(feature = "alloc")]
pub struct DummyFlash {
    config: DummyConfig,
    data: Vec<u8>,
    status_reg1: u8,
    write_enabled: bool,
    busy_remaining: u32,
    stuck_busy: bool,
    counters: OpCounters,
}

#[cfg(feature = "alloc")]
impl DummyFlash {
    /// Create a new dummy flash with the given configuration
    pub fn new(config: DummyConfig) -> Self {
        let data = vec![0xFF; config.size];
        Self {
            config,
            data,
            status_reg1: 0,
            write_enabled: false,
            busy_remaining: 0,
            stuck_busy: false,
            counters: OpCounters::default(),
        }
    }

    /// Create a new dummy flash with default configuration (W25Q128FV)
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// Create a dummy flash with pre-filled data
    pub fn with_data(config: DummyConfig, initial_data: &[u8]) -> Self {
        let mut flash = Self::new(config);
        let len = core::cmp::min(initial_data.len(), flash.data.len());
        flash.data[..len].copy_from_slice(&initial_data[..len]);
        flash
    }

    /// Get a reference to the flash data
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Get a mutable reference to the flash data
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Get the configuration
    pub fn config(&self) -> &DummyConfig {
        &self.config
    }

    /// Operations performed so far
    pub fn counters(&self) -> OpCounters {
        self.counters
    }

    /// Keep the busy bit set forever (models a hung part)
    pub fn set_stuck_busy(&mut self, stuck: bool) {
        self.stuck_busy = stuck;
    }

    fn is_busy(&self) -> bool {
        self.stuck_busy || self.busy_remaining > 0
    }

    fn start_busy(&mut self) {
        self.busy_remaining = self.config.busy_polls;
    }

    fn handle_read_status(&mut self, cmd: &mut SpiCommand<'_>) {
        let mut status = Status::from_bits_retain(self.status_reg1);
        status.set(Status::WIP, self.is_busy());
        status.set(Status::WEL, self.write_enabled);
        if self.busy_remaining > 0 {
            self.busy_remaining -= 1;
        }
        if let Some(byte) = cmd.read_buf.first_mut() {
            *byte = status.bits();
        }
    }

    fn handle_read(&mut self, cmd: &mut SpiCommand<'_>) -> Result<()> {
        let addr = cmd.address.unwrap_or(0) as usize;
        let len = cmd.read_buf.len();

        if addr + len > self.data.len() {
            return Err(Error::AddressOutOfBounds);
        }

        cmd.read_buf.copy_from_slice(&self.data[addr..addr + len]);
        Ok(())
    }

    fn handle_page_program(&mut self, cmd: &SpiCommand<'_>) -> Result<()> {
        if !self.write_enabled {
            return Err(Error::WriteProtected);
        }

        let addr = cmd.address.unwrap_or(0) as usize;
        if addr >= self.data.len() {
            return Err(Error::AddressOutOfBounds);
        }

        let page_size = self.config.page_size;
        let page_base = addr & !(page_size - 1);
        let start = addr - page_base;
        if start + cmd.write_data.len() > page_size {
            log::warn!(
                "page program at 0x{:06X} len {} wraps inside its page",
                addr,
                cmd.write_data.len()
            );
            self.counters.wrapped_programs += 1;
        }

        // Flash programming: can only change 1 -> 0
        for (i, &byte) in cmd.write_data.iter().enumerate() {
            let offset = page_base + (start + i) % page_size;
            self.data[offset] &= byte;
        }

        self.counters.programs += 1;
        self.write_enabled = false;
        self.start_busy();
        Ok(())
    }

    fn handle_sector_erase(&mut self, cmd: &SpiCommand<'_>, erase_size: usize) -> Result<()> {
        if !self.write_enabled {
            return Err(Error::WriteProtected);
        }

        let addr = cmd.address.unwrap_or(0) as usize;

        // Align address to erase boundary
        let aligned_addr = addr & !(erase_size - 1);

        if aligned_addr + erase_size > self.data.len() {
            return Err(Error::AddressOutOfBounds);
        }

        // Erase sets all bytes to 0xFF
        for byte in &mut self.data[aligned_addr..aligned_addr + erase_size] {
            *byte = 0xFF;
        }

        self.counters.erases += 1;
        self.write_enabled = false;
        self.start_busy();
        Ok(())
    }

    fn handle_chip_erase(&mut self) -> Result<()> {
        if !self.write_enabled {
            return Err(Error::WriteProtected);
        }

        for byte in &mut self.data {
            *byte = 0xFF;
        }

        self.counters.erases += 1;
        self.write_enabled = false;
        self.start_busy();
        Ok(())
    }
}

#[cfg(feature = "alloc")]
impl SpiMaster for DummyFlash {
    fn max_read_len(&self) -> usize {
        4096
    }

    fn max_write_len(&self) -> usize {
        self.config.page_size
    }

    fn execute(&mut self, cmd: &mut SpiCommand<'_>) -> Result<()> {
        let mut header = [0u8; 4];
        let header_len = cmd.header_len();
        cmd.encode_header(&mut header[..header_len]);
        log::trace!(
            "dummy: {:02X?} ({} bytes on the wire)",
            &header[..header_len],
            cmd.total_bytes()
        );

        // A busy part only answers status reads
        if self.is_busy() && cmd.opcode != opcodes::RDSR {
            log::warn!("dummy: opcode 0x{:02X} issued while busy", cmd.opcode);
            return Err(Error::SpiTransferFailed);
        }

        match cmd.opcode {
            // JEDEC ID
            opcodes::RDID => {
                if cmd.read_buf.len() >= 3 {
                    cmd.read_buf[0] = self.config.manufacturer_id;
                    cmd.read_buf[1] = (self.config.device_id >> 8) as u8;
                    cmd.read_buf[2] = self.config.device_id as u8;
                }
                Ok(())
            }

            // Status register read
            opcodes::RDSR => {
                self.handle_read_status(cmd);
                Ok(())
            }

            // Write enable/disable
            opcodes::WREN => {
                self.write_enabled = true;
                Ok(())
            }
            opcodes::WRDI => {
                self.write_enabled = false;
                Ok(())
            }

            // Read commands
            opcodes::READ => self.handle_read(cmd),

            // Page program
            opcodes::PP => self.handle_page_program(cmd),

            // Erase commands
            opcodes::SE_20 => self.handle_sector_erase(cmd, 4 * 1024),
            opcodes::BE_52 => self.handle_sector_erase(cmd, 32 * 1024),
            opcodes::BE_D8 => self.handle_sector_erase(cmd, 64 * 1024),
            opcodes::CE_60 | opcodes::CE_C7 => self.handle_chip_erase(),

            // Software reset
            opcodes::RSTEN | opcodes::RST => Ok(()),

            // Unknown opcode
            _ => Err(Error::OpcodeNotSupported),
        }
    }

    fn delay_us(&mut self, _us: u32) {
        // No delay needed for in-memory operations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fwup_core::flash::{FlashConfig, FlashStorage, SpiFlash, Timing};
    use fwup_core::protocol;
    use fwup_core::upload::{ChunkOutcome, Header, Sequencer, SessionState};

    fn image(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_read_jedec_id() {
        let mut flash = DummyFlash::new_default();
        let id = protocol::read_jedec_id(&mut flash, opcodes::RDID).unwrap();
        assert_eq!(id, [0xEF, 0x40, 0x18]);
    }

    #[test]
    fn test_read_write() {
        let mut flash = DummyFlash::new_default();

        // Write some data
        let data = [0x12, 0x34, 0x56, 0x78];
        protocol::write_enable(&mut flash, opcodes::WREN).unwrap();
        let mut cmd = SpiCommand::write_3b(opcodes::PP, 0x1000, &data);
        flash.execute(&mut cmd).unwrap();

        // Read it back
        let mut buf = [0u8; 4];
        let mut cmd = SpiCommand::read_3b(opcodes::READ, 0x1000, &mut buf);
        flash.execute(&mut cmd).unwrap();

        assert_eq!(buf, data);
    }

    #[test]
    fn test_program_requires_write_enable() {
        let mut flash = DummyFlash::new_default();
        let data = [0u8; 4];
        let mut cmd = SpiCommand::write_3b(opcodes::PP, 0, &data);
        assert_eq!(flash.execute(&mut cmd), Err(Error::WriteProtected));
    }

    #[test]
    fn test_erase() {
        let mut flash = DummyFlash::new_default();

        // Write some data
        let data = [0x00u8; 256];
        protocol::write_enable(&mut flash, opcodes::WREN).unwrap();
        let mut cmd = SpiCommand::write_3b(opcodes::PP, 0, &data);
        flash.execute(&mut cmd).unwrap();
        assert!(flash.data()[..256].iter().all(|&b| b == 0x00));

        // Erase the sector
        protocol::write_enable(&mut flash, opcodes::WREN).unwrap();
        let mut cmd = SpiCommand::erase_3b(opcodes::SE_20, 0);
        flash.execute(&mut cmd).unwrap();

        assert!(flash.data()[..4096].iter().all(|&b| b == 0xFF));
        assert_eq!(flash.counters().erases, 1);
        assert_eq!(flash.counters().programs, 1);
    }

    #[test]
    fn test_program_wraps_inside_page() {
        let mut flash = DummyFlash::new_default();
        let data = [0xA5u8; 8];
        protocol::write_enable(&mut flash, opcodes::WREN).unwrap();
        let mut cmd = SpiCommand::write_3b(opcodes::PP, 252, &data);
        flash.execute(&mut cmd).unwrap();

        assert_eq!(&flash.data()[252..256], &[0xA5; 4]);
        assert_eq!(&flash.data()[0..4], &[0xA5; 4]);
        assert_eq!(flash.data()[256], 0xFF);
        assert_eq!(flash.counters().wrapped_programs, 1);
    }

    #[test]
    fn test_busy_polls_then_ready() {
        let mut flash = DummyFlash::new(DummyConfig {
            busy_polls: 3,
            ..DummyConfig::default()
        });
        protocol::write_enable(&mut flash, opcodes::WREN).unwrap();
        let mut cmd = SpiCommand::erase_3b(opcodes::SE_20, 0);
        flash.execute(&mut cmd).unwrap();

        let mut wip = 0;
        for _ in 0..5 {
            let status = protocol::read_status(&mut flash, opcodes::RDSR).unwrap();
            if Status::from_bits_retain(status).contains(Status::WIP) {
                wip += 1;
            }
        }
        assert_eq!(wip, 3);
    }

    #[test]
    fn test_commands_rejected_while_busy() {
        let mut flash = DummyFlash::new_default();
        flash.set_stuck_busy(true);
        assert_eq!(
            protocol::write_enable(&mut flash, opcodes::WREN),
            Err(Error::SpiTransferFailed)
        );
    }

    #[test]
    fn test_spi_flash_rejects_page_crossing() {
        let mut storage = SpiFlash::new(DummyFlash::new_default(), FlashConfig::default()).unwrap();
        assert_eq!(
            storage.program_page(250, &[0u8; 10]),
            Err(Error::InvalidAlignment)
        );
        assert_eq!(storage.erase_sector(100), Err(Error::InvalidAlignment));
        assert_eq!(storage.master().counters(), OpCounters::default());
    }

    #[test]
    fn test_upload_overwrites_stale_contents() {
        // Stale 0x00 bytes would survive a program without an erase
        let stale = vec![0x00u8; 3 * 4096];
        let flash = DummyFlash::with_data(DummyConfig::default(), &stale);
        let storage = SpiFlash::new(flash, FlashConfig::default()).unwrap();
        let mut seq = Sequencer::new(storage);
        let mut replies: Vec<u8> = Vec::new();

        let payload = image(5000);
        let mut first = Header::new(5000).to_bytes().to_vec();
        first.extend_from_slice(&payload[..1234]);

        seq.process_chunk(&first, &mut replies).unwrap();
        for chunk in payload[1234..].chunks(777) {
            seq.process_chunk(chunk, &mut replies).unwrap();
        }

        assert_eq!(replies, b"OK");
        assert!(seq.state().is_complete());

        let mut storage = seq.into_storage();
        let mut readback = vec![0u8; 5000];
        storage.read(0, &mut readback).unwrap();
        assert_eq!(readback, payload);

        let flash = storage.into_inner();
        // Tail of the second sector was erased, third sector untouched
        assert!(flash.data()[5000..8192].iter().all(|&b| b == 0xFF));
        assert!(flash.data()[8192..3 * 4096].iter().all(|&b| b == 0x00));
        assert_eq!(flash.counters().erases, 2);
        assert_eq!(flash.counters().wrapped_programs, 0);
    }

    #[test]
    fn test_upload_with_slow_flash() {
        let flash = DummyFlash::new(DummyConfig {
            busy_polls: 4,
            ..DummyConfig::default()
        });
        let storage = SpiFlash::new(flash, FlashConfig::default()).unwrap();
        let mut seq = Sequencer::new(storage);
        let mut replies: Vec<u8> = Vec::new();

        let payload = image(600);
        let mut chunk = Header::new(600).to_bytes().to_vec();
        chunk.extend_from_slice(&payload);
        let outcome = seq.process_chunk(&chunk, &mut replies).unwrap();

        assert_eq!(
            outcome,
            ChunkOutcome::Completed {
                programmed: 600,
                discarded: 0
            }
        );
        let flash = seq.into_storage().into_inner();
        assert_eq!(&flash.data()[..600], &payload[..]);
    }

    #[test]
    fn test_stuck_flash_times_out_and_resets() {
        // Never finishes the first erase
        let flash = DummyFlash::new(DummyConfig {
            busy_polls: u32::MAX,
            ..DummyConfig::default()
        });
        let config = FlashConfig {
            timing: Timing {
                erase_poll_us: 10,
                erase_timeout_us: 100,
                ..Timing::default()
            },
            ..FlashConfig::default()
        };
        let storage = SpiFlash::new(flash, config).unwrap();
        let mut seq = Sequencer::new(storage);

        let mut replies: Vec<u8> = Vec::new();
        let result = seq.process_chunk(&Header::new(10).to_bytes(), &mut replies);

        assert_eq!(result, Err(Error::Timeout));
        assert_eq!(seq.state(), SessionState::Idle);
        assert!(replies.is_empty());
    }
}
