//! SPI25 protocol implementation
//!
//! This module implements the common SPI flash command sequences
//! as defined by JEDEC. Opcodes and the busy bit come from
//! [`FlashConfig`] so parts that deviate from the JEDEC defaults can be
//! driven without code changes.
//!
//! Every sequence that changes flash contents is
//! `WREN -> command -> wait_ready`, so when these functions return the
//! device is idle again and the next command can be issued.

use crate::error::{Error, Result};
use crate::flash::FlashConfig;
use crate::programmer::SpiMaster;
use crate::spi::{opcodes, SpiCommand};

/// Read the 3-byte JEDEC ID from a flash chip
///
/// Returns `[manufacturer, device_hi, device_lo]`.
pub fn read_jedec_id<M: SpiMaster + ?Sized>(master: &mut M, opcode: u8) -> Result<[u8; 3]> {
    let mut buf = [0u8; 3];
    let mut cmd = SpiCommand::read_reg(opcode, &mut buf);
    master.execute(&mut cmd)?;
    Ok(buf)
}

/// Read the status register
pub fn read_status<M: SpiMaster + ?Sized>(master: &mut M, opcode: u8) -> Result<u8> {
    let mut buf = [0u8; 1];
    let mut cmd = SpiCommand::read_reg(opcode, &mut buf);
    master.execute(&mut cmd)?;
    Ok(buf[0])
}

/// Send the Write Enable command
pub fn write_enable<M: SpiMaster + ?Sized>(master: &mut M, opcode: u8) -> Result<()> {
    let mut cmd = SpiCommand::simple(opcode);
    master.execute(&mut cmd)
}

/// Wait for the busy bit to clear
///
/// Polls the status register until the configured busy bit clears.
///
/// # Arguments
/// * `poll_delay_us` - Delay in microseconds between status register polls
/// * `timeout_us` - Maximum time to wait before returning Error::Timeout
pub fn wait_ready<M: SpiMaster + ?Sized>(
    master: &mut M,
    config: &FlashConfig,
    poll_delay_us: u32,
    timeout_us: u32,
) -> Result<()> {
    let max_polls = if poll_delay_us > 0 {
        timeout_us / poll_delay_us
    } else {
        timeout_us // Fall back to polling once per microsecond
    };
    // Always look at least once, a zero timeout still means "check"
    let max_polls = max_polls.max(1);
    let busy = config.busy_mask();

    for _ in 0..max_polls {
        let status = read_status(master, config.read_status_opcode)?;
        if status & busy == 0 {
            return Ok(());
        }
        if poll_delay_us > 0 {
            master.delay_us(poll_delay_us);
        }
    }

    log::error!("flash still busy after {}us", timeout_us);
    Err(Error::Timeout)
}

/// Program a single page (up to page_size bytes)
///
/// The data must not cross a page boundary; the chip would wrap around to
/// the start of the page and corrupt data written earlier.
pub fn program_page<M: SpiMaster + ?Sized>(
    master: &mut M,
    config: &FlashConfig,
    addr: u32,
    data: &[u8],
) -> Result<()> {
    write_enable(master, config.write_enable_opcode)?;

    let mut cmd = SpiCommand::write_3b(config.program_opcode, addr, data);
    master.execute(&mut cmd)?;

    wait_ready(
        master,
        config,
        config.timing.program_poll_us,
        config.timing.program_timeout_us,
    )
}

/// Erase one erase unit at the given address
pub fn erase_sector<M: SpiMaster + ?Sized>(
    master: &mut M,
    config: &FlashConfig,
    addr: u32,
) -> Result<()> {
    write_enable(master, config.write_enable_opcode)?;

    let mut cmd = SpiCommand::erase_3b(config.erase_opcode, addr);
    master.execute(&mut cmd)?;

    wait_ready(
        master,
        config,
        config.timing.erase_poll_us,
        config.timing.erase_timeout_us,
    )
}

/// Read data from flash using 3-byte addressing
pub fn read<M: SpiMaster + ?Sized>(master: &mut M, addr: u32, buf: &mut [u8]) -> Result<()> {
    let max_len = master.max_read_len();
    let mut offset = 0;

    while offset < buf.len() {
        let chunk_len = core::cmp::min(max_len, buf.len() - offset);
        let chunk = &mut buf[offset..offset + chunk_len];
        let mut cmd = SpiCommand::read_3b(opcodes::READ, addr + offset as u32, chunk);
        master.execute(&mut cmd)?;
        offset += chunk_len;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec::Vec;

    /// Scripted SPI master: records opcodes and answers RDSR from a queue
    struct Scripted {
        log: Vec<(u8, Option<u32>, usize)>,
        status: Vec<u8>,
        delays: u32,
    }

    impl Scripted {
        fn new(status: &[u8]) -> Self {
            Self {
                log: Vec::new(),
                status: status.iter().rev().copied().collect(),
                delays: 0,
            }
        }
    }

    impl SpiMaster for Scripted {
        fn max_read_len(&self) -> usize {
            64
        }

        fn max_write_len(&self) -> usize {
            256
        }

        fn execute(&mut self, cmd: &mut SpiCommand<'_>) -> Result<()> {
            self.log
                .push((cmd.opcode, cmd.address, cmd.write_data.len()));
            if cmd.opcode == opcodes::RDSR {
                cmd.read_buf[0] = self.status.pop().unwrap_or(0);
            }
            Ok(())
        }

        fn delay_us(&mut self, _us: u32) {
            self.delays += 1;
        }
    }

    #[test]
    fn test_erase_sequence() {
        let mut spi = Scripted::new(&[0x01, 0x01, 0x00]);
        erase_sector(&mut spi, &FlashConfig::default(), 0x2000).unwrap();

        let opcodes: Vec<u8> = spi.log.iter().map(|e| e.0).collect();
        assert_eq!(
            opcodes,
            [opcodes::WREN, opcodes::SE_20, opcodes::RDSR, opcodes::RDSR, opcodes::RDSR]
        );
        assert_eq!(spi.log[1].1, Some(0x2000));
        assert_eq!(spi.delays, 2);
    }

    #[test]
    fn test_program_sequence() {
        let mut spi = Scripted::new(&[0x00]);
        let data = [0x55u8; 32];
        program_page(&mut spi, &FlashConfig::default(), 0x100, &data).unwrap();

        assert_eq!(spi.log[0].0, opcodes::WREN);
        assert_eq!(spi.log[1], (opcodes::PP, Some(0x100), 32));
        assert_eq!(spi.log[2].0, opcodes::RDSR);
    }

    #[test]
    fn test_wait_ready_times_out() {
        let mut spi = Scripted::new(&[0x01; 16]);
        let result = wait_ready(&mut spi, &FlashConfig::default(), 10, 50);
        assert_eq!(result, Err(Error::Timeout));
        assert_eq!(spi.log.len(), 5);
    }

    #[test]
    fn test_wait_ready_uses_configured_busy_bit() {
        let config = FlashConfig {
            busy_bit: 7,
            ..FlashConfig::default()
        };
        // Bit 0 set but bit 7 clear: ready
        let mut spi = Scripted::new(&[0x01]);
        assert_eq!(wait_ready(&mut spi, &config, 10, 100), Ok(()));
    }

    #[test]
    fn test_read_splits_by_max_read_len() {
        let mut spi = Scripted::new(&[]);
        let mut buf = [0u8; 150];
        read(&mut spi, 0x1000, &mut buf).unwrap();
        let addrs: Vec<Option<u32>> = spi.log.iter().map(|e| e.1).collect();
        assert_eq!(addrs, [Some(0x1000), Some(0x1040), Some(0x1080)]);
    }
}
