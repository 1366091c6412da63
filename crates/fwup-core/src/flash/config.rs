//! Flash geometry, opcodes and busy-wait timing

use crate::error::{Error, Result};
use crate::spi::{opcodes, AddressWidth};

/// Busy-wait policy for the two classes of long-running flash operations
///
/// Typical poll delays follow flashprog:
/// * Page program: poll every 10us, typical 0.7-5ms
/// * 4KB sector erase: poll every 10ms, typical 45-400ms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Delay between status polls while a page program is in progress
    pub program_poll_us: u32,
    /// Give up on a page program after this long
    pub program_timeout_us: u32,
    /// Delay between status polls while an erase is in progress
    pub erase_poll_us: u32,
    /// Give up on an erase after this long
    pub erase_timeout_us: u32,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            program_poll_us: 10,
            program_timeout_us: 10_000,
            erase_poll_us: 10_000,
            erase_timeout_us: 1_000_000,
        }
    }
}

/// Everything the storage driver needs to know about the flash part
///
/// The defaults describe a generic 16 MiB SPI NOR with 256-byte pages and
/// 4 KiB sector erase (`0x20`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashConfig {
    /// Page program granularity in bytes (power of two)
    pub page_size: u32,
    /// Erase unit in bytes (power of two, multiple of `page_size`)
    pub erase_size: u32,
    /// Total addressable bytes
    pub capacity: u32,
    /// Write Enable opcode
    pub write_enable_opcode: u8,
    /// Read Status Register opcode
    pub read_status_opcode: u8,
    /// Read JEDEC ID opcode
    pub read_id_opcode: u8,
    /// Erase opcode matching `erase_size`
    pub erase_opcode: u8,
    /// Page Program opcode
    pub program_opcode: u8,
    /// Bit position of the busy flag in the status register
    pub busy_bit: u8,
    /// Busy-wait policy
    pub timing: Timing,
}

impl Default for FlashConfig {
    fn default() -> Self {
        Self {
            page_size: 256,
            erase_size: 4096,
            capacity: 16 * 1024 * 1024,
            write_enable_opcode: opcodes::WREN,
            read_status_opcode: opcodes::RDSR,
            read_id_opcode: opcodes::RDID,
            erase_opcode: opcodes::SE_20,
            program_opcode: opcodes::PP,
            busy_bit: 0,
            timing: Timing::default(),
        }
    }
}

impl FlashConfig {
    /// Check the geometry for consistency
    pub fn validate(&self) -> Result<()> {
        if !self.page_size.is_power_of_two() || !self.erase_size.is_power_of_two() {
            log::error!(
                "page size {} and erase size {} must be powers of two",
                self.page_size,
                self.erase_size
            );
            return Err(Error::InvalidConfig);
        }
        if self.page_size > self.erase_size {
            log::error!(
                "page size {} exceeds erase size {}",
                self.page_size,
                self.erase_size
            );
            return Err(Error::InvalidConfig);
        }
        if self.busy_bit > 7 {
            log::error!("busy bit {} is outside the status register", self.busy_bit);
            return Err(Error::InvalidConfig);
        }
        if self.capacity == 0
            || self.capacity > AddressWidth::ThreeByte.max_size()
            || self.capacity % self.erase_size != 0
        {
            log::error!(
                "capacity {} must be a nonzero multiple of {} and fit 3-byte addressing",
                self.capacity,
                self.erase_size
            );
            return Err(Error::InvalidConfig);
        }
        Ok(())
    }

    /// Status register mask of the busy flag
    pub fn busy_mask(&self) -> u8 {
        1 << self.busy_bit
    }

    /// Round `len` up to the next erase-unit boundary
    ///
    /// Returns `None` if the result does not fit in 32 bits.
    pub fn erase_ceiling(&self, len: u32) -> Option<u32> {
        let mask = self.erase_size - 1;
        len.checked_add(mask).map(|v| v & !mask)
    }

    /// Offset of `addr` inside its page
    pub fn page_offset(&self, addr: u32) -> u32 {
        addr & (self.page_size - 1)
    }

    /// Bytes from `addr` to the end of its page
    pub fn page_remaining(&self, addr: u32) -> u32 {
        self.page_size - self.page_offset(addr)
    }

    /// Returns true if `addr` sits on an erase-unit boundary
    pub fn is_erase_aligned(&self, addr: u32) -> bool {
        addr & (self.erase_size - 1) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert_eq!(FlashConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_erase_ceiling() {
        let config = FlashConfig::default();
        assert_eq!(config.erase_ceiling(0), Some(0));
        assert_eq!(config.erase_ceiling(1), Some(4096));
        assert_eq!(config.erase_ceiling(100), Some(4096));
        assert_eq!(config.erase_ceiling(4096), Some(4096));
        assert_eq!(config.erase_ceiling(4097), Some(8192));
        assert_eq!(config.erase_ceiling(u32::MAX), None);
    }

    #[test]
    fn test_page_remaining() {
        let config = FlashConfig::default();
        assert_eq!(config.page_remaining(0), 256);
        assert_eq!(config.page_remaining(200), 56);
        assert_eq!(config.page_remaining(255), 1);
        assert_eq!(config.page_remaining(256), 256);
    }

    #[test]
    fn test_rejects_bad_geometry() {
        let bad_page = FlashConfig {
            page_size: 300,
            ..FlashConfig::default()
        };
        assert_eq!(bad_page.validate(), Err(Error::InvalidConfig));

        let page_over_sector = FlashConfig {
            page_size: 8192,
            ..FlashConfig::default()
        };
        assert_eq!(page_over_sector.validate(), Err(Error::InvalidConfig));

        let bad_busy = FlashConfig {
            busy_bit: 8,
            ..FlashConfig::default()
        };
        assert_eq!(bad_busy.validate(), Err(Error::InvalidConfig));

        let too_big = FlashConfig {
            capacity: 32 * 1024 * 1024,
            ..FlashConfig::default()
        };
        assert_eq!(too_big.validate(), Err(Error::InvalidConfig));
    }

    #[test]
    fn test_busy_mask() {
        let config = FlashConfig {
            busy_bit: 3,
            ..FlashConfig::default()
        };
        assert_eq!(config.busy_mask(), 0x08);
    }
}
