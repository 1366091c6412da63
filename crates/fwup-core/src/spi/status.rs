//! Status register 1 bits

use bitflags::bitflags;

bitflags! {
    /// Status register 1 as reported by `RDSR`
    ///
    /// Only the bits shared by practically every SPI NOR part are named.
    /// The busy-wait itself uses the bit position from
    /// [`FlashConfig::busy_bit`](crate::flash::FlashConfig::busy_bit), so
    /// parts with a relocated busy flag still work.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Status: u8 {
        /// Write In Progress / Busy
        const WIP  = 1 << 0;
        /// Write Enable Latch
        const WEL  = 1 << 1;
        /// Block Protect bit 0
        const BP0  = 1 << 2;
        /// Block Protect bit 1
        const BP1  = 1 << 3;
        /// Block Protect bit 2
        const BP2  = 1 << 4;
        /// Top/Bottom Protect
        const TB   = 1 << 5;
        /// Sector/Block Protect
        const SEC  = 1 << 6;
        /// Status Register Protect 0
        const SRP0 = 1 << 7;

        /// Any block protect bit
        const BP = Self::BP0.bits() | Self::BP1.bits() | Self::BP2.bits();
    }
}

impl Status {
    /// Returns true if any block protect bit is set
    pub fn is_protected(&self) -> bool {
        self.intersects(Self::BP)
    }
}
