//! fwup-core - Streamed flash upload sequencer
//!
//! This crate turns a byte stream of the form `"FWUP" <u32 LE length>
//! <payload>` into erase and page-program operations on a SPI NOR flash.
//! It is `no_std` compatible so the same sequencer can run on the target
//! that owns the flash chip and in host-side tools and tests.
//!
//! # Layers
//!
//! - [`spi`] / [`programmer`] / [`protocol`] - SPI commands, the
//!   [`SpiMaster`](programmer::SpiMaster) bus abstraction and the SPI25
//!   command sequences (write enable, status poll, erase, program, id)
//! - [`flash`] - the storage capability interface ([`FlashStorage`]) and
//!   its SPI implementation ([`SpiFlash`])
//! - [`upload`] - header parsing, session state and the [`Sequencer`]
//! - [`device`] - the cooperative control loop gluing a link to the
//!   sequencer
//!
//! # Features
//!
//! - `std` - Enable standard library support (includes `alloc` and TOML
//!   configuration loading)
//! - `alloc` - Enable heap allocation
//!
//! # Example
//!
//! ```ignore
//! use fwup_core::{FlashConfig, Sequencer, SpiFlash};
//!
//! let storage = SpiFlash::new(master, FlashConfig::default())?;
//! let mut sequencer = Sequencer::new(storage);
//! sequencer.process_chunk(&chunk, &mut link)?;
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(any(feature = "std", test))]
extern crate std;

pub mod device;
pub mod error;
pub mod flash;
pub mod programmer;
pub mod protocol;
pub mod spi;
pub mod upload;

pub use device::{PollEvent, UploadDevice};
pub use error::{Error, Result};
pub use flash::{FlashConfig, FlashStorage, SpiFlash, Timing};
pub use upload::{ChunkOutcome, Header, Sequencer, SessionState};
