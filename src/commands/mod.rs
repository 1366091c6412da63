//! CLI command implementations
//!
//! `upload` is the host side and talks to real hardware or to `serve`.
//! `serve` and `simulate` run the device side against an emulated flash.

pub mod config;
pub mod serve;
pub mod simulate;
pub mod upload;

use fwup_core::spi::opcodes;
use fwup_core::FlashConfig;
use fwup_dummy::{DummyConfig, DummyFlash};
use std::path::Path;

/// Load the flash configuration, falling back to defaults
pub fn load_flash_config(path: Option<&Path>) -> Result<FlashConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => {
            let config = FlashConfig::from_toml_file(path)?;
            log::info!("Loaded flash configuration from {:?}", path);
            Ok(config)
        }
        None => Ok(FlashConfig::default()),
    }
}

/// Build an erased emulated flash matching `config`
pub fn emulated_flash(config: &FlashConfig) -> Result<DummyFlash, Box<dyn std::error::Error>> {
    let emulated_erase = match config.erase_opcode {
        opcodes::SE_20 => 4 * 1024,
        opcodes::BE_52 => 32 * 1024,
        opcodes::BE_D8 => 64 * 1024,
        other => {
            return Err(format!("Emulated flash has no erase opcode 0x{:02X}", other).into());
        }
    };
    if emulated_erase != config.erase_size {
        return Err(format!(
            "Erase opcode 0x{:02X} erases {} bytes, config says {}",
            config.erase_opcode, emulated_erase, config.erase_size
        )
        .into());
    }

    Ok(DummyFlash::new(DummyConfig {
        size: config.capacity as usize,
        page_size: config.page_size as usize,
        ..DummyConfig::default()
    }))
}
