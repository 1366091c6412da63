//! Config command implementation

use std::path::Path;

/// Print the effective flash configuration as TOML
pub fn run_config(path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_flash_config(path)?;
    print!("{}", config.to_toml_string());
    Ok(())
}
