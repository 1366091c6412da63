//! TOML flash configuration files
//!
//! Every key is optional; missing keys keep the [`FlashConfig`] default.
//!
//! ```toml
//! [flash]
//! page_size = 256
//! erase_size = "4 KiB"
//! capacity = "16 MiB"
//! busy_bit = 0
//!
//! [opcodes]
//! write_enable = 0x06
//! read_status = 0x05
//! read_id = 0x9F
//! erase = 0x20
//! program = 0x02
//!
//! [timing]
//! program_poll_us = 10
//! program_timeout_us = 10000
//! erase_poll_us = 10000
//! erase_timeout_us = 1000000
//! ```

use std::fmt;
use std::format;
use std::fs;
use std::path::Path;
use std::string::String;

use super::{FlashConfig, Timing};
use crate::error::Error;

/// Error loading a configuration file
#[derive(Debug)]
pub enum ConfigError {
    /// File could not be read
    Io(std::io::Error),
    /// File is not valid TOML or has a malformed value
    Parse(String),
    /// Values parsed but describe an impossible geometry
    Invalid(Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "cannot read config: {}", e),
            Self::Parse(msg) => write!(f, "cannot parse config: {}", msg),
            Self::Invalid(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlConfigFile {
    #[serde(default)]
    flash: TomlFlash,
    #[serde(default)]
    opcodes: TomlOpcodes,
    #[serde(default)]
    timing: TomlTiming,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlFlash {
    #[serde(default, deserialize_with = "deserialize_size")]
    page_size: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_size")]
    erase_size: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_size")]
    capacity: Option<u32>,
    busy_bit: Option<u8>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlOpcodes {
    write_enable: Option<u8>,
    read_status: Option<u8>,
    read_id: Option<u8>,
    erase: Option<u8>,
    program: Option<u8>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlTiming {
    program_poll_us: Option<u32>,
    program_timeout_us: Option<u32>,
    erase_poll_us: Option<u32>,
    erase_timeout_us: Option<u32>,
}

/// Deserialize a size that can be an integer, hex string or "4 KiB"
fn deserialize_size<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum SizeOrInt {
        Int(u32),
        Str(String),
    }

    match Option::<SizeOrInt>::deserialize(deserializer)? {
        None => Ok(None),
        Some(SizeOrInt::Int(n)) => Ok(Some(n)),
        Some(SizeOrInt::Str(s)) => parse_size(&s).map(Some).map_err(serde::de::Error::custom),
    }
}

/// Parse a size string like "16 MiB", "0x1000" or "4096"
pub(crate) fn parse_size(s: &str) -> Result<u32, String> {
    let s = s.trim();

    if let Ok(n) = s.parse::<u32>() {
        return Ok(n);
    }

    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        if let Ok(n) = u32::from_str_radix(hex.trim(), 16) {
            return Ok(n);
        }
    }

    let s_lower = s.to_lowercase();
    let (num_str, multiplier) = if let Some(n) = s_lower.strip_suffix("mib") {
        (n.trim(), 1024 * 1024)
    } else if let Some(n) = s_lower.strip_suffix("kib") {
        (n.trim(), 1024)
    } else if let Some(n) = s_lower.strip_suffix("b") {
        (n.trim(), 1)
    } else {
        return Err(format!("invalid size: {}", s));
    };

    let num: u32 = num_str.parse().map_err(|_| format!("invalid size: {}", s))?;
    num.checked_mul(multiplier)
        .ok_or_else(|| format!("size too large: {}", s))
}

/// Format a size as human-readable string
fn format_size(size: u32) -> String {
    if size >= 1024 * 1024 && size % (1024 * 1024) == 0 {
        format!("{} MiB", size / (1024 * 1024))
    } else if size >= 1024 && size % 1024 == 0 {
        format!("{} KiB", size / 1024)
    } else {
        format!("{}", size)
    }
}

impl FlashConfig {
    /// Load a configuration from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_toml_str(&content)
    }

    /// Parse a configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: TomlConfigFile =
            ::toml::from_str(content).map_err(|e| ConfigError::Parse(format!("{}", e)))?;

        let defaults = FlashConfig::default();
        let timing = Timing {
            program_poll_us: file
                .timing
                .program_poll_us
                .unwrap_or(defaults.timing.program_poll_us),
            program_timeout_us: file
                .timing
                .program_timeout_us
                .unwrap_or(defaults.timing.program_timeout_us),
            erase_poll_us: file
                .timing
                .erase_poll_us
                .unwrap_or(defaults.timing.erase_poll_us),
            erase_timeout_us: file
                .timing
                .erase_timeout_us
                .unwrap_or(defaults.timing.erase_timeout_us),
        };

        let config = FlashConfig {
            page_size: file.flash.page_size.unwrap_or(defaults.page_size),
            erase_size: file.flash.erase_size.unwrap_or(defaults.erase_size),
            capacity: file.flash.capacity.unwrap_or(defaults.capacity),
            busy_bit: file.flash.busy_bit.unwrap_or(defaults.busy_bit),
            write_enable_opcode: file
                .opcodes
                .write_enable
                .unwrap_or(defaults.write_enable_opcode),
            read_status_opcode: file
                .opcodes
                .read_status
                .unwrap_or(defaults.read_status_opcode),
            read_id_opcode: file.opcodes.read_id.unwrap_or(defaults.read_id_opcode),
            erase_opcode: file.opcodes.erase.unwrap_or(defaults.erase_opcode),
            program_opcode: file.opcodes.program.unwrap_or(defaults.program_opcode),
            timing,
        };

        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    /// Convert the configuration to a TOML string
    pub fn to_toml_string(&self) -> String {
        let mut output = String::new();

        output.push_str("[flash]\n");
        output.push_str(&format!("page_size = {}\n", self.page_size));
        output.push_str(&format!("erase_size = \"{}\"\n", format_size(self.erase_size)));
        output.push_str(&format!("capacity = \"{}\"\n", format_size(self.capacity)));
        output.push_str(&format!("busy_bit = {}\n", self.busy_bit));
        output.push('\n');

        output.push_str("[opcodes]\n");
        output.push_str(&format!("write_enable = 0x{:02X}\n", self.write_enable_opcode));
        output.push_str(&format!("read_status = 0x{:02X}\n", self.read_status_opcode));
        output.push_str(&format!("read_id = 0x{:02X}\n", self.read_id_opcode));
        output.push_str(&format!("erase = 0x{:02X}\n", self.erase_opcode));
        output.push_str(&format!("program = 0x{:02X}\n", self.program_opcode));
        output.push('\n');

        output.push_str("[timing]\n");
        output.push_str(&format!("program_poll_us = {}\n", self.timing.program_poll_us));
        output.push_str(&format!(
            "program_timeout_us = {}\n",
            self.timing.program_timeout_us
        ));
        output.push_str(&format!("erase_poll_us = {}\n", self.timing.erase_poll_us));
        output.push_str(&format!("erase_timeout_us = {}\n", self.timing.erase_timeout_us));

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("4096").unwrap(), 4096);
        assert_eq!(parse_size("0x1000").unwrap(), 4096);
        assert_eq!(parse_size("4 KiB").unwrap(), 4096);
        assert_eq!(parse_size("64KiB").unwrap(), 65536);
        assert_eq!(parse_size("16 MiB").unwrap(), 16 * 1024 * 1024);
        assert!(parse_size("lots").is_err());
    }

    #[test]
    fn test_empty_file_is_default() {
        let config = FlashConfig::from_toml_str("").unwrap();
        assert_eq!(config, FlashConfig::default());
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
[flash]
page_size = 256
erase_size = "64 KiB"
capacity = "8 MiB"
busy_bit = 0

[opcodes]
erase = 0xD8

[timing]
erase_poll_us = 100000
erase_timeout_us = 4000000
"#;
        let config = FlashConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.erase_size, 64 * 1024);
        assert_eq!(config.capacity, 8 * 1024 * 1024);
        assert_eq!(config.erase_opcode, 0xD8);
        assert_eq!(config.program_opcode, 0x02);
        assert_eq!(config.timing.erase_timeout_us, 4_000_000);
        assert_eq!(config.timing.program_timeout_us, 10_000);
    }

    #[test]
    fn test_invalid_geometry_is_rejected() {
        let err = FlashConfig::from_toml_str("[flash]\npage_size = 100\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(Error::InvalidConfig)));
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let err = FlashConfig::from_toml_str("[flash]\nsector = 4096\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_round_trip_through_string() {
        let config = FlashConfig {
            erase_size: 32 * 1024,
            erase_opcode: 0x52,
            ..FlashConfig::default()
        };
        let text = config.to_toml_string();
        assert_eq!(FlashConfig::from_toml_str(&text).unwrap(), config);
    }
}
