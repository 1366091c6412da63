//! CLI argument parsing

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

#[derive(Parser)]
#[command(name = "fwup")]
#[command(author, version, about = "Stream firmware images into SPI NOR flash", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Where the host reaches the device
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct TargetArgs {
    /// Device TCP address (host:port)
    #[arg(long)]
    pub tcp: Option<String>,

    /// Device serial port (e.g. /dev/ttyACM0)
    #[arg(long)]
    pub serial: Option<String>,
}

/// Where the emulated device listens
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct ListenArgs {
    /// TCP address to listen on (e.g. 127.0.0.1:4040)
    #[arg(long)]
    pub listen: Option<String>,

    /// Serial port to serve on
    #[arg(long)]
    pub serial: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Upload an image to a device
    Upload {
        /// Image file to upload
        file: PathBuf,

        #[command(flatten)]
        target: TargetArgs,

        /// Baud rate for --serial
        #[arg(long)]
        baud: Option<u32>,

        /// Payload bytes per write (hex or decimal)
        #[arg(long, default_value = "4096", value_parser = parse_hex_u32)]
        chunk_size: u32,

        /// Milliseconds to wait for the acknowledgement
        #[arg(long, default_value_t = 10_000)]
        timeout_ms: u64,

        /// Milliseconds to pause after the header while the device erases
        #[arg(long, default_value_t = 0)]
        wait_after_header_ms: u64,
    },

    /// Run an emulated upload target
    Serve {
        #[command(flatten)]
        listen: ListenArgs,

        /// Baud rate for --serial
        #[arg(long)]
        baud: Option<u32>,

        /// Flash configuration file (TOML format)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Write the flash contents here after each session
        #[arg(long)]
        image: Option<PathBuf>,
    },

    /// Stream an image through the sequencer into an emulated flash
    Simulate {
        /// Image file to stream
        file: PathBuf,

        /// Bytes per chunk, header included in the first (hex or decimal)
        #[arg(long, default_value = "4096", value_parser = parse_hex_u32)]
        chunk_size: u32,

        /// Flash configuration file (TOML format)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Write the resulting flash contents to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the effective flash configuration
    Config {
        /// Flash configuration file (TOML format)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}
