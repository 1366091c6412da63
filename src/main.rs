//! fwup - Stream firmware images into SPI NOR flash
//!
//! The device side receives `"FWUP" <u32 LE length> <payload>` over a byte
//! link, erases the covered sectors, programs the payload page by page and
//! answers `"OK"`. This binary is the host uploader plus an emulated
//! device for testing without hardware.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use commands::serve::ServeOn;
use fwup_link::{Connection, UploadOptions};
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    match cli.command {
        Commands::Upload {
            file,
            target,
            baud,
            chunk_size,
            timeout_ms,
            wait_after_header_ms,
        } => {
            let conn = match (target.tcp, target.serial) {
                (Some(addr), _) => Connection::Tcp { addr },
                (None, Some(device)) => Connection::Serial { device, baud },
                (None, None) => return Err("Either --tcp or --serial is required".into()),
            };
            let options = UploadOptions {
                chunk_size: chunk_size as usize,
                wait_after_header: Duration::from_millis(wait_after_header_ms),
                ack_timeout: Duration::from_millis(timeout_ms),
            };
            commands::upload::run_upload(&file, &conn, options)
        }
        Commands::Serve {
            listen,
            baud,
            config,
            image,
        } => {
            let on = match (listen.listen, listen.serial) {
                (Some(addr), _) => ServeOn::Tcp(addr),
                (None, Some(device)) => ServeOn::Serial { device, baud },
                (None, None) => return Err("Either --listen or --serial is required".into()),
            };
            commands::serve::run_serve(&on, config.as_deref(), image.as_deref())
        }
        Commands::Simulate {
            file,
            chunk_size,
            config,
            output,
        } => commands::simulate::run_simulate(
            &file,
            chunk_size as usize,
            config.as_deref(),
            output.as_deref(),
        ),
        Commands::Config { config } => commands::config::run_config(config.as_deref()),
    }
}
