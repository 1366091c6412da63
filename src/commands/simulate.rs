//! Simulate command implementation
//!
//! Streams an image through the sequencer into an emulated flash, the
//! same way a device would see it arrive over a link, then reads the
//! flash back and compares.

use fwup_core::upload::{ChunkOutcome, Header};
use fwup_core::{Sequencer, SpiFlash};
use std::path::Path;

/// Run the simulate command
pub fn run_simulate(
    input: &Path,
    chunk_size: usize,
    config: Option<&Path>,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    if chunk_size == 0 {
        return Err("Chunk size must be nonzero".into());
    }

    let config = super::load_flash_config(config)?;
    let image = std::fs::read(input)?;
    let total = u32::try_from(image.len())
        .map_err(|_| format!("File size ({} bytes) exceeds the length field", image.len()))?;

    let storage = SpiFlash::new(super::emulated_flash(&config)?, config)?;
    let mut sequencer = Sequencer::new(storage);

    // The header must arrive whole, so it always leads the first chunk
    let mut stream = Header::new(total).to_bytes().to_vec();
    stream.extend_from_slice(&image);

    let mut replies: Vec<u8> = Vec::new();
    let mut chunks = 0usize;
    for chunk in stream.chunks(chunk_size.max(fwup_core::upload::HEADER_LEN)) {
        chunks += 1;
        match sequencer.process_chunk(chunk, &mut replies)? {
            ChunkOutcome::Rejected(reason) => {
                return Err(format!("Upload rejected: {:?}", reason).into());
            }
            ChunkOutcome::Accepted { programmed } => {
                log::debug!("chunk {}: {} bytes programmed", chunks, programmed);
            }
            ChunkOutcome::Completed { programmed, .. } => {
                log::debug!("chunk {}: {} bytes programmed, done", chunks, programmed);
            }
        }
    }

    if replies != fwup_core::upload::ACK {
        return Err(format!(
            "Expected acknowledgement, device replied {:?}",
            String::from_utf8_lossy(&replies)
        )
        .into());
    }

    let mut storage = sequencer.into_storage();
    let mut readback = vec![0u8; image.len()];
    storage.read(0, &mut readback)?;
    if let Some(addr) = readback.iter().zip(&image).position(|(a, b)| a != b) {
        return Err(format!(
            "Verification failed at 0x{:08X}: expected 0x{:02X}, got 0x{:02X}",
            addr, image[addr], readback[addr]
        )
        .into());
    }

    let flash = storage.into_inner();
    let counters = flash.counters();
    println!(
        "Streamed {} bytes in {} chunks: {} erases, {} page programs, verified",
        total, chunks, counters.erases, counters.programs
    );

    if let Some(output) = output {
        std::fs::write(output, flash.data())?;
        println!("Wrote flash image to {:?}", output);
    }

    Ok(())
}
