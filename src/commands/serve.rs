//! Serve command implementation
//!
//! Runs the device control loop against an emulated flash so the host
//! uploader can be exercised without hardware.

use fwup_core::{ChunkOutcome, Error, PollEvent, SpiFlash, UploadDevice};
use fwup_dummy::DummyFlash;
use fwup_link::{SerialLink, TcpLink};
use std::net::TcpListener;
use std::path::Path;
use std::time::Duration;

/// Sleep between polls of an idle link
const IDLE_SLEEP: Duration = Duration::from_millis(1);

/// Device end to serve on
#[derive(Debug, Clone)]
pub enum ServeOn {
    /// Accept TCP connections, one session each
    Tcp(String),
    /// Serve a serial port
    Serial {
        /// Port path
        device: String,
        /// Baud rate (None for the default)
        baud: Option<u32>,
    },
}

/// Run the serve command
pub fn run_serve(
    on: &ServeOn,
    config: Option<&Path>,
    image: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_flash_config(config)?;
    let mut storage = SpiFlash::new(super::emulated_flash(&config)?, config)?;
    println!(
        "Emulating {} byte flash ({} byte pages, {} byte erase units)",
        config.capacity, config.page_size, config.erase_size
    );

    match on {
        ServeOn::Tcp(addr) => {
            let listener = TcpListener::bind(addr)?;
            println!("Listening on {}", listener.local_addr()?);
            loop {
                let link = match TcpLink::accept(&listener) {
                    Ok(link) => link,
                    Err(e) => {
                        log::warn!("accept failed: {}", e);
                        continue;
                    }
                };
                let peer = link.peer();
                serve_link(&mut storage, link, false, image)?;
                log::info!("session with {} ended", peer);
            }
        }
        ServeOn::Serial { device, baud } => {
            let link = SerialLink::open(device, *baud)?;
            // No hang-up on a serial line, so each completion ends the session
            serve_link(&mut storage, link, true, image)
        }
    }
}

/// Drive one link until it closes
fn serve_link<L>(
    storage: &mut SpiFlash<DummyFlash>,
    link: L,
    reset_on_complete: bool,
    image: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>>
where
    L: embedded_io::Read + embedded_io::ReadReady + embedded_io::Write,
{
    let mut device = UploadDevice::new(&mut *storage, link);
    device.set_reset_on_complete(reset_on_complete);
    device.identify()?;

    loop {
        let was_complete = device.state().is_complete();
        let event = device.poll();
        if let (Some(path), Ok(event)) = (image, &event) {
            if session_finished(was_complete, event) {
                save_image(device.sequencer().storage(), path)?;
            }
        }
        match event {
            Ok(PollEvent::Idle) => std::thread::sleep(IDLE_SLEEP),
            Ok(PollEvent::Disconnected) => return Ok(()),
            Ok(PollEvent::Chunk(ChunkOutcome::Completed { programmed, discarded })) => {
                log::debug!("last chunk: {} programmed, {} discarded", programmed, discarded);
            }
            Ok(PollEvent::Chunk(_)) => {}
            Err(Error::IoError) => {
                log::warn!("link failed, dropping session");
                device.disconnect();
                return Ok(());
            }
            Err(e) => log::error!("upload aborted: {}", e),
        }
    }
}

/// Whether `event` is the chunk that completed a session
///
/// Chunks arriving after completion are acknowledged again but must not
/// count as a new session.
fn session_finished(was_complete: bool, event: &PollEvent) -> bool {
    !was_complete && matches!(event, PollEvent::Chunk(ChunkOutcome::Completed { .. }))
}

fn save_image(storage: &SpiFlash<DummyFlash>, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::write(path, storage.master().data())?;
    println!("Wrote flash image to {:?}", path);
    Ok(())
}
