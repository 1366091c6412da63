//! Device-side control loop
//!
//! The loop is cooperative and single-threaded: the caller invokes
//! [`UploadDevice::poll`] from its idle loop, interleaved with whatever
//! servicing the transport needs. Erase and program calls block inside
//! `poll` until the flash is idle again.

use embedded_io::{Error as _, Read, ReadReady, Write};

use crate::error::{Error, Result};
use crate::flash::FlashStorage;
use crate::spi::Status;
use crate::upload::{ChunkOutcome, Sequencer, SessionState};

/// Largest chunk handed to the sequencer in one call
pub const CHUNK_BUF_SIZE: usize = 4096;

/// Result of one [`UploadDevice::poll`] iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollEvent {
    /// Nothing buffered on the link
    Idle,
    /// A chunk was processed
    Chunk(ChunkOutcome),
    /// The link reported end of stream; the session was reset
    Disconnected,
}

/// Upload target: a sequencer fed from a byte link
///
/// The link is anything implementing the `embedded_io` traits. A read of
/// zero bytes after `read_ready` reported data means the peer went away.
///
/// Links that never report end of stream (a serial line) should enable
/// [`set_reset_on_complete`](Self::set_reset_on_complete), otherwise the
/// session stays complete and later uploads are only acknowledged.
pub struct UploadDevice<S, L> {
    sequencer: Sequencer<S>,
    link: L,
    buf: [u8; CHUNK_BUF_SIZE],
    reset_on_complete: bool,
}

impl<S, L> UploadDevice<S, L>
where
    S: FlashStorage,
    L: Read + ReadReady + Write,
{
    /// Create an idle device
    pub fn new(storage: S, link: L) -> Self {
        Self {
            sequencer: Sequencer::new(storage),
            link,
            buf: [0u8; CHUNK_BUF_SIZE],
            reset_on_complete: false,
        }
    }

    /// Return to idle as soon as a session completes and its ack is sent
    pub fn set_reset_on_complete(&mut self, enable: bool) {
        self.reset_on_complete = enable;
    }

    /// Read and log the flash identification
    ///
    /// Also warns when block protection bits are set.
    pub fn identify(&mut self) -> Result<[u8; 3]> {
        let storage = self.sequencer.storage_mut();
        let id = storage.read_id()?;
        log::info!(
            "flash JEDEC ID: {:02X} {:02X}{:02X}",
            id[0],
            id[1],
            id[2]
        );
        let status = Status::from_bits_retain(storage.read_status()?);
        if status.is_protected() {
            log::warn!("flash block protection is set: {:?}", status);
        }
        Ok(id)
    }

    /// Run one iteration of the control loop
    pub fn poll(&mut self) -> Result<PollEvent> {
        let ready = self.link.read_ready().map_err(|e| {
            log::error!("link poll failed: {:?}", e.kind());
            Error::IoError
        })?;
        if !ready {
            return Ok(PollEvent::Idle);
        }

        let n = self.link.read(&mut self.buf).map_err(|e| {
            log::error!("link read failed: {:?}", e.kind());
            Error::IoError
        })?;
        if n == 0 {
            self.disconnect();
            return Ok(PollEvent::Disconnected);
        }

        log::trace!("chunk of {} bytes", n);
        let outcome = self
            .sequencer
            .process_chunk(&self.buf[..n], &mut self.link)?;
        if self.reset_on_complete && matches!(outcome, ChunkOutcome::Completed { .. }) {
            self.sequencer.reset_session();
        }
        Ok(PollEvent::Chunk(outcome))
    }

    /// Transport went away: drop the session
    pub fn disconnect(&mut self) {
        if let SessionState::Receiving { expected, received } = self.sequencer.state() {
            log::warn!(
                "link closed mid-upload at {}/{} bytes, flash left partially written",
                received,
                expected
            );
        }
        self.sequencer.reset_session();
    }

    /// Swap in a new link (e.g. the next accepted connection)
    ///
    /// The session is reset; the old link is returned.
    pub fn replace_link(&mut self, link: L) -> L {
        self.disconnect();
        core::mem::replace(&mut self.link, link)
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        self.sequencer.state()
    }

    /// Access the sequencer
    pub fn sequencer(&self) -> &Sequencer<S> {
        &self.sequencer
    }

    /// Mutable access to the sequencer
    pub fn sequencer_mut(&mut self) -> &mut Sequencer<S> {
        &mut self.sequencer
    }

    /// Mutable access to the link
    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Split into storage driver and link
    pub fn into_parts(self) -> (S, L) {
        (self.sequencer.into_storage(), self.link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flash::FlashConfig;
    use crate::upload::Header;
    use std::collections::VecDeque;
    use std::vec::Vec;

    #[derive(Default)]
    struct CountingFlash {
        config: FlashConfig,
        erases: u32,
        programmed: Vec<u8>,
    }

    impl FlashStorage for CountingFlash {
        fn config(&self) -> &FlashConfig {
            &self.config
        }

        fn erase_sector(&mut self, _addr: u32) -> Result<()> {
            self.erases += 1;
            Ok(())
        }

        fn program_page(&mut self, _addr: u32, data: &[u8]) -> Result<()> {
            self.programmed.extend_from_slice(data);
            Ok(())
        }

        fn read_status(&mut self) -> Result<u8> {
            Ok(0)
        }

        fn read_id(&mut self) -> Result<[u8; 3]> {
            Ok([0xC8, 0x40, 0x17])
        }
    }

    /// Link replaying queued chunks, then optionally hanging up
    #[derive(Default)]
    struct ScriptedLink {
        incoming: VecDeque<Vec<u8>>,
        hang_up: bool,
        sent: Vec<u8>,
    }

    impl embedded_io::ErrorType for ScriptedLink {
        type Error = core::convert::Infallible;
    }

    impl Read for ScriptedLink {
        fn read(&mut self, buf: &mut [u8]) -> core::result::Result<usize, Self::Error> {
            match self.incoming.pop_front() {
                Some(chunk) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
                None => Ok(0),
            }
        }
    }

    impl ReadReady for ScriptedLink {
        fn read_ready(&mut self) -> core::result::Result<bool, Self::Error> {
            Ok(!self.incoming.is_empty() || self.hang_up)
        }
    }

    impl Write for ScriptedLink {
        fn write(&mut self, buf: &[u8]) -> core::result::Result<usize, Self::Error> {
            self.sent.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> core::result::Result<(), Self::Error> {
            Ok(())
        }
    }

    #[test]
    fn test_idle_when_nothing_buffered() {
        let mut device = UploadDevice::new(CountingFlash::default(), ScriptedLink::default());
        assert_eq!(device.poll(), Ok(PollEvent::Idle));
        assert_eq!(device.state(), SessionState::Idle);
    }

    #[test]
    fn test_full_upload_sends_ack_on_link() {
        let mut link = ScriptedLink::default();
        link.incoming.push_back(Header::new(6).to_bytes().to_vec());
        link.incoming.push_back(b"abc".to_vec());
        link.incoming.push_back(b"def".to_vec());
        let mut device = UploadDevice::new(CountingFlash::default(), link);

        assert!(matches!(
            device.poll(),
            Ok(PollEvent::Chunk(ChunkOutcome::Accepted { programmed: 0 }))
        ));
        assert!(matches!(
            device.poll(),
            Ok(PollEvent::Chunk(ChunkOutcome::Accepted { programmed: 3 }))
        ));
        assert!(matches!(
            device.poll(),
            Ok(PollEvent::Chunk(ChunkOutcome::Completed { programmed: 3, .. }))
        ));
        assert_eq!(device.poll(), Ok(PollEvent::Idle));

        let (flash, link) = device.into_parts();
        assert_eq!(flash.erases, 1);
        assert_eq!(flash.programmed, b"abcdef");
        assert_eq!(link.sent, b"OK");
    }

    #[test]
    fn test_hang_up_resets_session() {
        let mut link = ScriptedLink::default();
        link.incoming.push_back(Header::new(100).to_bytes().to_vec());
        link.incoming.push_back(b"abc".to_vec());
        link.hang_up = true;
        let mut device = UploadDevice::new(CountingFlash::default(), link);

        device.poll().unwrap();
        device.poll().unwrap();
        assert_eq!(
            device.state(),
            SessionState::Receiving {
                expected: 100,
                received: 3
            }
        );

        assert_eq!(device.poll(), Ok(PollEvent::Disconnected));
        assert_eq!(device.state(), SessionState::Idle);
        assert!(device.link_mut().sent.is_empty());
    }

    #[test]
    fn test_replace_link_starts_fresh() {
        let mut link = ScriptedLink::default();
        link.incoming.push_back(Header::new(100).to_bytes().to_vec());
        let mut device = UploadDevice::new(CountingFlash::default(), link);
        device.poll().unwrap();
        assert!(device.state().header_seen());

        let mut next = ScriptedLink::default();
        let mut chunk = Header::new(2).to_bytes().to_vec();
        chunk.extend_from_slice(b"hi");
        next.incoming.push_back(chunk);
        device.replace_link(next);
        assert_eq!(device.state(), SessionState::Idle);

        device.poll().unwrap();
        assert!(device.state().is_complete());
        assert_eq!(device.link_mut().sent, b"OK");
    }

    #[test]
    fn test_identify_reads_jedec_id() {
        let mut device = UploadDevice::new(CountingFlash::default(), ScriptedLink::default());
        assert_eq!(device.identify(), Ok([0xC8, 0x40, 0x17]));
    }

    fn upload(total: u32, payload: &[u8]) -> Vec<u8> {
        let mut chunk = Header::new(total).to_bytes().to_vec();
        chunk.extend_from_slice(payload);
        chunk
    }

    #[test]
    fn test_back_to_back_uploads_with_reset_on_complete() {
        let mut link = ScriptedLink::default();
        link.incoming.push_back(upload(3, b"abc"));
        link.incoming.push_back(upload(3, b"xyz"));
        let mut device = UploadDevice::new(CountingFlash::default(), link);
        device.set_reset_on_complete(true);

        for _ in 0..2 {
            assert_eq!(
                device.poll(),
                Ok(PollEvent::Chunk(ChunkOutcome::Completed {
                    programmed: 3,
                    discarded: 0
                }))
            );
            assert_eq!(device.state(), SessionState::Idle);
        }

        let (flash, link) = device.into_parts();
        assert_eq!(flash.erases, 2);
        assert_eq!(flash.programmed, b"abcxyz");
        assert_eq!(link.sent, b"OKOK");
    }

    #[test]
    fn test_second_upload_without_reset_is_only_acknowledged() {
        let mut link = ScriptedLink::default();
        link.incoming.push_back(upload(3, b"abc"));
        link.incoming.push_back(upload(3, b"xyz"));
        let mut device = UploadDevice::new(CountingFlash::default(), link);

        device.poll().unwrap();
        assert_eq!(
            device.poll(),
            Ok(PollEvent::Chunk(ChunkOutcome::Completed {
                programmed: 0,
                discarded: 11
            }))
        );

        let (flash, link) = device.into_parts();
        assert_eq!(flash.programmed, b"abc");
        assert_eq!(link.sent, b"OKOK");
    }
}
