//! Flash-write sequencer
//!
//! Turns transport chunks into erase and page-program calls.
//!
//! Ordering within a session is strict: every sector covering the
//! declared length is erased (ascending) while the header is processed,
//! then payload is programmed at increasing, gap-free offsets with no
//! program call crossing a page boundary.

use embedded_io::{Error as _, Write};

use super::header::{Header, HeaderError, ACK};
use super::session::SessionState;
use crate::error::{Error, Result};
use crate::flash::FlashStorage;

/// Why a chunk was refused at the start of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Malformed header
    Header(HeaderError),
    /// Header declared a zero-length payload
    EmptyUpload,
    /// Declared payload does not fit the device
    TooLarge {
        /// Length from the header
        total_len: u32,
        /// Device capacity
        capacity: u32,
    },
}

/// What [`Sequencer::process_chunk`] did with a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// The chunk could not open a session; state was reset and nothing
    /// was erased or programmed
    Rejected(RejectReason),
    /// Payload was programmed and more is expected
    Accepted {
        /// Payload bytes programmed from this chunk
        programmed: u32,
    },
    /// The session is complete and the acknowledgement was sent
    Completed {
        /// Payload bytes programmed from this chunk
        programmed: u32,
        /// Bytes beyond the declared length that were dropped
        discarded: u32,
    },
}

enum Start<'a> {
    Payload(&'a [u8]),
    Rejected(RejectReason),
}

/// Upload sequencer owning the session state and the storage driver
#[derive(Debug)]
pub struct Sequencer<S> {
    storage: S,
    state: SessionState,
}

impl<S: FlashStorage> Sequencer<S> {
    /// Create a sequencer in the idle state
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            state: SessionState::Idle,
        }
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Access the storage driver
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Mutable access to the storage driver
    ///
    /// Calling erase/program directly while a session is open breaks the
    /// session's erase-before-write bookkeeping.
    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    /// Release the storage driver
    pub fn into_storage(self) -> S {
        self.storage
    }

    /// Drop the current session, if any
    ///
    /// Flash contents written so far are left as they are.
    pub fn reset_session(&mut self) {
        if self.state != SessionState::Idle {
            log::debug!(
                "session reset at {}/{} bytes",
                self.state.received_total(),
                self.state.expected_total()
            );
        }
        self.state = SessionState::Idle;
    }

    /// Consume one chunk from the transport
    ///
    /// In the idle state the chunk must start with the header. Once the
    /// declared length has been programmed, `"OK"` is written to `reply`
    /// after this and every following chunk until the session is reset.
    ///
    /// A storage error, or a storage config that fails
    /// [`FlashConfig::validate`](crate::flash::FlashConfig::validate),
    /// resets the session before it is returned.
    pub fn process_chunk<W: Write + ?Sized>(
        &mut self,
        chunk: &[u8],
        reply: &mut W,
    ) -> Result<ChunkOutcome> {
        let payload = if self.state.header_seen() {
            chunk
        } else {
            match self.start_session(chunk) {
                Ok(Start::Payload(rest)) => rest,
                Ok(Start::Rejected(reason)) => {
                    log::warn!("discarding {} byte chunk: {:?}", chunk.len(), reason);
                    self.reset_session();
                    return Ok(ChunkOutcome::Rejected(reason));
                }
                Err(e) => {
                    self.reset_session();
                    return Err(e);
                }
            }
        };

        let (programmed, discarded) = match self.write_payload(payload) {
            Ok(counts) => counts,
            Err(e) => {
                log::error!(
                    "write failed at offset 0x{:06X}: {}",
                    self.state.write_cursor(),
                    e
                );
                self.reset_session();
                return Err(e);
            }
        };

        if !self.state.is_complete() {
            return Ok(ChunkOutcome::Accepted { programmed });
        }

        reply.write_all(ACK).map_err(|e| {
            log::error!("failed to send acknowledgement: {:?}", e.kind());
            Error::IoError
        })?;
        reply.flush().map_err(|e| {
            log::error!("failed to flush acknowledgement: {:?}", e.kind());
            Error::IoError
        })?;

        Ok(ChunkOutcome::Completed {
            programmed,
            discarded,
        })
    }

    /// Parse the header and erase the region it covers
    fn start_session<'a>(&mut self, chunk: &'a [u8]) -> Result<Start<'a>> {
        let (header, rest) = match Header::parse(chunk) {
            Ok(parsed) => parsed,
            Err(e) => return Ok(Start::Rejected(RejectReason::Header(e))),
        };

        if header.total_len == 0 {
            return Ok(Start::Rejected(RejectReason::EmptyUpload));
        }

        let config = *self.storage.config();
        config.validate()?;
        let ceiling = match config.erase_ceiling(header.total_len) {
            Some(ceiling) if ceiling <= config.capacity => ceiling,
            _ => {
                return Ok(Start::Rejected(RejectReason::TooLarge {
                    total_len: header.total_len,
                    capacity: config.capacity,
                }))
            }
        };

        log::info!(
            "upload of {} bytes, erasing {} sector(s)",
            header.total_len,
            ceiling / config.erase_size
        );

        let mut addr = 0;
        while addr < ceiling {
            log::debug!("erase sector 0x{:06X}", addr);
            self.storage.erase_sector(addr)?;
            addr += config.erase_size;
        }

        self.state = SessionState::Receiving {
            expected: header.total_len,
            received: 0,
        };
        Ok(Start::Payload(rest))
    }

    /// Program `data` at the cursor, page by page
    ///
    /// Returns `(programmed, discarded)` byte counts.
    fn write_payload(&mut self, data: &[u8]) -> Result<(u32, u32)> {
        let (expected, mut received) = match self.state {
            SessionState::Receiving { expected, received } => (expected, received),
            SessionState::Complete { .. } => {
                if !data.is_empty() {
                    log::warn!(
                        "session already complete, ignoring {} bytes",
                        data.len()
                    );
                }
                return Ok((0, byte_count(data.len())));
            }
            SessionState::Idle => return Ok((0, byte_count(data.len()))),
        };

        let room = (expected - received) as usize;
        let (data, overshoot) = data.split_at(data.len().min(room));
        if !overshoot.is_empty() {
            log::warn!(
                "dropping {} bytes past the declared length of {}",
                overshoot.len(),
                expected
            );
        }

        let config = *self.storage.config();
        let mut offset = 0;
        while offset < data.len() {
            let run = (config.page_remaining(received) as usize).min(data.len() - offset);
            log::debug!("program 0x{:06X} len {}", received, run);
            self.storage
                .program_page(received, &data[offset..offset + run])?;
            offset += run;
            received += run as u32;
            self.state = SessionState::Receiving { expected, received };
        }

        if received == expected {
            log::info!("upload complete, {} bytes written", expected);
            self.state = SessionState::Complete { expected };
        }

        Ok((byte_count(data.len()), byte_count(overshoot.len())))
    }
}

/// Chunk length as a `u32` count, saturating for chunks over 4 GiB
fn byte_count(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}
