//! Host-side upload driver

use std::time::{Duration, Instant};

use fwup_core::upload::{Header, ACK};

use crate::error::{LinkError, Result};
use crate::transport::Transport;

/// Default payload bytes per write
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Default time to wait for the acknowledgement
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Progress callbacks for an upload
pub trait UploadProgress {
    /// Called once before the first payload chunk
    fn start(&mut self, total: u32);

    /// Called after each payload chunk has been written
    fn update(&mut self, sent: u32);

    /// Called when the payload has been written, before waiting for the ack
    fn finish(&mut self);
}

/// Progress sink that reports nothing
pub struct NoProgress;

impl UploadProgress for NoProgress {
    fn start(&mut self, _total: u32) {}
    fn update(&mut self, _sent: u32) {}
    fn finish(&mut self) {}
}

/// Upload tuning
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Payload bytes per transport write
    pub chunk_size: usize,
    /// Pause after the header, covering the device's erase
    pub wait_after_header: Duration,
    /// How long to wait for `"OK"` once the payload is out
    pub ack_timeout: Duration,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            wait_after_header: Duration::ZERO,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
        }
    }
}

/// Summary of a finished upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    /// Payload bytes written to the transport
    pub bytes_sent: u32,
    /// Whether the device answered `"OK"` in time
    pub acknowledged: bool,
    /// Wall time from header to acknowledgement or timeout
    pub elapsed: Duration,
}

/// Streams one image to a device
pub struct Uploader<T> {
    transport: T,
    options: UploadOptions,
    replies: Vec<u8>,
}

impl<T: Transport> Uploader<T> {
    /// Create an uploader over an open transport
    pub fn new(transport: T, options: UploadOptions) -> Result<Self> {
        if options.chunk_size == 0 {
            return Err(LinkError::InvalidParameter(
                "chunk size must be nonzero".into(),
            ));
        }
        Ok(Self {
            transport,
            options,
            replies: Vec::new(),
        })
    }

    /// Bytes received from the device so far
    pub fn replies(&self) -> &[u8] {
        &self.replies
    }

    /// Give back the transport
    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Upload `image` and wait for the acknowledgement
    ///
    /// A missing acknowledgement is reported in the result, not as an
    /// error; transport failures are errors.
    pub fn upload(
        &mut self,
        image: &[u8],
        progress: &mut dyn UploadProgress,
    ) -> Result<UploadReport> {
        let total = u32::try_from(image.len()).map_err(|_| {
            LinkError::InvalidParameter(format!(
                "image of {} bytes does not fit the 32-bit length field",
                image.len()
            ))
        })?;
        if total == 0 {
            return Err(LinkError::InvalidParameter("image is empty".into()));
        }

        self.replies.clear();
        let started = Instant::now();

        log::info!("sending header for {} bytes", total);
        self.transport.write(&Header::new(total).to_bytes())?;
        self.transport.flush()?;

        if !self.options.wait_after_header.is_zero() {
            log::debug!(
                "waiting {:?} for the device to erase",
                self.options.wait_after_header
            );
            std::thread::sleep(self.options.wait_after_header);
        }

        progress.start(total);
        let mut sent = 0u32;
        for chunk in image.chunks(self.options.chunk_size) {
            self.transport.write(chunk)?;
            sent += chunk.len() as u32;
            progress.update(sent);
            // Pick up anything the device sent without stalling the stream
            self.drain_replies(0)?;
        }
        self.transport.flush()?;
        progress.finish();

        let acknowledged = self.wait_for_ack()?;
        let elapsed = started.elapsed();
        if acknowledged {
            log::info!("device acknowledged {} bytes in {:?}", sent, elapsed);
        } else {
            log::warn!(
                "no acknowledgement within {:?}, received {:?}",
                self.options.ack_timeout,
                String::from_utf8_lossy(&self.replies)
            );
        }

        Ok(UploadReport {
            bytes_sent: sent,
            acknowledged,
            elapsed,
        })
    }

    fn has_ack(&self) -> bool {
        self.replies.windows(ACK.len()).any(|w| w == ACK)
    }

    fn drain_replies(&mut self, timeout_ms: u32) -> Result<usize> {
        let mut buf = [0u8; 64];
        let n = self.transport.read_nonblock(&mut buf, timeout_ms)?;
        if n > 0 {
            log::debug!("device: {:?}", String::from_utf8_lossy(&buf[..n]));
            self.replies.extend_from_slice(&buf[..n]);
        }
        Ok(n)
    }

    fn wait_for_ack(&mut self) -> Result<bool> {
        let deadline = Instant::now() + self.options.ack_timeout;
        loop {
            if self.has_ack() {
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            let left = (deadline - now).as_millis().min(100) as u32;
            self.drain_replies(left)?;
        }
    }
}
