//! Upload session protocol
//!
//! An upload is a single byte stream:
//!
//! ```text
//! +------+------+------+------+----------------+---------------------+
//! | 'F'  | 'W'  | 'U'  | 'P'  | length (u32 LE)| payload (length B)  |
//! +------+------+------+------+----------------+---------------------+
//! ```
//!
//! The first chunk of a session must carry the whole 8-byte header.
//! Payload is written to flash starting at offset 0. When `length` bytes
//! have been written the device answers `"OK"`.

mod header;
mod sequencer;
mod session;

pub use header::{Header, HeaderError, ACK, HEADER_LEN, MARKER};
pub use sequencer::{ChunkOutcome, RejectReason, Sequencer};
pub use session::SessionState;
