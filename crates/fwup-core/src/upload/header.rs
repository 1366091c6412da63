//! Upload header framing

/// Marker opening every upload
pub const MARKER: [u8; 4] = *b"FWUP";

/// Header length: marker + little-endian u32 payload length
pub const HEADER_LEN: usize = 8;

/// Reply sent once the declared payload has been written
pub const ACK: &[u8; 2] = b"OK";

/// Why a chunk could not start a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderError {
    /// Fewer than [`HEADER_LEN`] bytes
    TooShort(usize),
    /// First four bytes are not [`MARKER`]
    BadMarker([u8; 4]),
}

/// Decoded upload header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Number of payload bytes following the header
    pub total_len: u32,
}

impl Header {
    /// Create a header announcing `total_len` payload bytes
    pub const fn new(total_len: u32) -> Self {
        Self { total_len }
    }

    /// Parse the header at the start of `chunk`
    ///
    /// Returns the header and the payload bytes that followed it in the
    /// same chunk.
    pub fn parse(chunk: &[u8]) -> Result<(Self, &[u8]), HeaderError> {
        if chunk.len() < HEADER_LEN {
            return Err(HeaderError::TooShort(chunk.len()));
        }
        let (head, rest) = chunk.split_at(HEADER_LEN);
        let marker = [head[0], head[1], head[2], head[3]];
        if marker != MARKER {
            return Err(HeaderError::BadMarker(marker));
        }
        let total_len = u32::from_le_bytes([head[4], head[5], head[6], head[7]]);
        Ok((Self { total_len }, rest))
    }

    /// Encode the header as sent on the wire
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[..4].copy_from_slice(&MARKER);
        buf[4..].copy_from_slice(&self.total_len.to_le_bytes());
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_trailing_payload() {
        let chunk = [b'F', b'W', b'U', b'P', 0x64, 0x00, 0x00, 0x00, 1, 2, 3];
        let (header, rest) = Header::parse(&chunk).unwrap();
        assert_eq!(header.total_len, 100);
        assert_eq!(rest, &[1, 2, 3]);
    }

    #[test]
    fn test_length_is_little_endian() {
        let chunk = [b'F', b'W', b'U', b'P', 0x0A, 0x10, 0x00, 0x00];
        let (header, rest) = Header::parse(&chunk).unwrap();
        assert_eq!(header.total_len, 4096 + 10);
        assert!(rest.is_empty());
    }

    #[test]
    fn test_short_chunk() {
        assert_eq!(
            Header::parse(b"FWUP\x01"),
            Err(HeaderError::TooShort(5))
        );
    }

    #[test]
    fn test_bad_marker() {
        assert_eq!(
            Header::parse(b"XWUP\x01\x00\x00\x00"),
            Err(HeaderError::BadMarker(*b"XWUP"))
        );
    }

    #[test]
    fn test_to_bytes() {
        assert_eq!(Header::new(300).to_bytes(), *b"FWUP\x2c\x01\x00\x00");
    }
}
