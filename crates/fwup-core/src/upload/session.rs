//! Upload session state

/// State of the single upload session
///
/// Payload is written contiguously from offset 0, so the write cursor and
/// the received byte count are the same number and only stored once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No header seen yet
    #[default]
    Idle,
    /// Header processed, erase done, payload in flight
    Receiving {
        /// Payload length declared by the header (nonzero)
        expected: u32,
        /// Payload bytes programmed so far, also the next write offset
        received: u32,
    },
    /// All declared bytes programmed
    Complete {
        /// Payload length declared by the header
        expected: u32,
    },
}

impl SessionState {
    /// Declared payload length, 0 when idle
    pub fn expected_total(&self) -> u32 {
        match *self {
            Self::Idle => 0,
            Self::Receiving { expected, .. } | Self::Complete { expected } => expected,
        }
    }

    /// Payload bytes programmed so far
    pub fn received_total(&self) -> u32 {
        match *self {
            Self::Idle => 0,
            Self::Receiving { received, .. } => received,
            Self::Complete { expected } => expected,
        }
    }

    /// Next destination offset
    pub fn write_cursor(&self) -> u32 {
        self.received_total()
    }

    /// Whether the header phase is over
    pub fn header_seen(&self) -> bool {
        !matches!(self, Self::Idle)
    }

    /// Whether the declared payload has been fully written
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete { .. })
    }
}
