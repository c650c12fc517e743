//! Packet encoding and decoding.
//!
//! Every message in either direction shares one layout:
//!
//! ```text
//! +------+--------+--------+---------+-----------------+--------+--------+
//! | 0x01 | len_lo | len_hi | command | payload         | crc_lo | crc_hi |
//! +------+--------+--------+---------+-----------------+--------+--------+
//! ```
//!
//! The length counts the whole frame, including the six bytes of overhead. The
//! check value covers every byte before it.

use alloc::vec::Vec;

use thiserror::Error;

use super::check::checksum16;

/// Marker byte opening every frame.
pub const SYNC: u8 = 0x01;

/// Bytes of framing around the payload.
pub const OVERHEAD: usize = 6;

/// Length of a frame with an empty payload.
pub const MIN_FRAME_LEN: usize = OVERHEAD;

/// Largest payload the length field can describe.
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize - OVERHEAD;

/// A frame that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The command or response code.
    pub command: u8,
    /// Bytes between the command code and the check value.
    pub payload: Vec<u8>,
}

/// An error validating a candidate frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FramingError {
    /// The candidate does not begin with the sync marker.
    #[error("Expected sync marker, found {0:#04x}.")]
    NotSync(u8),
    /// The declared length is shorter than the smallest possible frame.
    #[error("Declared frame length ({0}) is shorter than the minimum.")]
    Length(u16),
    /// Calculated and found check values do not match.
    #[error("Calculated ({calculated:#06x}) and found ({found:#06x}) CRC values do not match.")]
    CyclicRedundancyCheck { found: u16, calculated: u16 },
}

/// The outcome of decoding the front of a byte sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// Fewer bytes are available than the frame declares. Nothing should be
    /// discarded.
    Incomplete,
    /// The candidate failed validation. `consumed` bytes should be discarded;
    /// when zero, the caller should drop one byte and retry.
    Invalid {
        consumed: usize,
        error: FramingError,
    },
    /// A complete frame, occupying the first `consumed` bytes.
    Valid { frame: Frame, consumed: usize },
}

impl Decoded {
    /// Number of bytes to discard from the front of the sequence.
    pub fn consumed(&self) -> usize {
        match self {
            Decoded::Incomplete => 0,
            Decoded::Invalid { consumed, .. } | Decoded::Valid { consumed, .. } => *consumed,
        }
    }
}

/// Encode a command and its payload into a frame.
///
/// # Panics
///
/// Panics if the payload is longer than [`MAX_PAYLOAD_LEN`].
pub fn encode(command: u8, payload: &[u8]) -> Vec<u8> {
    assert!(
        payload.len() <= MAX_PAYLOAD_LEN,
        "payload of {} bytes does not fit in a frame",
        payload.len()
    );

    let len = payload.len() + OVERHEAD;

    let mut frame = Vec::with_capacity(len);
    frame.push(SYNC);
    frame.extend_from_slice(&(len as u16).to_le_bytes());
    frame.push(command);
    frame.extend_from_slice(payload);

    let crc = checksum16(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());

    frame
}

/// Decode a frame from the front of a byte sequence.
///
/// Trailing bytes beyond the declared length are left untouched.
pub fn decode(r: &[u8]) -> Decoded {
    match r.first() {
        None => return Decoded::Incomplete,
        Some(&b) if b != SYNC => {
            return Decoded::Invalid {
                consumed: 0,
                error: FramingError::NotSync(b),
            };
        }
        Some(_) => {}
    }

    let Some(declared) = r.get(1..3) else {
        return Decoded::Incomplete;
    };
    let declared = u16::from_le_bytes([declared[0], declared[1]]);
    let len = declared as usize;

    // Drop only the false sync byte; trusting the length would skip real data.
    if len < MIN_FRAME_LEN {
        return Decoded::Invalid {
            consumed: 1,
            error: FramingError::Length(declared),
        };
    }

    if r.len() < len {
        return Decoded::Incomplete;
    }

    let calculated = checksum16(&r[..len - 2]);
    let found = u16::from_le_bytes([r[len - 2], r[len - 1]]);

    if found != calculated {
        return Decoded::Invalid {
            consumed: len,
            error: FramingError::CyclicRedundancyCheck { found, calculated },
        };
    }

    Decoded::Valid {
        frame: Frame {
            command: r[3],
            payload: r[4..len - 2].to_vec(),
        },
        consumed: len,
    }
}
