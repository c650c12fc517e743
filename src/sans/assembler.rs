//! Locating frames in an accumulating receive buffer.
//!
//! Bytes from the receiver arrive in arbitrary fragments, possibly preceded by
//! line noise. The assembler inspects the front of the buffer, asks its owner
//! to discard whatever cannot be part of a frame, and yields frames once they
//! are complete.

use alloc::vec::Vec;

use log::trace;

use super::frame::{self, Decoded, Frame, FramingError, MIN_FRAME_LEN, SYNC};

/// A buffer of received bytes, owned by a transport.
pub trait ReceiveBuffer {
    /// Bytes received and not yet discarded.
    fn received(&self) -> &[u8];
    /// Remove the first `n` bytes.
    fn discard(&mut self, n: usize);
}

impl ReceiveBuffer for Vec<u8> {
    fn received(&self) -> &[u8] {
        self
    }

    fn discard(&mut self, n: usize) {
        self.drain(..n.min(self.len()));
    }
}

impl ReceiveBuffer for bytes::BytesMut {
    fn received(&self) -> &[u8] {
        self
    }

    fn discard(&mut self, n: usize) {
        bytes::Buf::advance(self, n.min(self.len()));
    }
}

/// Count the bytes before the first sync marker.
pub fn leading_noise(r: &[u8]) -> usize {
    r.iter().position(|&b| b == SYNC).unwrap_or(r.len())
}

/// Try to take one frame from the front of a receive buffer.
///
/// Returns `None` when no complete frame is available yet. Otherwise the frame
/// (or the reason it was rejected) is returned, and its bytes have already
/// been discarded. A rejected frame should be treated as no response at all.
pub fn poll(buffer: &mut impl ReceiveBuffer) -> Option<Result<Frame, FramingError>> {
    let noise = leading_noise(buffer.received());
    if noise != 0 {
        trace!("discarding {noise} bytes of noise");
        buffer.discard(noise);
    }

    if buffer.received().len() < MIN_FRAME_LEN {
        return None;
    }

    match frame::decode(buffer.received()) {
        Decoded::Incomplete => None,
        Decoded::Invalid { consumed, error } => {
            // Noise was stripped above, so at least the sync byte must go.
            buffer.discard(consumed.max(1));
            Some(Err(error))
        }
        Decoded::Valid { frame, consumed } => {
            buffer.discard(consumed);
            Some(Ok(frame))
        }
    }
}
