//! States of a single command/response exchange.
//!
//! An exchange begins idle, as a [`Descriptor`]. Transmitting it yields an
//! [`AwaitingResponse`] token, which is advanced against the receive buffer
//! until a frame arrives. The resulting [`Decoding`] token finishes the
//! exchange, either done (with the decoded response, if the receiver sent a
//! payload) or failed.
//!
//! Tokens are consumed by each transition, so an exchange cannot be advanced
//! from a stale state.

use alloc::vec::Vec;

use thiserror::Error;

use super::{
    assembler::{self, ReceiveBuffer},
    command::{Command, Descriptor, command_name},
    frame::{Frame, FramingError},
    record::DecodeError,
};

/// An error finishing an exchange.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResponseError {
    /// The receiver answered with something other than an acknowledgement.
    #[error("Unexpected response {code} ({name}).")]
    UnexpectedResponse { code: u8, name: &'static str },
    /// The acknowledgement payload could not be decoded.
    #[error("Could not decode response: {0}")]
    Decode(#[from] DecodeError),
}

impl<T> Descriptor<T> {
    /// Transition to another state by transmitting the request.
    ///
    /// Returns the bytes to write, and a successor state token. The bytes must
    /// be written before the token is advanced.
    pub fn transmit(self) -> (Vec<u8>, AwaitingResponse<T>) {
        let Descriptor {
            command,
            frame,
            decode,
        } = self;

        (
            frame.clone(),
            AwaitingResponse {
                command,
                frame,
                decode,
            },
        )
    }
}

/// State token waiting for the response frame.
pub struct AwaitingResponse<T> {
    command: Command,
    frame: Vec<u8>,
    decode: fn(&[u8]) -> Result<T, DecodeError>,
}

/// The result of advancing an [`AwaitingResponse`] token.
pub enum Step<T> {
    /// No complete frame has arrived yet.
    Waiting(AwaitingResponse<T>),
    /// A frame arrived and failed validation. Its bytes have been discarded.
    Corrupt(AwaitingResponse<T>, FramingError),
    /// A valid frame arrived.
    Received(Decoding<T>),
}

impl<T> AwaitingResponse<T> {
    /// The command awaiting a response.
    pub fn command(&self) -> Command {
        self.command
    }

    /// The request frame, for retransmission.
    pub fn frame(&self) -> &[u8] {
        &self.frame
    }

    /// Transition to another state by inspecting the receive buffer.
    ///
    /// Returns a successor state.
    pub fn advance(self, buffer: &mut impl ReceiveBuffer) -> Step<T> {
        match assembler::poll(buffer) {
            None => Step::Waiting(self),
            Some(Err(error)) => Step::Corrupt(self, error),
            Some(Ok(frame)) => Step::Received(Decoding {
                command: self.command,
                frame,
                decode: self.decode,
            }),
        }
    }
}

/// State token holding a received frame.
pub struct Decoding<T> {
    command: Command,
    frame: Frame,
    decode: fn(&[u8]) -> Result<T, DecodeError>,
}

impl<T> Decoding<T> {
    /// The command this frame answers.
    pub fn command(&self) -> Command {
        self.command
    }

    /// The received response frame.
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Finish the exchange by checking the response code and decoding the
    /// payload.
    ///
    /// Returns the decoded response, or `None` for an acknowledgement without
    /// a payload.
    pub fn advance(self) -> Result<Option<T>, ResponseError> {
        let Frame { command, payload } = self.frame;

        if command != Command::Ack.code() {
            Err(ResponseError::UnexpectedResponse {
                code: command,
                name: command_name(command),
            })?;
        }

        if payload.is_empty() {
            return Ok(None);
        }

        Ok(Some((self.decode)(&payload)?))
    }
}
