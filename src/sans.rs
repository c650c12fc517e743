//! Protocol machinery performing no I/O.
//!
//! This module is intended for applications that need fine control over how
//! bytes reach the receiver. See [`crate::avec`] for a session driving these
//! pieces over a transport.
//!
//! # Architecture
//!
//! Every exchange with the receiver follows the same shape:
//!
//! 1. A [`command::Descriptor`] is built for the request. It holds the encoded
//!    frame and the decoder for the response payload, and represents the idle
//!    state of an exchange.
//!
//! 2. Transmitting the descriptor yields an [`exchange::AwaitingResponse`]
//!    token. Advance it against the receive buffer as bytes arrive; the
//!    [`assembler`] skips line noise, waits for complete frames, and discards
//!    consumed bytes.
//!
//! 3. Once a frame arrives, the [`exchange::Decoding`] token checks the
//!    response code and hands the payload to the descriptor's decoder.
//!
//! Some areas of the exchange are not represented here and must be carefully
//! written by the caller:
//!
//! - Moving bytes between the device and the receive buffer.
//!
//! - Deciding how long to wait for a response, and whether to retransmit after
//!   a corrupt one.
//!
//! - Issuing only one command at a time. The receiver does not tag responses,
//!   so a second outstanding command makes correlation impossible.

pub mod assembler;
pub mod check;
pub mod command;
pub mod exchange;
pub mod frame;
pub mod metadata;
pub mod record;
