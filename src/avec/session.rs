//! Sessions issuing commands to a receiver.

use std::{
    boxed::Box,
    io, thread,
    time::{Duration, Instant},
};

use either::Either::{self, Left, Right};
use log::{debug, info, trace, warn};
use thiserror::Error;

use crate::sans::{
    assembler::ReceiveBuffer,
    command::{Command, Descriptor, command_name, read_firmware_header},
    exchange::{AwaitingResponse, ResponseError, Step},
    frame::FramingError,
    metadata::FirmwareHeader,
};

use super::transport::Transport;

/// Errors occurring while talking to a receiver.
#[derive(Debug, Error)]
pub enum Error {
    /// An error from the transport.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// An error opening the serial port.
    #[cfg(feature = "serial")]
    #[error(transparent)]
    Serial(#[from] serialport::Error),
    /// A command was issued while another awaited its response.
    #[error("Cannot issue a command while {outstanding} awaits a response.")]
    Busy { outstanding: Command },
    /// No response arrived in time.
    #[error("No response to {command} after {elapsed:?}.")]
    Timeout { command: Command, elapsed: Duration },
    /// Responses kept failing validation after every retransmission.
    #[error("Corrupt response to {command}: {source}")]
    Framing {
        command: Command,
        source: FramingError,
    },
    /// The receiver rejected the command, or its response could not be decoded.
    #[error(transparent)]
    Response(#[from] ResponseError),
    /// The receiver acknowledged without the payload the command requires.
    #[error("Acknowledgement to {0} carried no payload.")]
    MissingPayload(Command),
    /// A page of a download failed.
    #[error("Failed to read page {index}: {source}")]
    Page { index: u32, source: Box<Error> },
}

/// Timing and retry settings for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Delay between checks for a response.
    pub poll_interval: Duration,
    /// How long to wait for a response before giving up. `None` waits
    /// indefinitely.
    pub response_timeout: Option<Duration>,
    /// How many times a command is retransmitted after corrupt responses.
    pub max_retransmits: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            response_timeout: Some(Duration::from_secs(10)),
            max_retransmits: 3,
        }
    }
}

impl Config {
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_response_timeout(mut self, response_timeout: Option<Duration>) -> Self {
        self.response_timeout = response_timeout;
        self
    }

    pub fn with_max_retransmits(mut self, max_retransmits: u8) -> Self {
        self.max_retransmits = max_retransmits;
        self
    }
}

/// An exchange whose response has not yet arrived.
///
/// Advance it with [`Session::poll`], or abandon it with [`Session::cancel`].
pub struct Pending<T> {
    awaiting: AwaitingResponse<T>,
    started: Instant,
    retransmits: u8,
}

impl<T> Pending<T> {
    pub fn command(&self) -> Command {
        self.awaiting.command()
    }
}

/// A connection to a receiver.
///
/// At most one command is outstanding at any time; issuing another before the
/// response arrives fails with [`Error::Busy`].
pub struct Session<P> {
    transport: P,
    config: Config,
    outstanding: Option<Command>,
    firmware_header: Option<FirmwareHeader>,
}

impl<P: Transport> Session<P> {
    pub fn new(transport: P) -> Self {
        Self::with_config(transport, Config::default())
    }

    pub fn with_config(transport: P, config: Config) -> Self {
        Self {
            transport,
            config,
            outstanding: None,
            firmware_header: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn transport(&self) -> &P {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut P {
        &mut self.transport
    }

    pub fn into_transport(self) -> P {
        self.transport
    }

    /// Whether a command awaits its response.
    pub fn is_busy(&self) -> bool {
        self.outstanding.is_some()
    }

    /// The metadata read by the last successful handshake.
    pub fn firmware_header(&self) -> Option<&FirmwareHeader> {
        self.firmware_header.as_ref()
    }

    /// Transmit a request without waiting for its response.
    pub fn begin<T>(&mut self, descriptor: Descriptor<T>) -> Result<Pending<T>, Error> {
        if let Some(outstanding) = self.outstanding {
            Err(Error::Busy { outstanding })?;
        }

        // Late responses to abandoned or timed-out commands must not answer this one.
        self.transport.fill()?;
        let stale = self.transport.received().len();
        if stale != 0 {
            debug!("discarding {stale} stale bytes");
            self.transport.discard(stale);
        }

        let (bytes, awaiting) = descriptor.transmit();

        debug!("-> {} ({} bytes)", awaiting.command(), bytes.len());
        self.transport.transmit(&bytes)?;
        self.outstanding = Some(awaiting.command());

        Ok(Pending {
            awaiting,
            started: Instant::now(),
            retransmits: 0,
        })
    }

    /// Check once for the response to a pending request, without waiting.
    ///
    /// Returns the pending request if no response has arrived, or the decoded
    /// response (`None` for an acknowledgement without a payload).
    pub fn poll<T>(&mut self, pending: Pending<T>) -> Result<Either<Pending<T>, Option<T>>, Error> {
        let result = self.step(pending);

        if !matches!(result, Ok(Left(_))) {
            self.outstanding = None;
        }

        result
    }

    /// Abandon a pending request. A late response is discarded when the next
    /// command begins.
    pub fn cancel<T>(&mut self, pending: Pending<T>) {
        debug!("abandoning {}", pending.command());
        self.outstanding = None;
    }

    /// Transmit a request and wait for its response.
    pub fn send<T>(&mut self, descriptor: Descriptor<T>) -> Result<Option<T>, Error> {
        let mut pending = self.begin(descriptor)?;

        loop {
            pending = match self.poll(pending)? {
                Left(pending) => pending,
                Right(response) => return Ok(response),
            };

            trace!("waiting for response to {}", pending.command());
            thread::sleep(self.config.poll_interval);
        }
    }

    /// Read the firmware header, confirming a receiver is present.
    ///
    /// The metadata is kept for the life of the session.
    pub fn handshake(&mut self) -> Result<&FirmwareHeader, Error> {
        let header = self
            .send(read_firmware_header())?
            .ok_or(Error::MissingPayload(Command::ReadFirmwareHeader))?;

        info!(
            "connected to {} (firmware {})",
            header.product_name().unwrap_or(&header.tag),
            header.firmware_version().unwrap_or("unknown")
        );

        Ok(self.firmware_header.insert(header))
    }

    /// Check whether a receiver answers the handshake.
    ///
    /// Protocol failures mean no receiver was found; transport failures are
    /// returned as errors.
    pub fn detect(&mut self) -> Result<bool, Error> {
        match self.handshake() {
            Ok(_) => Ok(true),
            Err(e @ (Error::Io(_) | Error::Busy { .. })) => Err(e),
            Err(e) => {
                warn!("no receiver detected: {e}");
                Ok(false)
            }
        }
    }

    fn step<T>(&mut self, pending: Pending<T>) -> Result<Either<Pending<T>, Option<T>>, Error> {
        let Pending {
            awaiting,
            started,
            retransmits,
        } = pending;

        self.transport.fill()?;

        match awaiting.advance(&mut self.transport) {
            Step::Waiting(awaiting) => {
                let elapsed = started.elapsed();

                if let Some(timeout) = self.config.response_timeout {
                    if elapsed >= timeout {
                        Err(Error::Timeout {
                            command: awaiting.command(),
                            elapsed,
                        })?;
                    }
                }

                Ok(Left(Pending {
                    awaiting,
                    started,
                    retransmits,
                }))
            }
            // A false sync byte in line noise; the response may still follow.
            Step::Corrupt(awaiting, error @ (FramingError::NotSync(_) | FramingError::Length(_))) => {
                trace!("skipping noise while awaiting {} ({error})", awaiting.command());

                Ok(Left(Pending {
                    awaiting,
                    started,
                    retransmits,
                }))
            }
            Step::Corrupt(awaiting, error) => {
                let command = awaiting.command();

                if retransmits >= self.config.max_retransmits {
                    return Err(Error::Framing {
                        command,
                        source: error,
                    });
                }

                warn!("corrupt response to {command} ({error}), retransmitting");
                self.transport.transmit(awaiting.frame())?;

                Ok(Left(Pending {
                    awaiting,
                    started: Instant::now(),
                    retransmits: retransmits + 1,
                }))
            }
            Step::Received(decoding) => {
                let frame = decoding.frame();
                debug!(
                    "<- {} ({} byte payload)",
                    command_name(frame.command),
                    frame.payload.len()
                );

                Ok(Right(decoding.advance()?))
            }
        }
    }
}
