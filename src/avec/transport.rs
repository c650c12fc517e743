//! Byte-stream transports.

use std::io::{self, ErrorKind, Read, Write};
#[cfg(feature = "serial")]
use std::{boxed::Box, string::String, time::Duration};

use bytes::BytesMut;
use log::trace;

use crate::sans::assembler::ReceiveBuffer;

#[cfg(feature = "serial")]
use super::session::Error;

/// A link to the receiver, accumulating received bytes in a buffer.
pub trait Transport: ReceiveBuffer {
    /// Write bytes to the receiver, returning once they are sent.
    fn transmit(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Move any bytes the receiver has sent into the receive buffer, without
    /// waiting for more to arrive.
    ///
    /// Returns the number of bytes added.
    fn fill(&mut self) -> io::Result<usize>;
}

/// A transport over any readable and writable stream.
///
/// Reads that time out or would block are treated as no data.
#[derive(Debug)]
pub struct StreamTransport<S> {
    stream: S,
    buffer: BytesMut,
}

/// Largest number of bytes taken from the stream by one fill.
const READ_CHUNK: usize = 512;

impl<S> StreamTransport<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(4 * READ_CHUNK),
        }
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S> ReceiveBuffer for StreamTransport<S> {
    fn received(&self) -> &[u8] {
        self.buffer.received()
    }

    fn discard(&mut self, n: usize) {
        self.buffer.discard(n);
    }
}

impl<S: Read + Write> Transport for StreamTransport<S> {
    fn transmit(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes)?;
        self.stream.flush()
    }

    fn fill(&mut self) -> io::Result<usize> {
        let mut chunk = [0; READ_CHUNK];

        match self.stream.read(&mut chunk) {
            Ok(n) => {
                if n != 0 {
                    trace!("received {n} bytes");
                }
                self.buffer.extend_from_slice(&chunk[..n]);
                Ok(n)
            }
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }
}

/// Settings for opening a serial port.
///
/// _Requires Cargo feature `serial`._
#[cfg(feature = "serial")]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    pub path: String,
    pub baud_rate: u32,
    /// How long a single read may wait for data.
    pub read_timeout: Duration,
}

#[cfg(feature = "serial")]
impl SerialConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            baud_rate: 115_200,
            read_timeout: Duration::from_millis(10),
        }
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }
}

/// Open a serial port to a receiver.
///
/// _Requires Cargo feature `serial`._
#[cfg(feature = "serial")]
pub fn open_serial(
    config: &SerialConfig,
) -> Result<StreamTransport<Box<dyn serialport::SerialPort>>, Error> {
    let port = serialport::new(&config.path, config.baud_rate)
        .timeout(config.read_timeout)
        .open()?;

    log::info!("opened {} at {} baud", config.path, config.baud_rate);

    Ok(StreamTransport::new(port))
}
