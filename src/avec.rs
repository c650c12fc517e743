//! Driving a receiver over a byte-stream transport.
//!
//! _Requires Cargo feature `std`._
//!
//! A [`Session`] owns a [`Transport`] and issues one command at a time,
//! waiting for each response before the next request is written. Most users
//! need only [`Session::handshake`] and [`Session::download_readings`].
//!
//! # Example
//!
//! ```ignore
//! use egvlink::avec::{Config, Session, SerialConfig, open_serial};
//!
//! let transport = open_serial(&SerialConfig::new("/dev/ttyACM0"))?;
//! let mut session = Session::with_config(transport, Config::default());
//!
//! session.handshake()?;
//! for reading in session.download_readings(|percent| println!("{percent:.0}%"))? {
//!     println!("{} {} {}", reading.display_time, reading.glucose, reading.trend_name);
//! }
//! ```

mod pages;
pub mod session;
pub mod transport;

pub use session::{Config, Error, Pending, Session};
#[cfg(feature = "serial")]
pub use transport::{SerialConfig, open_serial};
pub use transport::{StreamTransport, Transport};
