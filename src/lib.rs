#![no_std]

//! A driver for continuous glucose monitor receivers speaking the Dexcom
//! serial protocol.
//!
//! Egvlink frames commands, validates and correlates responses, walks the
//! receiver's paged data log, and decodes estimated glucose value (EGV)
//! records into timestamped readings.
//!
//! Most users should begin with the [`avec::Session`] type, which drives a
//! receiver over any byte-stream transport. The protocol machinery underneath
//! performs no I/O and lives in the [`sans`] module, for applications that need
//! to drive the exchange themselves (such as those running on embedded
//! systems).
//!
//! ## Cargo Features
//!
//! The following crate feature flags are available:
//!
//! - `std`: enable the transport-driven session (default).
//! - `serial`: enable opening a serial port with the `serialport` crate.

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

#[cfg(feature = "std")]
pub mod avec;
pub mod sans;
