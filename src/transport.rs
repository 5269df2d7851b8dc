//! Byte transports for the provisioning session.
//!
//! The session owns exactly one transport for its lifetime and drives it
//! from a single thread: bounded reads, flushing writes, and an input
//! reset used to discard stale banner text from a previous boot. The real
//! implementation sits on top of a serial port; tests script a fake.

pub mod fake;
mod serial;

pub use serial::{open_and_setup_port, SerialLink};

use crate::error::Result;

/// A byte-oriented, half-duplex channel to the device.
///
/// Implementations must never block `read_available` beyond the configured
/// poll timeout; returning an empty buffer is the normal idle case. The
/// channel is closed by dropping the transport, which also covers error
/// and interrupt paths.
pub trait Transport {
    /// Return whatever input is currently available, possibly nothing.
    fn read_available(&mut self) -> Result<Vec<u8>>;

    /// Transmit the given bytes completely and flush. A short write is an
    /// error.
    fn write_all(&mut self, bytes: &[u8]) -> Result<()>;

    /// Discard buffered unread input.
    fn reset_input(&mut self) -> Result<()>;

    /// A short human-readable description of the channel, for logging.
    fn describe(&self) -> String;
}
