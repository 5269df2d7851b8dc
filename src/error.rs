//! Error types for `provcom`.
//!
//! Only conditions that must abort a provisioning session are errors here.
//! A ready banner or acknowledgment not showing up in time is *not* an
//! error; those are reported through the session outcome (see
//! [`SessionReport`](crate::SessionReport)) and left for the caller to
//! judge.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal conditions for a provisioning session.
#[derive(Debug, Error)]
pub enum Error {
    /// Opening or configuring the serial port failed. Not retried beyond
    /// the fixed open-retry loop; the session never starts.
    #[error("serial transport failure: {0}")]
    Transport(#[from] serialport::Error),

    /// An I/O failure while reading from or writing to an already open
    /// transport. Aborts the session immediately.
    #[error("serial I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed provisioning material or payload: non-hex characters,
    /// wrong length, embedded line terminators. Rejected before any port
    /// is touched.
    #[error("invalid provisioning material: {0}")]
    Material(String),
}
