//! `provcom` serial provisioning protocol.
//!
//! **Example** - Importing the public interfaces through prov_protocol:
//! ```ignore
//! use crate::{
//!     prov_protocol::{self as ppsm},
//!     settings::Settings,
//! };
//! ```
//!
//! **Example** - Executing the state machine event loop:
//! ```ignore
//! let settings = SettingsBuilder::new()
//!     .path("/dev/ttyACM0")
//!     .baud_rate(115_200)
//!     .finalize();
//! let ctx = SessionContext::new(settings, payload);
//! let mut ppsm = ppsm::factory(ctx, io);
//! let report = ppsm.run();
//! ```

#[macro_use]
mod macros;

mod events;
mod state_machine;
mod states;

pub use state_machine::{
    factory, ProvisioningSession, ReadyOutcome, SessionContext, SessionIo, SessionOutcome,
    SessionReport,
};

/// Banners the device prints once it has booted and can accept commands.
/// Any one of them suffices.
pub const READY_MARKERS: [&str; 2] = ["EVT,UART_CMD,READY", "EVT,APP,READY"];

/// Banner confirming that the provisioning command was applied.
pub const ACK_MARKERS: [&str; 1] = ["EVT,PROVISION,CURVE25519_UPDATED"];

/// Rolling-window capacity, in characters, while waiting for a ready
/// banner.
pub const READY_WINDOW: usize = 512;

/// Rolling-window capacity, in characters, while waiting for the
/// provisioning acknowledgment. Larger than the ready window because the
/// command is echoed back together with multi-line status output.
pub const ACK_WINDOW: usize = 1024;
