//! Provcom is a utility to provision Curve25519 key material onto an
//! embedded device over the serial port connection. The device side
//! exposes a small line-oriented text protocol: once booted it prints a
//! ready banner, accepts a single `prov curve` command line, and confirms
//! a successful update with an acknowledgment banner. Provcom drives that
//! exchange, echoing the device console to the operator and retrying the
//! transmission once when the acknowledgment does not show up.
//!
//! The provisioning exchange in `provcom` is implemented as a state
//! machine. State machines are implemented in terms of **states** and
//! **transitions** between them with the following characteristics:
//!
//! * Can only be in one state at any time.
//! * Each state can have its own associated data if needed.
//! * It is possible to have some shared data between **all** states.
//! * Transitions between states are triggered via typed **events** and
//!   follow defined semantics.
//! * Only explicitly defined transitions should be permitted and as many
//!   errors should be detected at **compile-time**.
//! * Transitioning from one state to another consumes the original state
//!   and renders it unusable. Any transition back to that state would
//!   create a new state.
//! * Data can be transferred from one state to the next by attaching it to
//!   the transition event. Such data is statically defined as part of the
//!   event type.
//!
//! The implementation of state transitions leverages `rust`'s `From` and
//! `Into` pattern. The `From` trait allows for a type to define how to
//! create itself from another type, hence providing us an intuitive and
//! simple mechanism for converting `events` into new `states`.
//!
//! The `From` and `Into` traits are inherently linked and reciprocal.
//! Implementing one of them is enough. We'll be implementing the `From`
//! trait to convert from `event` types to `state` types following the
//! semantics of the state machine transitions. Only transitions for which
//! the `From` trait is implemented are authorized and any other transition
//! would be detected at compile-time as an error.

mod error;
mod marker;
mod payload;
mod policy;
mod prov_protocol;
mod settings;
mod transport;
mod utils;

pub use error::{Error, Result};
pub use marker::MarkerScanner;
pub use payload::{CommandPayload, CurveMaterial, CURVE_LEN, DEMO_PEER, DEMO_SCALAR};
pub use policy::{AutoDecline, ConsoleConfirm, Decision, DecisionSource, RetryPolicy};
pub use prov_protocol::{
    factory, ProvisioningSession, ReadyOutcome, SessionContext, SessionIo, SessionOutcome,
    SessionReport, ACK_MARKERS, ACK_WINDOW, READY_MARKERS, READY_WINDOW,
};
pub use settings::{Settings, SettingsBuilder};
pub use transport::{fake, open_and_setup_port, SerialLink, Transport};
pub use utils::select_port;
