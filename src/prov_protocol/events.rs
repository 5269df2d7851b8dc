//! Events for the `provcom` provisioning session state machine.
//!
//! This module is private and restricted to the
//! [`prov_protocol`](crate::prov_protocol) scope. The public interface of
//! the provisioning session state machine is provided by
//! [`prov_protocol`](crate::prov_protocol).
//!
//! ```ignore
//! use super::events::*;
//! ```
//!
//! Refer to the [`state_machine`](super::state_machine) module for an
//! overview of states, events and transitions.

use std::fmt;

use super::state_machine::{ReadyOutcome, SessionContext, SessionIo, SessionReport};

// =============================================================================
// Crate-Public Interface
// =============================================================================

// AwaitReadyEvent =============================================================

/// Event fired to trigger a transition to [`AwaitReadyState`], while at
/// the [`InitState`] and ready-waiting is enabled in the settings.
pub(crate) struct AwaitReadyEvent {
    pub ctx: SessionContext,
    /// The session I/O bundle used in the next state. Consumed and moved
    /// to the next state.
    pub io: SessionIo,
}
impl fmt::Debug for AwaitReadyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let io = &self.io;
        debug_fmt_session_io!(io, f).finish()
    }
}

// SettleEvent =================================================================

/// Event fired to trigger a transition to [`SettleState`], while at the
/// [`InitState`] and ready-waiting is disabled in the settings.
pub(crate) struct SettleEvent {
    pub ctx: SessionContext,
    /// The session I/O bundle used in the next state. Consumed and moved
    /// to the next state.
    pub io: SessionIo,
}
impl fmt::Debug for SettleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let io = &self.io;
        debug_fmt_session_io!(io, f).finish()
    }
}

// TransmitEvent ===============================================================

/// Event fired to trigger a transition to [`TransmitState`].
///
/// This event can happen under one of the following circumstances:
///
///  1. While at the [`AwaitReadyState`] once a ready banner was observed
///     or the ready wait timed out (carried in `ready`).
///  2. While at the [`SettleState`] after the settle delay elapsed.
///  3. While at the [`RetryDecisionState`] when a resend was approved,
///     with `attempt` bumped by one.
pub(crate) struct TransmitEvent {
    pub ctx: SessionContext,
    /// The session I/O bundle used in the next state. Consumed and moved
    /// to the next state.
    pub io: SessionIo,
    /// 1-based number of the transmission attempt about to be made.
    pub attempt: usize,
    /// How the ready phase concluded, for the final report.
    pub ready: Option<ReadyOutcome>,
}
impl fmt::Debug for TransmitEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let io = &self.io;
        debug_fmt_session_io!(io, f)
            .field(&self.attempt)
            .finish()
    }
}

// AwaitAckEvent ===============================================================

/// Event fired to trigger a transition to [`AwaitAckState`], after the
/// payload was written by [`TransmitState`] and a response is expected.
pub(crate) struct AwaitAckEvent {
    pub ctx: SessionContext,
    /// The session I/O bundle used in the next state. Consumed and moved
    /// to the next state.
    pub io: SessionIo,
    /// 1-based number of the transmission attempt just made.
    pub attempt: usize,
    /// How the ready phase concluded, for the final report.
    pub ready: Option<ReadyOutcome>,
}
impl fmt::Debug for AwaitAckEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let io = &self.io;
        debug_fmt_session_io!(io, f)
            .field(&self.attempt)
            .finish()
    }
}

// RetryDecisionEvent ==========================================================

/// Event fired to trigger a transition to [`RetryDecisionState`], after an
/// acknowledgment wait timed out with attempts still remaining.
pub(crate) struct RetryDecisionEvent {
    pub ctx: SessionContext,
    /// The session I/O bundle used in the next state. Consumed and moved
    /// to the next state.
    pub io: SessionIo,
    /// 1-based number of the transmission attempt that went unanswered.
    pub attempt: usize,
    /// How the ready phase concluded, for the final report.
    pub ready: Option<ReadyOutcome>,
}
impl fmt::Debug for RetryDecisionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let io = &self.io;
        debug_fmt_session_io!(io, f)
            .field(&self.attempt)
            .finish()
    }
}

// DoneEvent ===================================================================

/// Event fired when the provisioning session completes and is about to
/// terminate. It triggers a transition to the `Done` state.
///
/// This event can happen at any state due to normal completion, an
/// exhausted or declined retry, or a fatal transport error.
#[derive(Debug)]
pub(crate) struct DoneEvent {
    pub ctx: SessionContext,
    /// The terminal artifact of the session run.
    pub report: SessionReport,
}

// ExitEvent ===================================================================

/// The last event that can be triggered in the provisioning session state
/// machine. It causes the event loop to terminate, handing the
/// [`SessionReport`] back to the original caller that started the event
/// loop.
#[derive(Debug)]
pub(crate) struct ExitEvent {
    pub ctx: SessionContext,
    pub report: SessionReport,
}

// Events enum =================================================================

/// Events that can be triggered within the provisioning session state
/// machine of `provcom`.
///
/// Each possible value holds an `event`, which in turn may hold additional
/// data for the state transition. Such data is passed by the origin state
/// for potential use by the target state.
#[derive(Debug)]
pub(crate) enum Event {
    AwaitReady(AwaitReadyEvent),
    Settle(SettleEvent),
    Transmit(TransmitEvent),
    AwaitAck(AwaitAckEvent),
    RetryDecision(RetryDecisionEvent),
    Done(DoneEvent),
    Exit(ExitEvent),
}
