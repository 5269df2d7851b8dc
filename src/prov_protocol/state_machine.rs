//! `provcom` provisioning session state machine.
//!
//! One session provisions one device: wait for the device to announce
//! readiness on its UART console (or give it a fixed settle delay),
//! transmit the provisioning command line, then watch the returned byte
//! stream for the acknowledgment banner, retrying at most once when it
//! does not show up.
//!
//! The following state diagram summarizes the different states and
//! transitions a provisioning session goes through:
//!
//! ```text
//!                        START
//!                          |
//!                          v
//!                      .-------.
//!                      | Init  |
//!                      '-------'
//!                          |
//!                          v
//!               yes  .------------.  no
//!              .----( wait_ready?  )----.
//!              v     '------------'     v
//!       .------------.            .----------.
//!       | AwaitReady |            |  Settle  |
//!       '------------'            '----------'
//!              | ready or timeout       |
//!              '--------->.<------------'
//!                         |
//!                         v
//!                   .-----------.   resend approved
//!                   | Transmit  |<------------------.
//!                   '-----------'                   |
//!        fire-and-forget |      | response expected |
//!              .---------'      v                   |
//!              |          .----------.       .---------------.
//!              |          | AwaitAck |------>| RetryDecision |
//!              |          '----------'  no   '---------------'
//!              |            | ack       ack         |
//!              v            v                       | declined or
//!            .---------------.<---------------------' exhausted
//!            |     Done      |
//!            '---------------'
//!                    |
//!                    v
//!                   END
//! ```
//!
//! Transport failures in any state jump straight to `Done` with an
//! `Aborted` report; they are never retried.

use std::fmt;
use std::io::Write;

use crate::error::Error;
use crate::payload::CommandPayload;
use crate::policy::DecisionSource;
use crate::settings::Settings;
use crate::transport::Transport;

use super::events::*;
use super::states::*;

// =============================================================================
// Public Interface
// =============================================================================

/// Everything a session reads but never mutates: the settings and the
/// payload to transmit.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub settings: Settings,
    pub payload: CommandPayload,
}
impl SessionContext {
    pub fn new(settings: Settings, payload: CommandPayload) -> Self {
        SessionContext { settings, payload }
    }
}

/// The I/O capabilities a session owns for its lifetime: the transport to
/// the device, the operator sink receiving raw device output, and the
/// decision source consulted before a resend.
pub struct SessionIo {
    /// Channel to the device. Owned exclusively; closed on drop.
    pub link: Box<dyn Transport>,
    /// Receives every raw byte read from the device, as it arrives.
    pub sink: Box<dyn Write>,
    /// Asked whether to resend after a missing acknowledgment.
    pub decide: Box<dyn DecisionSource>,
}
impl SessionIo {
    pub fn new(
        link: Box<dyn Transport>,
        sink: Box<dyn Write>,
        decide: Box<dyn DecisionSource>,
    ) -> Self {
        SessionIo { link, sink, decide }
    }
}
impl fmt::Debug for SessionIo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let io = self;
        debug_fmt_session_io!(io, f).finish()
    }
}

/// How the ready-wait phase concluded.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ReadyOutcome {
    /// A ready banner was observed in the device output.
    Observed,
    /// No ready banner showed up before the deadline; the session carried
    /// on transmitting anyway.
    TimedOut,
    /// Ready-waiting was disabled; the settle delay was used instead.
    Skipped,
}

/// The terminal outcome of one session run.
#[derive(Debug)]
pub enum SessionOutcome {
    /// The device confirmed the provisioning command.
    AckObserved,
    /// No acknowledgment was observed within the deadline, across all
    /// attempts made.
    AckTimedOut,
    /// Fire-and-forget: the command was written and no response was read.
    SentUnconfirmed,
    /// A transport failure ended the session early.
    Aborted(Error),
}

/// The immutable artifact of one [`ProvisioningSession::run`] call.
#[derive(Debug)]
pub struct SessionReport {
    /// Ready-phase tag; `None` when the session aborted before the phase
    /// concluded.
    pub ready: Option<ReadyOutcome>,
    /// Terminal outcome.
    pub outcome: SessionOutcome,
    /// Number of transmissions actually made.
    pub attempts: usize,
}
impl SessionReport {
    /// Whether the run should be reported as a process failure.
    pub fn with_error(&self) -> bool {
        match self.outcome {
            SessionOutcome::AckObserved | SessionOutcome::SentUnconfirmed => false,
            SessionOutcome::AckTimedOut | SessionOutcome::Aborted(_) => true,
        }
    }

    /// Exit code for a CLI wrapping the session: **`0`** for a confirmed
    /// or fire-and-forget send, non-zero otherwise.
    pub fn exit_code(&self) -> i8 {
        if self.with_error() {
            1
        } else {
            0
        }
    }
}

/// Represents the `provcom` provisioning session state machine. Use the
/// `factory()` function to get an instance then run it by calling its
/// `run()` method.
pub struct ProvisioningSession {
    sm: SessionStates,
}
impl ProvisioningSession {
    /// The provisioning session event loop runs until the `Done` state is
    /// reached and its `should_exit` flag is set. At such point, the event
    /// loop terminates and hands back the [`SessionReport`].
    pub fn run(&mut self) -> SessionReport {
        loop {
            self.sm = self.sm.step();
            match &mut self.sm {
                SessionStates::Done(sm) => {
                    if sm.state.should_exit {
                        return sm
                            .state
                            .report
                            .take()
                            .expect("session completed without a report");
                    }
                }
                _ => {}
            }
        }
    }
}

/// Factory function for the `provcom` provisioning session state machine.
/// Use it to get an instance of the state machine, which you can run by
/// invoking its `run()` method.
pub fn factory(ctx: SessionContext, io: SessionIo) -> ProvisioningSession {
    ProvisioningSession {
        // The machine naturally starts in the `Init` state.
        sm: SessionStates::Init(SessionSM::new(ctx, io)),
    }
}

// =============================================================================
// Private stuff
// =============================================================================

/// The raw state machine implementing `provcom`'s provisioning session.
///
/// This is a private interface, abstracted for a simpler and more
/// intuitive use in the public `ProvisioningSession` interface.
///
/// Note that using a generic type that holds the current state serves two
/// purposes. It allows for also having shared data by all states that is
/// not really part of state data (e.g. the settings and the payload).
/// Additionally, it's nicer when debugging to see the state machine and
/// the current state it is holding at any time.
#[derive(Debug)]
struct SessionSM<S: Runnable> {
    ctx: SessionContext,
    state: S,
}
impl<S: Runnable> SessionSM<S> {
    fn run(&mut self) -> Event {
        self.state.run(&self.ctx)
    }
}

/// The state machine starts in the `InitState`.
impl SessionSM<InitState> {
    fn new(ctx: SessionContext, io: SessionIo) -> Self {
        SessionSM {
            ctx,
            state: InitState { io: Some(io) },
        }
    }
}

/// An enum wrapper around the states of the provisioning session state
/// machine. It provides a simpler and more intuitive model for
/// manipulating states and their transitions.
enum SessionStates {
    Init(SessionSM<InitState>),
    AwaitReady(SessionSM<AwaitReadyState>),
    Settle(SessionSM<SettleState>),
    Transmit(SessionSM<TransmitState>),
    AwaitAck(SessionSM<AwaitAckState>),
    RetryDecision(SessionSM<RetryDecisionState>),
    Done(SessionSM<DoneState>),
}
impl SessionStates {
    /// The unit of work in the state machine event loop. It checks the
    /// current state and the current event and decides the next
    /// transition. State transitions from events are implemented using the
    /// rust `From`/`Into` pattern. Most of the potential errors of
    /// state/event/transition mismatches can be caught at compile time.
    fn step(&mut self) -> Self {
        match self {
            SessionStates::Init(sm) => {
                let event = sm.run();
                match event {
                    Event::AwaitReady(ev) => SessionStates::AwaitReady(ev.into()),
                    Event::Settle(ev) => SessionStates::Settle(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
            SessionStates::AwaitReady(sm) => {
                let event = sm.run();
                match event {
                    Event::Transmit(ev) => SessionStates::Transmit(ev.into()),
                    Event::Done(ev) => SessionStates::Done(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
            SessionStates::Settle(sm) => {
                let event = sm.run();
                match event {
                    Event::Transmit(ev) => SessionStates::Transmit(ev.into()),
                    Event::Done(ev) => SessionStates::Done(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
            SessionStates::Transmit(sm) => {
                let event = sm.run();
                match event {
                    Event::AwaitAck(ev) => SessionStates::AwaitAck(ev.into()),
                    Event::Done(ev) => SessionStates::Done(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
            SessionStates::AwaitAck(sm) => {
                let event = sm.run();
                match event {
                    Event::RetryDecision(ev) => SessionStates::RetryDecision(ev.into()),
                    Event::Done(ev) => SessionStates::Done(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
            SessionStates::RetryDecision(sm) => {
                let event = sm.run();
                match event {
                    Event::Transmit(ev) => SessionStates::Transmit(ev.into()),
                    Event::Done(ev) => SessionStates::Done(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
            SessionStates::Done(sm) => {
                let event = sm.run();
                match event {
                    Event::Exit(ev) => SessionStates::Done(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
        }
    }
}

// -----------------------------------------------------------------------------
// State from Event transitions
// -----------------------------------------------------------------------------

impl From<AwaitReadyEvent> for SessionSM<AwaitReadyState> {
    fn from(event: AwaitReadyEvent) -> SessionSM<AwaitReadyState> {
        SessionSM {
            ctx: event.ctx,
            state: AwaitReadyState {
                io: Some(event.io),
            },
        }
    }
}

impl From<SettleEvent> for SessionSM<SettleState> {
    fn from(event: SettleEvent) -> SessionSM<SettleState> {
        SessionSM {
            ctx: event.ctx,
            state: SettleState {
                io: Some(event.io),
            },
        }
    }
}

impl From<TransmitEvent> for SessionSM<TransmitState> {
    fn from(event: TransmitEvent) -> SessionSM<TransmitState> {
        SessionSM {
            ctx: event.ctx,
            state: TransmitState {
                io: Some(event.io),
                attempt: event.attempt,
                ready: event.ready,
            },
        }
    }
}

impl From<AwaitAckEvent> for SessionSM<AwaitAckState> {
    fn from(event: AwaitAckEvent) -> SessionSM<AwaitAckState> {
        SessionSM {
            ctx: event.ctx,
            state: AwaitAckState {
                io: Some(event.io),
                attempt: event.attempt,
                ready: event.ready,
            },
        }
    }
}

impl From<RetryDecisionEvent> for SessionSM<RetryDecisionState> {
    fn from(event: RetryDecisionEvent) -> SessionSM<RetryDecisionState> {
        SessionSM {
            ctx: event.ctx,
            state: RetryDecisionState {
                io: Some(event.io),
                attempt: event.attempt,
                ready: event.ready,
            },
        }
    }
}

impl From<DoneEvent> for SessionSM<DoneState> {
    fn from(event: DoneEvent) -> SessionSM<DoneState> {
        SessionSM {
            ctx: event.ctx,
            state: DoneState {
                report: Some(event.report),
                should_exit: false,
            },
        }
    }
}
impl From<ExitEvent> for SessionSM<DoneState> {
    fn from(event: ExitEvent) -> SessionSM<DoneState> {
        SessionSM {
            ctx: event.ctx,
            state: DoneState {
                report: Some(event.report),
                should_exit: true,
            },
        }
    }
}
