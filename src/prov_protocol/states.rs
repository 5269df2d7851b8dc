//! States for the `provcom` provisioning session state machine.
//!
//! This module is private and restricted to the
//! [`prov_protocol`](crate::prov_protocol) scope. The public interface of
//! the provisioning session state machine is provided by
//! [`prov_protocol`](crate::prov_protocol).
//!
//! ```ignore
//! use super::states::*;
//! ```
//!
//! Refer to the [`state_machine`](super::state_machine) module for an
//! overview of states, events and transitions.

use std::io::Write;
use std::{fmt, thread, time::Duration, time::Instant};

use console::style;
use log::{info, log_enabled, warn, Level::Debug};

use crate::error::Result;
use crate::marker::MarkerScanner;
use crate::policy::{Decision, RetryPolicy};

use super::events::*;
use super::state_machine::{ReadyOutcome, SessionContext, SessionIo, SessionOutcome, SessionReport};
use super::{ACK_MARKERS, ACK_WINDOW, READY_MARKERS, READY_WINDOW};

/// Sleep between polls when the port had nothing for us.
const READ_BACKOFF: Duration = Duration::from_millis(50);

/// While waiting for the acknowledgment, each received chunk pushes the
/// deadline out to at least this far from now, so a slow multi-line
/// response is not cut off mid-stream. There is no outer ceiling; the wait
/// lives as long as bytes keep trickling in within the grace period.
const ACK_GRACE: Duration = Duration::from_millis(200);

// =============================================================================
// Crate-Public Interface
// =============================================================================

/// Trait adding the ability for a state to be `run` after a transition
/// into it.
pub(crate) trait Runnable {
    /// A state implements this method so it can be `run` after the state
    /// machine transitions into it.
    ///
    /// During this call, the state can do any work that needs to be done
    /// and when finished, requests a transition to a `new state` by
    /// returning the appropriate `event`. The `state` and the `event` are
    /// consumed to create the `new state` using the corresponding
    /// [`From`] trait implementation (provided such implementation
    /// exists).
    fn run(&mut self, ctx: &SessionContext) -> Event;
}

// Init State ==================================================================

/// The initial state of the provisioning session state machine.
///
/// From the `InitState`, the state machine can evolve via the following
/// transitions:
///
///  * **[`AwaitReadyEvent`] => [`AwaitReadyState`]** when ready-waiting is
///    enabled in the settings,
///  * **[`SettleEvent`] => [`SettleState`]** when ready-waiting is
///    disabled and a fixed settle delay is used instead.
pub(crate) struct InitState {
    /// The session I/O bundle. Consumed and moved upon the first
    /// transition.
    pub io: Option<SessionIo>,
}
impl Runnable for InitState {
    fn run(&mut self, ctx: &SessionContext) -> Event {
        info!("=> Init");

        if let Some(io) = self.io.take() {
            if ctx.settings.wait_ready {
                return Event::AwaitReady(AwaitReadyEvent {
                    ctx: ctx.clone(),
                    io,
                });
            }
            return Event::Settle(SettleEvent {
                ctx: ctx.clone(),
                io,
            });
        }

        // We should never reach here!
        unreachable!()
    }
}
impl fmt::Debug for InitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.io {
            Some(io) => debug_fmt_session_io!(io, f).finish(),
            None => f.debug_tuple("InitState").finish(),
        }
    }
}

// AwaitReady State ============================================================

/// A `state` of the provisioning session where `provcom` reads device
/// output, displays it on the terminal and watches for one of the ready
/// banners ([`READY_MARKERS`]).
///
/// A missing ready banner is a warning, not a failure; the device may have
/// booted before the port was opened, so the session proceeds to transmit
/// either way.
///
/// This state can transition to another state as following:
///
///  * **[`TransmitEvent`] => [`TransmitState`]** once a ready banner was
///    observed or the ready wait timed out,
///  * **[`DoneEvent`] => [`DoneState`]** on a transport failure.
pub(crate) struct AwaitReadyState {
    /// The session I/O bundle. Consumed and moved upon the transition.
    pub io: Option<SessionIo>,
}
impl Runnable for AwaitReadyState {
    fn run(&mut self, ctx: &SessionContext) -> Event {
        info!("=> AwaitReady");

        if let Some(mut io) = self.io.take() {
            let timeout = ctx.settings.ready_timeout;
            eprintln!(
                "[PC] {}",
                style(format!(
                    "⏳ Waiting up to {:.1} s for UART ready markers...",
                    timeout.as_secs_f64()
                ))
                .dim()
            );

            let mut scanner = MarkerScanner::new(READY_MARKERS.iter().copied(), READY_WINDOW);
            match drain_for_marker(&mut io, &mut scanner, timeout, None) {
                Ok(DrainStatus::Matched) => {
                    eprintln!(
                        "[PC] {}",
                        style("👍 Device reported ready; provisioning...").green()
                    );
                    Event::Transmit(TransmitEvent {
                        ctx: ctx.clone(),
                        io,
                        attempt: 1,
                        ready: Some(ReadyOutcome::Observed),
                    })
                }
                Ok(DrainStatus::TimedOut) => {
                    warn!("ready markers not seen before timeout; continuing anyway");
                    Event::Transmit(TransmitEvent {
                        ctx: ctx.clone(),
                        io,
                        attempt: 1,
                        ready: Some(ReadyOutcome::TimedOut),
                    })
                }
                Err(err) => {
                    info!("error: {:?}", err.to_string());
                    Event::Done(DoneEvent {
                        ctx: ctx.clone(),
                        report: SessionReport {
                            ready: None,
                            outcome: SessionOutcome::Aborted(err),
                            attempts: 0,
                        },
                    })
                }
            }
        } else {
            // We should never reach here!
            unreachable!()
        }
    }
}
impl fmt::Debug for AwaitReadyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.io {
            Some(io) => debug_fmt_session_io!(io, f).finish(),
            None => f.debug_tuple("AwaitReadyState").finish(),
        }
    }
}

// Settle State ================================================================

/// A `state` of the provisioning session used when ready-waiting is
/// disabled: discard stale banner text buffered from a previous boot, then
/// give the device a fixed delay to stabilize before transmitting.
///
///  * **[`TransmitEvent`] => [`TransmitState`]** after the settle delay,
///  * **[`DoneEvent`] => [`DoneState`]** on a transport failure.
pub(crate) struct SettleState {
    /// The session I/O bundle. Consumed and moved upon the transition.
    pub io: Option<SessionIo>,
}
impl Runnable for SettleState {
    fn run(&mut self, ctx: &SessionContext) -> Event {
        info!("=> Settle");

        if let Some(mut io) = self.io.take() {
            if !ctx.settings.no_read {
                if let Err(err) = io.link.reset_input() {
                    info!("error: {:?}", err.to_string());
                    return Event::Done(DoneEvent {
                        ctx: ctx.clone(),
                        report: SessionReport {
                            ready: Some(ReadyOutcome::Skipped),
                            outcome: SessionOutcome::Aborted(err),
                            attempts: 0,
                        },
                    });
                }
            }

            let delay = ctx.settings.settle_delay;
            if delay > Duration::from_millis(0) {
                eprintln!(
                    "[PC] {}",
                    style(format!(
                        "⏳ Waiting {:.1} s before provisioning...",
                        delay.as_secs_f64()
                    ))
                    .dim()
                );
                thread::sleep(delay);
            }

            return Event::Transmit(TransmitEvent {
                ctx: ctx.clone(),
                io,
                attempt: 1,
                ready: Some(ReadyOutcome::Skipped),
            });
        }

        // We should never reach here!
        unreachable!()
    }
}
impl fmt::Debug for SettleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.io {
            Some(io) => debug_fmt_session_io!(io, f).finish(),
            None => f.debug_tuple("SettleState").finish(),
        }
    }
}

// Transmit State ==============================================================

/// A `state` of the provisioning session where `provcom` writes the
/// command payload to the device. The payload is written exactly once per
/// attempt.
///
///  * **[`AwaitAckEvent`] => [`AwaitAckState`]** when a response is
///    expected,
///  * **[`DoneEvent`] => [`DoneState`]** in fire-and-forget mode (the
///    `no_read` setting or a zero ack timeout) or on a transport failure.
pub(crate) struct TransmitState {
    /// The session I/O bundle. Consumed and moved upon the transition.
    pub io: Option<SessionIo>,
    /// 1-based number of this transmission attempt.
    pub attempt: usize,
    /// How the ready phase concluded, for the final report.
    pub ready: Option<ReadyOutcome>,
}
impl Runnable for TransmitState {
    fn run(&mut self, ctx: &SessionContext) -> Event {
        info!("=> Transmit (attempt {})", self.attempt);

        if let Some(mut io) = self.io.take() {
            if self.attempt > 1 {
                eprintln!(
                    "[PC] {}",
                    style(format!(
                        "🔁 Retrying provisioning attempt {} of {}...",
                        self.attempt, ctx.settings.max_attempts
                    ))
                    .yellow()
                );
            }

            if let Err(err) = io.link.write_all(ctx.payload.as_bytes()) {
                info!("error: {:?}", err.to_string());
                return Event::Done(DoneEvent {
                    ctx: ctx.clone(),
                    report: SessionReport {
                        ready: self.ready,
                        outcome: SessionOutcome::Aborted(err),
                        attempts: self.attempt - 1,
                    },
                });
            }

            let fire_and_forget =
                ctx.settings.no_read || ctx.settings.ack_timeout.as_millis() == 0;
            if fire_and_forget {
                return Event::Done(DoneEvent {
                    ctx: ctx.clone(),
                    report: SessionReport {
                        ready: self.ready,
                        outcome: SessionOutcome::SentUnconfirmed,
                        attempts: self.attempt,
                    },
                });
            }

            return Event::AwaitAck(AwaitAckEvent {
                ctx: ctx.clone(),
                io,
                attempt: self.attempt,
                ready: self.ready,
            });
        }

        // We should never reach here!
        unreachable!()
    }
}
impl fmt::Debug for TransmitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.io {
            Some(io) => debug_fmt_session_io!(io, f).field(&self.attempt).finish(),
            None => f.debug_tuple("TransmitState").finish(),
        }
    }
}

// AwaitAck State ==============================================================

/// A `state` of the provisioning session where `provcom` drains the
/// device's response, displays it on the terminal and watches for the
/// acknowledgment banner ([`ACK_MARKERS`]).
///
/// Unlike the ready wait, every received chunk extends the deadline by a
/// small grace period from now, so the wait ends only once the device has
/// gone quiet past the deadline.
///
///  * **[`DoneEvent`] => [`DoneState`]** once the acknowledgment was
///    observed, when attempts are exhausted, or on a transport failure,
///  * **[`RetryDecisionEvent`] => [`RetryDecisionState`]** after a timeout
///    with attempts still remaining.
pub(crate) struct AwaitAckState {
    /// The session I/O bundle. Consumed and moved upon the transition.
    pub io: Option<SessionIo>,
    /// 1-based number of the transmission attempt just made.
    pub attempt: usize,
    /// How the ready phase concluded, for the final report.
    pub ready: Option<ReadyOutcome>,
}
impl Runnable for AwaitAckState {
    fn run(&mut self, ctx: &SessionContext) -> Event {
        info!("=> AwaitAck (attempt {})", self.attempt);

        if let Some(mut io) = self.io.take() {
            println!("=== Device response ===");
            let mut scanner = MarkerScanner::new(ACK_MARKERS.iter().copied(), ACK_WINDOW);
            let drained = drain_for_marker(
                &mut io,
                &mut scanner,
                ctx.settings.ack_timeout,
                Some(ACK_GRACE),
            );
            println!("=== End ===");

            match drained {
                Ok(DrainStatus::Matched) => Event::Done(DoneEvent {
                    ctx: ctx.clone(),
                    report: SessionReport {
                        ready: self.ready,
                        outcome: SessionOutcome::AckObserved,
                        attempts: self.attempt,
                    },
                }),
                Ok(DrainStatus::TimedOut) => {
                    if self.attempt < ctx.settings.max_attempts {
                        Event::RetryDecision(RetryDecisionEvent {
                            ctx: ctx.clone(),
                            io,
                            attempt: self.attempt,
                            ready: self.ready,
                        })
                    } else {
                        Event::Done(DoneEvent {
                            ctx: ctx.clone(),
                            report: SessionReport {
                                ready: self.ready,
                                outcome: SessionOutcome::AckTimedOut,
                                attempts: self.attempt,
                            },
                        })
                    }
                }
                Err(err) => {
                    info!("error: {:?}", err.to_string());
                    Event::Done(DoneEvent {
                        ctx: ctx.clone(),
                        report: SessionReport {
                            ready: self.ready,
                            outcome: SessionOutcome::Aborted(err),
                            attempts: self.attempt,
                        },
                    })
                }
            }
        } else {
            // We should never reach here!
            unreachable!()
        }
    }
}
impl fmt::Debug for AwaitAckState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.io {
            Some(io) => debug_fmt_session_io!(io, f).field(&self.attempt).finish(),
            None => f.debug_tuple("AwaitAckState").finish(),
        }
    }
}

// RetryDecision State =========================================================

/// Reached after an acknowledgment timeout with attempts still remaining.
/// Consults the [`RetryPolicy`], which may ask the session's decision
/// source whether to resend the same payload.
///
///  * **[`TransmitEvent`] => [`TransmitState`]** when the resend was
///    approved, with the attempt counter bumped,
///  * **[`DoneEvent`] => [`DoneState`]** when the resend was declined or
///    unavailable.
pub(crate) struct RetryDecisionState {
    /// The session I/O bundle. Consumed and moved upon the transition.
    pub io: Option<SessionIo>,
    /// 1-based number of the transmission attempt that went unanswered.
    pub attempt: usize,
    /// How the ready phase concluded, for the final report.
    pub ready: Option<ReadyOutcome>,
}
impl Runnable for RetryDecisionState {
    fn run(&mut self, ctx: &SessionContext) -> Event {
        info!("=> RetryDecision (after attempt {})", self.attempt);

        if let Some(mut io) = self.io.take() {
            let policy = RetryPolicy::new(ctx.settings.max_attempts);
            match policy.should_retry(self.attempt, io.decide.as_mut()) {
                Decision::Retry => Event::Transmit(TransmitEvent {
                    ctx: ctx.clone(),
                    io,
                    attempt: self.attempt + 1,
                    ready: self.ready,
                }),
                Decision::Stop => {
                    warn!("provisioning acknowledgement missing; skipping retry");
                    Event::Done(DoneEvent {
                        ctx: ctx.clone(),
                        report: SessionReport {
                            ready: self.ready,
                            outcome: SessionOutcome::AckTimedOut,
                            attempts: self.attempt,
                        },
                    })
                }
            }
        } else {
            // We should never reach here!
            unreachable!()
        }
    }
}
impl fmt::Debug for RetryDecisionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.io {
            Some(io) => debug_fmt_session_io!(io, f).field(&self.attempt).finish(),
            None => f.debug_tuple("RetryDecisionState").finish(),
        }
    }
}

// Done State ==================================================================

/// Reached when the provisioning session completes its execution and is
/// about to terminate (normally or abnormally).
///
/// This state goes into a 2-phase execution. During the initial phase, it
/// runs like any other state to report the session outcome to the
/// operator. It then triggers the [`ExitEvent`] to cause the session
/// state machine to terminate and exit.
#[derive(Debug)]
pub(crate) struct DoneState {
    /// The terminal artifact of the session run. Taken when the state
    /// fires [`ExitEvent`] and finally by the event loop.
    pub report: Option<SessionReport>,
    /// When `true` instructs the session state machine to exit its event
    /// loop.
    pub should_exit: bool,
}
impl Runnable for DoneState {
    fn run(&mut self, ctx: &SessionContext) -> Event {
        let report = match self.report.take() {
            Some(report) => report,
            // We should never reach here!
            None => unreachable!(),
        };

        info!(
            "=> Done with{}errors",
            if report.with_error() { " " } else { " no " }
        );

        if report.ready == Some(ReadyOutcome::TimedOut) {
            println!(
                "[PC] {}",
                style("⚠️  Ready markers were never seen; the device may have booted earlier.")
                    .yellow()
            );
        }

        match &report.outcome {
            SessionOutcome::AckObserved => {
                println!(
                    "[PC] {}",
                    style("✅ Device acknowledged the provisioning command.").green()
                );
            }
            SessionOutcome::SentUnconfirmed => {
                println!("[PC] 📨 Command sent. Re-open your UART monitor to view the response.");
            }
            SessionOutcome::AckTimedOut => {
                println!(
                    "[PC] {}",
                    style("⚠️  Provisioning incomplete: the scalar did not reach the hardware.")
                        .yellow()
                );
                println!(
                    "[PC] 🔎 Check the provisioning build and the UART cabling, then try again."
                );
            }
            SessionOutcome::Aborted(err) => {
                println!(
                    "{}",
                    style("[PC] 💥 Unrecoverable error on the serial port!").red()
                );
                println!("[PC]    {}", err);
                println!("[PC] 🔌 Disconnect and reconnect the device!");
            }
        }

        Event::Exit(ExitEvent {
            ctx: ctx.clone(),
            report,
        })
    }
}

// =============================================================================
// Private stuff
// =============================================================================

/// How one drain loop over the device output ended.
enum DrainStatus {
    Matched,
    TimedOut,
}

/// Poll the transport until the scanner matches or the deadline expires.
///
/// Received bytes are echoed raw to the operator sink as they arrive, and
/// dumped as a hex table when debug logging is enabled. With `grace` set,
/// every non-empty read pushes the deadline out to at least now + grace.
/// The deadline is only consulted when a read comes back empty, matching
/// the half-duplex console behavior: a device actively printing is never
/// cut off.
fn drain_for_marker(
    io: &mut SessionIo,
    scanner: &mut MarkerScanner,
    timeout: Duration,
    grace: Option<Duration>,
) -> Result<DrainStatus> {
    use hexplay::HexViewBuilder;

    let mut deadline = Instant::now() + timeout;
    loop {
        let chunk = io.link.read_available()?;
        if !chunk.is_empty() {
            io.sink.write_all(&chunk)?;
            io.sink.flush()?;

            // Dump the received data in a hex table for debugging
            if log_enabled!(Debug) {
                let view = HexViewBuilder::new(&chunk)
                    .address_offset(0)
                    .row_width(16)
                    .finish();
                println!("{}", view);
            }

            let matched = scanner.feed(&chunk);
            if let Some(grace) = grace {
                let extended = Instant::now() + grace;
                if extended > deadline {
                    deadline = extended;
                }
            }
            if matched {
                return Ok(DrainStatus::Matched);
            }
        } else {
            if Instant::now() >= deadline {
                return Ok(DrainStatus::TimedOut);
            }
            thread::sleep(READ_BACKOFF);
        }
    }
}
