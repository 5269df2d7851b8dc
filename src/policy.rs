//! Retry policy for provisioning attempts.
//!
//! Bounds how many times one session may transmit and asks an injected
//! yes/no decision source before any retry. Stubs replace the terminal
//! prompt in tests and in non-interactive runs.

use console::style;
use dialoguer::{theme::ColorfulTheme, Confirm};
use log::debug;

// =============================================================================
// Public Interface
// =============================================================================

/// Outcome of a retry consultation.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Decision {
    /// Transmit the same payload again.
    Retry,
    /// Stop; report the session as incomplete.
    Stop,
}

/// A yes/no answer capability, asked before resending a payload.
pub trait DecisionSource {
    /// Answer the given question. `true` means go ahead.
    fn confirm(&mut self, prompt: &str) -> bool;
}

/// Interactive decision source backed by a terminal prompt. Defaults to
/// yes, matching the common case of flaky first transmissions.
pub struct ConsoleConfirm;
impl DecisionSource for ConsoleConfirm {
    fn confirm(&mut self, prompt: &str) -> bool {
        Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .default(true)
            .interact()
            .unwrap_or(false)
    }
}

/// Non-interactive decision source that always declines. Used when stdin
/// is not a terminal, and as the conservative stub in tests.
pub struct AutoDecline;
impl DecisionSource for AutoDecline {
    fn confirm(&mut self, prompt: &str) -> bool {
        debug!("auto-declining: {}", prompt);
        false
    }
}

/// Bounds the number of transmit attempts and consults a decision source
/// before any retry.
#[derive(Debug, Copy, Clone)]
pub struct RetryPolicy {
    max_attempts: usize,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize) -> Self {
        RetryPolicy { max_attempts }
    }

    /// The attempt cap for one session.
    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Decide whether attempt `attempt` (1-based) may be followed by
    /// another transmission. At or past the cap the answer is `Stop`
    /// without consulting the decision source.
    pub fn should_retry(&self, attempt: usize, decide: &mut dyn DecisionSource) -> Decision {
        if attempt >= self.max_attempts {
            return Decision::Stop;
        }
        let prompt = format!(
            "{} Resend the same scalar?",
            style("Provisioning acknowledgement not observed.").yellow()
        );
        if decide.confirm(&prompt) {
            Decision::Retry
        } else {
            Decision::Stop
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
struct AlwaysApprove;
#[cfg(test)]
impl DecisionSource for AlwaysApprove {
    fn confirm(&mut self, _prompt: &str) -> bool {
        true
    }
}

#[test]
fn stops_at_the_attempt_cap_without_asking() {
    struct Panicking;
    impl DecisionSource for Panicking {
        fn confirm(&mut self, _prompt: &str) -> bool {
            panic!("must not be consulted at the cap");
        }
    }
    let policy = RetryPolicy::new(2);
    assert_eq!(policy.should_retry(2, &mut Panicking), Decision::Stop);
    assert_eq!(policy.should_retry(3, &mut Panicking), Decision::Stop);
}

#[test]
fn retries_when_approved_below_the_cap() {
    let policy = RetryPolicy::new(2);
    assert_eq!(policy.should_retry(1, &mut AlwaysApprove), Decision::Retry);
}

#[test]
fn stops_when_declined() {
    let policy = RetryPolicy::new(2);
    assert_eq!(policy.should_retry(1, &mut AutoDecline), Decision::Stop);
}
