//! Provisioning session round-trips over a scripted fake transport.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use provcom::{
    factory,
    fake::{FakeChunk, FakeTransport},
    CommandPayload, CurveMaterial, DecisionSource, ReadyOutcome, SessionContext, SessionIo,
    SessionOutcome, SessionReport, Settings, SettingsBuilder,
};

const READY_BANNER: &[u8] = b"EVT,APP,READY\r\n";
const ACK_BANNER: &[u8] = b"EVT,PROVISION,CURVE25519_UPDATED\r\n";

/// Operator sink capturing the echoed device output.
#[derive(Clone, Default)]
struct SharedSink(Arc<Mutex<Vec<u8>>>);
impl SharedSink {
    fn contents(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }
}
impl Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Decision source answering a fixed way while counting consultations.
struct CountingConfirm {
    answer: bool,
    asked: Arc<Mutex<usize>>,
}
impl CountingConfirm {
    fn new(answer: bool) -> (Self, Arc<Mutex<usize>>) {
        let asked = Arc::new(Mutex::new(0));
        (
            CountingConfirm {
                answer,
                asked: Arc::clone(&asked),
            },
            asked,
        )
    }
}
impl DecisionSource for CountingConfirm {
    fn confirm(&mut self, _prompt: &str) -> bool {
        *self.asked.lock().unwrap() += 1;
        self.answer
    }
}

fn demo_payload() -> CommandPayload {
    CommandPayload::curve(&CurveMaterial::demo())
}

fn short_timeouts() -> SettingsBuilder {
    SettingsBuilder::new()
        .path("fake")
        .ready_timeout(Duration::from_millis(150))
        .settle_delay(Duration::from_millis(0))
        .ack_timeout(Duration::from_millis(150))
}

fn run_session(
    settings: Settings,
    fake: FakeTransport,
    decide: Box<dyn DecisionSource>,
    sink: SharedSink,
) -> SessionReport {
    let io = SessionIo::new(Box::new(fake), Box::new(sink), decide);
    let ctx = SessionContext::new(settings, demo_payload());
    factory(ctx, io).run()
}

#[test]
fn ready_then_ack_provisions_in_one_attempt() {
    let fake = FakeTransport::new(vec![
        FakeChunk::immediate(READY_BANNER),
        FakeChunk::immediate(ACK_BANNER),
    ]);
    let recorded = fake.recorded();
    let sink = SharedSink::default();
    let (confirm, asked) = CountingConfirm::new(true);

    let settings = short_timeouts().finalize();
    let report = run_session(settings, fake, Box::new(confirm), sink.clone());

    assert!(matches!(report.outcome, SessionOutcome::AckObserved));
    assert_eq!(report.ready, Some(ReadyOutcome::Observed));
    assert_eq!(report.attempts, 1);
    assert_eq!(report.exit_code(), 0);

    let recorded = recorded.lock().unwrap();
    assert_eq!(recorded.writes, vec![demo_payload().as_bytes().to_vec()]);
    assert_eq!(*asked.lock().unwrap(), 0);

    let echoed = sink.contents();
    let echoed = String::from_utf8_lossy(&echoed);
    assert!(echoed.contains("EVT,APP,READY"));
    assert!(echoed.contains("EVT,PROVISION,CURVE25519_UPDATED"));
}

#[test]
fn silent_boot_degrades_to_ready_timeout_and_still_provisions() {
    // The ack banner only shows up after the ready wait has expired.
    let fake = FakeTransport::new(vec![FakeChunk::after(Duration::from_millis(250), ACK_BANNER)]);
    let recorded = fake.recorded();
    let (confirm, _) = CountingConfirm::new(true);

    let settings = short_timeouts().ack_timeout(Duration::from_secs(2)).finalize();
    let report = run_session(settings, fake, Box::new(confirm), SharedSink::default());

    assert!(matches!(report.outcome, SessionOutcome::AckObserved));
    assert_eq!(report.ready, Some(ReadyOutcome::TimedOut));
    assert_eq!(report.attempts, 1);
    assert_eq!(recorded.lock().unwrap().writes.len(), 1);
}

#[test]
fn declined_retry_stops_after_one_attempt() {
    let fake = FakeTransport::silent();
    let recorded = fake.recorded();
    let (confirm, asked) = CountingConfirm::new(false);

    let settings = short_timeouts().wait_ready(false).finalize();
    let report = run_session(settings, fake, Box::new(confirm), SharedSink::default());

    assert!(matches!(report.outcome, SessionOutcome::AckTimedOut));
    assert_eq!(report.ready, Some(ReadyOutcome::Skipped));
    assert_eq!(report.attempts, 1);
    assert_eq!(report.exit_code(), 1);
    assert_eq!(*asked.lock().unwrap(), 1);

    let recorded = recorded.lock().unwrap();
    assert_eq!(recorded.writes.len(), 1);
    // Stale banner text from a previous boot is discarded before sending.
    assert_eq!(recorded.input_resets, 1);
}

#[test]
fn approved_retry_transmits_at_most_twice() {
    let fake = FakeTransport::silent();
    let recorded = fake.recorded();
    let (confirm, asked) = CountingConfirm::new(true);

    let settings = short_timeouts().wait_ready(false).finalize();
    let report = run_session(settings, fake, Box::new(confirm), SharedSink::default());

    assert!(matches!(report.outcome, SessionOutcome::AckTimedOut));
    assert_eq!(report.attempts, 2);
    // Attempt 2 is the cap; the decision source is never consulted again.
    assert_eq!(*asked.lock().unwrap(), 1);
    assert_eq!(recorded.lock().unwrap().writes.len(), 2);
}

#[test]
fn zero_ack_timeout_is_fire_and_forget() {
    let fake = FakeTransport::silent();
    let recorded = fake.recorded();
    let (confirm, asked) = CountingConfirm::new(true);

    let settings = short_timeouts()
        .wait_ready(false)
        .ack_timeout(Duration::from_millis(0))
        .finalize();
    let report = run_session(settings, fake, Box::new(confirm), SharedSink::default());

    assert!(matches!(report.outcome, SessionOutcome::SentUnconfirmed));
    assert_eq!(report.attempts, 1);
    assert_eq!(report.exit_code(), 0);
    assert_eq!(*asked.lock().unwrap(), 0);
    assert_eq!(recorded.lock().unwrap().writes.len(), 1);
}

#[test]
fn no_read_skips_response_and_input_reset() {
    let fake = FakeTransport::silent();
    let recorded = fake.recorded();
    let (confirm, _) = CountingConfirm::new(true);

    let settings = short_timeouts().wait_ready(false).no_read(true).finalize();
    let report = run_session(settings, fake, Box::new(confirm), SharedSink::default());

    assert!(matches!(report.outcome, SessionOutcome::SentUnconfirmed));
    let recorded = recorded.lock().unwrap();
    assert_eq!(recorded.writes.len(), 1);
    assert_eq!(recorded.input_resets, 0);
}

#[test]
fn trickling_response_keeps_the_ack_wait_alive() {
    // Chunks keep arriving within the grace period, well past the nominal
    // 150 ms deadline, before the ack banner finally lands.
    let fake = FakeTransport::new(vec![
        FakeChunk::immediate(b"line 1\r\n"),
        FakeChunk::after(Duration::from_millis(100), b"line 2\r\n"),
        FakeChunk::after(Duration::from_millis(200), b"line 3\r\n"),
        FakeChunk::after(Duration::from_millis(300), b"line 4\r\n"),
        FakeChunk::after(Duration::from_millis(400), b"line 5\r\n"),
        FakeChunk::after(Duration::from_millis(500), ACK_BANNER),
    ]);
    let (confirm, _) = CountingConfirm::new(false);

    let settings = short_timeouts().wait_ready(false).finalize();
    let started = Instant::now();
    let report = run_session(settings, fake, Box::new(confirm), SharedSink::default());

    assert!(matches!(report.outcome, SessionOutcome::AckObserved));
    assert_eq!(report.attempts, 1);
    assert!(started.elapsed() >= Duration::from_millis(500));
}

#[test]
fn transport_error_during_ready_wait_aborts() {
    let fake = FakeTransport::new(vec![FakeChunk::error_after(
        Duration::from_millis(0),
        "cable gone",
    )]);
    let recorded = fake.recorded();
    let (confirm, _) = CountingConfirm::new(true);

    let settings = short_timeouts().finalize();
    let report = run_session(settings, fake, Box::new(confirm), SharedSink::default());

    assert!(matches!(report.outcome, SessionOutcome::Aborted(_)));
    assert_eq!(report.ready, None);
    assert_eq!(report.attempts, 0);
    assert_eq!(report.exit_code(), 1);
    assert!(recorded.lock().unwrap().writes.is_empty());
}

#[test]
fn transport_error_during_ack_wait_aborts() {
    let fake = FakeTransport::new(vec![FakeChunk::error_after(
        Duration::from_millis(0),
        "cable gone",
    )]);
    let recorded = fake.recorded();
    let (confirm, asked) = CountingConfirm::new(true);

    let settings = short_timeouts().wait_ready(false).finalize();
    let report = run_session(settings, fake, Box::new(confirm), SharedSink::default());

    assert!(matches!(report.outcome, SessionOutcome::Aborted(_)));
    assert_eq!(report.attempts, 1);
    // A transport failure is never retried.
    assert_eq!(*asked.lock().unwrap(), 0);
    assert_eq!(recorded.lock().unwrap().writes.len(), 1);
}
