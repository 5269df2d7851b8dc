//! Minimal fake transport used in tests to script device output.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

use super::Transport;

/// One scripted chunk of device output, released once `at` has elapsed
/// since the first read.
pub struct FakeChunk {
    at: Duration,
    data: Result<Vec<u8>>,
}

impl FakeChunk {
    /// A chunk available from the very first read.
    pub fn immediate(data: &[u8]) -> Self {
        FakeChunk {
            at: Duration::from_millis(0),
            data: Ok(data.to_vec()),
        }
    }

    /// A chunk that becomes available `at` after the first read.
    pub fn after(at: Duration, data: &[u8]) -> Self {
        FakeChunk {
            at,
            data: Ok(data.to_vec()),
        }
    }

    /// A scripted transport failure surfacing `at` after the first read.
    pub fn error_after(at: Duration, message: &str) -> Self {
        FakeChunk {
            at,
            data: Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                message.to_string(),
            ))),
        }
    }
}

/// What the session did to the transport: everything written, one entry
/// per `write_all` call, and the number of input-buffer resets.
#[derive(Default)]
pub struct Recorded {
    pub writes: Vec<Vec<u8>>,
    pub input_resets: usize,
}

/// Scripted [`Transport`] replaying timed chunks while recording writes
/// and input resets.
///
/// The clock starts on the first `read_available` call, so script offsets
/// are relative to the moment the session begins polling. The recording
/// is shared: grab a handle with [`FakeTransport::recorded`] before
/// handing the transport to a session.
pub struct FakeTransport {
    script: VecDeque<FakeChunk>,
    started: Option<Instant>,
    recorded: Arc<Mutex<Recorded>>,
}

impl FakeTransport {
    pub fn new(script: Vec<FakeChunk>) -> Self {
        FakeTransport {
            script: script.into(),
            started: None,
            recorded: Arc::new(Mutex::new(Recorded::default())),
        }
    }

    /// A transport with no device output at all.
    pub fn silent() -> Self {
        FakeTransport::new(Vec::new())
    }

    /// Shared handle to the recorded writes and resets, usable after the
    /// transport has been moved into a session.
    pub fn recorded(&self) -> Arc<Mutex<Recorded>> {
        Arc::clone(&self.recorded)
    }
}

impl Transport for FakeTransport {
    fn read_available(&mut self) -> Result<Vec<u8>> {
        let started = *self.started.get_or_insert_with(Instant::now);
        match self.script.front() {
            Some(chunk) if started.elapsed() >= chunk.at => {
                let chunk = self.script.pop_front().unwrap();
                chunk.data
            }
            _ => Ok(Vec::new()),
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.recorded.lock().unwrap().writes.push(bytes.to_vec());
        Ok(())
    }

    fn reset_input(&mut self) -> Result<()> {
        self.recorded.lock().unwrap().input_resets += 1;
        Ok(())
    }

    fn describe(&self) -> String {
        "fake transport".into()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[test]
fn fake_transport_scripts_reads_and_records_writes() {
    let mut fake = FakeTransport::new(vec![
        FakeChunk::immediate(b"first"),
        FakeChunk::error_after(Duration::from_millis(0), "boom"),
    ]);
    let recorded = fake.recorded();
    assert_eq!(fake.read_available().unwrap(), b"first");
    assert!(fake.read_available().is_err());
    assert_eq!(fake.read_available().unwrap(), b"");
    fake.write_all(b"PING\r\n").unwrap();
    fake.reset_input().unwrap();
    let recorded = recorded.lock().unwrap();
    assert_eq!(recorded.writes, vec![b"PING\r\n".to_vec()]);
    assert_eq!(recorded.input_resets, 1);
}

#[test]
fn scripted_delay_is_respected() {
    let mut fake = FakeTransport::new(vec![FakeChunk::after(Duration::from_millis(20), b"later")]);
    assert_eq!(fake.read_available().unwrap(), b"");
    std::thread::sleep(Duration::from_millis(25));
    assert_eq!(fake.read_available().unwrap(), b"later");
}
