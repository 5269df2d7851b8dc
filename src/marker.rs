//! Marker detection over the device's UART output.
//!
//! The device signals protocol-relevant events by printing fixed banner
//! strings (markers) in its console output. Detection works on a bounded
//! rolling window of the most recently received text, so a marker is found
//! no matter how the surrounding output is chunked by the serial driver,
//! while memory stays bounded for arbitrarily chatty devices.
//!
//! Device consoles commonly colorize their output with VT100 escape
//! sequences. Those are stripped before matching; the stripper is a small
//! state machine that keeps its state between chunks, so a sequence split
//! across two reads is removed just as reliably as one arriving whole.

// =============================================================================
// Public Interface
// =============================================================================

/// Scans a stream of UART output chunks for a set of marker strings.
///
/// Construct one scanner per wait phase; it carries no state worth keeping
/// beyond the phase.
pub struct MarkerScanner {
    markers: Vec<String>,
    window: String,
    capacity: usize,
    stripper: EscapeStripper,
}

impl MarkerScanner {
    /// Create a scanner matching any of `markers` inside a rolling window
    /// of `capacity` characters. Markers must be non-empty and fit within
    /// the window, otherwise they can never match.
    pub fn new<S: Into<String>>(markers: impl IntoIterator<Item = S>, capacity: usize) -> Self {
        MarkerScanner {
            markers: markers.into_iter().map(Into::into).collect(),
            window: String::new(),
            capacity,
            stripper: EscapeStripper::new(),
        }
    }

    /// Append a newly received chunk and report whether any marker is now
    /// present in the window.
    ///
    /// The chunk is decoded lossily (markers are plain ASCII, so mangled
    /// multi-byte text cannot produce a false match), escape sequences are
    /// stripped, and the window is truncated from the left to its capacity.
    pub fn feed(&mut self, chunk: &[u8]) -> bool {
        let text = String::from_utf8_lossy(chunk);
        for ch in text.chars() {
            if let Some(ch) = self.stripper.push(ch) {
                self.window.push(ch);
            }
        }
        self.truncate_window();
        self.matched()
    }

    /// Whether any marker is currently present in the window.
    pub fn matched(&self) -> bool {
        self.markers.iter().any(|m| self.window.contains(m.as_str()))
    }

    /// The current rolling window content, escape-stripped.
    pub fn window(&self) -> &str {
        &self.window
    }

    fn truncate_window(&mut self) {
        let excess = self.window.chars().count().saturating_sub(self.capacity);
        if excess > 0 {
            let cut = self
                .window
                .char_indices()
                .nth(excess)
                .map(|(idx, _)| idx)
                .unwrap_or_else(|| self.window.len());
            self.window.drain(..cut);
        }
    }
}

// =============================================================================
// Private stuff
// =============================================================================

/// Streaming VT100/ANSI CSI stripper.
///
/// Removes `ESC [ <params> <final>` sequences where the parameter and
/// intermediate bytes are in `0x20..=0x3F` and the final byte is in
/// `0x40..=0x7E`. State survives across `push` calls so sequences split
/// over chunk boundaries are still removed. For an ESC not followed by `[`
/// the ESC itself is dropped and the follow-up character kept; malformed
/// sequence bytes are dropped and the stripper returns to ground.
struct EscapeStripper {
    state: StripState,
}

#[derive(PartialEq)]
enum StripState {
    Ground,
    Escape,
    Csi,
}

const ESC: char = '\u{1b}';

impl EscapeStripper {
    fn new() -> Self {
        EscapeStripper {
            state: StripState::Ground,
        }
    }

    /// Process one character; returns the character to keep, if any.
    fn push(&mut self, ch: char) -> Option<char> {
        match self.state {
            StripState::Ground => {
                if ch == ESC {
                    self.state = StripState::Escape;
                    None
                } else {
                    Some(ch)
                }
            }
            StripState::Escape => {
                if ch == '[' {
                    self.state = StripState::Csi;
                    None
                } else {
                    // Not a CSI introducer; the ESC itself was already
                    // swallowed, hand the follow-up character through.
                    self.state = StripState::Ground;
                    Some(ch)
                }
            }
            StripState::Csi => {
                match ch as u32 {
                    0x20..=0x3f => None,
                    0x40..=0x7e => {
                        self.state = StripState::Ground;
                        None
                    }
                    _ => {
                        // Malformed sequence; drop the byte and resync.
                        self.state = StripState::Ground;
                        None
                    }
                }
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[test]
fn plain_marker_is_detected() {
    let mut scanner = MarkerScanner::new(vec!["EVT,APP,READY"], 512);
    assert!(!scanner.feed(b"booting...\r\n"));
    assert!(scanner.feed(b"EVT,APP,READY\r\n"));
}

#[test]
fn any_marker_of_the_set_matches() {
    let mut scanner = MarkerScanner::new(vec!["EVT,UART_CMD,READY", "EVT,APP,READY"], 512);
    assert!(scanner.feed(b"noise EVT,UART_CMD,READY noise"));
}

#[test]
fn marker_split_across_chunks_is_detected() {
    let mut scanner = MarkerScanner::new(vec!["EVT,PROVISION,CURVE25519_UPDATED"], 1024);
    assert!(!scanner.feed(b"EVT,PROVISION,CURVE"));
    assert!(scanner.feed(b"25519_UPDATED"));
}

#[test]
fn escape_sequences_are_stripped() {
    let mut scanner = MarkerScanner::new(vec!["EVT,APP,READY"], 512);
    assert!(scanner.feed(b"\x1b[1;32mEVT,APP\x1b[0m,READY"));
    assert!(!scanner.window().contains('\u{1b}'));
}

#[test]
fn escape_sequence_split_across_chunks_is_stripped() {
    let mut scanner = MarkerScanner::new(vec!["EVT,APP,READY"], 512);
    assert!(!scanner.feed(b"EVT,APP\x1b[3"));
    assert!(scanner.feed(b"2m,READY"));
    assert_eq!(scanner.window(), "EVT,APP,READY");
}

#[test]
fn truncated_escape_sequence_does_not_panic_or_match() {
    let mut scanner = MarkerScanner::new(vec!["READY"], 64);
    assert!(!scanner.feed(b"\x1b["));
    assert!(!scanner.feed(b"\x1b"));
    assert!(!scanner.feed(b""));
}

#[test]
fn lone_escape_passes_through_without_false_match() {
    let mut scanner = MarkerScanner::new(vec!["OK"], 64);
    assert!(!scanner.feed(b"\x1bZ"));
    assert_eq!(scanner.window(), "Z");
}

#[test]
fn window_is_bounded() {
    let mut scanner = MarkerScanner::new(vec!["NEVER"], 16);
    scanner.feed("x".repeat(100).as_bytes());
    assert_eq!(scanner.window().len(), 16);
}

#[test]
fn marker_scrolled_out_of_the_window_is_forgotten() {
    let mut scanner = MarkerScanner::new(vec!["EVT,APP,READY"], 32);
    assert!(scanner.feed(b"EVT,APP,READY"));
    assert!(!scanner.feed("#".repeat(64).as_bytes()));
    assert!(!scanner.matched());
}

#[test]
fn marker_within_capacity_survives_trailing_output() {
    let mut scanner = MarkerScanner::new(vec!["EVT,APP,READY"], 512);
    assert!(scanner.feed(b"EVT,APP,READY"));
    assert!(scanner.feed(b" and some trailing log output"));
}

#[test]
fn invalid_utf8_never_panics() {
    let mut scanner = MarkerScanner::new(vec!["READY"], 64);
    assert!(!scanner.feed(&[0xff, 0xfe, 0x80]));
    assert!(scanner.feed(b"READY"));
}
