//! Provisioning command payload assembly.
//!
//! The device accepts one ASCII command line over the UART:
//!
//! ```text
//! prov curve <scalar-hex> [peer-hex]\r\n
//! ```
//!
//! where `scalar-hex` is exactly 64 lowercase hex characters (a 32-byte
//! Curve25519 scalar) and `peer-hex`, if present, is a 64-hex peer public
//! key. The meaning of the material is opaque here; this module only
//! validates shape and builds the wire bytes. Validation happens before
//! any serial port is touched, so a typo never costs a device reboot.

use crate::error::{Error, Result};

/// Length in bytes of a Curve25519 scalar or public key.
pub const CURVE_LEN: usize = 32;

/// RFC 7748 test-vector scalar, for quick UART validation only. Hardware
/// must never ship provisioned with this value.
pub const DEMO_SCALAR: &str = "00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff";

/// RFC 7748 test-vector peer key matching [`DEMO_SCALAR`].
pub const DEMO_PEER: &str = "a1a2a3a4a5a6a7a8b1b2b3b4b5b6b7b8c1c2c3c4c5c6c7c8d1d2d3d4d5d6d7d8";

// =============================================================================
// Public Interface
// =============================================================================

/// Validated Curve25519 provisioning material: a scalar and an optional
/// peer public key, both held as normalized lowercase hex.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CurveMaterial {
    scalar: String,
    peer: Option<String>,
}

impl CurveMaterial {
    /// Validate and normalize the given hex fields.
    ///
    /// Whitespace is removed first so wrapped or heredoc'ed strings still
    /// validate, then each field must be exactly 64 hex characters; the
    /// result is lowercased.
    pub fn new(scalar: &str, peer: Option<&str>) -> Result<Self> {
        Ok(CurveMaterial {
            scalar: hex_key(scalar)?,
            peer: peer.map(hex_key).transpose()?,
        })
    }

    /// The RFC 7748 test vectors. For quick wiring checks only.
    pub fn demo() -> Self {
        CurveMaterial {
            scalar: DEMO_SCALAR.into(),
            peer: Some(DEMO_PEER.into()),
        }
    }

    /// The normalized scalar hex.
    pub fn scalar(&self) -> &str {
        &self.scalar
    }

    /// The normalized peer hex, when one was provided.
    pub fn peer(&self) -> Option<&str> {
        self.peer.as_deref()
    }
}

/// One immutable command line ready to transmit: always terminated by a
/// single CRLF and free of embedded CR or LF elsewhere.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CommandPayload {
    bytes: Vec<u8>,
}

impl CommandPayload {
    /// Build the `prov curve` command line from validated material.
    pub fn curve(material: &CurveMaterial) -> Self {
        let mut line = format!("prov curve {}", material.scalar);
        if let Some(peer) = &material.peer {
            line.push(' ');
            line.push_str(peer);
        }
        line.push_str("\r\n");
        CommandPayload {
            bytes: line.into_bytes(),
        }
    }

    /// Use a pre-built raw command verbatim, normalizing the trailing line
    /// terminator to a single CRLF.
    ///
    /// Rejects payloads that would span multiple lines; the device protocol
    /// is strictly one command per session.
    pub fn raw(blob: &[u8]) -> Result<Self> {
        let mut bytes: Vec<u8> = blob.to_vec();
        while bytes.last() == Some(&b'\r') || bytes.last() == Some(&b'\n') {
            bytes.pop();
        }
        if bytes.is_empty() {
            return Err(Error::Material("raw command is empty".into()));
        }
        if bytes.iter().any(|b| *b == b'\r' || *b == b'\n') {
            return Err(Error::Material(
                "raw command must be a single line".into(),
            ));
        }
        bytes.extend_from_slice(b"\r\n");
        Ok(CommandPayload { bytes })
    }

    /// The wire bytes, including the trailing CRLF.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

// =============================================================================
// Private stuff
// =============================================================================

fn hex_key(value: &str) -> Result<String> {
    // Remove whitespace so heredocs / wrapped strings still validate.
    let value: String = value.split_whitespace().collect();
    if value.len() != CURVE_LEN * 2 {
        return Err(Error::Material(format!(
            "expected {} hex chars, got {}",
            CURVE_LEN * 2,
            value.len()
        )));
    }
    if let Some(bad) = value.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(Error::Material(format!("invalid hex character '{}'", bad)));
    }
    Ok(value.to_ascii_lowercase())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[test]
fn curve_command_with_scalar_only() {
    let material = CurveMaterial::new(DEMO_SCALAR, None).unwrap();
    let payload = CommandPayload::curve(&material);
    assert_eq!(
        payload.as_bytes(),
        format!("prov curve {}\r\n", DEMO_SCALAR).as_bytes()
    );
}

#[test]
fn curve_command_with_peer() {
    let material = CurveMaterial::new(DEMO_SCALAR, Some(DEMO_PEER)).unwrap();
    let payload = CommandPayload::curve(&material);
    assert_eq!(
        payload.as_bytes(),
        format!("prov curve {} {}\r\n", DEMO_SCALAR, DEMO_PEER).as_bytes()
    );
}

#[test]
fn hex_is_normalized_to_lowercase() {
    let material = CurveMaterial::new(&DEMO_SCALAR.to_ascii_uppercase(), None).unwrap();
    assert_eq!(material.scalar(), DEMO_SCALAR);
}

#[test]
fn whitespace_in_hex_is_tolerated() {
    let wrapped = format!("{}\n  {}", &DEMO_SCALAR[..32], &DEMO_SCALAR[32..]);
    let material = CurveMaterial::new(&wrapped, None).unwrap();
    assert_eq!(material.scalar(), DEMO_SCALAR);
}

#[test]
fn wrong_length_is_rejected() {
    assert!(CurveMaterial::new("abcd", None).is_err());
    assert!(CurveMaterial::new(&DEMO_SCALAR[..63], None).is_err());
}

#[test]
fn non_hex_is_rejected() {
    let mut bad = DEMO_SCALAR.to_string();
    bad.replace_range(0..1, "g");
    assert!(CurveMaterial::new(&bad, None).is_err());
}

#[test]
fn bad_peer_is_rejected() {
    assert!(CurveMaterial::new(DEMO_SCALAR, Some("zz")).is_err());
}

#[test]
fn raw_payload_normalizes_trailing_terminator() {
    let payload = CommandPayload::raw(b"prov curve 00\n").unwrap();
    assert_eq!(payload.as_bytes(), b"prov curve 00\r\n");
    let payload = CommandPayload::raw(b"prov curve 00\r\n\r\n").unwrap();
    assert_eq!(payload.as_bytes(), b"prov curve 00\r\n");
    let payload = CommandPayload::raw(b"prov curve 00").unwrap();
    assert_eq!(payload.as_bytes(), b"prov curve 00\r\n");
}

#[test]
fn raw_payload_rejects_multiple_lines() {
    assert!(CommandPayload::raw(b"one\r\ntwo\r\n").is_err());
}

#[test]
fn raw_payload_rejects_empty() {
    assert!(CommandPayload::raw(b"\r\n").is_err());
}
