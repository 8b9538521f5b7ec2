//! XBee API transmit-request frame encoder and validator.
//!
//! Only the outbound direction is implemented: frames are built for
//! transmission and can be checked for well-formedness, but inbound API
//! frames are never decoded.
//!
//! # Frame format
//!
//! ```text
//! 0x7E <len:u16 BE> 0x10 <id> <addr64:8> <addr16:2> <radius> <options> <payload...> <cksum>
//! ```
//!
//! - `len` counts the body: everything between the length field and the
//!   checksum (14 header bytes plus the payload)
//! - `cksum` = `0xFF - (sum(body) mod 256)`, so a receiver adding the body and
//!   the checksum always gets `0xFF` in the low byte

use std::fmt;
use std::str::FromStr;

use bytes::{BufMut, BytesMut};
use radiolink_core::{Error, Result};

/// Start delimiter of every API frame.
pub const START_DELIMITER: u8 = 0x7E;

/// Frame type of a 64-bit transmit request.
pub const TRANSMIT_REQUEST: u8 = 0x10;

/// Frame id used for every transmission.
pub const DEFAULT_FRAME_ID: u8 = 0x01;

/// 16-bit address sentinel meaning "unknown, route by the 64-bit address".
pub const ADDR16_UNKNOWN: u16 = 0xFFFE;

/// Transmit-request header length inside the body (type through options).
pub const HEADER_LEN: usize = 14;

/// Largest payload whose body length still fits the 16-bit length field.
pub const MAX_PAYLOAD: usize = u16::MAX as usize - HEADER_LEN;

/// Delimiter plus length field.
const PREFIX_LEN: usize = 3;

/// A 64-bit IEEE/XBee hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address64(pub [u8; 8]);

impl Address64 {
    pub const fn new(bytes: [u8; 8]) -> Self {
        Address64(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

impl fmt::Display for Address64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{b:02X}")?;
        }
        Ok(())
    }
}

impl FromStr for Address64 {
    type Err = Error;

    /// Parse `00:13:A2:00:42:6E:E7:77`, `00-13-...` or `0013A200426EE777`.
    fn from_str(s: &str) -> Result<Self> {
        let digits: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, ':' | '-' | ' '))
            .collect();
        if digits.len() != 16 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::InvalidParameter(format!(
                "invalid 64-bit address {s:?}: expected 16 hex digits"
            )));
        }

        let mut bytes = [0u8; 8];
        for (i, slot) in bytes.iter_mut().enumerate() {
            *slot = u8::from_str_radix(&digits[i * 2..i * 2 + 2], 16)
                .map_err(|e| Error::InvalidParameter(format!("invalid 64-bit address {s:?}: {e}")))?;
        }
        Ok(Address64(bytes))
    }
}

/// A 64-bit transmit request (frame type `0x10`).
///
/// Length and checksum are not stored; [`encode`](Self::encode) derives them
/// from the current field values every time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransmitRequest {
    pub frame_id: u8,
    pub dest_addr_64: Address64,
    pub dest_addr_16: u16,
    /// Maximum hop count; `0` means the network maximum.
    pub broadcast_radius: u8,
    pub options: u8,
    pub payload: Vec<u8>,
}

impl TransmitRequest {
    /// A unicast request to `dest` with default id, radius and options.
    pub fn new(dest: Address64, payload: &[u8]) -> Self {
        TransmitRequest {
            frame_id: DEFAULT_FRAME_ID,
            dest_addr_64: dest,
            dest_addr_16: ADDR16_UNKNOWN,
            broadcast_radius: 0x00,
            options: 0x00,
            payload: payload.to_vec(),
        }
    }

    fn put_body(&self, buf: &mut BytesMut) {
        buf.put_u8(TRANSMIT_REQUEST);
        buf.put_u8(self.frame_id);
        buf.put_slice(self.dest_addr_64.as_bytes());
        buf.put_u16(self.dest_addr_16);
        buf.put_u8(self.broadcast_radius);
        buf.put_u8(self.options);
        buf.put_slice(&self.payload);
    }

    /// Encode the request into a complete frame.
    ///
    /// Fails only if the payload is longer than [`MAX_PAYLOAD`].
    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.payload.len() > MAX_PAYLOAD {
            return Err(Error::InvalidParameter(format!(
                "payload of {} bytes exceeds the {MAX_PAYLOAD}-byte frame limit",
                self.payload.len()
            )));
        }

        let body_len = HEADER_LEN + self.payload.len();
        let mut buf = BytesMut::with_capacity(PREFIX_LEN + body_len + 1);
        buf.put_u8(START_DELIMITER);
        buf.put_u16(body_len as u16);
        self.put_body(&mut buf);
        let cksum = checksum(&buf[PREFIX_LEN..]);
        buf.put_u8(cksum);
        Ok(buf.to_vec())
    }
}

/// Checksum over a frame body: `0xFF - (sum mod 256)`.
pub fn checksum(body: &[u8]) -> u8 {
    0xFF - body.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Build a transmit-request frame for `payload` addressed to `dest`.
///
/// # Example
///
/// ```
/// use radiolink_xbee::frame::{build, Address64};
///
/// let dest: Address64 = "00:13:A2:00:42:6E:E7:77".parse().unwrap();
/// let frame = build(dest, b"Test").unwrap();
/// assert_eq!(frame.len(), 22);
/// assert_eq!(frame[0], 0x7E);
/// assert_eq!(*frame.last().unwrap(), 0x8E);
/// ```
pub fn build(dest: Address64, payload: &[u8]) -> Result<Vec<u8>> {
    TransmitRequest::new(dest, payload).encode()
}

/// Check delimiter, length field and checksum of a complete frame.
///
/// Returns the body (frame type through payload) on success.
pub fn validate(frame: &[u8]) -> Result<&[u8]> {
    if frame.len() < PREFIX_LEN + 1 {
        return Err(Error::Protocol(format!(
            "frame too short: {} bytes",
            frame.len()
        )));
    }
    if frame[0] != START_DELIMITER {
        return Err(Error::Protocol(format!(
            "bad start delimiter 0x{:02X}",
            frame[0]
        )));
    }

    let declared = u16::from_be_bytes([frame[1], frame[2]]) as usize;
    let actual = frame.len() - PREFIX_LEN - 1;
    if declared != actual {
        return Err(Error::Protocol(format!(
            "length field says {declared} bytes, body has {actual}"
        )));
    }

    let body = &frame[PREFIX_LEN..PREFIX_LEN + actual];
    let received = frame[frame.len() - 1];
    let expected = checksum(body);
    if received != expected {
        return Err(Error::Protocol(format!(
            "checksum mismatch: expected 0x{expected:02X}, got 0x{received:02X}"
        )));
    }
    Ok(body)
}

/// Lowercase hex rendering of a frame, as written to transmission logs.
pub fn to_hex(frame: &[u8]) -> String {
    frame.iter().map(|b| format!("{b:02x}")).collect()
}
