//! Payload representation
//!
//! A payload is the raw byte content handed to the inspection engines by
//! an upstream capture decoder, together with its hex and printable-ASCII
//! renderings. All engines scan the raw bytes; the renderings exist for
//! reports and operator-facing output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("invalid hex payload: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

pub type Result<T> = std::result::Result<T, PayloadError>;

/// A byte payload with derived renderings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    data: Vec<u8>,
}

impl Payload {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Decode a hex string (as submitted by operators or dumped by a
    /// capture tool) into a payload.
    pub fn from_hex(s: &str) -> Result<Self> {
        Ok(Self {
            data: hex::decode(s.trim())?,
        })
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Lowercase hex rendering of the raw bytes.
    pub fn hex(&self) -> String {
        hex::encode(&self.data)
    }

    /// Printable-ASCII rendering; non-printable bytes become `.`.
    pub fn printable(&self) -> String {
        self.data
            .iter()
            .map(|&b| {
                if b.is_ascii_graphic() || b == b' ' {
                    b as char
                } else {
                    '.'
                }
            })
            .collect()
    }

    /// Truncate to at most `limit` bytes, returning the bounded view.
    pub fn bounded(&self, limit: usize) -> &[u8] {
        if self.data.len() > limit {
            &self.data[..limit]
        } else {
            &self.data
        }
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Self::new(s.as_bytes().to_vec())
    }
}

impl From<&[u8]> for Payload {
    fn from(b: &[u8]) -> Self {
        Self::new(b.to_vec())
    }
}

/// One decoded packet as delivered by the upstream capture decoder.
///
/// The decoder assigns packet ids monotonically and never delivers a
/// packet without a TCP payload; both IPv4 and IPv6 sources feed this
/// same record shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayloadRecord {
    pub packet_id: u32,
    pub captured_at: DateTime<Utc>,
    pub payload: Payload,
}

impl PayloadRecord {
    pub fn new(packet_id: u32, captured_at: DateTime<Utc>, payload: Payload) -> Self {
        Self {
            packet_id,
            captured_at,
            payload,
        }
    }
}
