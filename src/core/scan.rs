//! Scan result types
//!
//! A `ScanReport` is produced fresh per scan call and owned by the
//! caller; nothing in it aliases engine internals, so a report outlives
//! any rebuild of the automaton that produced it.

use serde::{Deserialize, Serialize};

use super::payload::Payload;

/// A single pattern occurrence.
///
/// `position` is the index of the input byte at which the pattern's match
/// ends. Each pattern is reported at most once per scan, at its first
/// such ending position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternHit {
    pub pattern: String,
    pub position: usize,
}

/// One automaton step of a scan, recorded per input byte.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanStep {
    /// The raw input byte consumed at this step.
    pub byte: u8,
    /// Node the automaton is in after consuming the byte.
    pub node: u32,
    /// Patterns output at that node (including failure-propagated ones).
    pub outputs: Vec<String>,
}

/// Full result of scanning one payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub packet_id: u32,
    pub payload_hex: String,
    pub payload_ascii: String,
    pub matches: Vec<PatternHit>,
    pub steps: Vec<ScanStep>,
}

impl ScanReport {
    pub fn new(packet_id: u32, payload: &Payload) -> Self {
        Self {
            packet_id,
            payload_hex: payload.hex(),
            payload_ascii: payload.printable(),
            matches: Vec::new(),
            steps: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.matches.is_empty()
    }
}
