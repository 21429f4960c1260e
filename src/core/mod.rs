//! Core shared types for payload inspection
//!
//! - `Payload`: raw bytes plus hex / printable renderings
//! - `PayloadRecord`: capture-decoder boundary record
//! - `ScanReport`: per-scan match and step-trace output

pub mod payload;
pub mod scan;

pub use payload::{Payload, PayloadError, PayloadRecord};
pub use scan::{PatternHit, ScanReport, ScanStep};
