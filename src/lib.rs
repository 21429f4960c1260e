//! pktwarden - automaton-based deep packet inspection toolkit
//!
//! Extracts byte payloads from captured traffic and runs them through
//! automaton-based detectors:
//!
//! - [`multipattern::MultiPatternMatcher`]: trie + failure-link
//!   multi-pattern search, one O(n) pass, overlapping matches included
//! - [`dfa::DfaMatcher`] / [`dfa::PrefixDfa`]: flat transition-table
//!   matching, whole-string and streaming modes, pluggable payload
//!   anomaly detector
//! - [`http_validator::HttpValidator`]: stack-disciplined byte-by-byte
//!   HTTP request structure validation with a full transition trace
//!
//! The [`Inspector`] facade bundles the engines built from one pattern
//! set and supports lock-free scanning with atomic swap on rebuild.

pub mod config;
pub mod core;
pub mod detector;
pub mod dfa;
pub mod export;
pub mod http_validator;
pub mod multipattern;

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::config::Config;
use crate::core::{Payload, PayloadRecord, ScanReport};
use crate::detector::{Classification, PayloadClassifier, SignatureDetector};
use crate::dfa::{PrefixDfa, PrefixHit};
use crate::export::{DfaDump, TrieDump};
use crate::http_validator::{HttpValidator, TraceRecord, ValidationResult};
use crate::multipattern::MultiPatternMatcher;

/// Immutable bundle of engines built from one pattern list.
///
/// A bundle is never mutated after construction; rebuilds create a new
/// bundle and swap the reference, so in-flight scans keep the machine
/// they started with.
pub struct EngineSet {
    patterns: Vec<String>,
    matcher: MultiPatternMatcher,
    prefix_dfa: PrefixDfa,
    detector: SignatureDetector,
}

impl EngineSet {
    pub fn build(patterns: Vec<String>) -> Self {
        let matcher = MultiPatternMatcher::build(&patterns);
        let prefix_dfa = PrefixDfa::from_patterns(&patterns);
        let detector = SignatureDetector::new(patterns.clone());
        Self {
            patterns,
            matcher,
            prefix_dfa,
            detector,
        }
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn matcher(&self) -> &MultiPatternMatcher {
        &self.matcher
    }

    pub fn prefix_dfa(&self) -> &PrefixDfa {
        &self.prefix_dfa
    }

    pub fn detector(&self) -> &SignatureDetector {
        &self.detector
    }
}

/// Core inspection facade.
///
/// Owns the current [`EngineSet`] behind a reader-writer lock; scans
/// take a cheap `Arc` clone under the read lock and never hold the lock
/// while scanning.
pub struct Inspector {
    config: Config,
    engines: RwLock<Arc<EngineSet>>,
}

impl Inspector {
    /// Build an inspector from configuration.
    pub fn new(config: Config) -> Self {
        let engines = Arc::new(EngineSet::build(config.flat_patterns()));
        info!(
            patterns = engines.patterns().len(),
            "inspection engines initialized"
        );
        Self {
            config,
            engines: RwLock::new(engines),
        }
    }

    /// Replace the pattern set: builds a fresh engine bundle, then swaps
    /// it in atomically. In-flight scans finish on the old bundle.
    pub fn rebuild(&self, patterns: Vec<String>) {
        let fresh = Arc::new(EngineSet::build(patterns));
        info!(patterns = fresh.patterns().len(), "engines rebuilt");
        *self.engines.write() = fresh;
    }

    /// Current engine bundle.
    pub fn engines(&self) -> Arc<EngineSet> {
        self.engines.read().clone()
    }

    /// Multi-pattern scan of one payload, bounded by the configured
    /// payload limit.
    pub fn scan(&self, packet_id: u32, payload: &Payload) -> ScanReport {
        let engines = self.engines();
        let bounded = Payload::new(payload.bounded(self.config.inspect.max_payload_bytes).to_vec());
        let mut report = engines.matcher().scan_packet(packet_id, &bounded);
        if !self.config.inspect.step_trace {
            report.steps.clear();
        }
        report
    }

    /// Scan one decoded packet from the capture boundary.
    pub fn scan_record(&self, record: &PayloadRecord) -> ScanReport {
        self.scan(record.packet_id, &record.payload)
    }

    /// Streaming prefix-table scan (the weaker, cheaper mode).
    pub fn scan_prefix(&self, payload: &Payload) -> Vec<PrefixHit> {
        let engines = self.engines();
        engines
            .prefix_dfa()
            .scan(payload.bounded(self.config.inspect.max_payload_bytes))
    }

    /// Substring-signature classification of one payload.
    pub fn classify(&self, payload: &Payload) -> Classification {
        let engines = self.engines();
        engines
            .detector()
            .classify(payload.bounded(self.config.inspect.max_payload_bytes))
    }

    /// Validate an HTTP message; returns the verdict and the transition
    /// trace. A fresh validator serves each call.
    pub fn validate_http(&self, message: &str) -> (ValidationResult, Vec<TraceRecord>) {
        let mut validator = HttpValidator::new();
        let result = validator.validate(message);
        (result, validator.trace().to_vec())
    }

    /// Structural dump of the multi-pattern trie.
    pub fn trie_dump(&self) -> TrieDump {
        TrieDump::from_matcher(self.engines().matcher())
    }

    /// Structural dump of the prefix transition table.
    pub fn dfa_dump(&self) -> DfaDump {
        DfaDump::from_prefix_dfa(self.engines().prefix_dfa())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inspector() -> Inspector {
        Inspector::new(Config::default())
    }

    #[test]
    fn test_scan_flags_default_signatures() {
        let report = inspector().scan(1, &Payload::from("id=1 UNION SELECT password"));
        assert!(report
            .matches
            .iter()
            .any(|m| m.pattern == "UNION SELECT"));
        assert_eq!(report.packet_id, 1);
    }

    #[test]
    fn test_rebuild_swaps_engines() {
        let inspector = inspector();
        let payload = Payload::from("totally custom marker");

        assert!(inspector.scan(0, &payload).is_clean());

        inspector.rebuild(vec!["custom marker".to_string()]);
        let report = inspector.scan(0, &payload);
        assert_eq!(report.matches.len(), 1);
        assert_eq!(report.matches[0].pattern, "custom marker");
    }

    #[test]
    fn test_scan_respects_payload_bound() {
        let mut config = Config::default();
        config.inspect.max_payload_bytes = 4;
        let inspector = Inspector::new(config);

        // The signature sits past the bound and must not fire.
        let report = inspector.scan(0, &Payload::from("x' UNION SELECT"));
        assert!(report.is_clean());
        assert_eq!(report.steps.len(), 4);
    }

    #[test]
    fn test_scan_record_carries_packet_id() {
        let record = PayloadRecord::new(
            42,
            chrono::Utc::now(),
            Payload::from("<script>alert(1)</script>"),
        );
        let report = inspector().scan_record(&record);
        assert_eq!(report.packet_id, 42);
        assert!(report.matches.iter().any(|m| m.pattern == "<script"));
    }

    #[test]
    fn test_classify_and_validate() {
        let inspector = inspector();

        let verdict = inspector.classify(&Payload::from("<ScRiPt>alert(1)"));
        assert!(verdict.matched);

        let (result, trace) = inspector.validate_http("GET / HTTP/1.1\r\nHost: x\r\n\r\n");
        assert_eq!(result, ValidationResult::Valid);
        assert!(!trace.is_empty());
    }
}
