//! Transition-table matching
//!
//! Two deterministic machines share the flat `(state, byte) -> state`
//! table shape:
//!
//! - [`DfaMatcher`]: hand-assembled table with whole-string acceptance,
//!   plus an optional payload-anomaly detector plug-in.
//! - [`PrefixDfa`]: a prefix trie compiled from a pattern list, scanned
//!   in streaming mode with single-character restart on mismatch.
//!
//! Neither machine has failure links. The streaming scan's restart-on-
//! mismatch recovers only single-character resynchronization and can
//! under-match compared to the multi-pattern automaton in
//! `multipattern`; it is kept as an explicitly weaker, cheaper mode.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::detector::{Classification, PayloadClassifier};

/// State identifier within a transition table.
pub type StateId = u32;

/// Deterministic matcher over a hand-assembled transition table.
///
/// `matches` is whole-string acceptance: a missing transition rejects
/// immediately (no implicit self-loop), and the input is accepted only if
/// every byte was consumed and the final state is accepting.
pub struct DfaMatcher {
    start: StateId,
    transitions: BTreeMap<(StateId, u8), StateId>,
    accepting: BTreeSet<StateId>,
    detector: Option<Box<dyn PayloadClassifier>>,
}

impl DfaMatcher {
    pub fn new(start: StateId) -> Self {
        Self {
            start,
            transitions: BTreeMap::new(),
            accepting: BTreeSet::new(),
            detector: None,
        }
    }

    /// Register a transition. The last write for a given `(from, symbol)`
    /// wins silently.
    pub fn add_transition(&mut self, from: StateId, symbol: u8, to: StateId) {
        self.transitions.insert((from, symbol), to);
    }

    pub fn add_accepting_state(&mut self, state: StateId) {
        self.accepting.insert(state);
    }

    /// Attach a payload classifier consulted by [`Self::inspect_payload`].
    pub fn with_detector(mut self, detector: Box<dyn PayloadClassifier>) -> Self {
        self.detector = Some(detector);
        self
    }

    /// Whole-string acceptance of `data`.
    pub fn matches(&self, data: &[u8]) -> bool {
        let mut current = self.start;

        for &byte in data {
            match self.transitions.get(&(current, byte)) {
                Some(&next) => current = next,
                None => return false,
            }
        }

        self.accepting.contains(&current)
    }

    /// Malicious/benign verdict from the configured detector.
    ///
    /// With no detector configured this fails open: the payload is
    /// reported benign, never an error.
    pub fn inspect_payload(&self, payload: &[u8]) -> bool {
        match &self.detector {
            Some(detector) => detector.has_match(payload),
            None => false,
        }
    }

    /// Signatures the configured detector found in the payload; empty
    /// when no detector is configured.
    pub fn payload_anomalies(&self, payload: &[u8]) -> Vec<String> {
        match &self.detector {
            Some(detector) => detector.classify(payload).signatures,
            None => Vec::new(),
        }
    }

    /// Full classification from the configured detector.
    pub fn classify_payload(&self, payload: &[u8]) -> Classification {
        match &self.detector {
            Some(detector) => detector.classify(payload),
            None => Classification::default(),
        }
    }

    pub fn start_state(&self) -> StateId {
        self.start
    }

    pub fn state_count(&self) -> usize {
        let mut states: BTreeSet<StateId> = BTreeSet::new();
        states.insert(self.start);
        for (&(from, _), &to) in &self.transitions {
            states.insert(from);
            states.insert(to);
        }
        states.len()
    }

    /// Enumerate transitions as `(from, input byte, to)` for export.
    pub fn transitions(&self) -> impl Iterator<Item = (StateId, u8, StateId)> + '_ {
        self.transitions
            .iter()
            .map(|(&(from, byte), &to)| (from, byte, to))
    }

    /// Enumerate accepting states for export.
    pub fn accepting_states(&self) -> impl Iterator<Item = StateId> + '_ {
        self.accepting.iter().copied()
    }
}

/// A streaming match from [`PrefixDfa::scan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixHit {
    /// Index of the input byte at which an accepting state was reached.
    pub position: usize,
    /// Patterns accepted at that state, original casing.
    pub patterns: Vec<String>,
}

/// Prefix-trie transition table compiled from a pattern list.
///
/// Patterns sharing a prefix share the state chain for it. Terminal
/// states are accepting and annotated with the pattern(s) ending there.
pub struct PrefixDfa {
    start: StateId,
    transitions: BTreeMap<(StateId, u8), StateId>,
    accepting: BTreeMap<StateId, Vec<u32>>,
    patterns: Vec<String>,
}

impl PrefixDfa {
    /// Compile a prefix trie over the lower-cased patterns.
    pub fn from_patterns<S: AsRef<str>>(patterns: &[S]) -> Self {
        let mut dfa = Self {
            start: 0,
            transitions: BTreeMap::new(),
            accepting: BTreeMap::new(),
            patterns: Vec::with_capacity(patterns.len()),
        };

        let mut next_state: StateId = 1;
        for pattern in patterns {
            let pattern = pattern.as_ref();
            if pattern.is_empty() {
                continue;
            }

            let pattern_id = dfa.patterns.len() as u32;
            let mut current = dfa.start;

            for byte in pattern.bytes() {
                let byte = byte.to_ascii_lowercase();
                current = match dfa.transitions.get(&(current, byte)) {
                    Some(&existing) => existing,
                    None => {
                        let state = next_state;
                        next_state += 1;
                        dfa.transitions.insert((current, byte), state);
                        state
                    }
                };
            }

            dfa.accepting.entry(current).or_default().push(pattern_id);
            dfa.patterns.push(pattern.to_string());
        }

        debug!(
            patterns = dfa.patterns.len(),
            states = next_state,
            "built prefix transition table"
        );

        dfa
    }

    /// Streaming scan: advance across the text byte-by-byte; on a missing
    /// transition, reset to the start state and retry the same byte once
    /// from there before moving on.
    ///
    /// This recovers only single-character restarts, so a match whose
    /// prefix overlaps a longer failed candidate can be missed; use the
    /// multi-pattern automaton when that matters.
    pub fn scan(&self, text: &[u8]) -> Vec<PrefixHit> {
        let mut hits = Vec::new();
        let mut current = self.start;

        for (position, &raw) in text.iter().enumerate() {
            let byte = raw.to_ascii_lowercase();

            match self.transitions.get(&(current, byte)) {
                Some(&next) => {
                    current = next;
                    self.record_hit(current, position, &mut hits);
                }
                None => {
                    current = self.start;
                    if let Some(&next) = self.transitions.get(&(current, byte)) {
                        current = next;
                        self.record_hit(current, position, &mut hits);
                    }
                }
            }
        }

        hits
    }

    fn record_hit(&self, state: StateId, position: usize, hits: &mut Vec<PrefixHit>) {
        if let Some(ids) = self.accepting.get(&state) {
            hits.push(PrefixHit {
                position,
                patterns: ids
                    .iter()
                    .map(|&id| self.patterns[id as usize].clone())
                    .collect(),
            });
        }
    }

    pub fn start_state(&self) -> StateId {
        self.start
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    pub fn state_count(&self) -> usize {
        let mut states: BTreeSet<StateId> = BTreeSet::new();
        states.insert(self.start);
        for (&(from, _), &to) in &self.transitions {
            states.insert(from);
            states.insert(to);
        }
        states.len()
    }

    /// Enumerate transitions as `(from, input byte, to)` for export.
    pub fn transitions(&self) -> impl Iterator<Item = (StateId, u8, StateId)> + '_ {
        self.transitions
            .iter()
            .map(|(&(from, byte), &to)| (from, byte, to))
    }

    /// Enumerate accepting states with their pattern texts for export.
    pub fn accepting_states(&self) -> impl Iterator<Item = (StateId, Vec<&str>)> + '_ {
        self.accepting.iter().map(|(&state, ids)| {
            (
                state,
                ids.iter().map(|&id| self.patterns[id as usize].as_str()).collect(),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::SignatureDetector;

    fn get_matcher() -> DfaMatcher {
        let mut dfa = DfaMatcher::new(0);
        dfa.add_transition(0, b'G', 1);
        dfa.add_transition(1, b'E', 2);
        dfa.add_transition(2, b'T', 3);
        dfa.add_accepting_state(3);
        dfa
    }

    #[test]
    fn test_whole_string_acceptance() {
        let dfa = get_matcher();
        assert!(dfa.matches(b"GET"));
        // Extra byte with no defined transition must not still accept.
        assert!(!dfa.matches(b"GETX"));
        // Prefix ends in a non-accepting state.
        assert!(!dfa.matches(b"GE"));
        assert!(!dfa.matches(b"PUT"));
    }

    #[test]
    fn test_empty_input_acceptance() {
        let mut dfa = DfaMatcher::new(0);
        assert!(!dfa.matches(b""));
        dfa.add_accepting_state(0);
        assert!(dfa.matches(b""));
    }

    #[test]
    fn test_last_write_wins() {
        let mut dfa = DfaMatcher::new(0);
        dfa.add_transition(0, b'a', 1);
        dfa.add_transition(0, b'a', 2);
        dfa.add_accepting_state(2);
        assert!(dfa.matches(b"a"));
    }

    #[test]
    fn test_inspect_without_detector_fails_open() {
        let dfa = get_matcher();
        assert!(!dfa.inspect_payload(b"union select * from users"));
        assert!(dfa.payload_anomalies(b"<script>alert(1)</script>").is_empty());
    }

    #[test]
    fn test_inspect_with_detector() {
        let detector = SignatureDetector::new(vec![
            "union select".to_string(),
            "<script".to_string(),
        ]);
        let dfa = get_matcher().with_detector(Box::new(detector));

        assert!(dfa.inspect_payload(b"id=1 UNION SELECT *"));
        assert_eq!(
            dfa.payload_anomalies(b"id=1 UNION SELECT *"),
            vec!["union select"]
        );
        assert!(!dfa.inspect_payload(b"id=1"));
    }

    #[test]
    fn test_prefix_dfa_shares_prefixes() {
        let dfa = PrefixDfa::from_patterns(&["abc", "abd"]);
        // Start, a, b, c, d: the "ab" chain is shared.
        assert_eq!(dfa.state_count(), 5);
    }

    #[test]
    fn test_prefix_scan_finds_substrings() {
        let dfa = PrefixDfa::from_patterns(&["virus", "eval"]);
        let hits = dfa.scan(b"an EVAL call");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].position, 6);
        assert_eq!(hits[0].patterns, vec!["eval"]);
    }

    #[test]
    fn test_prefix_scan_single_char_restart() {
        let dfa = PrefixDfa::from_patterns(&["ab"]);
        // Mismatch at 'x' resets; the restart retries 'a' from start.
        let hits = dfa.scan(b"axab");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].position, 3);
    }

    #[test]
    fn test_prefix_scan_under_matches_on_overlap() {
        let dfa = PrefixDfa::from_patterns(&["aab", "ab"]);
        // "aab" is found, but the overlapping "ab" ending at the same
        // byte is missed - no failure links.
        let hits = dfa.scan(b"aab");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].patterns, vec!["aab"]);

        // The full multi-pattern automaton finds both.
        let matcher = crate::multipattern::MultiPatternMatcher::build(&["aab", "ab"]);
        let report = matcher.scan(&crate::core::Payload::from("aab"));
        assert_eq!(report.matches.len(), 2);
    }

    #[test]
    fn test_prefix_dfa_deterministic() {
        let a = PrefixDfa::from_patterns(&["drop table", "eval"]);
        let b = PrefixDfa::from_patterns(&["drop table", "eval"]);
        for text in [&b"x; DROP TABLE users"[..], &b"eval()"[..], &b"clean"[..]] {
            assert_eq!(a.scan(text), b.scan(text));
        }
    }
}
