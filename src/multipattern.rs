//! Multi-pattern matching automaton
//!
//! A trie with failure links (Aho-Corasick): all patterns are folded
//! into one machine that finds every occurrence, including overlapping
//! and suffix matches, in a single left-to-right pass over the payload.
//!
//! Nodes live in an arena (`Vec<TrieNode>`) and reference each other by
//! index, so the failure link is a plain copyable `u32` with no ownership
//! implication. The root is always index 0 and its failure link points to
//! itself.

use std::collections::{BTreeMap, VecDeque};

use tracing::debug;

use crate::core::{Payload, PatternHit, ScanReport, ScanStep};

/// Index of a trie node within the arena.
pub type NodeId = u32;

const ROOT: NodeId = 0;

/// One trie node. Children own nothing; all links are arena indices.
#[derive(Debug, Clone)]
struct TrieNode {
    children: BTreeMap<u8, NodeId>,
    fail: NodeId,
    /// Ids of patterns whose match ends at this node, including those
    /// propagated from the failure chain.
    output: Vec<u32>,
}

impl TrieNode {
    fn new() -> Self {
        Self {
            children: BTreeMap::new(),
            fail: ROOT,
            output: Vec::new(),
        }
    }
}

/// Multi-pattern matcher over a fixed pattern set.
///
/// Patterns are lower-cased at insertion; scanning lower-cases each input
/// byte before comparison, so matching is case-insensitive throughout.
/// Match reports carry the original (pre-lowering) pattern text.
#[derive(Debug, Clone)]
pub struct MultiPatternMatcher {
    nodes: Vec<TrieNode>,
    patterns: Vec<String>,
}

impl MultiPatternMatcher {
    /// Build the automaton from a pattern list.
    ///
    /// An empty list (or a list of only empty strings) yields a valid
    /// automaton that matches nothing. Construction is a pure function of
    /// the list: rebuilding with the same input produces a machine that
    /// classifies every text identically.
    pub fn build<S: AsRef<str>>(patterns: &[S]) -> Self {
        let mut matcher = Self {
            nodes: vec![TrieNode::new()],
            patterns: Vec::with_capacity(patterns.len()),
        };

        for pattern in patterns {
            matcher.insert(pattern.as_ref());
        }
        matcher.build_failure_links();

        debug!(
            patterns = matcher.patterns.len(),
            nodes = matcher.nodes.len(),
            "built multi-pattern automaton"
        );

        matcher
    }

    fn insert(&mut self, pattern: &str) {
        if pattern.is_empty() {
            return;
        }

        let pattern_id = self.patterns.len() as u32;
        let mut current = ROOT;

        for byte in pattern.bytes() {
            let byte = byte.to_ascii_lowercase();
            current = match self.nodes[current as usize].children.get(&byte) {
                Some(&child) => child,
                None => {
                    let id = self.nodes.len() as NodeId;
                    self.nodes.push(TrieNode::new());
                    self.nodes[current as usize].children.insert(byte, id);
                    id
                }
            };
        }

        self.nodes[current as usize].output.push(pattern_id);
        self.patterns.push(pattern.to_string());
    }

    /// Breadth-first failure-link construction.
    ///
    /// Nodes are processed in increasing depth order so each node's
    /// failure link is finalized before its children's are computed; the
    /// output propagation step establishes output(n) ⊇ output(fail(n)).
    fn build_failure_links(&mut self) {
        let mut queue = VecDeque::new();

        // Depth-1 nodes fail to the root.
        let depth_one: Vec<NodeId> = self.nodes[ROOT as usize].children.values().copied().collect();
        for child in depth_one {
            self.nodes[child as usize].fail = ROOT;
            queue.push_back(child);
        }

        while let Some(node) = queue.pop_front() {
            let children: Vec<(u8, NodeId)> = self.nodes[node as usize]
                .children
                .iter()
                .map(|(&b, &c)| (b, c))
                .collect();

            for (byte, child) in children {
                queue.push_back(child);

                // Walk the parent's failure chain until a node with a
                // child on this byte turns up, or the root is reached.
                let mut fail = self.nodes[node as usize].fail;
                while fail != ROOT && !self.nodes[fail as usize].children.contains_key(&byte) {
                    fail = self.nodes[fail as usize].fail;
                }

                let target = match self.nodes[fail as usize].children.get(&byte) {
                    Some(&next) => next,
                    None => ROOT,
                };
                self.nodes[child as usize].fail = target;

                let inherited = self.nodes[target as usize].output.clone();
                self.nodes[child as usize].output.extend(inherited);
            }
        }
    }

    /// Scan a payload in one pass, recording every pattern at its first
    /// ending position and a per-byte step trace.
    pub fn scan(&self, payload: &Payload) -> ScanReport {
        self.scan_packet(0, payload)
    }

    /// Scan with an upstream packet id attached to the report.
    pub fn scan_packet(&self, packet_id: u32, payload: &Payload) -> ScanReport {
        let mut report = ScanReport::new(packet_id, payload);
        let mut found = vec![false; self.patterns.len()];
        let mut current = ROOT;

        for (position, &raw) in payload.data().iter().enumerate() {
            let byte = raw.to_ascii_lowercase();

            while current != ROOT && !self.nodes[current as usize].children.contains_key(&byte) {
                current = self.nodes[current as usize].fail;
            }
            if let Some(&next) = self.nodes[current as usize].children.get(&byte) {
                current = next;
            }

            let node = &self.nodes[current as usize];
            for &pattern_id in &node.output {
                if !found[pattern_id as usize] {
                    found[pattern_id as usize] = true;
                    report.matches.push(PatternHit {
                        pattern: self.patterns[pattern_id as usize].clone(),
                        position,
                    });
                }
            }

            report.steps.push(ScanStep {
                byte: raw,
                node: current,
                outputs: node
                    .output
                    .iter()
                    .map(|&id| self.patterns[id as usize].clone())
                    .collect(),
            });
        }

        report
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Enumerate nodes as `(id, fail, output patterns)` for export.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, NodeId, Vec<&str>)> + '_ {
        self.nodes.iter().enumerate().map(|(id, node)| {
            (
                id as NodeId,
                node.fail,
                node.output
                    .iter()
                    .map(|&p| self.patterns[p as usize].as_str())
                    .collect(),
            )
        })
    }

    /// Enumerate edges as `(from, input byte, to)` for export.
    pub fn edges(&self) -> impl Iterator<Item = (NodeId, u8, NodeId)> + '_ {
        self.nodes.iter().enumerate().flat_map(|(id, node)| {
            node.children
                .iter()
                .map(move |(&byte, &child)| (id as NodeId, byte, child))
        })
    }

    #[cfg(test)]
    fn fail_of(&self, node: NodeId) -> NodeId {
        self.nodes[node as usize].fail
    }

    #[cfg(test)]
    fn output_of(&self, node: NodeId) -> &[u32] {
        &self.nodes[node as usize].output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hits(report: &ScanReport) -> Vec<(&str, usize)> {
        report
            .matches
            .iter()
            .map(|m| (m.pattern.as_str(), m.position))
            .collect()
    }

    #[test]
    fn test_single_pattern_match() {
        let matcher = MultiPatternMatcher::build(&["virus"]);
        let report = matcher.scan(&Payload::from("a virus payload"));
        assert_eq!(hits(&report), vec![("virus", 6)]);
    }

    #[test]
    fn test_case_insensitive() {
        let matcher = MultiPatternMatcher::build(&["UNION SELECT"]);
        let report = matcher.scan(&Payload::from("id=1 union select *"));
        assert_eq!(report.matches.len(), 1);
        // Configured casing is preserved in the report.
        assert_eq!(report.matches[0].pattern, "UNION SELECT");
    }

    #[test]
    fn test_overlapping_and_suffix_matches() {
        let matcher = MultiPatternMatcher::build(&["he", "she", "his", "hers"]);
        let report = matcher.scan(&Payload::from("ushers"));
        // "she" ends at 3, "he" at 3 (suffix of she), "hers" at 5.
        let found = hits(&report);
        assert!(found.contains(&("she", 3)));
        assert!(found.contains(&("he", 3)));
        assert!(found.contains(&("hers", 5)));
        assert!(!found.iter().any(|(p, _)| *p == "his"));
    }

    #[test]
    fn test_first_occurrence_only() {
        let matcher = MultiPatternMatcher::build(&["abc"]);
        let report = matcher.scan(&Payload::from("abc abc abc"));
        assert_eq!(hits(&report), vec![("abc", 2)]);
    }

    #[test]
    fn test_rescan_is_idempotent() {
        let matcher = MultiPatternMatcher::build(&["eval", "base64"]);
        let payload = Payload::from("eval(base64_decode(...))");
        let first = matcher.scan(&payload);
        let second = matcher.scan(&payload);
        assert_eq!(first.matches, second.matches);
    }

    #[test]
    fn test_step_trace_covers_every_byte() {
        let matcher = MultiPatternMatcher::build(&["xyz"]);
        let payload = Payload::from("no match here");
        let report = matcher.scan(&payload);
        assert!(report.matches.is_empty());
        assert_eq!(report.steps.len(), payload.len());
    }

    #[test]
    fn test_empty_pattern_list() {
        let matcher = MultiPatternMatcher::build::<&str>(&[]);
        let report = matcher.scan(&Payload::from("anything at all"));
        assert!(report.matches.is_empty());
        assert_eq!(report.steps.len(), 15);
    }

    #[test]
    fn test_empty_patterns_are_skipped() {
        let matcher = MultiPatternMatcher::build(&["", "ok", ""]);
        assert_eq!(matcher.pattern_count(), 1);
        let report = matcher.scan(&Payload::from("look"));
        assert_eq!(report.matches.len(), 1);
    }

    #[test]
    fn test_failure_output_superset_invariant() {
        let matcher = MultiPatternMatcher::build(&["she", "he", "her", "is"]);
        for id in 1..matcher.node_count() as NodeId {
            let fail = matcher.fail_of(id);
            let fail_output = matcher.output_of(fail).to_vec();
            let output = matcher.output_of(id);
            for p in fail_output {
                assert!(
                    output.contains(&p),
                    "node {} output missing pattern {} from its failure link",
                    id,
                    p
                );
            }
        }
    }

    #[test]
    fn test_root_fails_to_itself() {
        let matcher = MultiPatternMatcher::build(&["a"]);
        assert_eq!(matcher.fail_of(ROOT), ROOT);
    }

    #[test]
    fn test_deterministic_builds() {
        let patterns = ["<script", "union select", "../"];
        let a = MultiPatternMatcher::build(&patterns);
        let b = MultiPatternMatcher::build(&patterns);
        for text in ["<ScRiPt>alert(1)", "1 UNION SELECT x", "../../etc", "clean"] {
            let payload = Payload::from(text);
            assert_eq!(a.scan(&payload).matches, b.scan(&payload).matches);
        }
    }

    #[test]
    fn test_export_accessors() {
        let matcher = MultiPatternMatcher::build(&["ab"]);
        assert_eq!(matcher.node_count(), 3);
        let edges: Vec<_> = matcher.edges().collect();
        assert_eq!(edges, vec![(0, b'a', 1), (1, b'b', 2)]);
        let terminal = matcher.nodes().find(|(id, _, _)| *id == 2).unwrap();
        assert_eq!(terminal.2, vec!["ab"]);
    }
}
