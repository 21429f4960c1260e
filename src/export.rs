//! Structural dumps of the automatons
//!
//! Serializable snapshots of automaton structure (stable identifiers,
//! full transition enumeration, output sets) so an external visualizer
//! can render the machines without walking internal pointers. The visual
//! schema itself belongs to the consumer; these types only promise the
//! structure.

use serde::{Deserialize, Serialize};

use crate::dfa::{DfaMatcher, PrefixDfa};
use crate::multipattern::MultiPatternMatcher;

/// One trie node: id, failure-link target, patterns output here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrieNodeDump {
    pub id: u32,
    pub fail: u32,
    pub output: Vec<String>,
}

/// One labeled edge of a trie or transition table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeDump {
    pub from: u32,
    pub input: String,
    pub to: u32,
}

/// Full trie structure of a [`MultiPatternMatcher`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrieDump {
    pub nodes: Vec<TrieNodeDump>,
    pub edges: Vec<EdgeDump>,
}

impl TrieDump {
    pub fn from_matcher(matcher: &MultiPatternMatcher) -> Self {
        Self {
            nodes: matcher
                .nodes()
                .map(|(id, fail, output)| TrieNodeDump {
                    id,
                    fail,
                    output: output.into_iter().map(String::from).collect(),
                })
                .collect(),
            edges: matcher
                .edges()
                .map(|(from, byte, to)| EdgeDump {
                    from,
                    input: render_input(byte),
                    to,
                })
                .collect(),
        }
    }
}

/// Accepting state annotated with the patterns it accepts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptDump {
    pub state: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patterns: Vec<String>,
}

/// Full structure of a transition-table matcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DfaDump {
    pub states: Vec<u32>,
    pub start: u32,
    pub accept: Vec<AcceptDump>,
    pub transitions: Vec<EdgeDump>,
}

impl DfaDump {
    pub fn from_prefix_dfa(dfa: &PrefixDfa) -> Self {
        let transitions: Vec<EdgeDump> = dfa
            .transitions()
            .map(|(from, byte, to)| EdgeDump {
                from,
                input: render_input(byte),
                to,
            })
            .collect();

        Self {
            states: collect_states(dfa.start_state(), &transitions),
            start: dfa.start_state(),
            accept: dfa
                .accepting_states()
                .map(|(state, patterns)| AcceptDump {
                    state,
                    patterns: patterns.into_iter().map(String::from).collect(),
                })
                .collect(),
            transitions,
        }
    }

    pub fn from_matcher(dfa: &DfaMatcher) -> Self {
        let transitions: Vec<EdgeDump> = dfa
            .transitions()
            .map(|(from, byte, to)| EdgeDump {
                from,
                input: render_input(byte),
                to,
            })
            .collect();

        Self {
            states: collect_states(dfa.start_state(), &transitions),
            start: dfa.start_state(),
            accept: dfa
                .accepting_states()
                .map(|state| AcceptDump {
                    state,
                    patterns: Vec::new(),
                })
                .collect(),
            transitions,
        }
    }
}

fn collect_states(start: u32, transitions: &[EdgeDump]) -> Vec<u32> {
    let mut states: Vec<u32> = transitions
        .iter()
        .flat_map(|t| [t.from, t.to])
        .chain(std::iter::once(start))
        .collect();
    states.sort_unstable();
    states.dedup();
    states
}

/// Printable bytes render as themselves; the rest as `\xNN`.
fn render_input(byte: u8) -> String {
    if byte.is_ascii_graphic() || byte == b' ' {
        (byte as char).to_string()
    } else {
        format!("\\x{:02x}", byte)
    }
}
