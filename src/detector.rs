//! Payload anomaly detection
//!
//! A detector classifies a payload as malicious or benign against a
//! configured signature list. It is a strategy object: the transition-
//! table matcher holds one behind the `PayloadClassifier` trait, so other
//! detection policies can be plugged in without touching the matcher.

use serde::{Deserialize, Serialize};

/// Outcome of classifying one payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Classification {
    pub matched: bool,
    /// Signatures that fired, in configuration order, original casing.
    pub signatures: Vec<String>,
}

/// Pluggable payload classifier.
pub trait PayloadClassifier: Send + Sync {
    /// Full classification: every signature found, in configuration order.
    fn classify(&self, payload: &[u8]) -> Classification;

    /// Short-circuiting malicious/benign test.
    fn has_match(&self, payload: &[u8]) -> bool {
        self.classify(payload).matched
    }
}

/// Substring-based detector over an ordered signature list.
///
/// Signatures are tested as case-insensitive substrings of the payload.
/// Pure function of (signature list, payload); no mutable state.
#[derive(Debug, Clone)]
pub struct SignatureDetector {
    signatures: Vec<String>,
}

impl SignatureDetector {
    pub fn new(signatures: Vec<String>) -> Self {
        Self { signatures }
    }

    pub fn signatures(&self) -> &[String] {
        &self.signatures
    }

    /// Every signature present in the payload, in configuration order.
    pub fn matched_signatures(&self, payload: &[u8]) -> Vec<String> {
        self.signatures
            .iter()
            .filter(|sig| find_nocase(payload, sig.as_bytes()).is_some())
            .cloned()
            .collect()
    }
}

impl PayloadClassifier for SignatureDetector {
    fn classify(&self, payload: &[u8]) -> Classification {
        let signatures = self.matched_signatures(payload);
        Classification {
            matched: !signatures.is_empty(),
            signatures,
        }
    }

    fn has_match(&self, payload: &[u8]) -> bool {
        self.signatures
            .iter()
            .any(|sig| find_nocase(payload, sig.as_bytes()).is_some())
    }
}

/// Case-insensitive byte substring search without allocation.
fn find_nocase(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    if needle.len() > haystack.len() {
        return None;
    }

    let first_lower = needle[0].to_ascii_lowercase();
    let first_upper = needle[0].to_ascii_uppercase();
    let mut pos = 0;

    while pos <= haystack.len() - needle.len() {
        let found = haystack[pos..]
            .iter()
            .position(|&b| b == first_lower || b == first_upper);

        match found {
            Some(offset) => {
                let start = pos + offset;
                if start + needle.len() > haystack.len() {
                    return None;
                }
                let matches = haystack[start..start + needle.len()]
                    .iter()
                    .zip(needle.iter())
                    .all(|(&h, &n)| h.to_ascii_lowercase() == n.to_ascii_lowercase());
                if matches {
                    return Some(start);
                }
                pos = start + 1;
            }
            None => break,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> SignatureDetector {
        SignatureDetector::new(vec!["union select".to_string(), "<script".to_string()])
    }

    #[test]
    fn test_malicious_payload() {
        let d = detector();
        let payload = b"id=1 UNION SELECT *";
        assert!(d.has_match(payload));
        assert_eq!(d.matched_signatures(payload), vec!["union select"]);
    }

    #[test]
    fn test_benign_payload() {
        let d = detector();
        let payload = b"id=1&page=2";
        assert!(!d.has_match(payload));
        assert!(d.matched_signatures(payload).is_empty());
    }

    #[test]
    fn test_configuration_order_preserved() {
        let d = detector();
        let payload = b"<SCRIPT>union select</SCRIPT>";
        // Both fire; order follows the configured list, not payload order.
        assert_eq!(
            d.matched_signatures(payload),
            vec!["union select", "<script"]
        );
    }

    #[test]
    fn test_classify_matches_helpers() {
        let d = detector();
        let c = d.classify(b"x' UNION SELECT password");
        assert!(c.matched);
        assert_eq!(c.signatures, vec!["union select"]);
    }

    #[test]
    fn test_find_nocase() {
        assert_eq!(find_nocase(b"abcDEF", b"cde"), Some(2));
        assert_eq!(find_nocase(b"abc", b"abcd"), None);
        assert_eq!(find_nocase(b"xxab", b"ab"), Some(2));
        assert_eq!(find_nocase(b"anything", b""), Some(0));
    }
}
