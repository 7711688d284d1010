//! Reversed-label trie for `*.domain` wildcard matching. A lookup for
//! `a.b.ads.example.com` walks labels TLD-first and matches as soon as it
//! passes a node carrying a wildcard, as long as at least one label remains
//! below it (the wildcard's own apex domain never matches itself).

use compact_str::CompactString;
use rustc_hash::FxBuildHasher;
use std::collections::HashMap;

#[derive(Default)]
struct TrieNode {
    children: HashMap<CompactString, TrieNode, FxBuildHasher>,
    is_wildcard: bool,
}

#[derive(Default)]
pub struct SuffixTrie {
    root: TrieNode,
}

impl SuffixTrie {
    pub fn new() -> Self {
        Self::default()
    }

    /// `pattern` is either a bare domain (exact-suffix match for subdomains)
    /// or a `*.domain` wildcard; both are stored identically since this trie
    /// only ever matches subdomains, never the apex.
    pub fn insert_wildcard(&mut self, pattern: &str) {
        let stripped = pattern.strip_prefix("*.").unwrap_or(pattern);
        let labels: Vec<&str> = stripped.split('.').rev().collect();
        let mut node = &mut self.root;
        for label in labels {
            node = node
                .children
                .entry(CompactString::new(label))
                .or_default();
        }
        node.is_wildcard = true;
    }

    #[inline]
    pub fn lookup(&self, domain: &str) -> bool {
        let labels: Vec<&str> = domain.split('.').rev().collect();
        let n = labels.len();
        let mut node = &self.root;
        for (i, label) in labels.iter().enumerate() {
            let Some(next) = node.children.get(*label) else {
                return false;
            };
            node = next;
            if node.is_wildcard && i + 1 < n {
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_matches_subdomains_only() {
        let mut trie = SuffixTrie::new();
        trie.insert_wildcard("*.ads.example.com");
        assert!(trie.lookup("tracker.ads.example.com"));
        assert!(trie.lookup("a.b.ads.example.com"));
        assert!(!trie.lookup("ads.example.com"));
        assert!(!trie.lookup("example.com"));
    }
}
