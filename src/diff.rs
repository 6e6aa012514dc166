// ============================================================================
// File: packages/ramsync/src/diff.rs
// ----------------------------------------------------------------------------
// Set-based differencing of two fingerprint maps.
// ============================================================================

use serde::{Deserialize, Serialize};

use crate::fingerprint::FingerprintMap;

/// Classification of every path in `source ∪ target`
///
/// The four lists are disjoint and each is sorted lexicographically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResult {
    /// In source, not in target
    pub added: Vec<String>,
    /// In target, not in source
    pub removed: Vec<String>,
    /// In both, digests differ
    pub modified: Vec<String>,
    /// In both, digests equal
    pub unchanged: Vec<String>,
}

impl DiffResult {
    /// True when source and target hold the same files with the same content
    pub fn is_identical(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    /// Paths the source side must push to the target (`added ∪ modified`, sorted)
    pub fn to_copy(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self
            .added
            .iter()
            .chain(self.modified.iter())
            .map(String::as_str)
            .collect();
        paths.sort_unstable();
        paths
    }

    /// Number of distinct paths classified
    pub fn total(&self) -> usize {
        self.added.len() + self.removed.len() + self.modified.len() + self.unchanged.len()
    }
}

/// Compare two fingerprint maps
///
/// Pure and total: every pair of maps, empty ones included, yields a result.
pub fn diff(source: &FingerprintMap, target: &FingerprintMap) -> DiffResult {
    let mut result = DiffResult::default();

    // BTreeMap iteration is ordered, so every list comes out sorted
    for (path, source_digest) in source {
        match target.get(path) {
            None => result.added.push(path.clone()),
            Some(target_digest) if target_digest == source_digest => {
                result.unchanged.push(path.clone())
            }
            Some(_) => result.modified.push(path.clone()),
        }
    }
    for path in target.keys() {
        if !source.contains_key(path) {
            result.removed.push(path.clone());
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    fn map(entries: &[(&str, &str)]) -> FingerprintMap {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn keys(list: &[String]) -> BTreeSet<&str> {
        list.iter().map(String::as_str).collect()
    }

    fn assert_partition(source: &FingerprintMap, target: &FingerprintMap) {
        let d = diff(source, target);

        let source_side: BTreeSet<&str> = keys(&d.added)
            .union(&keys(&d.modified))
            .copied()
            .chain(keys(&d.unchanged))
            .collect();
        let target_side: BTreeSet<&str> = keys(&d.removed)
            .union(&keys(&d.modified))
            .copied()
            .chain(keys(&d.unchanged))
            .collect();
        assert_eq!(source_side, source.keys().map(String::as_str).collect::<BTreeSet<_>>());
        assert_eq!(target_side, target.keys().map(String::as_str).collect::<BTreeSet<_>>());

        let lists = [&d.added, &d.removed, &d.modified, &d.unchanged];
        for (i, a) in lists.iter().enumerate() {
            for b in lists.iter().skip(i + 1) {
                assert!(keys(a).is_disjoint(&keys(b)));
            }
        }

        let union: BTreeSet<&str> = source.keys().chain(target.keys()).map(String::as_str).collect();
        assert_eq!(d.total(), union.len());
    }

    #[test]
    fn classifies_each_category() {
        let source = map(&[("a", "1"), ("b", "2"), ("c", "3")]);
        let target = map(&[("b", "2"), ("c", "9"), ("d", "4")]);

        let d = diff(&source, &target);
        assert_eq!(d.added, vec!["a"]);
        assert_eq!(d.removed, vec!["d"]);
        assert_eq!(d.modified, vec!["c"]);
        assert_eq!(d.unchanged, vec!["b"]);
        assert!(!d.is_identical());
        assert_eq!(d.to_copy(), vec!["a", "c"]);
    }

    #[test]
    fn partition_holds() {
        let cases = [
            (map(&[]), map(&[])),
            (map(&[("x", "1")]), map(&[])),
            (map(&[]), map(&[("x", "1")])),
            (
                map(&[("a", "1"), ("b", "2"), ("dir/c", "3")]),
                map(&[("a", "1"), ("b", "x"), ("dir/d", "4")]),
            ),
        ];
        for (source, target) in &cases {
            assert_partition(source, target);
        }
    }

    #[test]
    fn identity() {
        for m in [map(&[]), map(&[("a", "1"), ("sub/b", "2")])] {
            let d = diff(&m, &m);
            assert!(d.added.is_empty());
            assert!(d.removed.is_empty());
            assert!(d.modified.is_empty());
            assert_eq!(d.unchanged, m.keys().cloned().collect::<Vec<_>>());
            assert!(d.is_identical());
        }
    }

    #[test]
    fn output_is_sorted() {
        let source = map(&[("z", "1"), ("m", "1"), ("a", "1")]);
        let d = diff(&source, &map(&[]));
        assert_eq!(d.added, vec!["a", "m", "z"]);
    }
}
