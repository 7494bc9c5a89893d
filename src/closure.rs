//! Ancestor closure over a dot-separated hierarchy, such as MeSH tree numbers

use crate::melt::Row;
use std::collections::{BTreeMap, HashMap};

/// Min and max distance between an ancestor and a descendant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairInfo {
    pub ancestor_id: String,
    pub descendant_id: String,
    pub min_distance: usize,
    pub max_distance: usize,
}

impl PairInfo {
    pub fn to_row(&self, table: &str) -> Row {
        Row::new(table)
            .with("ancestor_ui", self.ancestor_id.as_str())
            .with("descendant_ui", self.descendant_id.as_str())
            .with("min_distance", self.min_distance.to_string())
            .with("max_distance", self.max_distance.to_string())
    }
}

/// Every (descendant, ancestor) pair implied by a forest of paths.
///
/// `path_to_id` maps paths like `A01.236.500` to the identifier of the node at
/// that path. Several paths may share an identifier; their pairs are merged
/// with a running min/max distance. Self-pairs at distance 0 are included, and a
/// prefix that maps to no identifier contributes nothing. Output is sorted by
/// (descendant, ancestor) whatever the map's iteration order.
pub fn build_closure(path_to_id: &HashMap<String, String>) -> Vec<PairInfo> {
    let mut pairs: BTreeMap<(&str, &str), (usize, usize)> = BTreeMap::new();

    for (path, descendant) in path_to_id {
        let depth = path.split('.').count();
        let ends = path
            .match_indices('.')
            .map(|(i, _)| i)
            .chain(std::iter::once(path.len()));

        for (segments, end) in ends.enumerate() {
            let Some(ancestor) = path_to_id.get(&path[..end]) else {
                continue;
            };
            let distance = depth - segments - 1;
            pairs
                .entry((descendant.as_str(), ancestor.as_str()))
                .and_modify(|(min, max)| {
                    *min = (*min).min(distance);
                    *max = (*max).max(distance);
                })
                .or_insert((distance, distance));
        }
    }

    pairs
        .into_iter()
        .map(|((descendant, ancestor), (min, max))| PairInfo {
            ancestor_id: ancestor.to_string(),
            descendant_id: descendant.to_string(),
            min_distance: min,
            max_distance: max,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn forest(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|(p, id)| (p.to_string(), id.to_string()))
            .collect()
    }

    fn pair<'a>(closure: &'a [PairInfo], descendant: &str, ancestor: &str) -> Option<&'a PairInfo> {
        closure
            .iter()
            .find(|p| p.descendant_id == descendant && p.ancestor_id == ancestor)
    }

    #[test]
    fn test_chain_with_self_pairs() {
        let closure = build_closure(&forest(&[("A", "x"), ("A.B", "y"), ("A.B.C", "z")]));
        assert_eq!(closure.len(), 6);
        assert_eq!(pair(&closure, "y", "x").unwrap().min_distance, 1);
        assert_eq!(pair(&closure, "z", "x").unwrap().min_distance, 2);
        assert_eq!(pair(&closure, "z", "y").unwrap().max_distance, 1);
        for id in ["x", "y", "z"] {
            assert_eq!(pair(&closure, id, id).unwrap().max_distance, 0);
        }
    }

    #[test]
    fn test_shared_identifier_merges_distances() {
        let closure = build_closure(&forest(&[
            ("A", "x"),
            ("A.B", "y"),
            ("A.B.C", "z"),
            ("D", "w"),
            ("D.E", "w"),
            ("D.B.C", "z"),
        ]));
        let zw = pair(&closure, "z", "w").unwrap();
        assert_eq!((zw.min_distance, zw.max_distance), (2, 2));

        let ww = pair(&closure, "w", "w").unwrap();
        assert_eq!((ww.min_distance, ww.max_distance), (0, 1));
    }

    #[test]
    fn test_unresolved_prefix_is_skipped() {
        let closure = build_closure(&forest(&[("A", "x"), ("A.B.C", "z")]));
        assert_eq!(closure.len(), 3);
        assert_eq!(pair(&closure, "z", "x").unwrap().min_distance, 2);
    }

    #[test]
    fn test_to_row() {
        let row = PairInfo {
            ancestor_id: "D1".into(),
            descendant_id: "D2".into(),
            min_distance: 1,
            max_distance: 3,
        }
        .to_row("mesh_ancestor");
        assert_eq!(row.get("ancestor_ui"), Some("D1"));
        assert_eq!(row.get("max_distance"), Some("3"));
    }

    proptest! {
        #[test]
        fn prop_insertion_order_does_not_matter(
            paths in prop::collection::vec(
                (prop::collection::vec(0u8..3, 1..5), 0u8..4),
                1..20,
            )
        ) {
            let entries: Vec<(String, String)> = paths
                .iter()
                .map(|(segments, id)| {
                    let path: Vec<String> = segments.iter().map(|s| s.to_string()).collect();
                    (path.join("."), format!("id{}", id))
                })
                .collect();

            let unique: BTreeMap<String, String> = entries.into_iter().collect();
            let forward: HashMap<String, String> =
                unique.iter().map(|(p, id)| (p.clone(), id.clone())).collect();
            let backward: HashMap<String, String> =
                unique.iter().rev().map(|(p, id)| (p.clone(), id.clone())).collect();

            prop_assert_eq!(build_closure(&forward), build_closure(&backward));
        }
    }
}
