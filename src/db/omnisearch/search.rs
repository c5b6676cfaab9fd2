use std::collections::HashMap;
use std::hash::Hash;

use super::index::{generate_trigrams, TrigramIndex};

/// One search result: a record key and how many of the query's trigrams its
/// indexed text contained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit<K> {
    pub key: K,
    pub hits: usize,
}

/// Count, for every indexed key, how many of the query's trigrams hit it.
///
/// Results come back ordered by hit count descending; ties keep an arbitrary
/// but stable order only after the caller applies its own tie-break, so
/// callers that care about determinism should re-sort (the record sets rank
/// ties by edit distance and key).
pub fn search<K: Clone + Eq + Hash + Ord>(query: &str, index: &TrigramIndex<K>) -> Vec<SearchHit<K>> {
    let mut counts: HashMap<K, usize> = HashMap::new();

    for trigram in generate_trigrams(query) {
        if let Some(keys) = index.lookup(&trigram) {
            for key in keys {
                *counts.entry(key.clone()).or_insert(0) += 1;
            }
        }
    }

    let mut results: Vec<SearchHit<K>> = counts
        .into_iter()
        .map(|(key, hits)| SearchHit { key, hits })
        .collect();
    results.sort_by(|a, b| b.hits.cmp(&a.hits).then_with(|| a.key.cmp(&b.key)));
    results
}

/// Edit distance with adjacent transpositions (optimal string alignment).
/// Used to rank results whose trigram hit counts tie: the candidate whose
/// indexed text sits closer to the query wins.
pub fn edit_distance(first: &str, second: &str) -> usize {
    let a: Vec<char> = first.chars().collect();
    let b: Vec<char> = second.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    // Rolling three rows of the distance matrix; the oldest row is only
    // needed for the transposition case.
    let mut two_ago: Vec<usize> = vec![0; b.len() + 1];
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut current: Vec<usize> = vec![0; b.len() + 1];

    for i in 1..=a.len() {
        current[0] = i;
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            let mut best = (prev[j] + 1)
                .min(current[j - 1] + 1)
                .min(prev[j - 1] + cost);
            if i > 1 && j > 1 && a[i - 1] == b[j - 2] && a[i - 2] == b[j - 1] {
                best = best.min(two_ago[j - 2] + 1);
            }
            current[j] = best;
        }
        std::mem::swap(&mut two_ago, &mut prev);
        std::mem::swap(&mut prev, &mut current);
    }

    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_of(entries: &[(&str, u32)]) -> TrigramIndex<u32> {
        let mut index = TrigramIndex::new();
        for (text, key) in entries {
            index.add(text, *key);
        }
        index
    }

    #[test]
    fn full_match_outranks_partial_match() {
        let index = index_of(&[("the rust programming language", 1), ("rust in action", 2), ("java basics", 3)]);

        let results = search("rust programming", &index);
        assert_eq!(results[0].key, 1);
        assert!(results.iter().any(|hit| hit.key == 2));
        assert!(results.iter().all(|hit| hit.key != 3));
    }

    #[test]
    fn no_hits_for_unrelated_query() {
        let index = index_of(&[("the rust programming language", 1)]);
        assert!(search("cobol", &index).is_empty());
    }

    #[test]
    fn query_casing_does_not_matter() {
        let index = index_of(&[("The Rust Programming Language", 1)]);
        assert_eq!(search("RUST", &index).len(), 1);
    }

    #[test]
    fn edit_distance_basics() {
        assert_eq!(edit_distance("", ""), 0);
        assert_eq!(edit_distance("rust", "rust"), 0);
        assert_eq!(edit_distance("rust", ""), 4);
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        // One adjacent transposition counts as a single edit.
        assert_eq!(edit_distance("rust", "rsut"), 1);
    }
}
