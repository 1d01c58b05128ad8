//! Flat adjacency structure over related lemmas.
//!
//! Edges are resolved from lemma strings to integer item ids once at build
//! time; lookups afterwards are index reads with no string hashing.

use std::collections::HashMap;

use super::VocabEntry;

#[derive(Debug, Clone, Default)]
pub struct WordGraph {
    synonyms: Vec<Vec<u32>>,
    antonyms: Vec<Vec<u32>>,
    siblings: Vec<Vec<u32>>,
}

impl WordGraph {
    pub fn build(entries: &[VocabEntry]) -> Self {
        let by_lemma: HashMap<String, u32> = entries
            .iter()
            .enumerate()
            .map(|(id, entry)| (entry.lemma.to_lowercase(), id as u32))
            .collect();

        let resolve = |lemmas: &[String]| -> Vec<u32> {
            let mut ids: Vec<u32> = lemmas
                .iter()
                .filter_map(|lemma| by_lemma.get(&lemma.to_lowercase()).copied())
                .collect();
            ids.sort_unstable();
            ids.dedup();
            ids
        };

        let synonyms: Vec<Vec<u32>> = entries.iter().map(|e| resolve(&e.synonyms)).collect();
        let antonyms: Vec<Vec<u32>> = entries.iter().map(|e| resolve(&e.antonyms)).collect();

        // Siblings share at least one hypernym.
        let mut members: HashMap<&str, Vec<u32>> = HashMap::new();
        for (id, entry) in entries.iter().enumerate() {
            for hypernym in &entry.hypernyms {
                members.entry(hypernym.as_str()).or_default().push(id as u32);
            }
        }
        let mut siblings: Vec<Vec<u32>> = vec![Vec::new(); entries.len()];
        for group in members.values() {
            if group.len() < 2 {
                continue;
            }
            for &id in group {
                let list = &mut siblings[id as usize];
                list.extend(group.iter().copied().filter(|&other| other != id));
            }
        }
        for list in &mut siblings {
            list.sort_unstable();
            list.dedup();
        }

        Self {
            synonyms,
            antonyms,
            siblings,
        }
    }

    pub fn synonyms_of(&self, id: u32) -> &[u32] {
        self.synonyms.get(id as usize).map_or(&[], Vec::as_slice)
    }

    pub fn antonyms_of(&self, id: u32) -> &[u32] {
        self.antonyms.get(id as usize).map_or(&[], Vec::as_slice)
    }

    pub fn siblings_of(&self, id: u32) -> &[u32] {
        self.siblings.get(id as usize).map_or(&[], Vec::as_slice)
    }

    pub fn is_synonym_pair(&self, lhs: u32, rhs: u32) -> bool {
        self.synonyms_of(lhs).contains(&rhs) || self.synonyms_of(rhs).contains(&lhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::ItemBank;

    #[test]
    fn graph_resolves_lemma_edges() {
        let bank = ItemBank::synthetic(100, 5);
        let graph = bank.graph();
        // Synthetic entries link synonyms at fixed offsets, so the first
        // item has resolvable neighbors.
        assert!(!graph.synonyms_of(0).is_empty());
        assert!(!graph.antonyms_of(0).is_empty());
    }

    #[test]
    fn siblings_exclude_self_and_are_symmetric() {
        let bank = ItemBank::synthetic(100, 5);
        let graph = bank.graph();
        for id in 0..bank.len() as u32 {
            for &sibling in graph.siblings_of(id) {
                assert_ne!(sibling, id);
                assert!(graph.siblings_of(sibling).contains(&id));
            }
        }
    }
}
