//! K-mer seed index over a protein collection.
//!
//! The tree indexes every window of `seed_len` residues of every protein and
//! serves occurrence queries for longer seeds by verifying the remainder
//! against the protein sequence. Queries take `&self` and are safe to issue
//! from many threads; the only mutable state is the postings cache, which is
//! lock-protected and can be shrunk on demand under memory pressure.

use crate::cache::BoundedCache;
use crate::errors::{
    Result,
    SeqTreeError,
};
use crate::masses::residue_mass;
use crate::matching::{
    expansions,
    MatchingKind,
    SequenceMatching,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeConfig {
    pub seed_len: usize,
    pub cache_capacity: usize,
    pub decoy_suffix: String,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            seed_len: 3,
            cache_capacity: 10_000,
            decoy_suffix: "_REVERSED".to_string(),
        }
    }
}

/// One position of one protein.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occurrence {
    pub protein: usize,
    pub position: usize,
}

#[derive(Debug)]
struct Protein {
    accession: String,
    sequence: Arc<str>,
    decoy: bool,
}

#[derive(Debug)]
pub struct SequenceTree {
    proteins: Vec<Protein>,
    seed_len: usize,
    seeds: HashMap<String, Vec<Occurrence>>,
    cache: BoundedCache<Vec<Occurrence>>,
}

impl SequenceTree {
    /// Builds the index from `(accession, sequence)` pairs.
    ///
    /// Accessions ending with the configured decoy suffix are marked as
    /// decoy proteins.
    pub fn build(entries: Vec<(String, String)>, config: TreeConfig) -> Result<Self> {
        if entries.is_empty() {
            return Err(SeqTreeError::EmptyDatabase);
        }
        let mut proteins = Vec::with_capacity(entries.len());
        for (accession, sequence) in entries {
            for (position, residue) in sequence.chars().enumerate() {
                if residue_mass(residue).is_none() && expansions(residue).is_empty() {
                    return Err(SeqTreeError::InvalidResidue {
                        accession,
                        residue,
                        position,
                    });
                }
            }
            let decoy = accession.ends_with(&config.decoy_suffix);
            proteins.push(Protein {
                accession,
                sequence: sequence.into(),
                decoy,
            });
        }

        let mut seeds: HashMap<String, Vec<Occurrence>> = HashMap::new();
        for (protein, entry) in proteins.iter().enumerate() {
            let residues: Vec<char> = entry.sequence.chars().collect();
            if residues.len() < config.seed_len {
                continue;
            }
            for position in 0..=(residues.len() - config.seed_len) {
                let key: String = residues[position..position + config.seed_len]
                    .iter()
                    .collect();
                seeds
                    .entry(key)
                    .or_default()
                    .push(Occurrence { protein, position });
            }
        }
        debug!(
            n_proteins = proteins.len(),
            n_seeds = seeds.len(),
            "Sequence tree built"
        );

        Ok(Self {
            proteins,
            seed_len: config.seed_len,
            seeds,
            cache: BoundedCache::new(config.cache_capacity),
        })
    }

    pub fn n_proteins(&self) -> usize {
        self.proteins.len()
    }

    pub fn seed_len(&self) -> usize {
        self.seed_len
    }

    pub fn accession(&self, protein: usize) -> &str {
        &self.proteins[protein].accession
    }

    pub fn is_decoy(&self, protein: usize) -> bool {
        self.proteins[protein].decoy
    }

    pub fn sequence(&self, protein: usize) -> &str {
        &self.proteins[protein].sequence
    }

    /// Index of the protein carrying the given accession, if any.
    pub fn protein_by_accession(&self, accession: &str) -> Option<usize> {
        self.proteins.iter().position(|p| p.accession == accession)
    }

    /// All occurrences of a seed under the given matching preferences.
    ///
    /// Seeds shorter than `seed_len` fall back to a linear scan; longer seeds
    /// use the k-mer postings for the first `seed_len` residues and verify
    /// the remainder in place. Results are served through the bounded cache.
    pub fn seed_occurrences(
        &self,
        seed: &str,
        matching: &SequenceMatching,
    ) -> Arc<Vec<Occurrence>> {
        let cache_key = format!("{:?}|{}", matching.kind, seed);
        if let Some(hit) = self.cache.get(&cache_key) {
            return hit;
        }
        let result = Arc::new(self.find_occurrences(seed, matching));
        self.cache.insert(cache_key, result.clone());
        result
    }

    fn find_occurrences(&self, seed: &str, matching: &SequenceMatching) -> Vec<Occurrence> {
        let query: Vec<char> = seed.chars().collect();
        if query.is_empty() {
            return Vec::new();
        }
        if query.len() < self.seed_len {
            return self.scan_occurrences(&query, matching);
        }

        let mut candidates: Vec<Occurrence> = Vec::new();
        let mut keys = vec![String::new()];
        for &residue in query[..self.seed_len].iter() {
            let options = concrete_candidates(residue, matching.kind);
            let mut next = Vec::with_capacity(keys.len() * options.len());
            for key in keys.iter() {
                for &option in options.iter() {
                    let mut extended = key.clone();
                    extended.push(option);
                    next.push(extended);
                }
            }
            keys = next;
        }
        for key in keys {
            if let Some(postings) = self.seeds.get(&key) {
                candidates.extend_from_slice(postings);
            }
        }

        candidates.retain(|occ| self.verify_tail(occ, &query, matching));
        candidates.sort_by_key(|occ| (occ.protein, occ.position));
        candidates.dedup();
        candidates
    }

    fn verify_tail(&self, occ: &Occurrence, query: &[char], matching: &SequenceMatching) -> bool {
        let sequence = self.proteins[occ.protein].sequence.as_bytes();
        if occ.position + query.len() > sequence.len() {
            return false;
        }
        query
            .iter()
            .enumerate()
            .skip(self.seed_len)
            .all(|(offset, &residue)| {
                matching.residues_match(residue, sequence[occ.position + offset] as char)
            })
    }

    fn scan_occurrences(&self, query: &[char], matching: &SequenceMatching) -> Vec<Occurrence> {
        let mut result = Vec::new();
        for (protein, entry) in self.proteins.iter().enumerate() {
            let sequence = entry.sequence.as_bytes();
            if sequence.len() < query.len() {
                continue;
            }
            for position in 0..=(sequence.len() - query.len()) {
                let matched = query.iter().enumerate().all(|(offset, &residue)| {
                    matching.residues_match(residue, sequence[position + offset] as char)
                });
                if matched {
                    result.push(Occurrence { protein, position });
                }
            }
        }
        result
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Drops a share of the postings cache. Safe to call from any thread at
    /// any time; repeated calls simply shrink further.
    pub fn reduce_cache_size(&self, share: f64) {
        debug!(share, cached = self.cache.len(), "Reducing postings cache");
        self.cache.reduce(share);
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

/// The concrete database residues a query residue can start a k-mer with.
fn concrete_candidates(residue: char, kind: MatchingKind) -> Vec<char> {
    match kind {
        MatchingKind::String => vec![residue],
        MatchingKind::AminoAcid => expansions(residue).to_vec(),
        MatchingKind::IndistinguishableAminoAcids => {
            let mut options = expansions(residue).to_vec();
            if residue == 'I' || residue == 'L' {
                options = vec!['I', 'L'];
            }
            options
        }
    }
}
