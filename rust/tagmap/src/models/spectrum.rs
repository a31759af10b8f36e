//! Spectra and spectrum matches.

use crate::models::advocate::Advocate;
use crate::models::assumption::{
    PeptideAssumption,
    TagAssumption,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::collections::BTreeMap;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    pub mz: f64,
    pub intensity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spectrum {
    pub precursor_mz: f64,
    pub peaks: Vec<Peak>,
}

impl Spectrum {
    pub fn new(precursor_mz: f64, peaks: Vec<Peak>) -> Self {
        Self { precursor_mz, peaks }
    }

    /// Whether any peak lies within `tolerance` of the queried m/z.
    pub fn has_peak_at(&self, mz: f64, tolerance: f64) -> bool {
        self.peaks.iter().any(|p| (p.mz - mz).abs() <= tolerance)
    }
}

/// Read access to the spectra of a run, shared across mapping workers.
///
/// Replaces a global spectrum factory: built once, passed by shared
/// reference into the scheduler.
pub trait SpectrumSource: Send + Sync {
    fn spectrum(&self, key: &str) -> Option<&Spectrum>;
}

#[derive(Debug, Default)]
pub struct InMemorySpectra {
    spectra: HashMap<String, Spectrum>,
}

impl InMemorySpectra {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, spectrum: Spectrum) {
        self.spectra.insert(key.into(), spectrum);
    }

    pub fn len(&self) -> usize {
        self.spectra.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spectra.is_empty()
    }
}

impl SpectrumSource for InMemorySpectra {
    fn spectrum(&self, key: &str) -> Option<&Spectrum> {
        self.spectra.get(key)
    }
}

/// One spectrum with its tag assumptions and the peptide hits accumulated
/// during mapping.
///
/// A match is only ever mutated by the single worker owning it; the
/// scheduler's partitioning guarantees that.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpectrumMatch {
    pub key: String,
    tag_assumptions: BTreeMap<i32, Vec<TagAssumption>>,
    peptide_hits: BTreeMap<i32, Vec<PeptideAssumption>>,
    pub best_assumption: Option<PeptideAssumption>,
}

impl SpectrumMatch {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Default::default()
        }
    }

    pub fn add_tag_assumption(&mut self, assumption: TagAssumption) {
        self.tag_assumptions
            .entry(assumption.advocate.id())
            .or_default()
            .push(assumption);
    }

    pub fn tag_assumptions(&self) -> &BTreeMap<i32, Vec<TagAssumption>> {
        &self.tag_assumptions
    }

    /// Appends a hit unless a peptide with the same key is already recorded
    /// for this advocate. Returns whether the hit was new.
    pub fn add_hit(&mut self, advocate: Advocate, assumption: PeptideAssumption) -> bool {
        let hits = self.peptide_hits.entry(advocate.id()).or_default();
        let peptide_key = assumption.peptide.key();
        if hits.iter().any(|h| h.peptide.key() == peptide_key) {
            return false;
        }
        hits.push(assumption);
        true
    }

    pub fn hits(&self, advocate: Advocate) -> &[PeptideAssumption] {
        self.peptide_hits
            .get(&advocate.id())
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn all_hits(&self) -> impl Iterator<Item = &PeptideAssumption> {
        self.peptide_hits.values().flatten()
    }

    pub fn n_hits(&self) -> usize {
        self.peptide_hits.values().map(|v| v.len()).sum()
    }

    /// Composition key of the best-scoring tag assumption; used to group
    /// matches into scheduler work units.
    pub fn composition_key(&self, key_size: usize, indistinguishable: bool) -> Option<String> {
        self.tag_assumptions
            .values()
            .flatten()
            .max_by(|a, b| a.score.total_cmp(&b.score))
            .and_then(|a| a.tag.composition_key(key_size, indistinguishable))
    }

    /// Elects the best peptide assumption by score, peptide key breaking
    /// ties so the choice is order-independent.
    pub fn elect_best_assumption(&mut self) {
        self.best_assumption = self
            .all_hits()
            .max_by(|a, b| {
                a.score
                    .total_cmp(&b.score)
                    .then_with(|| b.peptide.key().cmp(&a.peptide.key()))
            })
            .cloned();
    }
}
