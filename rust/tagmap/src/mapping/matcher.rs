//! Tag to peptide mapping against the sequence index.
//!
//! A matcher seeds on the longest literal residue run of a tag, pulls the
//! run's occurrences from the index, then walks the remaining components
//! outward at every occurrence: literal runs and patterns are compared
//! residue by residue, mass gaps are resolved depth-first against the
//! protein sequence within the fragment tolerance, fixed modifications
//! always counted and variable modifications tried per residue. Results
//! are deduplicated by peptide key and served through a lock-protected
//! per-tag cache that can be disabled and cleared under memory pressure.

use crate::models::modification::{
    ModificationMatch,
    ModificationProfile,
    ModificationRegistry,
};
use crate::models::tag::{
    Tag,
    TagComponent,
};
use crate::models::Peptide;
use seqtree::masses::residue_mass;
use seqtree::{
    SequenceMatching,
    SequenceTree,
};
use std::collections::HashMap;
use std::sync::atomic::{
    AtomicBool,
    Ordering,
};
use std::sync::{
    Arc,
    Mutex,
};
use tracing::trace;

/// One resolved stretch of tag components against a protein: its residue
/// length and the modification matches it carries, sites relative to the
/// stretch's own N-terminal end.
#[derive(Debug, Clone, Default)]
struct Segment {
    len: usize,
    mods: Vec<ModificationMatch>,
}

pub struct TagMatcher {
    fixed: Vec<String>,
    variable: Vec<String>,
    matching: SequenceMatching,
    registry: Arc<ModificationRegistry>,
    cache: Mutex<HashMap<String, Arc<Vec<Peptide>>>>,
    use_cache: AtomicBool,
}

impl TagMatcher {
    pub fn new(
        profile: &ModificationProfile,
        matching: SequenceMatching,
        registry: Arc<ModificationRegistry>,
    ) -> Self {
        Self {
            fixed: profile.fixed.clone(),
            variable: profile.variable.clone(),
            matching,
            registry,
            cache: Mutex::new(HashMap::new()),
            use_cache: AtomicBool::new(true),
        }
    }

    /// Maps a tag to peptides with their protein occurrences.
    ///
    /// Tags without a literal residue run cannot seed an index query and
    /// map to nothing.
    pub fn map_tag(&self, tag: &Tag, tree: &SequenceTree, tolerance: f64) -> Vec<Peptide> {
        let Some(run) = tag.longest_sequence_run() else {
            return Vec::new();
        };
        // Keyed on the tolerance too: gap resolution depends on it.
        let key = format!("{}|{}", tolerance, tag.as_key());
        if self.use_cache.load(Ordering::Relaxed) {
            if let Some(hit) = self.cache.lock().unwrap().get(&key) {
                return hit.as_ref().clone();
            }
        }

        let seed = match &tag.content[run] {
            TagComponent::Sequence(seq) => seq,
            _ => unreachable!("longest_sequence_run points at a sequence component"),
        };
        let seed_len = seed.len();
        let occurrences = tree.seed_occurrences(seed.residues(), &self.matching);
        trace!(tag = %key, n_occurrences = occurrences.len(), "Seed occurrences");

        let mut peptides: HashMap<String, Peptide> = HashMap::new();
        for occ in occurrences.iter() {
            let sequence: Vec<char> = tree.sequence(occ.protein).chars().collect();
            let lefts =
                self.extend_left(&tag.content[..run], &sequence, occ.position, tolerance);
            if lefts.is_empty() {
                continue;
            }
            let rights = self.extend_right(
                &tag.content[run + 1..],
                &sequence,
                occ.position + seed_len,
                tolerance,
            );
            for left in lefts.iter() {
                for right in rights.iter() {
                    let start = occ.position - left.len;
                    let end = occ.position + seed_len + right.len;
                    let residues: String = sequence[start..end].iter().collect();
                    if !self.matching.accepts_x_share(&residues) {
                        continue;
                    }
                    let mut modifications: Vec<ModificationMatch> = Vec::new();
                    modifications.extend(left.mods.iter().cloned());
                    for (site, matches) in seed.modifications().iter() {
                        for m in matches {
                            modifications.push(ModificationMatch {
                                name: m.name.clone(),
                                variable: m.variable,
                                site: left.len + site,
                            });
                        }
                    }
                    for m in right.mods.iter() {
                        modifications.push(ModificationMatch {
                            name: m.name.clone(),
                            variable: m.variable,
                            site: left.len + seed_len + m.site,
                        });
                    }
                    for (site, residue) in residues.chars().enumerate() {
                        for name in self.fixed.iter() {
                            if self.targets(name, residue) {
                                modifications.push(ModificationMatch::fixed(name.clone(), site));
                            }
                        }
                    }

                    let mut peptide = Peptide::new(residues);
                    peptide.modifications = modifications;
                    let peptide_key = peptide.key();
                    peptides
                        .entry(peptide_key)
                        .or_insert(peptide)
                        .add_occurrence(tree.accession(occ.protein).to_string(), start);
                }
            }
        }

        let mut result: Vec<Peptide> = peptides.into_values().collect();
        result.sort_by(|a, b| a.key().cmp(&b.key()));
        if self.use_cache.load(Ordering::Relaxed) {
            self.cache
                .lock()
                .unwrap()
                .insert(key, Arc::new(result.clone()));
        }
        result
    }

    /// Resolves the components right of the seed starting at `start`.
    fn extend_right(
        &self,
        components: &[TagComponent],
        sequence: &[char],
        start: usize,
        tolerance: f64,
    ) -> Vec<Segment> {
        let Some((component, rest)) = components.split_first() else {
            return vec![Segment::default()];
        };
        let mut out = Vec::new();
        match component {
            TagComponent::Sequence(seq) => {
                let len = seq.len();
                if start + len > sequence.len() {
                    return out;
                }
                let matched = seq
                    .residues()
                    .chars()
                    .enumerate()
                    .all(|(i, q)| self.matching.residues_match(q, sequence[start + i]));
                if !matched {
                    return out;
                }
                let own: Vec<ModificationMatch> = seq
                    .modifications()
                    .values()
                    .flatten()
                    .cloned()
                    .collect();
                for inner in self.extend_right(rest, sequence, start + len, tolerance) {
                    out.push(join_right(&own, len, inner));
                }
            }
            TagComponent::Pattern(pattern) => {
                let len = pattern.len();
                if start + len > sequence.len() {
                    return out;
                }
                let matched = pattern.positions().iter().enumerate().all(|(i, candidates)| {
                    candidates
                        .iter()
                        .any(|&q| self.matching.residues_match(q, sequence[start + i]))
                });
                if !matched {
                    return out;
                }
                let own: Vec<ModificationMatch> = pattern
                    .modifications()
                    .values()
                    .flatten()
                    .cloned()
                    .collect();
                for inner in self.extend_right(rest, sequence, start + len, tolerance) {
                    out.push(join_right(&own, len, inner));
                }
            }
            TagComponent::MassGap(gap) => {
                for (consumed, gap_mods) in
                    self.gap_splits_right(sequence, start, *gap, tolerance)
                {
                    for inner in self.extend_right(rest, sequence, start + consumed, tolerance) {
                        out.push(join_right(&gap_mods, consumed, inner));
                    }
                }
            }
        }
        out
    }

    /// Resolves the components left of the seed, ending at `end`. Segment
    /// modification sites come out relative to the segment's left end.
    fn extend_left(
        &self,
        components: &[TagComponent],
        sequence: &[char],
        end: usize,
        tolerance: f64,
    ) -> Vec<Segment> {
        let Some((component, rest)) = components.split_last() else {
            return vec![Segment::default()];
        };
        let mut out = Vec::new();
        match component {
            TagComponent::Sequence(seq) => {
                let len = seq.len();
                if end < len {
                    return out;
                }
                let base = end - len;
                let matched = seq
                    .residues()
                    .chars()
                    .enumerate()
                    .all(|(i, q)| self.matching.residues_match(q, sequence[base + i]));
                if !matched {
                    return out;
                }
                let own: Vec<ModificationMatch> = seq
                    .modifications()
                    .values()
                    .flatten()
                    .cloned()
                    .collect();
                for inner in self.extend_left(rest, sequence, base, tolerance) {
                    out.push(join_left(inner, &own, len));
                }
            }
            TagComponent::Pattern(pattern) => {
                let len = pattern.len();
                if end < len {
                    return out;
                }
                let base = end - len;
                let matched = pattern.positions().iter().enumerate().all(|(i, candidates)| {
                    candidates
                        .iter()
                        .any(|&q| self.matching.residues_match(q, sequence[base + i]))
                });
                if !matched {
                    return out;
                }
                let own: Vec<ModificationMatch> = pattern
                    .modifications()
                    .values()
                    .flatten()
                    .cloned()
                    .collect();
                for inner in self.extend_left(rest, sequence, base, tolerance) {
                    out.push(join_left(inner, &own, len));
                }
            }
            TagComponent::MassGap(gap) => {
                for (consumed, gap_mods) in self.gap_splits_left(sequence, end, *gap, tolerance)
                {
                    for inner in self.extend_left(rest, sequence, end - consumed, tolerance) {
                        out.push(join_left(inner, &gap_mods, consumed));
                    }
                }
            }
        }
        out
    }

    /// Ways a mass gap can be explained by residues right of `start`.
    /// Each split is `(consumed length, chosen variable modifications)`
    /// with sites relative to the gap's first residue.
    fn gap_splits_right(
        &self,
        sequence: &[char],
        start: usize,
        gap: f64,
        tolerance: f64,
    ) -> Vec<(usize, Vec<ModificationMatch>)> {
        let mut out = Vec::new();
        let mut chosen = Vec::new();
        self.descend_right(sequence, start, 0, gap, tolerance, &mut chosen, &mut out);
        out
    }

    #[allow(clippy::too_many_arguments)]
    fn descend_right(
        &self,
        sequence: &[char],
        start: usize,
        consumed: usize,
        remaining: f64,
        tolerance: f64,
        chosen: &mut Vec<ModificationMatch>,
        out: &mut Vec<(usize, Vec<ModificationMatch>)>,
    ) {
        if remaining.abs() <= tolerance {
            out.push((consumed, chosen.clone()));
            return;
        }
        if remaining < -tolerance || start + consumed >= sequence.len() {
            return;
        }
        let residue = sequence[start + consumed];
        let base = self.gap_residue_mass(residue);
        self.descend_right(
            sequence,
            start,
            consumed + 1,
            remaining - base,
            tolerance,
            chosen,
            out,
        );
        for (name, mass) in self.variable_options(residue) {
            chosen.push(ModificationMatch::variable(name, consumed));
            self.descend_right(
                sequence,
                start,
                consumed + 1,
                remaining - base - mass,
                tolerance,
                chosen,
                out,
            );
            chosen.pop();
        }
    }

    /// Leftward counterpart of `gap_splits_right`, consuming residues from
    /// `end` toward the protein's N terminus.
    fn gap_splits_left(
        &self,
        sequence: &[char],
        end: usize,
        gap: f64,
        tolerance: f64,
    ) -> Vec<(usize, Vec<ModificationMatch>)> {
        let mut raw: Vec<(usize, Vec<(usize, String)>)> = Vec::new();
        let mut chosen = Vec::new();
        self.descend_left(sequence, end, 0, gap, tolerance, &mut chosen, &mut raw);
        raw.into_iter()
            .map(|(consumed, picks)| {
                let mods = picks
                    .into_iter()
                    .map(|(distance, name)| {
                        ModificationMatch::variable(name, consumed - distance)
                    })
                    .collect();
                (consumed, mods)
            })
            .collect()
    }

    #[allow(clippy::too_many_arguments)]
    fn descend_left(
        &self,
        sequence: &[char],
        end: usize,
        consumed: usize,
        remaining: f64,
        tolerance: f64,
        chosen: &mut Vec<(usize, String)>,
        out: &mut Vec<(usize, Vec<(usize, String)>)>,
    ) {
        if remaining.abs() <= tolerance {
            out.push((consumed, chosen.clone()));
            return;
        }
        if remaining < -tolerance || consumed >= end {
            return;
        }
        let residue = sequence[end - consumed - 1];
        let base = self.gap_residue_mass(residue);
        self.descend_left(
            sequence,
            end,
            consumed + 1,
            remaining - base,
            tolerance,
            chosen,
            out,
        );
        for (name, mass) in self.variable_options(residue) {
            chosen.push((consumed + 1, name));
            self.descend_left(
                sequence,
                end,
                consumed + 1,
                remaining - base - mass,
                tolerance,
                chosen,
                out,
            );
            chosen.pop();
        }
    }

    /// Residue mass as seen inside a gap: fixed modifications always apply.
    fn gap_residue_mass(&self, residue: char) -> f64 {
        let mut mass = residue_mass(residue).unwrap_or(0.0);
        for name in self.fixed.iter() {
            if self.targets(name, residue) {
                mass += self.registry.mass(name).unwrap_or(0.0);
            }
        }
        mass
    }

    fn variable_options(&self, residue: char) -> Vec<(String, f64)> {
        self.variable
            .iter()
            .filter(|name| self.targets(name, residue))
            .filter_map(|name| self.registry.mass(name).map(|mass| (name.clone(), mass)))
            .collect()
    }

    fn targets(&self, name: &str, residue: char) -> bool {
        self.registry
            .get(name)
            .map(|d| d.targets.contains(&residue))
            .unwrap_or(false)
    }

    pub fn set_use_cache(&self, enabled: bool) {
        self.use_cache.store(enabled, Ordering::Relaxed);
    }

    pub fn clear_cache(&self) {
        self.cache.lock().unwrap().clear();
    }

    pub fn cache_len(&self) -> usize {
        self.cache.lock().unwrap().len()
    }
}

/// Prepends a component's own modifications to an inner right segment.
fn join_right(own: &[ModificationMatch], len: usize, inner: Segment) -> Segment {
    let mut mods: Vec<ModificationMatch> = own.to_vec();
    for m in inner.mods {
        mods.push(ModificationMatch {
            name: m.name,
            variable: m.variable,
            site: m.site + len,
        });
    }
    Segment {
        len: len + inner.len,
        mods,
    }
}

/// Appends a component after an inner left segment, shifting its sites past
/// the inner length.
fn join_left(inner: Segment, own: &[ModificationMatch], len: usize) -> Segment {
    let mut mods = inner.mods;
    for m in own {
        mods.push(ModificationMatch {
            name: m.name.clone(),
            variable: m.variable,
            site: inner.len + m.site,
        });
    }
    Segment {
        len: inner.len + len,
        mods,
    }
}
