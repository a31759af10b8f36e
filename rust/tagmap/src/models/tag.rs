//! De novo sequence tags.
//!
//! A tag is an ordered run of components: literal residue runs, pattern
//! runs (positions carrying several candidate residues), and mass gaps.
//! Tags come out of the upstream sequencing algorithm and are owned by a
//! spectrum match.

use crate::models::modification::{
    ModificationMatch,
    ModificationRegistry,
};
use seqtree::masses::{
    residue_mass,
    WATER,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::collections::BTreeMap;

/// A literal run of residues, possibly modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AminoAcidSequence {
    residues: String,
    modifications: BTreeMap<usize, Vec<ModificationMatch>>,
}

impl AminoAcidSequence {
    pub fn new(residues: impl Into<String>) -> Self {
        Self {
            residues: residues.into(),
            modifications: BTreeMap::new(),
        }
    }

    pub fn residues(&self) -> &str {
        &self.residues
    }

    pub fn len(&self) -> usize {
        self.residues.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.residues.is_empty()
    }

    pub fn add_modification(&mut self, modification: ModificationMatch) {
        self.modifications
            .entry(modification.site)
            .or_default()
            .push(modification);
    }

    pub fn modifications(&self) -> &BTreeMap<usize, Vec<ModificationMatch>> {
        &self.modifications
    }

    pub fn modifications_mut(&mut self) -> &mut BTreeMap<usize, Vec<ModificationMatch>> {
        &mut self.modifications
    }

    /// Rewrites the residue at a site; used when a remapped modification
    /// pins the site to its target residue.
    pub fn set_residue(&mut self, site: usize, residue: char) {
        let mut chars: Vec<char> = self.residues.chars().collect();
        if site < chars.len() {
            chars[site] = residue;
            self.residues = chars.into_iter().collect();
        }
    }

    pub fn mass(&self, registry: &ModificationRegistry) -> f64 {
        let residue_sum: f64 = self
            .residues
            .chars()
            .map(|aa| residue_mass(aa).unwrap_or(0.0))
            .sum();
        let modification_sum: f64 = self
            .modifications
            .values()
            .flatten()
            .map(|m| registry.mass(&m.name).unwrap_or(0.0))
            .sum();
        residue_sum + modification_sum
    }

    pub fn reversed(&self) -> Self {
        let len = self.len();
        let residues: String = self.residues.chars().rev().collect();
        let mut modifications: BTreeMap<usize, Vec<ModificationMatch>> = BTreeMap::new();
        for (site, matches) in self.modifications.iter() {
            let new_site = len - 1 - site;
            let remapped: Vec<ModificationMatch> = matches
                .iter()
                .map(|m| ModificationMatch {
                    name: m.name.clone(),
                    variable: m.variable,
                    site: new_site,
                })
                .collect();
            modifications.insert(new_site, remapped);
        }
        Self {
            residues,
            modifications,
        }
    }
}

/// A run where each position carries one or more candidate residues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AminoAcidPattern {
    positions: Vec<Vec<char>>,
    modifications: BTreeMap<usize, Vec<ModificationMatch>>,
}

impl AminoAcidPattern {
    pub fn new(positions: Vec<Vec<char>>) -> Self {
        Self {
            positions,
            modifications: BTreeMap::new(),
        }
    }

    pub fn positions(&self) -> &[Vec<char>] {
        &self.positions
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn add_modification(&mut self, modification: ModificationMatch) {
        self.modifications
            .entry(modification.site)
            .or_default()
            .push(modification);
    }

    pub fn modifications(&self) -> &BTreeMap<usize, Vec<ModificationMatch>> {
        &self.modifications
    }

    pub fn modifications_mut(&mut self) -> &mut BTreeMap<usize, Vec<ModificationMatch>> {
        &mut self.modifications
    }

    /// Restricts a position to the given candidate residues.
    pub fn set_targeted(&mut self, site: usize, residues: Vec<char>) {
        if site < self.positions.len() {
            self.positions[site] = residues;
        }
    }

    /// Pattern mass, taking the first candidate of every position.
    pub fn mass(&self, registry: &ModificationRegistry) -> f64 {
        let residue_sum: f64 = self
            .positions
            .iter()
            .map(|candidates| {
                candidates
                    .first()
                    .and_then(|&aa| residue_mass(aa))
                    .unwrap_or(0.0)
            })
            .sum();
        let modification_sum: f64 = self
            .modifications
            .values()
            .flatten()
            .map(|m| registry.mass(&m.name).unwrap_or(0.0))
            .sum();
        residue_sum + modification_sum
    }

    pub fn reversed(&self) -> Self {
        let len = self.len();
        let positions: Vec<Vec<char>> = self.positions.iter().rev().cloned().collect();
        let mut modifications: BTreeMap<usize, Vec<ModificationMatch>> = BTreeMap::new();
        for (site, matches) in self.modifications.iter() {
            let new_site = len - 1 - site;
            let remapped: Vec<ModificationMatch> = matches
                .iter()
                .map(|m| ModificationMatch {
                    name: m.name.clone(),
                    variable: m.variable,
                    site: new_site,
                })
                .collect();
            modifications.insert(new_site, remapped);
        }
        Self {
            positions,
            modifications,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TagComponent {
    Sequence(AminoAcidSequence),
    Pattern(AminoAcidPattern),
    MassGap(f64),
}

impl TagComponent {
    pub fn mass(&self, registry: &ModificationRegistry) -> f64 {
        match self {
            Self::Sequence(seq) => seq.mass(registry),
            Self::Pattern(pattern) => pattern.mass(registry),
            Self::MassGap(gap) => *gap,
        }
    }

    fn key_fragment(&self) -> String {
        match self {
            Self::Sequence(seq) => seq.residues().to_string(),
            Self::Pattern(pattern) => {
                let mut out = String::new();
                for candidates in pattern.positions() {
                    out.push('[');
                    for &aa in candidates {
                        out.push(aa);
                    }
                    out.push(']');
                }
                out
            }
            Self::MassGap(gap) => format!("<{:.4}>", gap),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Tag {
    pub content: Vec<TagComponent>,
}

impl Tag {
    pub fn new(content: Vec<TagComponent>) -> Self {
        Self { content }
    }

    /// Canonical string form used to deduplicate inspected tags.
    pub fn as_key(&self) -> String {
        self.content
            .iter()
            .map(|c| c.key_fragment())
            .collect::<Vec<_>>()
            .join("")
    }

    /// Neutral tag mass (residues, modifications, gaps, plus water).
    pub fn mass(&self, registry: &ModificationRegistry) -> f64 {
        WATER
            + self
                .content
                .iter()
                .map(|c| c.mass(registry))
                .sum::<f64>()
    }

    /// A tag can be reversed when no mass gap sits between two residue
    /// runs; an internal gap makes the reversed orientation ambiguous.
    pub fn can_reverse(&self) -> bool {
        if self.content.len() <= 2 {
            return true;
        }
        !self.content[1..self.content.len() - 1]
            .iter()
            .any(|c| matches!(c, TagComponent::MassGap(_)))
    }

    /// Reversed tag: component order flipped, residue runs flipped in
    /// place, modification sites remapped.
    pub fn reverse(&self) -> Self {
        let content = self
            .content
            .iter()
            .rev()
            .map(|c| match c {
                TagComponent::Sequence(seq) => TagComponent::Sequence(seq.reversed()),
                TagComponent::Pattern(pattern) => TagComponent::Pattern(pattern.reversed()),
                TagComponent::MassGap(gap) => TagComponent::MassGap(*gap),
            })
            .collect();
        Self { content }
    }

    /// Index of the longest literal residue run, the seed for index
    /// queries. `None` for tags made of gaps and patterns only.
    pub fn longest_sequence_run(&self) -> Option<usize> {
        self.content
            .iter()
            .enumerate()
            .filter_map(|(i, c)| match c {
                TagComponent::Sequence(seq) => Some((i, seq.len())),
                _ => None,
            })
            .max_by_key(|&(_, len)| len)
            .map(|(i, _)| i)
    }

    /// First residues of the tag in normalized form, used as the
    /// composition key for grouping work units.
    pub fn composition_key(&self, key_size: usize, indistinguishable: bool) -> Option<String> {
        let run = self.longest_sequence_run()?;
        let residues = match &self.content[run] {
            TagComponent::Sequence(seq) => seq.residues(),
            _ => return None,
        };
        let key: String = residues
            .chars()
            .take(key_size)
            .map(|aa| {
                if indistinguishable && aa == 'I' {
                    'L'
                } else {
                    aa
                }
            })
            .collect();
        Some(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gap_seq_gap() -> Tag {
        Tag::new(vec![
            TagComponent::MassGap(200.0),
            TagComponent::Sequence(AminoAcidSequence::new("PEPTIDE")),
            TagComponent::MassGap(150.0),
        ])
    }

    #[test]
    fn test_as_key() {
        let tag = gap_seq_gap();
        assert_eq!(tag.as_key(), "<200.0000>PEPTIDE<150.0000>");
        let mut pattern = AminoAcidPattern::new(vec![vec!['A'], vec!['D', 'N']]);
        pattern.add_modification(ModificationMatch::variable("Oxidation of M", 0));
        let tag = Tag::new(vec![TagComponent::Pattern(pattern)]);
        assert_eq!(tag.as_key(), "[A][DN]");
    }

    #[test]
    fn test_mass_includes_gaps_and_mods() {
        let registry = ModificationRegistry::with_defaults();
        let plain = Tag::new(vec![TagComponent::Sequence(AminoAcidSequence::new("M"))]);
        let mut modified_seq = AminoAcidSequence::new("M");
        modified_seq.add_modification(ModificationMatch::variable("Oxidation of M", 0));
        let modified = Tag::new(vec![TagComponent::Sequence(modified_seq)]);
        let delta = modified.mass(&registry) - plain.mass(&registry);
        assert!((delta - 15.994_915).abs() < 1e-6);

        let gapped = gap_seq_gap();
        assert!(gapped.mass(&registry) > 350.0);
    }

    #[test]
    fn test_can_reverse() {
        assert!(gap_seq_gap().can_reverse());
        let internal_gap = Tag::new(vec![
            TagComponent::Sequence(AminoAcidSequence::new("PEP")),
            TagComponent::MassGap(100.0),
            TagComponent::Sequence(AminoAcidSequence::new("IDE")),
        ]);
        assert!(!internal_gap.can_reverse());
    }

    #[test]
    fn test_reverse_remaps_modifications() {
        let mut seq = AminoAcidSequence::new("MKW");
        seq.add_modification(ModificationMatch::variable("Oxidation of M", 0));
        let tag = Tag::new(vec![
            TagComponent::MassGap(200.0),
            TagComponent::Sequence(seq),
        ]);
        let reversed = tag.reverse();
        match &reversed.content[0] {
            TagComponent::Sequence(seq) => {
                assert_eq!(seq.residues(), "WKM");
                assert!(seq.modifications().contains_key(&2));
            }
            other => panic!("unexpected component: {:?}", other),
        }
        assert!(matches!(reversed.content[1], TagComponent::MassGap(_)));
    }

    #[test]
    fn test_longest_sequence_run() {
        let tag = Tag::new(vec![
            TagComponent::Sequence(AminoAcidSequence::new("PE")),
            TagComponent::MassGap(100.0),
            TagComponent::Sequence(AminoAcidSequence::new("TIDE")),
        ]);
        assert_eq!(tag.longest_sequence_run(), Some(2));
        let gaps_only = Tag::new(vec![TagComponent::MassGap(100.0)]);
        assert_eq!(gaps_only.longest_sequence_run(), None);
    }

    #[test]
    fn test_composition_key_normalizes() {
        let tag = Tag::new(vec![TagComponent::Sequence(AminoAcidSequence::new(
            "IPEPTIDE",
        ))]);
        assert_eq!(tag.composition_key(3, true), Some("LPE".to_string()));
        assert_eq!(tag.composition_key(3, false), Some("IPE".to_string()));
    }
}
