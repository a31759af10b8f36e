//! Tag and peptide assumptions.

use crate::models::advocate::Advocate;
use crate::models::modification::{
    ModificationMatch,
    ModificationRegistry,
};
use crate::models::tag::{
    Tag,
    TagComponent,
};
use crate::validation::MatchValidationLevel;
use seqtree::masses::PROTON;
use seqtree::SequenceTree;
use serde::{
    Deserialize,
    Serialize,
};
use std::collections::BTreeMap;
use std::collections::HashSet;

/// Gap masses below this are not worth a component of their own.
const MIN_GAP_MASS: f64 = 0.01;

/// One candidate tag for one spectrum, as reported by an advocate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagAssumption {
    pub tag: Tag,
    pub rank: usize,
    pub advocate: Advocate,
    pub charge: i32,
    pub score: f64,
    pub source_file: String,
}

impl TagAssumption {
    /// Charge-dependent extensions of this tag toward one terminus.
    ///
    /// For every searched charge, the precursor mass left unexplained by the
    /// tag is turned into an extra terminal mass gap: merged into an
    /// existing terminal gap, and (at depth two and beyond) also kept as a
    /// separate component. Variants are deduplicated by tag key.
    pub fn possible_tags(
        &self,
        toward_c_terminus: bool,
        min_charge: i32,
        max_charge: i32,
        depth: usize,
        precursor_mz: f64,
        registry: &ModificationRegistry,
    ) -> Vec<TagAssumption> {
        let tag_mass = self.tag.mass(registry);
        let mut seen: HashSet<String> = HashSet::new();
        seen.insert(self.tag.as_key());
        let mut out = Vec::new();

        for charge in min_charge.max(1)..=max_charge.max(1) {
            let precursor_mass = precursor_mz * charge as f64 - charge as f64 * PROTON;
            let remaining = precursor_mass - tag_mass;
            if remaining <= MIN_GAP_MASS {
                continue;
            }

            let mut variants: Vec<Tag> = Vec::new();
            let mut merged = self.tag.clone();
            let terminal_is_gap = if toward_c_terminus {
                matches!(merged.content.last(), Some(TagComponent::MassGap(_)))
            } else {
                matches!(merged.content.first(), Some(TagComponent::MassGap(_)))
            };
            if terminal_is_gap {
                if toward_c_terminus {
                    if let Some(TagComponent::MassGap(gap)) = merged.content.last_mut() {
                        *gap += remaining;
                    }
                } else if let Some(TagComponent::MassGap(gap)) = merged.content.first_mut() {
                    *gap += remaining;
                }
                variants.push(merged);
                if depth >= 2 {
                    let mut separate = self.tag.clone();
                    if toward_c_terminus {
                        separate.content.push(TagComponent::MassGap(remaining));
                    } else {
                        separate.content.insert(0, TagComponent::MassGap(remaining));
                    }
                    variants.push(separate);
                }
            } else {
                if toward_c_terminus {
                    merged.content.push(TagComponent::MassGap(remaining));
                } else {
                    merged.content.insert(0, TagComponent::MassGap(remaining));
                }
                variants.push(merged);
            }

            for tag in variants {
                let key = tag.as_key();
                if seen.insert(key) {
                    out.push(TagAssumption {
                        tag,
                        rank: self.rank,
                        advocate: self.advocate,
                        charge,
                        score: self.score,
                        source_file: self.source_file.clone(),
                    });
                }
            }
        }
        out
    }

    /// The single reversed variant of this assumption. Gap masses are
    /// stored as neutral residue masses, so the reversal needs no
    /// terminus-dependent re-anchoring.
    pub fn reverse(&self) -> TagAssumption {
        TagAssumption {
            tag: self.tag.reverse(),
            rank: self.rank,
            advocate: self.advocate,
            charge: self.charge,
            score: self.score,
            source_file: self.source_file.clone(),
        }
    }
}

/// A peptide candidate with its protein mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Peptide {
    pub sequence: String,
    pub modifications: Vec<ModificationMatch>,
    /// Accession to start positions of the peptide in that protein.
    pub proteins: BTreeMap<String, Vec<usize>>,
}

impl Peptide {
    pub fn new(sequence: impl Into<String>) -> Self {
        Self {
            sequence: sequence.into(),
            modifications: Vec::new(),
            proteins: BTreeMap::new(),
        }
    }

    /// Deduplication key: sequence plus sorted modification signature.
    pub fn key(&self) -> String {
        let mut signature: Vec<String> = self
            .modifications
            .iter()
            .map(|m| format!("{}@{}", m.name, m.site))
            .collect();
        signature.sort();
        if signature.is_empty() {
            self.sequence.clone()
        } else {
            format!("{}|{}", self.sequence, signature.join(","))
        }
    }

    /// A peptide is a decoy when every protein it maps to is a decoy.
    pub fn is_decoy(&self, tree: &SequenceTree) -> bool {
        if self.proteins.is_empty() {
            return false;
        }
        self.proteins.keys().all(|accession| {
            tree.protein_by_accession(accession)
                .map(|protein| tree.is_decoy(protein))
                .unwrap_or(false)
        })
    }

    pub fn add_occurrence(&mut self, accession: String, position: usize) {
        self.proteins.entry(accession).or_default().push(position);
    }
}

/// A peptide candidate attached to a spectrum match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeptideAssumption {
    pub peptide: Peptide,
    pub rank: usize,
    pub advocate: Advocate,
    pub charge: i32,
    pub score: f64,
    pub source_file: String,
    /// Key of the tag this assumption was mapped from, when applicable.
    pub tag_key: Option<String>,
    /// Posterior error probability once estimated.
    pub pep: Option<f64>,
    pub validation: MatchValidationLevel,
}

impl PeptideAssumption {
    pub fn from_tag(
        peptide: Peptide,
        tag_assumption: &TagAssumption,
        rank: usize,
        tag_key: String,
    ) -> Self {
        Self {
            peptide,
            rank,
            advocate: tag_assumption.advocate,
            charge: tag_assumption.charge,
            score: tag_assumption.score,
            source_file: tag_assumption.source_file.clone(),
            tag_key: Some(tag_key),
            pep: None,
            validation: MatchValidationLevel::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tag::AminoAcidSequence;
    use seqtree::TreeConfig;

    fn assumption(tag: Tag) -> TagAssumption {
        TagAssumption {
            tag,
            rank: 1,
            advocate: Advocate::Pepnovo,
            charge: 2,
            score: 35.0,
            source_file: "run1.mgf".to_string(),
        }
    }

    #[test]
    fn test_possible_tags_adds_terminal_gap() {
        let registry = ModificationRegistry::with_defaults();
        let tag = Tag::new(vec![TagComponent::Sequence(AminoAcidSequence::new("PEP"))]);
        let tag_mass = tag.mass(&registry);
        // Precursor holding the tag plus ~200 Da unexplained, singly charged.
        let precursor_mz = tag_mass + 200.0 + PROTON;
        let variants = assumption(tag).possible_tags(true, 1, 1, 2, precursor_mz, &registry);
        assert_eq!(variants.len(), 1);
        match variants[0].tag.content.last().unwrap() {
            TagComponent::MassGap(gap) => assert!((gap - 200.0).abs() < 1e-6),
            other => panic!("unexpected component: {:?}", other),
        }
    }

    #[test]
    fn test_possible_tags_merges_and_splits_terminal_gap() {
        let registry = ModificationRegistry::with_defaults();
        let tag = Tag::new(vec![
            TagComponent::Sequence(AminoAcidSequence::new("PEP")),
            TagComponent::MassGap(100.0),
        ]);
        let tag_mass = tag.mass(&registry);
        let precursor_mz = tag_mass + 150.0 + PROTON;
        let variants = assumption(tag).possible_tags(true, 1, 1, 2, precursor_mz, &registry);
        // Merged gap and separate gap arrangements.
        assert_eq!(variants.len(), 2);
        let keys: Vec<String> = variants.iter().map(|v| v.tag.as_key()).collect();
        assert!(keys.contains(&"PEP<250.0000>".to_string()));
        assert!(keys.contains(&"PEP<100.0000><150.0000>".to_string()));
    }

    #[test]
    fn test_possible_tags_skips_explained_precursors() {
        let registry = ModificationRegistry::with_defaults();
        let tag = Tag::new(vec![TagComponent::Sequence(AminoAcidSequence::new("PEP"))]);
        let tag_mass = tag.mass(&registry);
        let precursor_mz = tag_mass + PROTON;
        let variants = assumption(tag).possible_tags(true, 1, 1, 2, precursor_mz, &registry);
        assert!(variants.is_empty());
    }

    #[test]
    fn test_peptide_key_includes_modifications() {
        let mut plain = Peptide::new("PEPTIDE");
        let mut modified = Peptide::new("PEPTIDE");
        modified
            .modifications
            .push(ModificationMatch::variable("Oxidation of M", 3));
        assert_ne!(plain.key(), modified.key());
        plain.modifications.clear();
        assert_eq!(plain.key(), "PEPTIDE");
    }

    #[test]
    fn test_peptide_decoy_status() {
        let tree = SequenceTree::build(
            vec![
                ("P1".to_string(), "PEPTIDEK".to_string()),
                ("P1_REVERSED".to_string(), "KEDITPEP".to_string()),
            ],
            TreeConfig::default(),
        )
        .unwrap();
        let mut target = Peptide::new("PEPTIDEK");
        target.add_occurrence("P1".to_string(), 0);
        assert!(!target.is_decoy(&tree));

        let mut decoy = Peptide::new("KEDITPEP");
        decoy.add_occurrence("P1_REVERSED".to_string(), 0);
        assert!(decoy.is_decoy(&tree));

        // Shared peptides count as targets.
        let mut shared = Peptide::new("PEP");
        shared.add_occurrence("P1".to_string(), 0);
        shared.add_occurrence("P1_REVERSED".to_string(), 5);
        assert!(!shared.is_decoy(&tree));
    }
}
