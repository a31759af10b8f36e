//! Terminal ion support of a tag against its spectrum.
//!
//! Builds the theoretical singly charged b and y ladders of a tag and
//! counts the peaks confirming each terminus. Gap components contribute a
//! single ladder step of their full mass; pattern positions take their
//! first candidate, like pattern masses do everywhere else.

use crate::models::modification::ModificationRegistry;
use crate::models::tag::{
    Tag,
    TagComponent,
};
use crate::models::Spectrum;
use seqtree::masses::{
    residue_mass,
    PROTON,
    WATER,
};

/// Monoisotopic mass added by each ladder step of a tag, N- to C-terminal.
fn step_masses(tag: &Tag, registry: &ModificationRegistry) -> Vec<f64> {
    let mut steps = Vec::new();
    for component in tag.content.iter() {
        match component {
            TagComponent::Sequence(seq) => {
                for (site, residue) in seq.residues().chars().enumerate() {
                    let mut mass = residue_mass(residue).unwrap_or(0.0);
                    if let Some(matches) = seq.modifications().get(&site) {
                        mass += matches
                            .iter()
                            .filter_map(|m| registry.mass(&m.name))
                            .sum::<f64>();
                    }
                    steps.push(mass);
                }
            }
            TagComponent::Pattern(pattern) => {
                for (site, candidates) in pattern.positions().iter().enumerate() {
                    let mut mass = candidates
                        .first()
                        .and_then(|&aa| residue_mass(aa))
                        .unwrap_or(0.0);
                    if let Some(matches) = pattern.modifications().get(&site) {
                        mass += matches
                            .iter()
                            .filter_map(|m| registry.mass(&m.name))
                            .sum::<f64>();
                    }
                    steps.push(mass);
                }
            }
            TagComponent::MassGap(gap) => steps.push(*gap),
        }
    }
    steps
}

/// Counts spectrum peaks confirming the N terminus (b ions) and the C
/// terminus (y ions) of a tag, within the fragment tolerance in Da.
pub fn count_terminal_ions(
    tag: &Tag,
    spectrum: &Spectrum,
    registry: &ModificationRegistry,
    tolerance: f64,
) -> (usize, usize) {
    let steps = step_masses(tag, registry);
    if steps.len() < 2 {
        return (0, 0);
    }

    let mut n_b = 0;
    let mut prefix = 0.0;
    for &step in steps[..steps.len() - 1].iter() {
        prefix += step;
        if spectrum.has_peak_at(prefix + PROTON, tolerance) {
            n_b += 1;
        }
    }

    let mut n_y = 0;
    let mut suffix = 0.0;
    for &step in steps[1..].iter().rev() {
        suffix += step;
        if spectrum.has_peak_at(suffix + WATER + PROTON, tolerance) {
            n_y += 1;
        }
    }

    (n_b, n_y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tag::AminoAcidSequence;
    use crate::models::Peak;

    fn peak(mz: f64) -> Peak {
        Peak {
            mz,
            intensity: 100.0,
        }
    }

    #[test]
    fn test_counts_b_and_y_ions() {
        let registry = ModificationRegistry::with_defaults();
        let tag = Tag::new(vec![TagComponent::Sequence(AminoAcidSequence::new("PEK"))]);
        let p = residue_mass('P').unwrap();
        let e = residue_mass('E').unwrap();
        let k = residue_mass('K').unwrap();
        let spectrum = Spectrum::new(
            400.0,
            vec![
                peak(p + PROTON),              // b1
                peak(p + e + PROTON),          // b2
                peak(k + WATER + PROTON),      // y1
                peak(555.5),                   // noise
            ],
        );
        let (n_b, n_y) = count_terminal_ions(&tag, &spectrum, &registry, 0.02);
        assert_eq!(n_b, 2);
        assert_eq!(n_y, 1);
    }

    #[test]
    fn test_gap_contributes_one_step() {
        let registry = ModificationRegistry::with_defaults();
        let tag = Tag::new(vec![
            TagComponent::MassGap(200.0),
            TagComponent::Sequence(AminoAcidSequence::new("PE")),
        ]);
        let p = residue_mass('P').unwrap();
        let e = residue_mass('E').unwrap();
        let spectrum = Spectrum::new(
            400.0,
            vec![
                peak(200.0 + PROTON),           // b1 = gap
                peak(200.0 + p + PROTON),       // b2
                peak(p + e + WATER + PROTON),   // y2
            ],
        );
        let (n_b, n_y) = count_terminal_ions(&tag, &spectrum, &registry, 0.02);
        assert_eq!(n_b, 2);
        assert_eq!(n_y, 1);
    }

    #[test]
    fn test_modification_shifts_ladder() {
        let registry = ModificationRegistry::with_defaults();
        let mut seq = AminoAcidSequence::new("ME");
        seq.add_modification(crate::models::ModificationMatch::variable(
            "Oxidation of M",
            0,
        ));
        let tag = Tag::new(vec![TagComponent::Sequence(seq)]);
        let m = residue_mass('M').unwrap();
        let spectrum = Spectrum::new(300.0, vec![peak(m + 15.994_915 + PROTON)]);
        let (n_b, _) = count_terminal_ions(&tag, &spectrum, &registry, 0.02);
        assert_eq!(n_b, 1);

        let unshifted = Spectrum::new(300.0, vec![peak(m + PROTON)]);
        let (n_b, _) = count_terminal_ions(&tag, &unshifted, &registry, 0.02);
        assert_eq!(n_b, 0);
    }

    #[test]
    fn test_single_step_tag_has_no_internal_ions() {
        let registry = ModificationRegistry::with_defaults();
        let tag = Tag::new(vec![TagComponent::Sequence(AminoAcidSequence::new("K"))]);
        let spectrum = Spectrum::new(300.0, vec![peak(147.11)]);
        assert_eq!(count_terminal_ions(&tag, &spectrum, &registry, 0.02), (0, 0));
    }
}
