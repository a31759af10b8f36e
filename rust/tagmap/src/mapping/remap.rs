//! Advocate-specific modification renaming.
//!
//! De novo engines report modifications in their own vocabulary: PepNovo+
//! uses engine-local codes, DirecTag a numeric index into the searched
//! variable modifications. Before a tag is queried against the index its
//! modification matches are rewritten to canonical names, and sites whose
//! modification targets a single residue are pinned to that residue.

use crate::errors::{
    Result,
    TagMapError,
};
use crate::models::modification::{
    AdvocateParams,
    ModificationMatch,
    ModificationRegistry,
};
use crate::models::tag::{
    Tag,
    TagComponent,
};
use crate::models::{
    Advocate,
    SearchParameters,
};
use std::collections::BTreeMap;

fn canonical_name(
    advocate: Advocate,
    reported: &str,
    params: &SearchParameters,
) -> Result<String> {
    match advocate {
        Advocate::Pepnovo => {
            let ptm_name_map = match params.advocate_params(advocate) {
                Some(AdvocateParams::Pepnovo { ptm_name_map }) => Some(ptm_name_map),
                None => None,
            };
            ptm_name_map
                .and_then(|map| map.get(reported))
                .cloned()
                .ok_or_else(|| TagMapError::UnknownModification {
                    advocate: advocate.name().to_string(),
                    modification: reported.to_string(),
                })
        }
        Advocate::DirecTag => {
            let index: usize =
                reported
                    .parse()
                    .map_err(|_| TagMapError::UnknownModification {
                        advocate: advocate.name().to_string(),
                        modification: reported.to_string(),
                    })?;
            params
                .modification_profile
                .variable_by_index(index)
                .map(|name| name.to_string())
                .ok_or_else(|| TagMapError::UnknownModification {
                    advocate: advocate.name().to_string(),
                    modification: reported.to_string(),
                })
        }
        other => Err(TagMapError::ModificationMappingNotImplemented {
            advocate: other.name().to_string(),
        }),
    }
}

/// The single residue a modification can sit on, if it is that specific.
fn pinned_target(registry: &ModificationRegistry, name: &str) -> Result<Option<char>> {
    match registry.get(name) {
        None => Ok(None),
        Some(definition) => match definition.targets.as_slice() {
            [] => Ok(None),
            [single] => Ok(Some(*single)),
            _ => Err(TagMapError::AmbiguousModificationTarget {
                modification: name.to_string(),
            }),
        },
    }
}

fn remap_sites(
    modifications: &mut BTreeMap<usize, Vec<ModificationMatch>>,
    advocate: Advocate,
    params: &SearchParameters,
    registry: &ModificationRegistry,
) -> Result<Vec<(usize, char)>> {
    let mut pins = Vec::new();
    for (site, matches) in modifications.iter_mut() {
        for m in matches.iter_mut() {
            let canonical = canonical_name(advocate, &m.name, params)?;
            if let Some(target) = pinned_target(registry, &canonical)? {
                pins.push((*site, target));
            }
            m.name = canonical;
        }
    }
    Ok(pins)
}

/// Rewrites every modification match of a tag to its canonical name.
///
/// Sequence sites pinned by a single-target modification get that residue
/// written in place; pattern sites are restricted to it. Mass gaps carry
/// no modifications and are skipped. Any unresolvable name fails the whole
/// tag, leaving it unusable for mapping.
pub fn remap_modifications(
    tag: &mut Tag,
    advocate: Advocate,
    params: &SearchParameters,
    registry: &ModificationRegistry,
) -> Result<()> {
    for component in tag.content.iter_mut() {
        match component {
            TagComponent::Sequence(seq) => {
                let pins = remap_sites(seq.modifications_mut(), advocate, params, registry)?;
                for (site, residue) in pins {
                    seq.set_residue(site, residue);
                }
            }
            TagComponent::Pattern(pattern) => {
                let pins =
                    remap_sites(pattern.modifications_mut(), advocate, params, registry)?;
                for (site, residue) in pins {
                    pattern.set_targeted(site, vec![residue]);
                }
            }
            TagComponent::MassGap(_) => {}
        }
    }
    Ok(())
}
