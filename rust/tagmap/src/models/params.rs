//! Search parameters shared by scoring and mapping.

use crate::models::advocate::Advocate;
use crate::models::modification::{
    AdvocateParams,
    ModificationProfile,
};
use seqtree::SequenceMatching;
use serde::{
    Deserialize,
    Serialize,
};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchParameters {
    pub modification_profile: ModificationProfile,
    pub min_charge: i32,
    pub max_charge: i32,
    /// Fragment ion accuracy in Da.
    pub fragment_accuracy: f64,
    /// Precursor m/z accuracy in Da.
    pub precursor_accuracy: f64,
    pub sequence_matching: SequenceMatching,
    /// Algorithm-specific parameter blocks keyed by advocate id.
    pub advocate_params: HashMap<i32, AdvocateParams>,
}

impl Default for SearchParameters {
    fn default() -> Self {
        Self {
            modification_profile: ModificationProfile::default(),
            min_charge: 2,
            max_charge: 4,
            fragment_accuracy: 0.02,
            precursor_accuracy: 0.02,
            sequence_matching: SequenceMatching::default(),
            advocate_params: HashMap::new(),
        }
    }
}

impl SearchParameters {
    pub fn advocate_params(&self, advocate: Advocate) -> Option<&AdvocateParams> {
        self.advocate_params.get(&advocate.id())
    }
}
