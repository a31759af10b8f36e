//! Modification names, masses and search profiles.
//!
//! The registry replaces a global modification-name factory: it is built
//! once per run and passed by shared reference wherever modification masses
//! or target residues are needed.

use serde::{
    Deserialize,
    Serialize,
};
use std::collections::HashMap;

/// One modification observed (or hypothesized) on a tag or peptide site.
///
/// Sites are 0-based within their component or sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModificationMatch {
    pub name: String,
    pub variable: bool,
    pub site: usize,
}

impl ModificationMatch {
    pub fn variable(name: impl Into<String>, site: usize) -> Self {
        Self {
            name: name.into(),
            variable: true,
            site,
        }
    }

    pub fn fixed(name: impl Into<String>, site: usize) -> Self {
        Self {
            name: name.into(),
            variable: false,
            site,
        }
    }
}

/// Canonical definition of a modification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModificationDefinition {
    pub name: String,
    pub mass: f64,
    /// Residues the modification can sit on; empty means terminal or
    /// unrestricted.
    pub targets: Vec<char>,
}

/// Name-keyed modification definitions for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModificationRegistry {
    by_name: HashMap<String, ModificationDefinition>,
}

impl ModificationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the modifications the bundled search
    /// profiles use.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let defaults = [
            ("Oxidation of M", 15.994_915, vec!['M']),
            ("Carbamidomethylation of C", 57.021_464, vec!['C']),
            ("Acetylation of K", 42.010_565, vec!['K']),
            ("Phosphorylation of S", 79.966_331, vec!['S']),
            ("Phosphorylation of T", 79.966_331, vec!['T']),
            ("Phosphorylation of Y", 79.966_331, vec!['Y']),
            ("Deamidation of N", 0.984_016, vec!['N']),
            ("Deamidation of Q", 0.984_016, vec!['Q']),
        ];
        for (name, mass, targets) in defaults {
            registry.insert(ModificationDefinition {
                name: name.to_string(),
                mass,
                targets,
            });
        }
        registry
    }

    pub fn insert(&mut self, definition: ModificationDefinition) {
        self.by_name.insert(definition.name.clone(), definition);
    }

    pub fn get(&self, name: &str) -> Option<&ModificationDefinition> {
        self.by_name.get(name)
    }

    pub fn mass(&self, name: &str) -> Option<f64> {
        self.by_name.get(name).map(|d| d.mass)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

/// Fixed and variable modification names searched for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModificationProfile {
    pub fixed: Vec<String>,
    pub variable: Vec<String>,
}

impl ModificationProfile {
    /// Variable modification by its (0-based) index, the form DirecTag
    /// reports modifications in.
    pub fn variable_by_index(&self, index: usize) -> Option<&str> {
        self.variable.get(index).map(|s| s.as_str())
    }

    pub fn contains_variable(&self, name: &str) -> bool {
        self.variable.iter().any(|m| m == name)
    }
}

/// Algorithm-specific parameter blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AdvocateParams {
    Pepnovo {
        /// Algorithm-local modification code to canonical name.
        ptm_name_map: HashMap<String, String>,
    },
}
