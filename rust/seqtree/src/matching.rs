//! Sequence matching preferences.
//!
//! Controls how query residues coming from de novo tags are compared against
//! database residues: exact characters only, expansion of combination
//! characters (X, B, Z, J), or additionally treating I and L as the same
//! residue (they are isobaric and cannot be told apart from fragment masses).

use serde::{
    Deserialize,
    Serialize,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchingKind {
    /// Plain character equality.
    String,
    /// Combination characters match their expansions.
    AminoAcid,
    /// Like `AminoAcid`, plus I and L are interchangeable.
    IndistinguishableAminoAcids,
}

/// Expansion sets for combination characters. A canonical residue expands to
/// itself.
pub fn expansions(aa: char) -> &'static [char] {
    match aa {
        'X' => &[
            'G', 'A', 'S', 'P', 'V', 'T', 'C', 'L', 'I', 'N', 'D', 'Q', 'K', 'E', 'M', 'H', 'F',
            'R', 'Y', 'W',
        ],
        'B' => &['D', 'N'],
        'Z' => &['E', 'Q'],
        'J' => &['I', 'L'],
        'G' => &['G'],
        'A' => &['A'],
        'S' => &['S'],
        'P' => &['P'],
        'V' => &['V'],
        'T' => &['T'],
        'C' => &['C'],
        'L' => &['L'],
        'I' => &['I'],
        'N' => &['N'],
        'D' => &['D'],
        'Q' => &['Q'],
        'K' => &['K'],
        'E' => &['E'],
        'M' => &['M'],
        'H' => &['H'],
        'F' => &['F'],
        'R' => &['R'],
        'Y' => &['Y'],
        'W' => &['W'],
        'U' => &['U'],
        'O' => &['O'],
        _ => &[],
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceMatching {
    pub kind: MatchingKind,
    /// Maximal share of X residues tolerated in a matched peptide.
    pub max_x_share: Option<f64>,
}

impl Default for SequenceMatching {
    fn default() -> Self {
        Self {
            kind: MatchingKind::IndistinguishableAminoAcids,
            max_x_share: Some(0.25),
        }
    }
}

impl SequenceMatching {
    pub fn new(kind: MatchingKind) -> Self {
        Self {
            kind,
            max_x_share: None,
        }
    }

    /// Whether a query residue (possibly a combination character) matches a
    /// database residue.
    pub fn residues_match(&self, query: char, subject: char) -> bool {
        if query == subject {
            return true;
        }
        match self.kind {
            MatchingKind::String => false,
            MatchingKind::AminoAcid => {
                expansions(query).contains(&subject) || expansions(subject).contains(&query)
            }
            MatchingKind::IndistinguishableAminoAcids => {
                if (query == 'I' || query == 'L') && (subject == 'I' || subject == 'L') {
                    return true;
                }
                expansions(query).contains(&subject) || expansions(subject).contains(&query)
            }
        }
    }

    /// Whether the share of X residues in a candidate sequence is acceptable.
    pub fn accepts_x_share(&self, sequence: &str) -> bool {
        match self.max_x_share {
            None => true,
            Some(max_share) => {
                if sequence.is_empty() {
                    return true;
                }
                let n_x = sequence.chars().filter(|&c| c == 'X').count();
                (n_x as f64) / (sequence.len() as f64) <= max_share
            }
        }
    }
}
