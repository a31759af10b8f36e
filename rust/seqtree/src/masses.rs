//! Monoisotopic masses for amino acid residues.
//!
//! Residue masses are the peptide-bond residue masses (amino acid minus
//! water). A peptide mass is the sum of its residue masses plus [`WATER`].

/// Monoisotopic mass of H2O.
pub const WATER: f64 = 18.010_564_684;
/// Monoisotopic mass of a proton.
pub const PROTON: f64 = 1.007_276_467;

/// Monoisotopic residue mass for one amino acid, `None` for characters that
/// do not denote a single residue (combination characters included).
pub fn residue_mass(aa: char) -> Option<f64> {
    let mass = match aa {
        'G' => 57.021_463_72,
        'A' => 71.037_113_79,
        'S' => 87.032_028_41,
        'P' => 97.052_763_87,
        'V' => 99.068_413_94,
        'T' => 101.047_678_5,
        'C' => 103.009_184_5,
        'L' | 'I' => 113.084_064_0,
        'N' => 114.042_927_4,
        'D' => 115.026_943_2,
        'Q' => 128.058_577_7,
        'K' => 128.094_963_0,
        'E' => 129.042_593_1,
        'M' => 131.040_484_6,
        'H' => 137.058_911_9,
        'F' => 147.068_413_9,
        'R' => 156.101_111_0,
        'Y' => 163.063_328_5,
        'W' => 186.079_312_9,
        'U' => 150.953_633_5,
        'O' => 237.147_726_7,
        _ => return None,
    };
    Some(mass)
}

/// Sum of residue masses plus water for a plain sequence.
///
/// Returns `None` if any character has no defined residue mass.
pub fn peptide_mass(sequence: &str) -> Option<f64> {
    let mut total = WATER;
    for aa in sequence.chars() {
        total += residue_mass(aa)?;
    }
    Some(total)
}
