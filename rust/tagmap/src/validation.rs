//! Match validation levels and the level assignment pass.

use crate::config::ValidationConfig;
use crate::models::SpectrumMatch;
use crate::scoring::CategoryDecoyMaps;
use serde::{
    Deserialize,
    Serialize,
};
use tracing::debug;

/// Confidence level of a match, from unprocessed to confidently validated.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum MatchValidationLevel {
    #[default]
    None,
    NotValidated,
    Doubtful,
    Confident,
}

impl MatchValidationLevel {
    pub fn is_validated(self) -> bool {
        matches!(self, Self::Doubtful | Self::Confident)
    }
}

/// Assigns a validation level to the best assumption of a match.
///
/// The PEP of the best assumption is looked up in its category map; a PEP
/// at or below the confidence threshold yields `Confident` unless the
/// category's statistics are suspicious or a doubtful-match filter applies
/// to the match's source file, which cap the level at `Doubtful`. Matches
/// whose category has no estimate stay `NotValidated`.
pub fn validate_match(
    spectrum_match: &mut SpectrumMatch,
    maps: &CategoryDecoyMaps,
    config: &ValidationConfig,
) {
    let Some(best) = spectrum_match.best_assumption.as_mut() else {
        return;
    };
    let Some(pep) = maps.get_probability(best.charge, best.score) else {
        best.validation = MatchValidationLevel::NotValidated;
        return;
    };
    best.pep = Some(pep);

    let reference = maps.corrected_key(best.charge);
    let labels = maps.keys();
    let suspicious_labels = maps.suspicious_input();
    let suspicious = labels
        .get(&reference)
        .map(|label| suspicious_labels.contains(label))
        .unwrap_or(true);
    let filtered = !maps
        .doubtful_filters(best.charge, &best.source_file)
        .is_empty();

    best.validation = if pep > config.confidence_pep {
        MatchValidationLevel::Doubtful
    } else if suspicious || filtered {
        debug!(
            key = %spectrum_match.key,
            suspicious,
            filtered,
            "Confident match demoted to doubtful"
        );
        MatchValidationLevel::Doubtful
    } else {
        MatchValidationLevel::Confident
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Advocate,
        Peptide,
        PeptideAssumption,
    };
    use crate::progress::SilentProgress;

    fn match_with_best(charge: i32, score: f64) -> SpectrumMatch {
        let mut spectrum_match = SpectrumMatch::new("spectrum 1");
        spectrum_match.best_assumption = Some(PeptideAssumption {
            peptide: Peptide::new("PEPTIDEK"),
            rank: 1,
            advocate: Advocate::Pepnovo,
            charge,
            score,
            source_file: "run1.mgf".to_string(),
            tag_key: None,
            pep: None,
            validation: MatchValidationLevel::None,
        });
        spectrum_match
    }

    fn filled_maps() -> CategoryDecoyMaps {
        let mut maps = CategoryDecoyMaps::new(ValidationConfig::default());
        for i in 0..300 {
            maps.put(2, 200.0 + i as f64, false);
        }
        for i in 0..120 {
            maps.put(2, i as f64, true);
        }
        maps
    }

    fn estimated_maps() -> CategoryDecoyMaps {
        let mut maps = filled_maps();
        maps.clean();
        maps.estimate_probabilities(&SilentProgress::new());
        maps
    }

    #[test]
    fn test_confident_and_doubtful_assignment() {
        let maps = estimated_maps();
        let config = ValidationConfig::default();

        let mut good = match_with_best(2, 490.0);
        validate_match(&mut good, &maps, &config);
        let best = good.best_assumption.as_ref().unwrap();
        assert_eq!(best.validation, MatchValidationLevel::Confident);
        assert!(best.pep.unwrap() <= config.confidence_pep);

        let mut bad = match_with_best(2, 10.0);
        validate_match(&mut bad, &maps, &config);
        let best = bad.best_assumption.as_ref().unwrap();
        assert_eq!(best.validation, MatchValidationLevel::Doubtful);
    }

    #[test]
    fn test_unestimated_category_stays_not_validated() {
        let maps = CategoryDecoyMaps::new(ValidationConfig::default());
        let mut spectrum_match = match_with_best(2, 240.0);
        validate_match(&mut spectrum_match, &maps, &ValidationConfig::default());
        assert_eq!(
            spectrum_match.best_assumption.as_ref().unwrap().validation,
            MatchValidationLevel::NotValidated
        );
    }

    #[test]
    fn test_doubtful_filter_caps_level() {
        let mut maps = filled_maps();
        maps.add_doubtful_filter(2, "run1.mgf", "low peak count");
        maps.clean();
        maps.estimate_probabilities(&SilentProgress::new());

        let mut spectrum_match = match_with_best(2, 490.0);
        validate_match(&mut spectrum_match, &maps, &ValidationConfig::default());
        assert_eq!(
            spectrum_match.best_assumption.as_ref().unwrap().validation,
            MatchValidationLevel::Doubtful
        );
    }

    #[test]
    fn test_match_without_best_assumption_is_untouched() {
        let maps = estimated_maps();
        let mut spectrum_match = SpectrumMatch::new("spectrum 1");
        validate_match(&mut spectrum_match, &maps, &ValidationConfig::default());
        assert!(spectrum_match.best_assumption.is_none());
    }
}
