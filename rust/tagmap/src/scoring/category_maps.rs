//! Per-category target-decoy maps with small-category grouping.
//!
//! Matches are scored in separate categories (the charge of the best
//! assumption, for spectrum matches). Categories with too few points to
//! support an estimate are merged into a reference category before
//! estimation, and lookups against a grouped category transparently
//! resolve to its reference.

use crate::config::ValidationConfig;
use crate::errors::{
    Result,
    TagMapError,
};
use crate::models::SpectrumMatch;
use crate::progress::ProgressHandler;
use crate::scoring::target_decoy::TargetDecoyMap;
use seqtree::SequenceTree;
use std::collections::BTreeMap;
use std::collections::HashMap;
use tracing::{
    debug,
    info,
};

#[derive(Debug, Clone, Default)]
pub struct CategoryDecoyMaps {
    maps: BTreeMap<i32, TargetDecoyMap>,
    /// Grouped category to the reference category holding its points.
    grouping: HashMap<i32, i32>,
    /// Names of doubtful-match filters keyed by category, then file name.
    doubtful_filters: HashMap<i32, HashMap<String, Vec<String>>>,
    cleaned: bool,
    config: ValidationConfig,
}

impl CategoryDecoyMaps {
    pub fn new(config: ValidationConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Records one raw observation under the given category.
    pub fn put(&mut self, key: i32, score: f64, is_decoy: bool) {
        let window = self.config.pep_window_points;
        self.maps
            .entry(key)
            .or_insert_with(|| TargetDecoyMap::with_window(window))
            .put(score, is_decoy);
    }

    /// Records the best assumption of a spectrum match: category is its
    /// charge, decoy status comes from its peptide's protein mapping.
    /// Matches with no elected assumption contribute nothing.
    pub fn add_point(&mut self, score: f64, spectrum_match: &SpectrumMatch, tree: &SequenceTree) {
        if let Some(best) = &spectrum_match.best_assumption {
            let is_decoy = best.peptide.is_decoy(tree);
            self.put(best.charge, score, is_decoy);
        }
    }

    /// Merges categories with insufficient data into a reference category.
    ///
    /// Keys are visited in ascending order; a category keeps its own map
    /// when both its target-only count and its size reach the grouping
    /// threshold, and every other category is pooled under the latest such
    /// reference (categories seen before the first reference are pooled
    /// into it once found; with no reference at all, everything pools
    /// under the first category). Idempotent, and must run before
    /// estimation.
    pub fn clean(&mut self) {
        if self.cleaned {
            return;
        }
        self.cleaned = true;

        let threshold = self.config.group_threshold;
        let keys: Vec<i32> = self.maps.keys().copied().collect();
        let mut reference: Option<i32> = None;
        let mut pending: Vec<i32> = Vec::new();
        for key in keys {
            let map = &self.maps[&key];
            let stands_alone =
                map.n_target_only() >= threshold && map.map_size() >= threshold;
            if stands_alone {
                if reference.is_none() {
                    for grouped in pending.drain(..) {
                        self.group_under(grouped, key);
                    }
                }
                reference = Some(key);
            } else if let Some(reference) = reference {
                self.group_under(key, reference);
            } else {
                pending.push(key);
            }
        }
        // No category stood alone: pool everything under the first one.
        if reference.is_none() {
            if let Some((&first, _)) = self.maps.iter().next() {
                let rest: Vec<i32> = self.maps.keys().copied().skip(1).collect();
                for grouped in rest {
                    self.group_under(grouped, first);
                }
            }
        }
        info!(
            n_categories = self.maps.len(),
            n_grouped = self.grouping.len(),
            "Category maps cleaned"
        );
    }

    fn group_under(&mut self, grouped: i32, reference: i32) {
        if let Some(taken) = self.maps.remove(&grouped) {
            debug!(grouped, reference, n_points = taken.map_size(), "Grouping category");
            if let Some(target) = self.maps.get_mut(&reference) {
                target.add_all(&taken);
            }
            self.grouping.insert(grouped, reference);
        }
    }

    /// The category whose map actually holds this key's points.
    pub fn corrected_key(&self, key: i32) -> i32 {
        self.grouping.get(&key).copied().unwrap_or(key)
    }

    /// Parses and corrects a textual category key. Categories are charges;
    /// non-numeric input is a caller bug and fails fast.
    pub fn corrected_key_from_str(&self, input: &str) -> Result<i32> {
        let key = input
            .trim()
            .parse::<i32>()
            .map_err(|_| TagMapError::InvalidCategoryKey {
                input: input.to_string(),
            })?;
        Ok(self.corrected_key(key))
    }

    /// Estimates the PEP curve of every reference category.
    pub fn estimate_probabilities(&mut self, progress: &dyn ProgressHandler) {
        info!(n_categories = self.maps.len(), "Estimating category probabilities");
        for (key, map) in self.maps.iter_mut() {
            if progress.is_canceled() {
                return;
            }
            debug!(category = key, n_points = map.map_size(), "Estimating");
            map.estimate_probabilities(progress);
        }
    }

    /// PEP of a score in a category. `None` when the category holds no
    /// data or has not been estimated yet.
    pub fn get_probability(&self, key: i32, score: f64) -> Option<f64> {
        self.maps
            .get(&self.corrected_key(key))?
            .get_probability(score)
    }

    /// Group labels of the reference categories whose statistics look too
    /// thin for a reliable estimate.
    pub fn suspicious_input(&self) -> Vec<String> {
        let labels = self.keys();
        self.maps
            .iter()
            .filter(|(_, map)| map.suspicious_input(self.config.suspicious_threshold))
            .filter_map(|(key, _)| labels.get(key).cloned())
            .collect()
    }

    /// Reference categories and their group labels, reference first and
    /// grouped members after it.
    pub fn keys(&self) -> BTreeMap<i32, String> {
        self.maps
            .keys()
            .map(|&reference| {
                let mut members: Vec<i32> = self
                    .grouping
                    .iter()
                    .filter(|(_, &r)| r == reference)
                    .map(|(&grouped, _)| grouped)
                    .collect();
                members.sort_unstable();
                let mut label = reference.to_string();
                for member in members {
                    label.push_str(", ");
                    label.push_str(&member.to_string());
                }
                (reference, label)
            })
            .collect()
    }

    /// Registers a doubtful-match filter name for a category and file.
    /// Filter metadata is additive and survives grouping untouched.
    pub fn add_doubtful_filter(
        &mut self,
        key: i32,
        file_name: impl Into<String>,
        filter_name: impl Into<String>,
    ) {
        self.doubtful_filters
            .entry(key)
            .or_default()
            .entry(file_name.into())
            .or_default()
            .push(filter_name.into());
    }

    /// Filter names applying to a category and file, including those
    /// registered under the category's reference.
    pub fn doubtful_filters(&self, key: i32, file_name: &str) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        let corrected = self.corrected_key(key);
        for category in [key, corrected] {
            if let Some(by_file) = self.doubtful_filters.get(&category) {
                if let Some(filters) = by_file.get(file_name) {
                    for name in filters {
                        if !names.contains(name) {
                            names.push(name.clone());
                        }
                    }
                }
            }
            if corrected == key {
                break;
            }
        }
        names
    }

    pub fn map_size(&self) -> usize {
        self.maps.values().map(|m| m.map_size()).sum()
    }

    /// Largest category ever seen, grouped or not.
    pub fn max_category(&self) -> Option<i32> {
        self.maps
            .keys()
            .chain(self.grouping.keys())
            .copied()
            .max()
    }

    pub fn is_cleaned(&self) -> bool {
        self.cleaned
    }
}
