//! Target-decoy score histogram and posterior error probability estimation.
//!
//! One map accumulates `(score, is_decoy)` observations for one category.
//! Estimation bins the points by exact score, walks the bins from the best
//! score down, smooths the local decoy rate over a window that grows until
//! it holds enough points, and makes the resulting PEP curve monotone with
//! a reverse running minimum (the same construction the q-value assignment
//! in Sage-style search engines uses). After estimation the map serves
//! probability lookups as a step function over score.

use crate::progress::ProgressHandler;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::debug;

/// Default number of raw points the smoothing window grows to hold.
pub const DEFAULT_WINDOW_POINTS: usize = 100;

/// Score key with a total order, so equal scores always share a bin and
/// insertion order never matters.
#[derive(Debug, Clone, Copy)]
struct OrderedScore(f64);

impl PartialEq for OrderedScore {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl Eq for OrderedScore {}

impl PartialOrd for OrderedScore {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedScore {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Bin {
    n_target: u32,
    n_decoy: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct CurvePoint {
    score: f64,
    pep: f64,
}

#[derive(Debug, Clone, Default)]
pub struct TargetDecoyMap {
    bins: BTreeMap<OrderedScore, Bin>,
    n_targets: usize,
    n_decoys: usize,
    window_points: usize,
    /// PEP step function, ascending by score. `None` until estimated.
    curve: Option<Vec<CurvePoint>>,
}

impl TargetDecoyMap {
    pub fn new() -> Self {
        Self::with_window(DEFAULT_WINDOW_POINTS)
    }

    pub fn with_window(window_points: usize) -> Self {
        Self {
            bins: BTreeMap::new(),
            n_targets: 0,
            n_decoys: 0,
            window_points: window_points.max(1),
            curve: None,
        }
    }

    /// Inserts one observation. Any previously computed curve is
    /// invalidated and must be re-estimated.
    pub fn put(&mut self, score: f64, is_decoy: bool) {
        let bin = self.bins.entry(OrderedScore(score)).or_default();
        if is_decoy {
            bin.n_decoy += 1;
            self.n_decoys += 1;
        } else {
            bin.n_target += 1;
            self.n_targets += 1;
        }
        self.curve = None;
    }

    /// Merges another map's raw points into this one. The computed curve,
    /// if any, is invalidated: merged statistics require re-estimation.
    pub fn add_all(&mut self, other: &TargetDecoyMap) {
        for (score, other_bin) in other.bins.iter() {
            let bin = self.bins.entry(*score).or_default();
            bin.n_target += other_bin.n_target;
            bin.n_decoy += other_bin.n_decoy;
        }
        self.n_targets += other.n_targets;
        self.n_decoys += other.n_decoys;
        self.curve = None;
    }

    pub fn map_size(&self) -> usize {
        self.n_targets + self.n_decoys
    }

    pub fn n_targets(&self) -> usize {
        self.n_targets
    }

    pub fn n_decoys(&self) -> usize {
        self.n_decoys
    }

    /// Targets in excess of decoys: the estimated number of correct hits.
    pub fn n_target_only(&self) -> usize {
        self.n_targets.saturating_sub(self.n_decoys)
    }

    /// Longest run of targets between consecutive decoys in descending
    /// score order; the resolution limit of the local estimate.
    pub fn n_max(&self) -> usize {
        let mut longest = 0usize;
        let mut run = 0usize;
        for bin in self.bins.values().rev() {
            run += bin.n_target as usize;
            if bin.n_decoy > 0 {
                longest = longest.max(run);
                run = 0;
            }
        }
        longest.max(run)
    }

    /// Whether the map holds too little information for a reliable
    /// estimate. A warning signal, never a blocker.
    pub fn suspicious_input(&self, threshold: usize) -> bool {
        self.n_target_only() < threshold || self.n_max() < threshold
    }

    pub fn is_estimated(&self) -> bool {
        self.curve.is_some()
    }

    /// Computes the PEP curve. Polls the cancellation flag per score bin;
    /// a canceled run leaves the map unestimated.
    pub fn estimate_probabilities(&mut self, progress: &dyn ProgressHandler) {
        if self.bins.is_empty() {
            debug!("No points to estimate probabilities from");
            self.curve = Some(Vec::new());
            return;
        }

        // Bins from best score down, with prefix sums for window lookups.
        let desc: Vec<(f64, Bin)> = self
            .bins
            .iter()
            .rev()
            .map(|(score, bin)| (score.0, *bin))
            .collect();
        let mut prefix_targets = vec![0usize; desc.len() + 1];
        let mut prefix_decoys = vec![0usize; desc.len() + 1];
        let mut prefix_points = vec![0usize; desc.len() + 1];
        for (i, (_, bin)) in desc.iter().enumerate() {
            prefix_targets[i + 1] = prefix_targets[i] + bin.n_target as usize;
            prefix_decoys[i + 1] = prefix_decoys[i] + bin.n_decoy as usize;
            prefix_points[i + 1] =
                prefix_points[i] + bin.n_target as usize + bin.n_decoy as usize;
        }
        let points_in = |lo: usize, hi: usize| prefix_points[hi + 1] - prefix_points[lo];

        let mut raw = Vec::with_capacity(desc.len());
        for i in 0..desc.len() {
            if progress.is_canceled() {
                return;
            }
            let (mut lo, mut hi) = (i, i);
            while points_in(lo, hi) < self.window_points && (lo > 0 || hi + 1 < desc.len()) {
                if lo > 0 {
                    lo -= 1;
                }
                if points_in(lo, hi) >= self.window_points {
                    break;
                }
                if hi + 1 < desc.len() {
                    hi += 1;
                }
            }
            let targets = prefix_targets[hi + 1] - prefix_targets[lo];
            let decoys = prefix_decoys[hi + 1] - prefix_decoys[lo];
            let pep = if decoys == 0 {
                0.0
            } else if targets == 0 {
                1.0
            } else {
                (decoys as f64 / targets as f64).clamp(0.0, 1.0)
            };
            raw.push(pep);
        }

        // Reverse running minimum makes the curve monotone: worse scores
        // can never look more confident than better ones.
        let mut pep_min = 1.0f64;
        for pep in raw.iter_mut().rev() {
            pep_min = pep_min.min(*pep);
            *pep = pep_min;
        }

        let mut curve: Vec<CurvePoint> = desc
            .iter()
            .zip(raw.iter())
            .map(|(&(score, _), &pep)| CurvePoint { score, pep })
            .collect();
        curve.reverse();
        debug!(
            n_bins = curve.len(),
            n_targets = self.n_targets,
            n_decoys = self.n_decoys,
            "Probabilities estimated"
        );
        self.curve = Some(curve);
    }

    /// PEP at the nearest estimated score at or below the query. A step
    /// function: consumers must not interpolate. `None` before estimation.
    pub fn get_probability(&self, score: f64) -> Option<f64> {
        let curve = self.curve.as_ref()?;
        if curve.is_empty() {
            return None;
        }
        let idx = curve.partition_point(|p| p.score <= score);
        if idx == 0 {
            Some(curve[0].pep)
        } else {
            Some(curve[idx - 1].pep)
        }
    }
}
