//! Concurrent scheduling of tag mapping.
//!
//! Matches are grouped by the composition key of their best tag so that
//! similar tags land in the same work unit and share matcher cache hits.
//! Units own their matches: they are moved into a worker and handed back
//! over a channel when done, so no match is ever touched by two threads.
//! Workers poll the shared cancellation flag between matches and the first
//! worker error cancels the run; units in flight finish their current
//! match and the error surfaces once to the caller.

use crate::config::{
    MappingConfig,
    PartitionStrategy,
};
use crate::errors::{
    Result,
    TagMapError,
};
use crate::mapping::annotate::count_terminal_ions;
use crate::mapping::matcher::TagMatcher;
use crate::mapping::remap::remap_modifications;
use crate::memory::MemoryProbe;
use crate::models::modification::ModificationRegistry;
use crate::models::{
    Advocate,
    PeptideAssumption,
    SearchParameters,
    SpectrumMatch,
    SpectrumSource,
    TagAssumption,
};
use crate::progress::ProgressHandler;
use rayon::ThreadPoolBuilder;
use seqtree::SequenceTree;
use std::collections::{
    BTreeMap,
    HashSet,
};
use std::sync::mpsc::{
    self,
    RecvTimeoutError,
};
use std::sync::Arc;
use std::time::{
    Duration,
    Instant,
};
use tracing::{
    debug,
    info,
    warn,
};

/// Spectrum matches grouped by tag composition key.
pub type TagsMap = BTreeMap<String, Vec<SpectrumMatch>>;

/// Groups matches by the composition key of their best-scoring tag.
/// Matches without a usable tag land under the empty key.
pub fn group_by_composition_key(
    matches: Vec<SpectrumMatch>,
    key_size: usize,
    indistinguishable: bool,
) -> TagsMap {
    let mut map = TagsMap::new();
    for spectrum_match in matches {
        let key = spectrum_match
            .composition_key(key_size, indistinguishable)
            .unwrap_or_default();
        map.entry(key).or_default().push(spectrum_match);
    }
    map
}

/// Everything a mapping run shares across workers.
#[derive(Clone)]
pub struct MapperContext {
    pub tree: Arc<SequenceTree>,
    pub spectra: Arc<dyn SpectrumSource>,
    pub probe: Arc<dyn MemoryProbe>,
    pub params: Arc<SearchParameters>,
    pub registry: Arc<ModificationRegistry>,
    pub config: MappingConfig,
}

struct UnitOutcome {
    key: String,
    matches: Vec<SpectrumMatch>,
    outcome: Result<()>,
}

pub struct TagMappingScheduler {
    context: MapperContext,
}

impl TagMappingScheduler {
    pub fn new(context: MapperContext) -> Self {
        Self { context }
    }

    fn matcher(&self) -> TagMatcher {
        TagMatcher::new(
            &self.context.params.modification_profile,
            self.context.params.sequence_matching.clone(),
            self.context.registry.clone(),
        )
    }

    /// Maps every tag of every match onto the sequence index.
    ///
    /// With one thread the sweep is sequential and deterministic. With
    /// more, matches are dispatched to a dedicated pool according to the
    /// configured partition strategy and collected back under an overall
    /// wall-clock deadline; hitting the deadline is reported through the
    /// progress handler and is not an error.
    pub fn map_tags(
        &self,
        tags_map: &mut TagsMap,
        progress: Arc<dyn ProgressHandler>,
        n_threads: usize,
    ) -> Result<()> {
        let total: usize = tags_map.values().map(|v| v.len()).sum();
        progress.set_max(total as u64);
        info!(n_matches = total, n_keys = tags_map.len(), n_threads, "Mapping tags");

        if n_threads <= 1 {
            for matches in tags_map.values_mut() {
                let matcher = self.matcher();
                for spectrum_match in matches.iter_mut() {
                    if progress.is_canceled() {
                        return Ok(());
                    }
                    self.map_tags_for_match(&matcher, spectrum_match, progress.as_ref())?;
                }
            }
            return Ok(());
        }

        let pool = ThreadPoolBuilder::new().num_threads(n_threads).build()?;
        let (tx, rx) = mpsc::channel::<UnitOutcome>();
        let mut n_units = 0usize;
        for (key, matches) in std::mem::take(tags_map) {
            if progress.is_canceled() {
                tags_map.entry(key).or_default().extend(matches);
                continue;
            }
            match self.context.config.partition {
                PartitionStrategy::PerKey => {
                    n_units += 1;
                    let worker = TagMappingScheduler::new(self.context.clone());
                    let progress = progress.clone();
                    let tx = tx.clone();
                    pool.spawn(move || {
                        let matcher = worker.matcher();
                        let mut matches = matches;
                        let outcome = worker.run_unit(&matcher, &mut matches, &progress);
                        let _ = tx.send(UnitOutcome {
                            key,
                            matches,
                            outcome,
                        });
                    });
                }
                PartitionStrategy::PerMatch => {
                    let matcher = Arc::new(self.matcher());
                    for spectrum_match in matches {
                        n_units += 1;
                        let worker = TagMappingScheduler::new(self.context.clone());
                        let matcher = matcher.clone();
                        let progress = progress.clone();
                        let tx = tx.clone();
                        let key = key.clone();
                        pool.spawn(move || {
                            let mut matches = vec![spectrum_match];
                            let outcome = worker.run_unit(&matcher, &mut matches, &progress);
                            let _ = tx.send(UnitOutcome {
                                key,
                                matches,
                                outcome,
                            });
                        });
                    }
                }
            }
        }
        drop(tx);

        let deadline =
            Instant::now() + Duration::from_secs(self.context.config.mapping_timeout_secs);
        let mut first_error: Option<TagMapError> = None;
        let mut received = 0usize;
        while received < n_units {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok(unit) => {
                    received += 1;
                    tags_map.entry(unit.key).or_default().extend(unit.matches);
                    if let Err(error) = unit.outcome {
                        if first_error.is_none() {
                            progress.cancel();
                            first_error = Some(error);
                        }
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!(
                        timeout_secs = self.context.config.mapping_timeout_secs,
                        "Tag mapping timed out"
                    );
                    progress.append_report(&format!(
                        "Tag mapping timed out after {} s",
                        self.context.config.mapping_timeout_secs
                    ));
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn run_unit(
        &self,
        matcher: &TagMatcher,
        matches: &mut [SpectrumMatch],
        progress: &Arc<dyn ProgressHandler>,
    ) -> Result<()> {
        for spectrum_match in matches.iter_mut() {
            if progress.is_canceled() {
                break;
            }
            self.map_tags_for_match(matcher, spectrum_match, progress.as_ref())?;
        }
        Ok(())
    }

    /// Maps the tags of one match and records the resulting peptide hits.
    ///
    /// Each tag assumption is inspected for terminal ion support; a poorly
    /// supported terminus triggers charge-dependent extensions toward that
    /// terminus, and every unambiguously reversible tag contributes its
    /// reversed variant. Inspected tags are deduplicated by canonical key,
    /// remapped to canonical modification names, and queried against the
    /// index.
    pub fn map_tags_for_match(
        &self,
        matcher: &TagMatcher,
        spectrum_match: &mut SpectrumMatch,
        progress: &dyn ProgressHandler,
    ) -> Result<()> {
        let context = &self.context;
        let spectrum = context
            .spectra
            .spectrum(&spectrum_match.key)
            .ok_or_else(|| TagMapError::MissingSpectrum {
                key: spectrum_match.key.clone(),
            })?;
        let tolerance = context.params.fragment_accuracy;
        let min_ions = context.config.min_terminal_ions;

        let by_advocate = spectrum_match.tag_assumptions().clone();
        for (advocate_id, assumptions) in by_advocate {
            let advocate = Advocate::from_id(advocate_id)?;
            let mut queue: Vec<TagAssumption> = Vec::new();
            for assumption in assumptions {
                let (n_b, n_y) =
                    count_terminal_ions(&assumption.tag, spectrum, &context.registry, tolerance);
                debug!(key = %spectrum_match.key, n_b, n_y, "Terminal ion support");
                if n_b < min_ions {
                    queue.extend(assumption.possible_tags(
                        false,
                        context.params.min_charge,
                        context.params.max_charge,
                        context.config.extension_depth,
                        spectrum.precursor_mz,
                        &context.registry,
                    ));
                }
                if n_y < min_ions {
                    queue.extend(assumption.possible_tags(
                        true,
                        context.params.min_charge,
                        context.params.max_charge,
                        context.config.extension_depth,
                        spectrum.precursor_mz,
                        &context.registry,
                    ));
                }
                if assumption.tag.can_reverse() {
                    queue.push(assumption.reverse());
                }
                queue.push(assumption);
            }

            let mut seen: HashSet<String> = HashSet::new();
            for candidate in queue {
                if !seen.insert(candidate.tag.as_key()) {
                    continue;
                }
                self.check_memory(matcher);
                let mut tag = candidate.tag.clone();
                remap_modifications(&mut tag, advocate, &context.params, &context.registry)?;
                let tag_key = tag.as_key();
                for peptide in matcher.map_tag(&tag, &context.tree, tolerance) {
                    let hit = PeptideAssumption::from_tag(
                        peptide,
                        &candidate,
                        candidate.rank,
                        tag_key.clone(),
                    );
                    spectrum_match.add_hit(advocate, hit);
                }
            }
        }

        spectrum_match.elect_best_assumption();
        progress.increment();
        Ok(())
    }

    /// Degrades caches under memory pressure. Above the clear threshold the
    /// matcher cache is disabled and dropped and the index cache emptied;
    /// above the reduce threshold the index cache is shrunk by the
    /// configured factor.
    fn check_memory(&self, matcher: &TagMatcher) {
        let share = self.context.probe.used_share();
        let config = &self.context.config;
        if share > config.cache_clear_share {
            warn!(share, "Memory high, clearing mapping caches");
            matcher.set_use_cache(false);
            matcher.clear_cache();
            self.context.tree.reduce_cache_size(1.0);
        } else if share > config.index_reduce_share {
            debug!(share, "Memory elevated, reducing index cache");
            self.context.tree.reduce_cache_size(config.reduce_factor);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::FixedProbe;
    use crate::models::tag::{
        AminoAcidSequence,
        Tag,
        TagComponent,
    };
    use crate::models::{
        InMemorySpectra,
        Peak,
        Spectrum,
    };
    use crate::progress::SilentProgress;
    use seqtree::masses::{
        residue_mass,
        PROTON,
        WATER,
    };
    use seqtree::TreeConfig;

    fn peak(mz: f64) -> Peak {
        Peak {
            mz,
            intensity: 100.0,
        }
    }

    fn residue(aa: char) -> f64 {
        residue_mass(aa).unwrap()
    }

    fn test_context(partition: PartitionStrategy, memory_share: f64) -> MapperContext {
        let tree = SequenceTree::build(
            vec![
                ("P1".to_string(), "MKWVTFISLLK".to_string()),
                ("P2".to_string(), "PEPTIDEKPEPTIDER".to_string()),
                ("P2_REVERSED".to_string(), "REDITPEPKEDITPEP".to_string()),
            ],
            TreeConfig::default(),
        )
        .unwrap();
        let mut spectra = InMemorySpectra::new();
        for i in 1..=4 {
            spectra.insert(format!("spectrum {}", i), Spectrum::new(500.0, Vec::new()));
        }
        MapperContext {
            tree: Arc::new(tree),
            spectra: Arc::new(spectra),
            probe: Arc::new(FixedProbe(memory_share)),
            params: Arc::new(SearchParameters::default()),
            registry: Arc::new(ModificationRegistry::with_defaults()),
            config: MappingConfig {
                partition,
                ..MappingConfig::default()
            },
        }
    }

    fn tag_match(key: &str, residues: &str, score: f64) -> SpectrumMatch {
        let mut spectrum_match = SpectrumMatch::new(key);
        spectrum_match.add_tag_assumption(TagAssumption {
            tag: Tag::new(vec![TagComponent::Sequence(AminoAcidSequence::new(
                residues,
            ))]),
            rank: 1,
            advocate: Advocate::Pepnovo,
            charge: 2,
            score,
            source_file: "run1.mgf".to_string(),
        });
        spectrum_match
    }

    fn test_tags_map() -> TagsMap {
        group_by_composition_key(
            vec![
                tag_match("spectrum 1", "PEPTIDE", 30.0),
                tag_match("spectrum 2", "PEPTIDEK", 25.0),
                tag_match("spectrum 3", "WVTFIS", 20.0),
                tag_match("spectrum 4", "MKWVT", 15.0),
            ],
            3,
            true,
        )
    }

    fn sorted_matches(tags_map: &TagsMap) -> Vec<SpectrumMatch> {
        let mut matches: Vec<SpectrumMatch> =
            tags_map.values().flatten().cloned().collect();
        matches.sort_by(|a, b| a.key.cmp(&b.key));
        matches
    }

    #[test]
    fn test_grouping_by_composition_key() {
        let tags_map = test_tags_map();
        // PEPTIDE and PEPTIDEK share a key; the I in WVTFIS is normalized.
        assert_eq!(tags_map["PEP"].len(), 2);
        assert_eq!(tags_map["WVT"].len(), 1);
        assert_eq!(tags_map["MKW"].len(), 1);
    }

    #[test]
    fn test_sequential_mapping_records_hits() {
        let scheduler = TagMappingScheduler::new(test_context(PartitionStrategy::PerKey, 0.1));
        let mut tags_map = test_tags_map();
        let progress = Arc::new(SilentProgress::new());
        scheduler
            .map_tags(&mut tags_map, progress.clone(), 1)
            .unwrap();
        assert_eq!(progress.progress(), (4, 4));

        let matches = sorted_matches(&tags_map);
        let first = &matches[0];
        assert_eq!(first.key, "spectrum 1");
        // The tag itself hits the target protein and, with no fragment
        // support on either side, its reversed variant hits the decoy.
        assert_eq!(first.n_hits(), 2);
        let sequences: Vec<&str> = first
            .all_hits()
            .map(|h| h.peptide.sequence.as_str())
            .collect();
        assert!(sequences.contains(&"PEPTIDE"));
        assert!(sequences.contains(&"EDITPEP"));
        let best = first.best_assumption.as_ref().unwrap();
        assert_eq!(best.charge, 2);
        assert!(best.tag_key.is_some());
    }

    #[test]
    fn test_terminal_extensions_recover_full_peptide() {
        let base = test_context(PartitionStrategy::PerKey, 0.1);
        // Precursor holding exactly one unexplained lysine at charge 2:
        // with no ion support on either terminus, the forward extension
        // recovers PEPTIDEK and the backward extension KPEPTIDE.
        let tag = Tag::new(vec![TagComponent::Sequence(AminoAcidSequence::new(
            "PEPTIDE",
        ))]);
        let precursor_mz = (tag.mass(&base.registry)
            + seqtree::masses::residue_mass('K').unwrap()
            + 2.0 * seqtree::masses::PROTON)
            / 2.0;
        let mut spectra = InMemorySpectra::new();
        spectra.insert("spectrum 1", Spectrum::new(precursor_mz, Vec::new()));
        let scheduler = TagMappingScheduler::new(MapperContext {
            spectra: Arc::new(spectra),
            ..base
        });

        let mut tags_map = group_by_composition_key(
            vec![tag_match("spectrum 1", "PEPTIDE", 30.0)],
            3,
            true,
        );
        scheduler
            .map_tags(&mut tags_map, Arc::new(SilentProgress::new()), 1)
            .unwrap();

        let matches = sorted_matches(&tags_map);
        let mut sequences: Vec<&str> = matches[0]
            .all_hits()
            .map(|h| h.peptide.sequence.as_str())
            .collect();
        sequences.sort_unstable();
        assert_eq!(sequences, vec!["EDITPEP", "KPEPTIDE", "PEPTIDE", "PEPTIDEK"]);
    }

    #[test]
    fn test_weak_c_terminus_extends_toward_c_terminus() {
        let base = test_context(PartitionStrategy::PerKey, 0.1);
        let tag = Tag::new(vec![TagComponent::Sequence(AminoAcidSequence::new(
            "PEPTIDE",
        ))]);
        // b1-b3 confirm the N terminus; nothing confirms the C terminus,
        // so only the C-terminal extension is searched. The reversed decoy
        // variant is searched regardless of which terminus dominates.
        let peaks = vec![
            peak(residue('P') + PROTON),
            peak(residue('P') + residue('E') + PROTON),
            peak(residue('P') + residue('E') + residue('P') + PROTON),
        ];
        let precursor_mz =
            (tag.mass(&base.registry) + residue('K') + 2.0 * PROTON) / 2.0;
        let mut spectra = InMemorySpectra::new();
        spectra.insert("spectrum 1", Spectrum::new(precursor_mz, peaks));
        let scheduler = TagMappingScheduler::new(MapperContext {
            spectra: Arc::new(spectra),
            ..base
        });

        let mut tags_map = group_by_composition_key(
            vec![tag_match("spectrum 1", "PEPTIDE", 30.0)],
            3,
            true,
        );
        scheduler
            .map_tags(&mut tags_map, Arc::new(SilentProgress::new()), 1)
            .unwrap();

        let matches = sorted_matches(&tags_map);
        let mut sequences: Vec<&str> = matches[0]
            .all_hits()
            .map(|h| h.peptide.sequence.as_str())
            .collect();
        sequences.sort_unstable();
        assert_eq!(sequences, vec!["EDITPEP", "PEPTIDE", "PEPTIDEK"]);
    }

    #[test]
    fn test_weak_n_terminus_extends_toward_n_terminus() {
        let base = test_context(PartitionStrategy::PerKey, 0.1);
        let tag = Tag::new(vec![TagComponent::Sequence(AminoAcidSequence::new(
            "PEPTIDE",
        ))]);
        // y1-y3 confirm the C terminus; the unexplained lysine is searched
        // at the N-terminal end only.
        let peaks = vec![
            peak(residue('E') + WATER + PROTON),
            peak(residue('D') + residue('E') + WATER + PROTON),
            peak(residue('I') + residue('D') + residue('E') + WATER + PROTON),
        ];
        let precursor_mz =
            (tag.mass(&base.registry) + residue('K') + 2.0 * PROTON) / 2.0;
        let mut spectra = InMemorySpectra::new();
        spectra.insert("spectrum 1", Spectrum::new(precursor_mz, peaks));
        let scheduler = TagMappingScheduler::new(MapperContext {
            spectra: Arc::new(spectra),
            ..base
        });

        let mut tags_map = group_by_composition_key(
            vec![tag_match("spectrum 1", "PEPTIDE", 30.0)],
            3,
            true,
        );
        scheduler
            .map_tags(&mut tags_map, Arc::new(SilentProgress::new()), 1)
            .unwrap();

        let matches = sorted_matches(&tags_map);
        let mut sequences: Vec<&str> = matches[0]
            .all_hits()
            .map(|h| h.peptide.sequence.as_str())
            .collect();
        sequences.sort_unstable();
        assert_eq!(sequences, vec!["EDITPEP", "KPEPTIDE", "PEPTIDE"]);
    }

    #[test]
    fn test_parallel_equals_sequential() {
        let scheduler = TagMappingScheduler::new(test_context(PartitionStrategy::PerKey, 0.1));

        let mut sequential = test_tags_map();
        scheduler
            .map_tags(&mut sequential, Arc::new(SilentProgress::new()), 1)
            .unwrap();

        let mut parallel = test_tags_map();
        scheduler
            .map_tags(&mut parallel, Arc::new(SilentProgress::new()), 3)
            .unwrap();

        assert_eq!(sorted_matches(&sequential), sorted_matches(&parallel));
    }

    #[test]
    fn test_per_match_partition_equals_per_key() {
        let per_key = TagMappingScheduler::new(test_context(PartitionStrategy::PerKey, 0.1));
        let per_match =
            TagMappingScheduler::new(test_context(PartitionStrategy::PerMatch, 0.1));

        let mut left = test_tags_map();
        per_key
            .map_tags(&mut left, Arc::new(SilentProgress::new()), 3)
            .unwrap();
        let mut right = test_tags_map();
        per_match
            .map_tags(&mut right, Arc::new(SilentProgress::new()), 3)
            .unwrap();

        assert_eq!(sorted_matches(&left), sorted_matches(&right));
    }

    #[test]
    fn test_missing_spectrum_is_an_error() {
        let scheduler = TagMappingScheduler::new(test_context(PartitionStrategy::PerKey, 0.1));
        let mut tags_map =
            group_by_composition_key(vec![tag_match("unknown spectrum", "PEPTIDE", 30.0)], 3, true);
        let err = scheduler
            .map_tags(&mut tags_map, Arc::new(SilentProgress::new()), 1)
            .unwrap_err();
        assert_eq!(err.to_string(), "No spectrum found for key unknown spectrum");
    }

    #[test]
    fn test_worker_error_cancels_parallel_run() {
        let scheduler = TagMappingScheduler::new(test_context(PartitionStrategy::PerKey, 0.1));
        let mut matches = vec![tag_match("unknown spectrum", "AAAK", 30.0)];
        matches.extend(
            (1..=4).map(|i| tag_match(&format!("spectrum {}", i), "PEPTIDE", 30.0)),
        );
        let mut tags_map = group_by_composition_key(matches, 3, true);
        let progress = Arc::new(SilentProgress::new());
        let err = scheduler
            .map_tags(&mut tags_map, progress.clone(), 2)
            .unwrap_err();
        assert!(matches!(err, TagMapError::MissingSpectrum { .. }));
        assert!(progress.is_canceled());
        // Every unit was handed back, processed or not.
        assert_eq!(tags_map.values().map(|v| v.len()).sum::<usize>(), 5);
    }

    #[test]
    fn test_cancellation_before_start() {
        let scheduler = TagMappingScheduler::new(test_context(PartitionStrategy::PerKey, 0.1));
        let mut tags_map = test_tags_map();
        let progress = Arc::new(SilentProgress::new());
        progress.cancel();
        scheduler
            .map_tags(&mut tags_map, progress.clone(), 1)
            .unwrap();
        assert_eq!(progress.progress().0, 0);
        assert!(sorted_matches(&tags_map).iter().all(|m| m.n_hits() == 0));
    }

    #[test]
    fn test_memory_pressure_degrades_caches() {
        let context = test_context(PartitionStrategy::PerKey, 0.95);
        let scheduler = TagMappingScheduler::new(context.clone());
        let matcher = scheduler.matcher();
        let tag = Tag::new(vec![TagComponent::Sequence(AminoAcidSequence::new(
            "PEPTIDE",
        ))]);
        matcher.map_tag(&tag, &context.tree, 0.02);
        assert_eq!(matcher.cache_len(), 1);

        scheduler.check_memory(&matcher);
        assert_eq!(matcher.cache_len(), 0);
        assert_eq!(context.tree.cache_len(), 0);
        // Disabled: a new query is not cached again.
        matcher.map_tag(&tag, &context.tree, 0.02);
        assert_eq!(matcher.cache_len(), 0);
    }

    #[test]
    fn test_elevated_memory_reduces_index_cache() {
        let context = test_context(PartitionStrategy::PerKey, 0.85);
        let scheduler = TagMappingScheduler::new(context.clone());
        let matcher = scheduler.matcher();
        for seed in ["PEPTIDE", "WVTFIS"] {
            context
                .tree
                .seed_occurrences(seed, &context.params.sequence_matching);
        }
        assert_eq!(context.tree.cache_len(), 2);
        scheduler.check_memory(&matcher);
        assert_eq!(context.tree.cache_len(), 1);
        // The matcher cache stays usable below the clear threshold.
        matcher.map_tag(
            &Tag::new(vec![TagComponent::Sequence(AminoAcidSequence::new(
                "PEPTIDE",
            ))]),
            &context.tree,
            0.02,
        );
        assert_eq!(matcher.cache_len(), 1);
    }
}
