use crate::errors::{
    Result,
    TagMapError,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Thresholds used by the target-decoy maps and the validation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Minimal target-only count and map size a category needs to stand on
    /// its own during grouping.
    pub group_threshold: usize,
    /// Below this target-only count (or resolution) a map is flagged as
    /// statistically suspicious.
    pub suspicious_threshold: usize,
    /// Minimal number of raw points the PEP smoothing window grows to hold.
    pub pep_window_points: usize,
    /// PEP at or below which a match is considered confident.
    pub confidence_pep: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            group_threshold: 100,
            suspicious_threshold: 100,
            pep_window_points: 100,
            confidence_pep: 0.01,
        }
    }
}

/// Work partitioning granularity for the mapping scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartitionStrategy {
    /// One unit of work per tag composition key (private matcher per unit).
    #[serde(rename = "per_key")]
    PerKey,
    /// One unit of work per spectrum match (matcher shared within a key).
    #[serde(rename = "per_match")]
    PerMatch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingConfig {
    pub partition: PartitionStrategy,
    /// Memory share above which matcher caches are disabled and cleared.
    pub cache_clear_share: f64,
    /// Memory share above which the index postings cache is reduced.
    pub index_reduce_share: f64,
    /// Share of cache entries dropped on a reduction.
    pub reduce_factor: f64,
    /// Overall wall-clock budget for one mapping run.
    pub mapping_timeout_secs: u64,
    /// Extension depth for charge-dependent possible-tag generation.
    pub extension_depth: usize,
    /// Terminal confirming-ion count below which a terminus is extended.
    pub min_terminal_ions: usize,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            partition: PartitionStrategy::PerKey,
            cache_clear_share: 0.9,
            index_reduce_share: 0.8,
            reduce_factor: 0.5,
            mapping_timeout_secs: 86_400,
            extension_depth: 2,
            min_terminal_ions: 3,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub mapping: MappingConfig,
}

impl Config {
    pub fn from_json_path(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| TagMapError::Io {
            source,
            path: Some(path.to_path_buf()),
        })?;
        let config = serde_json::from_reader(BufReader::new(file))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.validation.group_threshold, 100);
        assert_eq!(config.mapping.partition, PartitionStrategy::PerKey);
        assert_eq!(config.mapping.mapping_timeout_secs, 86_400);
    }

    #[test]
    fn test_json_round_trip() {
        let config = Config::default();
        let as_json = serde_json::to_string(&config).unwrap();
        let back: Config = serde_json::from_str(&as_json).unwrap();
        assert_eq!(back.validation.pep_window_points, 100);
        assert_eq!(back.mapping.extension_depth, 2);
    }

    #[test]
    fn test_partial_json() {
        let back: Config = serde_json::from_str(r#"{"mapping": {"partition": "per_match", "cache_clear_share": 0.95, "index_reduce_share": 0.8, "reduce_factor": 0.5, "mapping_timeout_secs": 60, "extension_depth": 2, "min_terminal_ions": 3}}"#).unwrap();
        assert_eq!(back.mapping.partition, PartitionStrategy::PerMatch);
        assert_eq!(back.validation.group_threshold, 100);
    }
}
