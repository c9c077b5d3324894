//! Serde-deserializable configuration knobs for the ETL collector and the stages
//! that use it.
//!
//! Mirrors the shape of the upstream project's own `reth_config::config` module:
//! one small `Default`-implementing struct per tunable subsystem, composed into a
//! top-level [`StageConfig`] a deployment loads from a TOML file. This crate has no
//! dependency on the stage pipeline or storage layer, only on `serde`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for every [`esync_etl::Collector`](../esync_etl/struct.Collector.html)
/// created during a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EtlConfig {
    /// Scratch directory collectors spill sorted runs into. `None` defers to the
    /// host's configured data directory (out of scope for this crate; resolved by
    /// the caller before constructing a collector).
    pub dir: Option<PathBuf>,
    /// In-memory byte budget before a collector spills a sorted run to disk.
    /// Defaults to 512 MiB.
    pub file_size: usize,
    /// How often `Collector::load` emits a progress line, as a percent of total
    /// entries. Never more than 100 lines are emitted regardless of this value.
    pub log_every_percent: u8,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self { dir: None, file_size: Self::DEFAULT_FILE_SIZE, log_every_percent: 10 }
    }
}

impl EtlConfig {
    /// 512 MiB, the default flush threshold `T`.
    pub const DEFAULT_FILE_SIZE: usize = 512 * 1024 * 1024;

    /// Builds a config pointing at a given scratch directory with the default
    /// thresholds.
    #[must_use]
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir, ..Self::default() }
    }
}

/// Configuration for the `BlockHashes` stage. Currently has no tunables beyond the
/// shared [`EtlConfig`]; kept as its own type so a future tunable doesn't require
/// widening [`StageConfig`]'s shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockHashesConfig {}

/// Configuration for the `Senders` stage's recovery farm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderRecoveryConfig {
    /// Number of recovery packages handed to a worker per dispatch. Defaults to
    /// 50,000.
    pub batch_size: usize,
    /// Worker-pool ceiling. `None` defers to `hardware_concurrency()` at farm
    /// construction.
    pub max_workers: Option<usize>,
}

impl Default for SenderRecoveryConfig {
    fn default() -> Self {
        Self { batch_size: 50_000, max_workers: None }
    }
}

/// Top-level configuration composing every stage's tunables plus the shared ETL
/// defaults, the way the upstream project's `reth.toml` does.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    pub etl: EtlConfig,
    pub block_hashes: BlockHashesConfig,
    pub sender_recovery: SenderRecoveryConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_expected() {
        let cfg = StageConfig::default();
        assert_eq!(cfg.etl.file_size, 512 * 1024 * 1024);
        assert_eq!(cfg.sender_recovery.batch_size, 50_000);
        assert_eq!(cfg.sender_recovery.max_workers, None);
    }

    #[test]
    fn round_trips_through_json() {
        let cfg = StageConfig {
            sender_recovery: SenderRecoveryConfig { batch_size: 1_000, max_workers: Some(4) },
            ..Default::default()
        };
        let encoded = serde_json::to_string(&cfg).unwrap();
        let decoded: StageConfig = serde_json::from_str(&encoded).unwrap();
        assert_eq!(cfg, decoded);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let decoded: StageConfig = serde_json::from_str(r#"{"sender_recovery":{"batch_size":7}}"#).unwrap();
        assert_eq!(decoded.sender_recovery.batch_size, 7);
        assert_eq!(decoded.sender_recovery.max_workers, None);
        assert_eq!(decoded.etl.file_size, EtlConfig::DEFAULT_FILE_SIZE);
    }
}
