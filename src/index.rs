//! # Index
//!
//! The data model (spec §3) and the in-memory catalogue that maps snapshot
//! ID → snapshot metadata (component C3, spec §4.3). Lookup by ID is O(1);
//! hash and chain lookups are O(n) scans, which is acceptable at the
//! expected scale of "a few thousand snapshots per storage root" (spec §5).
//!
//! `SnapshotIndex` is pure in-memory state — it knows nothing about how it
//! reaches disk. Persistence is [`crate::storage::Storage`]'s job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Current on-disk schema version. Readers must reject any other value
/// (spec §4.3: "readers must reject unknown versions").
pub const INDEX_VERSION: u32 = 1;

/// Whether a captured file lives inside a `.klaudiush` project directory or
/// is a global (user-wide) config.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConfigType {
    Global,
    Project,
}

impl ConfigType {
    /// Inspects `path` for a `.klaudiush` component (spec §4.4 step 11).
    pub fn detect(path: &std::path::Path) -> Self {
        let has_marker = path
            .components()
            .any(|c| c.as_os_str() == ".klaudiush");
        if has_marker {
            ConfigType::Project
        } else {
            ConfigType::Global
        }
    }
}

/// What caused a snapshot to be taken.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Manual,
    Automatic,
    BeforeInit,
    Migration,
}

/// Whether a snapshot stores the whole file (`Full`) or a delta over a base
/// (`Patch`, reserved — the engine currently only emits `Full`, spec §1).
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StorageType {
    Full,
    Patch,
}

/// User-supplied and environment-derived context recorded with a snapshot.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct SnapshotMetadata {
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub command: String,
    /// SHA-256 of the captured content. Equals [`Snapshot::checksum`] for
    /// `Full` snapshots (spec §3 invariant 3).
    #[serde(default)]
    pub config_hash: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub description: String,
}

/// Immutable record of one captured file (spec §3).
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Snapshot {
    /// 16-hex-char deterministic ID, see [`crate::fingerprint::snapshot_id`].
    pub id: String,
    /// 1-based position within `chain_id`.
    pub sequence_num: u64,
    pub timestamp: DateTime<Utc>,
    pub config_path: PathBuf,
    pub config_type: ConfigType,
    pub trigger: Trigger,
    pub storage_type: StorageType,
    /// Opaque locator produced by [`crate::storage::Storage`]; callers must
    /// not parse it.
    pub storage_path: PathBuf,
    pub size: u64,
    /// Hex SHA-256 of the stored blob.
    pub checksum: String,
    /// `chain-N`, monotonically increasing within a storage root.
    pub chain_id: String,
    #[serde(default)]
    pub base_snapshot_id: String,
    #[serde(default)]
    pub patch_from: String,
    pub metadata: SnapshotMetadata,
}

/// The in-memory catalogue. Serializes as `metadata.json` (spec §6).
///
/// Unknown top-level keys are ignored on read (no `deny_unknown_fields`);
/// unknown `storage_type`/`trigger`/`config_type` strings fail to parse,
/// because serde rejects unrecognized enum variants by default.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SnapshotIndex {
    pub version: u32,
    pub updated: DateTime<Utc>,
    pub snapshots: BTreeMap<String, Snapshot>,
    /// High-water mark of every `chain-N` ever assigned in this storage
    /// root, including chains later evicted by retention. Not part of the
    /// spec's minimal schema sketch, but required to honor spec §3
    /// invariant 6 ("strictly greater than any previously retired chain
    /// number") once retention has removed the only snapshot that used to
    /// carry the evidence of a high chain number. Readers that don't know
    /// about this field simply ignore it (spec §6: "unknown top-level keys
    /// must be ignored on read").
    #[serde(default)]
    pub max_chain_seen: u64,
}

impl SnapshotIndex {
    pub fn new() -> Self {
        Self {
            version: INDEX_VERSION,
            updated: Utc::now(),
            snapshots: BTreeMap::new(),
            max_chain_seen: 0,
        }
    }

    /// Inserts or replaces a snapshot and refreshes `updated`.
    pub fn add(&mut self, snapshot: Snapshot) {
        if let Some(n) = chain_number(&snapshot.chain_id) {
            self.max_chain_seen = self.max_chain_seen.max(n);
        }
        self.snapshots.insert(snapshot.id.clone(), snapshot);
        self.updated = Utc::now();
    }

    pub fn get(&self, id: &str) -> Option<&Snapshot> {
        self.snapshots.get(id)
    }

    /// Removes a snapshot by ID, refreshing `updated` if it was present.
    pub fn delete(&mut self, id: &str) -> Option<Snapshot> {
        let removed = self.snapshots.remove(id);
        if removed.is_some() {
            self.updated = Utc::now();
        }
        removed
    }

    /// All snapshots, in arbitrary (BTreeMap id-sorted) order.
    pub fn list(&self) -> Vec<&Snapshot> {
        self.snapshots.values().collect()
    }

    /// First snapshot whose `metadata.config_hash` matches `hash`, used for
    /// the dedup probe (spec §3 invariant 4, §4.4 step 6).
    pub fn find_by_hash(&self, hash: &str) -> Option<&Snapshot> {
        self.snapshots
            .values()
            .find(|s| s.metadata.config_hash == hash)
    }

    /// All snapshots sharing `chain_id`, ordered by `sequence_num`.
    pub fn get_chain(&self, chain_id: &str) -> Vec<&Snapshot> {
        let mut chain: Vec<&Snapshot> = self
            .snapshots
            .values()
            .filter(|s| s.chain_id == chain_id)
            .collect();
        chain.sort_by_key(|s| s.sequence_num);
        chain
    }

    /// Highest `N` ever assigned among `chain-N` IDs in this storage root,
    /// including chains since evicted by retention (spec §3 invariant 6).
    /// Used by the Manager to assign the next chain number (spec §4.4
    /// step 7).
    pub fn max_chain_number(&self) -> u64 {
        self.max_chain_seen
    }
}

impl Default for SnapshotIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses the `N` out of a `chain-N` identifier.
pub fn chain_number(chain_id: &str) -> Option<u64> {
    chain_id.strip_prefix("chain-")?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sample_snapshot(id: &str, chain_id: &str, seq: u64, hash: &str) -> Snapshot {
        Snapshot {
            id: id.to_string(),
            sequence_num: seq,
            timestamp: Utc::now(),
            config_path: PathBuf::from("/tmp/cfg.toml"),
            config_type: ConfigType::Global,
            trigger: Trigger::Manual,
            storage_type: StorageType::Full,
            storage_path: PathBuf::from(format!("/tmp/store/{id}")),
            size: 10,
            checksum: hash.to_string(),
            chain_id: chain_id.to_string(),
            base_snapshot_id: String::new(),
            patch_from: String::new(),
            metadata: SnapshotMetadata {
                config_hash: hash.to_string(),
                ..Default::default()
            },
        }
    }

    #[test]
    fn add_get_delete_roundtrip() {
        let mut index = SnapshotIndex::new();
        let snap = sample_snapshot("aaaa111122223333", "chain-1", 1, "hash1");
        index.add(snap.clone());

        assert_eq!(index.get("aaaa111122223333").unwrap().id, snap.id);
        assert_eq!(index.list().len(), 1);

        let removed = index.delete("aaaa111122223333");
        assert!(removed.is_some());
        assert!(index.get("aaaa111122223333").is_none());
    }

    #[test]
    fn find_by_hash_first_match() {
        let mut index = SnapshotIndex::new();
        index.add(sample_snapshot("id1", "chain-1", 1, "hashA"));
        index.add(sample_snapshot("id2", "chain-2", 1, "hashB"));

        let found = index.find_by_hash("hashB").unwrap();
        assert_eq!(found.id, "id2");
        assert!(index.find_by_hash("hashC").is_none());
    }

    #[test]
    fn chain_ordered_by_sequence() {
        let mut index = SnapshotIndex::new();
        index.add(sample_snapshot("id2", "chain-1", 2, "h2"));
        index.add(sample_snapshot("id1", "chain-1", 1, "h1"));
        index.add(sample_snapshot("id3", "chain-1", 3, "h3"));

        let chain = index.get_chain("chain-1");
        let ids: Vec<_> = chain.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["id1", "id2", "id3"]);
    }

    #[test]
    fn max_chain_number_tracks_highest() {
        let mut index = SnapshotIndex::new();
        assert_eq!(index.max_chain_number(), 0);

        index.add(sample_snapshot("id1", "chain-3", 1, "h1"));
        index.add(sample_snapshot("id2", "chain-7", 1, "h2"));
        assert_eq!(index.max_chain_number(), 7);
    }

    #[test]
    fn config_type_detects_project_marker() {
        let global = PathBuf::from("/home/user/.config/app.toml");
        let project = PathBuf::from("/home/user/repo/.klaudiush/config.toml");
        assert_eq!(ConfigType::detect(&global), ConfigType::Global);
        assert_eq!(ConfigType::detect(&project), ConfigType::Project);
    }

    #[test]
    fn serde_rejects_unknown_trigger() {
        let json = r#"{"id":"x","sequence_num":1,"timestamp":"2024-01-01T00:00:00Z",
            "config_path":"/x","config_type":"global","trigger":"not_a_real_trigger",
            "storage_type":"full","storage_path":"/y","size":1,"checksum":"c",
            "chain_id":"chain-1","base_snapshot_id":"","patch_from":"",
            "metadata":{"user":"","hostname":"","command":"","config_hash":"c","tag":"","description":""}}"#;
        let result: std::result::Result<Snapshot, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn index_ignores_unknown_top_level_keys() {
        let json = r#"{"version":1,"updated":"2024-01-01T00:00:00Z","snapshots":{},"future_field":42}"#;
        let index: SnapshotIndex = serde_json::from_str(json).unwrap();
        assert_eq!(index.version, 1);
    }
}
