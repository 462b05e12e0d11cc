//! # Manager
//!
//! Orchestrates create/list/get, enforces the dedup invariant, assigns
//! chain IDs and sequence numbers, and persists the index (component C4,
//! spec §4.4). Restore and retention are delegated to
//! [`crate::restorer::Restorer`] and [`crate::retention`] respectively, but
//! the Manager remains the sole owner of index mutation (spec §3
//! "Ownership").
//!
//! Generalized from the teacher's `backup_target` orchestration in
//! `backup.rs` (walk → hash → dedup-check → compress → store → record),
//! narrowed to a single captured file per call and widened with the
//! chain/sequence bookkeeping and audit trail the teacher's flat
//! snapshot list never needed.

use crate::audit::{AuditEntry, AuditLogger, Operation};
use crate::collaborators::{Clock, EngineConfig, HostIdentity};
use crate::error::{CoreError, Result};
use crate::fingerprint;
use crate::index::{ConfigType, Snapshot, SnapshotMetadata, StorageType, Trigger};
use crate::restorer::{RestoreOptions, RestoreResult, Restorer};
use crate::retention::{self, AgePolicy, CompositePolicy, CountPolicy, RetentionOutcome, RetentionPolicy, SizePolicy};
use crate::storage::Storage;
use serde_json::json;
use std::path::{Path, PathBuf};

/// Optional overrides for a `create_backup` call. Fields left `None` fall
/// back to the `HostIdentity` collaborator or an empty string.
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    pub tag: Option<String>,
    pub description: Option<String>,
    pub command: Option<String>,
    pub user_override: Option<String>,
    pub hostname_override: Option<String>,
}

/// Orchestrates the snapshot store for one storage scope.
pub struct Manager {
    storage: Box<dyn Storage>,
    clock: Box<dyn Clock>,
    host: Box<dyn HostIdentity>,
    config: EngineConfig,
    audit: AuditLogger,
}

impl Manager {
    pub fn new(
        storage: Box<dyn Storage>,
        clock: Box<dyn Clock>,
        host: Box<dyn HostIdentity>,
        config: EngineConfig,
        audit: AuditLogger,
    ) -> Self {
        Self {
            storage,
            clock,
            host,
            config,
            audit,
        }
    }

    pub(crate) fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    pub(crate) fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    /// Captures `config_path` as a new snapshot, or returns the existing
    /// snapshot unchanged if its content already exists in the index
    /// (spec §4.4 "Create").
    pub fn create_backup(
        &self,
        config_path: &Path,
        trigger: Trigger,
        opts: CreateOptions,
    ) -> Result<Snapshot> {
        if !self.config.enabled {
            return Err(CoreError::Disabled);
        }

        let bytes = std::fs::read(config_path)
            .map_err(|_| CoreError::ConfigFileNotFound(config_path.to_path_buf()))?;

        if !self.storage.exists() {
            self.storage.initialize()?;
        }

        let mut index = self.storage.load_index()?;
        let content_hash = fingerprint::content_hash(&bytes);

        if let Some(existing) = index.find_by_hash(&content_hash) {
            // Dedup: successful no-op, no new blob, no index write, no audit entry.
            return Ok(existing.clone());
        }

        let next_chain_n = index.max_chain_number() + 1;
        let chain_id = format!("chain-{next_chain_n}");
        let sequence_num = 1;

        let timestamp = self.clock.now();
        let timestamp_nanos = self.clock.now_nanos();
        let id = fingerprint::snapshot_id(timestamp_nanos, &content_hash);

        let storage_path = match self.storage.save(&id, &bytes) {
            Ok(p) => p,
            Err(e) => {
                self.log_failure(Operation::Create, Some(config_path), None, &e);
                return Err(e);
            }
        };

        let metadata = SnapshotMetadata {
            user: opts
                .user_override
                .unwrap_or_else(|| self.host.user()),
            hostname: opts
                .hostname_override
                .unwrap_or_else(|| self.host.hostname()),
            command: opts.command.unwrap_or_default(),
            config_hash: content_hash.clone(),
            tag: opts.tag.unwrap_or_default(),
            description: opts.description.unwrap_or_default(),
        };

        let snapshot = Snapshot {
            id: id.clone(),
            sequence_num,
            timestamp,
            config_path: config_path.to_path_buf(),
            config_type: ConfigType::detect(config_path),
            trigger,
            storage_type: StorageType::Full,
            storage_path,
            size: bytes.len() as u64,
            checksum: content_hash.clone(),
            chain_id,
            base_snapshot_id: String::new(),
            patch_from: String::new(),
            metadata,
        };

        index.add(snapshot.clone());
        if let Err(e) = self.storage.save_index(&index) {
            // The blob is now orphaned; a doctor-style sweeper is expected
            // to reconcile it later (spec §4.4 step 12).
            self.log_failure(Operation::Create, Some(config_path), None, &e);
            return Err(CoreError::IndexSaveFailed {
                source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
            });
        }

        let extra = json!({
            "size": snapshot.size,
            "storage_type": snapshot.storage_type,
            "trigger": snapshot.trigger,
        });
        let _ = self.audit.log(
            AuditEntry::success(Operation::Create, self.clock.now())
                .with_config_path(config_path)
                .with_snapshot_id(&snapshot.id)
                .with_user(&snapshot.metadata.user)
                .with_hostname(&snapshot.metadata.hostname)
                .with_extra(extra),
        );

        Ok(snapshot)
    }

    pub fn list_snapshots(&self) -> Result<Vec<Snapshot>> {
        if !self.config.enabled {
            return Err(CoreError::Disabled);
        }
        if !self.storage.exists() {
            return Ok(Vec::new());
        }
        let index = self.storage.load_index()?;
        Ok(index.list().into_iter().cloned().collect())
    }

    pub fn get_snapshot(&self, id: &str) -> Result<Snapshot> {
        if !self.config.enabled {
            return Err(CoreError::Disabled);
        }
        if !self.storage.exists() {
            return Err(CoreError::SnapshotNotFound(id.to_string()));
        }
        let index = self.storage.load_index()?;
        index
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::SnapshotNotFound(id.to_string()))
    }

    /// Looks up `id`, delegates reconstruction to [`Restorer`], and audits
    /// the outcome (spec §4.4 "Restore delegation").
    pub fn restore_snapshot(&self, id: &str, opts: RestoreOptions) -> Result<RestoreResult> {
        if !self.config.enabled {
            return Err(CoreError::Disabled);
        }

        let snapshot = self.get_snapshot(id)?;
        let restorer = Restorer::new(self);
        let result = restorer.restore(&snapshot, &opts);

        match &result {
            Ok(r) => {
                let extra = json!({
                    "restored_path": r.restored_path,
                    "bytes_restored": r.bytes_restored,
                    "checksum_verified": r.checksum_verified,
                    "backup_created": r.backup_snapshot.is_some(),
                });
                let _ = self.audit.log(
                    AuditEntry::success(Operation::Restore, self.clock.now())
                        .with_snapshot_id(id)
                        .with_extra(extra),
                );
            }
            Err(e) => self.log_failure(Operation::Restore, None, Some(id), e),
        }

        result
    }

    /// Recomputes the blob's hash and compares it to the recorded
    /// `config_hash`, failing with [`CoreError::ChecksumMismatch`] on
    /// divergence (spec §4.4 "Validate delegation").
    pub fn validate_snapshot(&self, id: &str) -> Result<()> {
        let snapshot = self.get_snapshot(id)?;
        let bytes = self.storage.load(&snapshot.storage_path)?;
        let actual = fingerprint::content_hash(&bytes);
        if actual != snapshot.metadata.config_hash {
            return Err(CoreError::ChecksumMismatch {
                snapshot_id: snapshot.id.clone(),
                expected: snapshot.metadata.config_hash.clone(),
                actual,
            });
        }
        Ok(())
    }

    /// Applies a chain-aware retention policy, evicting whole chains that
    /// the policy rejects (component C6, spec §4.6).
    pub fn apply_retention(&self, policy: &dyn RetentionPolicy) -> Result<RetentionOutcome> {
        if !self.config.enabled {
            return Err(CoreError::Disabled);
        }

        let outcome = retention::apply_retention(self.storage.as_ref(), policy, self.clock.as_ref());

        match &outcome {
            Ok(o) => {
                let extra = json!({
                    "snapshots_removed": o.snapshots_removed,
                    "chains_removed": o.chains_removed,
                    "bytes_freed": o.bytes_freed,
                });
                let _ = self.audit.log(
                    AuditEntry::success(Operation::Prune, self.clock.now()).with_extra(extra),
                );
            }
            Err(e) => self.log_failure(Operation::Prune, None, None, e),
        }

        outcome
    }

    /// Builds a [`CompositePolicy`] from the `Config` collaborator's
    /// retention parameters (`EngineConfig::max_chains`/`max_age`/
    /// `max_bytes`) and applies it — the concrete consumer of the
    /// retention half of the `Config` view spec.md §1 describes ("a
    /// `Config` view exposing retention parameters and an enable flag").
    /// Errors with [`CoreError::InvalidRetentionParameter`] if none of the
    /// three are set, since an empty composite would otherwise silently
    /// retain everything.
    pub fn apply_configured_retention(&self) -> Result<RetentionOutcome> {
        if !self.config.enabled {
            return Err(CoreError::Disabled);
        }

        let mut policies: Vec<Box<dyn RetentionPolicy>> = Vec::new();
        if let Some(n) = self.config.max_chains {
            policies.push(Box::new(CountPolicy::new(n)?));
        }
        if let Some(age) = self.config.max_age {
            policies.push(Box::new(AgePolicy::new(age)?));
        }
        if let Some(bytes) = self.config.max_bytes {
            policies.push(Box::new(SizePolicy::new(bytes)?));
        }
        if policies.is_empty() {
            return Err(CoreError::InvalidRetentionParameter(
                "no retention parameters configured".to_string(),
            ));
        }

        self.apply_retention(&CompositePolicy::new(policies))
    }

    /// Queries the audit log (spec §4.7 "Query").
    pub fn query_audit(&self, filter: &crate::audit::AuditFilter) -> Result<Vec<AuditEntry>> {
        self.audit.query(filter)
    }

    fn log_failure(
        &self,
        op: Operation,
        config_path: Option<&Path>,
        snapshot_id: Option<&str>,
        error: &CoreError,
    ) {
        let mut entry = AuditEntry::failure(op, self.clock.now(), error.to_string());
        if let Some(p) = config_path {
            entry = entry.with_config_path(p);
        }
        if let Some(id) = snapshot_id {
            entry = entry.with_snapshot_id(id);
        }
        let _ = self.audit.log(entry);
    }

    /// Creates a one-off snapshot of `path` for use as a pre-restore safety
    /// copy. Exposed to [`Restorer`] via crate-internal visibility only —
    /// external callers go through [`Manager::create_backup`].
    pub(crate) fn create_safety_snapshot(&self, path: &Path) -> Result<Snapshot> {
        self.create_backup(
            path,
            Trigger::Manual,
            CreateOptions {
                tag: Some("before-restore".to_string()),
                ..Default::default()
            },
        )
    }

    pub(crate) fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Root path reserved for future CLI-level convenience helpers that
    /// need the underlying scope directory without reaching into
    /// `Storage` directly.
    pub fn scope_root(&self) -> PathBuf {
        self.storage.scope_root().to_path_buf()
    }
}
