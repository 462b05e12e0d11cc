//! # Restorer
//!
//! Reconstructs a snapshot's bytes, verifies the checksum, optionally
//! captures a pre-restore safety snapshot of the existing target, and
//! writes atomically to the target path (component C5, spec §4.5).
//!
//! Generalized from the teacher's `restore.rs::restore_snapshot` (read blob
//! → decompress → decrypt → verify → write), dropped to a single file per
//! call (no compression/encryption — see `SPEC_FULL.md` §6.1) and extended
//! with the safety-snapshot step the teacher never had.
//!
//! Holds a borrow of [`crate::manager::Manager`] only to create that safety
//! snapshot — a one-way dependency, never a cycle (spec §9).

use crate::error::{CoreError, Result};
use crate::fingerprint;
use crate::index::{Snapshot, StorageType};
use crate::manager::Manager;
use crate::storage::{self, Storage};
use std::path::PathBuf;

/// Options controlling one restore call (spec §4.5).
#[derive(Debug, Clone, Default)]
pub struct RestoreOptions {
    /// Destination path. `None` means "use `snapshot.config_path`".
    pub target_path: Option<PathBuf>,
    /// Create a safety snapshot of the existing target before overwriting
    /// it, if the target exists and `force` is `false`.
    pub backup_before_restore: bool,
    /// Suppress the safety snapshot even when `backup_before_restore` is set.
    pub force: bool,
    /// Re-verify the checksum before (and after reconstructing) the bytes.
    pub validate: bool,
}

/// Outcome of a successful restore.
#[derive(Debug, Clone)]
pub struct RestoreResult {
    pub restored_path: PathBuf,
    /// ID of the safety snapshot taken of the pre-existing target, if any.
    pub backup_snapshot: Option<String>,
    pub bytes_restored: u64,
    pub checksum_verified: bool,
}

pub struct Restorer<'a> {
    manager: &'a Manager,
}

impl<'a> Restorer<'a> {
    pub fn new(manager: &'a Manager) -> Self {
        Self { manager }
    }

    /// Executes the restore algorithm in spec §4.5.
    pub fn restore(&self, snapshot: &Snapshot, opts: &RestoreOptions) -> Result<RestoreResult> {
        let target_path = match &opts.target_path {
            Some(p) if !p.as_os_str().is_empty() => p.clone(),
            _ if !snapshot.config_path.as_os_str().is_empty() => snapshot.config_path.clone(),
            _ => return Err(CoreError::TargetPathRequired),
        };

        if opts.validate {
            self.manager.validate_snapshot(&snapshot.id)?;
        }

        let mut backup_snapshot = None;
        if opts.backup_before_restore && !opts.force && target_path.exists() {
            let safety = self.manager.create_safety_snapshot(&target_path)?;
            backup_snapshot = Some(safety.id);
        }

        let content = match snapshot.storage_type {
            StorageType::Full => self.manager.storage().load(&snapshot.storage_path)?,
            StorageType::Patch => {
                return Err(CoreError::NotImplemented(
                    "patch reconstruction (base walk + sequential replay) is reserved for future delta chains".to_string(),
                ));
            }
        };

        let checksum_verified = if opts.validate {
            let actual = fingerprint::content_hash(&content);
            if actual != snapshot.checksum {
                return Err(CoreError::ChecksumMismatch {
                    snapshot_id: snapshot.id.clone(),
                    expected: snapshot.checksum.clone(),
                    actual,
                });
            }
            true
        } else {
            false
        };

        if let Some(parent) = target_path.parent() {
            if !parent.as_os_str().is_empty() {
                storage::create_dir_0700(parent)?;
            }
        }

        storage::atomic_write(&target_path, &content, 0o600).map_err(|source| {
            CoreError::SaveFailed {
                storage_path: target_path.clone(),
                source,
            }
        })?;

        Ok(RestoreResult {
            restored_path: target_path,
            backup_snapshot,
            bytes_restored: content.len() as u64,
            checksum_verified,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditLogger;
    use crate::collaborators::{EngineConfig, EnvHostIdentity, SystemClock};
    use crate::index::Trigger;
    use crate::manager::CreateOptions;
    use crate::storage::FsStorage;
    use std::path::Path;

    fn build_manager(root: &Path) -> Manager {
        let storage = Box::new(FsStorage::global(root));
        let clock = Box::new(SystemClock::new());
        let host = Box::new(EnvHostIdentity);
        let audit = AuditLogger::new(root.join("audit.jsonl"));
        Manager::new(storage, clock, host, EngineConfig::enabled(), audit)
    }

    #[test]
    fn restore_writes_exact_bytes_to_new_target() {
        let repo_dir = tempfile::tempdir().unwrap();
        let manager = build_manager(repo_dir.path());

        let src_dir = tempfile::tempdir().unwrap();
        let src_path = src_dir.path().join("cfg.toml");
        std::fs::write(&src_path, b"original content").unwrap();

        let snap = manager
            .create_backup(&src_path, Trigger::Manual, CreateOptions::default())
            .unwrap();

        let target_dir = tempfile::tempdir().unwrap();
        let target_path = target_dir.path().join("restored.toml");

        let result = manager
            .restore_snapshot(
                &snap.id,
                RestoreOptions {
                    target_path: Some(target_path.clone()),
                    backup_before_restore: false,
                    force: false,
                    validate: true,
                },
            )
            .unwrap();

        assert_eq!(result.restored_path, target_path);
        assert!(result.checksum_verified);
        assert_eq!(std::fs::read(&target_path).unwrap(), b"original content");
    }

    #[test]
    fn backup_before_restore_captures_existing_target() {
        let repo_dir = tempfile::tempdir().unwrap();
        let manager = build_manager(repo_dir.path());

        let src_dir = tempfile::tempdir().unwrap();
        let src_path = src_dir.path().join("cfg.toml");
        std::fs::write(&src_path, b"new content").unwrap();
        let snap = manager
            .create_backup(&src_path, Trigger::Manual, CreateOptions::default())
            .unwrap();

        let target_dir = tempfile::tempdir().unwrap();
        let target_path = target_dir.path().join("target.toml");
        std::fs::write(&target_path, b"existing").unwrap();

        let result = manager
            .restore_snapshot(
                &snap.id,
                RestoreOptions {
                    target_path: Some(target_path.clone()),
                    backup_before_restore: true,
                    force: false,
                    validate: false,
                },
            )
            .unwrap();

        let backup_id = result.backup_snapshot.expect("expected a safety snapshot");
        let backup = manager.get_snapshot(&backup_id).unwrap();
        assert_eq!(backup.metadata.tag, "before-restore");

        let backup_bytes = manager.storage().load(&backup.storage_path).unwrap();
        assert_eq!(backup_bytes, b"existing");

        assert_eq!(std::fs::read(&target_path).unwrap(), b"new content");
    }

    #[test]
    fn force_suppresses_safety_snapshot() {
        let repo_dir = tempfile::tempdir().unwrap();
        let manager = build_manager(repo_dir.path());

        let src_dir = tempfile::tempdir().unwrap();
        let src_path = src_dir.path().join("cfg.toml");
        std::fs::write(&src_path, b"content").unwrap();
        let snap = manager
            .create_backup(&src_path, Trigger::Manual, CreateOptions::default())
            .unwrap();

        let target_dir = tempfile::tempdir().unwrap();
        let target_path = target_dir.path().join("target.toml");
        std::fs::write(&target_path, b"existing").unwrap();

        let result = manager
            .restore_snapshot(
                &snap.id,
                RestoreOptions {
                    target_path: Some(target_path.clone()),
                    backup_before_restore: true,
                    force: true,
                    validate: false,
                },
            )
            .unwrap();

        assert!(result.backup_snapshot.is_none());
    }

    #[test]
    fn corrupted_blob_fails_validation_before_touching_target() {
        let repo_dir = tempfile::tempdir().unwrap();
        let manager = build_manager(repo_dir.path());

        let src_dir = tempfile::tempdir().unwrap();
        let src_path = src_dir.path().join("cfg.toml");
        std::fs::write(&src_path, b"good content").unwrap();
        let snap = manager
            .create_backup(&src_path, Trigger::Manual, CreateOptions::default())
            .unwrap();

        std::fs::write(&snap.storage_path, b"corrupted content").unwrap();

        let target_dir = tempfile::tempdir().unwrap();
        let target_path = target_dir.path().join("never_written.toml");

        let result = manager.restore_snapshot(
            &snap.id,
            RestoreOptions {
                target_path: Some(target_path.clone()),
                backup_before_restore: false,
                force: false,
                validate: true,
            },
        );

        assert!(matches!(result, Err(CoreError::ChecksumMismatch { .. })));
        assert!(!target_path.exists());
    }

    #[test]
    fn empty_target_and_config_path_requires_target() {
        let repo_dir = tempfile::tempdir().unwrap();
        let manager = build_manager(repo_dir.path());

        let src_dir = tempfile::tempdir().unwrap();
        let src_path = src_dir.path().join("cfg.toml");
        std::fs::write(&src_path, b"content").unwrap();
        let mut snap = manager
            .create_backup(&src_path, Trigger::Manual, CreateOptions::default())
            .unwrap();
        snap.config_path = PathBuf::new();

        let restorer = Restorer::new(&manager);
        let result = restorer.restore(
            &snap,
            &RestoreOptions {
                target_path: None,
                backup_before_restore: false,
                force: false,
                validate: false,
            },
        );
        assert!(matches!(result, Err(CoreError::TargetPathRequired)));
    }
}
