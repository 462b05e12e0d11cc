//! # Storage
//!
//! Filesystem layout, atomic blob/index I/O, and isolation between the
//! global and per-project scopes (component C2, spec §4.2).
//!
//! `Storage` is a capability interface (spec §9) so alternate backends —
//! in-memory for tests, remote, encrypted — can stand in without touching
//! [`crate::manager::Manager`]. [`FsStorage`] is the one production
//! implementation, grounded in the teacher's `manifest.rs` repository
//! operations (`blob_path`/`store_blob`/`read_blob`/`save_snapshot`),
//! generalized to the spec's scope model and atomic-write requirement.

use crate::error::{CoreError, Result};
use crate::index::SnapshotIndex;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Distinguishes the global (user-wide) scope from a per-project scope
/// (spec §4.2).
#[derive(Debug, Clone)]
pub enum Scope {
    Global,
    Project { absolute_path: PathBuf },
}

impl Scope {
    /// Parses a scope-kind string (`"global"` or `"project"`) into a
    /// `Scope`. `project_path` is required, and used, only for `"project"`.
    ///
    /// This is the fallible scope-constructor entry point spec.md §7
    /// reserves `InvalidConfigType` for ("scope constructor given unknown
    /// variant") — callers that parse a scope kind from a string (a CLI
    /// flag, a config file) go through here instead of matching strings
    /// themselves.
    pub fn parse(kind: &str, project_path: Option<PathBuf>) -> Result<Self> {
        match kind {
            "global" => Ok(Scope::Global),
            "project" => {
                let absolute_path = project_path.ok_or_else(|| {
                    CoreError::InvalidPath("project scope requires a project path".to_string())
                })?;
                Ok(Scope::Project { absolute_path })
            }
            other => Err(CoreError::InvalidConfigType(other.to_string())),
        }
    }
}

/// Capability interface for blob and index persistence. One scope (global,
/// or one specific project) per `Storage` instance.
pub trait Storage: Send + Sync {
    /// Creates the scope's directory tree with mode `0700` and writes an
    /// empty index if absent. Idempotent.
    fn initialize(&self) -> Result<()>;

    /// Whether the scope's root directory exists.
    fn exists(&self) -> bool;

    /// Writes `bytes` under `snapshots/{id}` with mode `0600`. Requires a
    /// prior [`Storage::initialize`] call.
    fn save(&self, snapshot_id: &str, bytes: &[u8]) -> Result<PathBuf>;

    /// Reads the blob at `storage_path`.
    fn load(&self, storage_path: &Path) -> Result<Vec<u8>>;

    /// Removes the blob at `storage_path`. Missing is an error, not a no-op.
    fn delete(&self, storage_path: &Path) -> Result<()>;

    /// Lists every blob's storage path under `snapshots/`.
    fn list(&self) -> Result<Vec<PathBuf>>;

    fn save_index(&self, index: &SnapshotIndex) -> Result<()>;

    /// Missing index file yields an empty index, not an error.
    fn load_index(&self) -> Result<SnapshotIndex>;

    /// Root directory of this scope (e.g. `<root>/.backups/global`).
    fn scope_root(&self) -> &Path;
}

/// Filesystem-backed [`Storage`]. Sanitizes an absolute project path into a
/// flat directory name by stripping the leading separator and replacing
/// every remaining separator with `_` (spec §4.2).
pub struct FsStorage {
    scope_root: PathBuf,
}

impl FsStorage {
    /// Constructs an `FsStorage` for the given scope. The single entry
    /// point that actually consumes [`Scope`]; `global`/`project` below are
    /// thin convenience wrappers over this for callers that already know
    /// which scope they want at compile time.
    pub fn new(root: &Path, scope: Scope) -> Result<Self> {
        match scope {
            Scope::Global => Ok(Self::global(root)),
            Scope::Project { absolute_path } => Self::project(root, &absolute_path),
        }
    }

    pub fn global(root: &Path) -> Self {
        Self {
            scope_root: root.join(".backups").join("global"),
        }
    }

    pub fn project(root: &Path, project_path: &Path) -> Result<Self> {
        if project_path.as_os_str().is_empty() {
            return Err(CoreError::InvalidPath(
                "project path must not be empty".to_string(),
            ));
        }
        let sanitized = sanitize_project_path(project_path);
        Ok(Self {
            scope_root: root.join(".backups").join("projects").join(sanitized),
        })
    }

    fn snapshots_dir(&self) -> PathBuf {
        self.scope_root.join("snapshots")
    }

    fn index_path(&self) -> PathBuf {
        self.scope_root.join("metadata.json")
    }

    fn blob_path(&self, snapshot_id: &str) -> PathBuf {
        self.snapshots_dir().join(snapshot_id)
    }
}

/// Flattens an absolute path into a single directory-name-safe component.
///
/// `/home/user/project` → `home_user_project`.
fn sanitize_project_path(path: &Path) -> String {
    let s = path.to_string_lossy();
    let stripped = s.strip_prefix(std::path::MAIN_SEPARATOR).unwrap_or(&s);
    stripped.replace(std::path::MAIN_SEPARATOR, "_").replace('/', "_")
}

impl Storage for FsStorage {
    fn initialize(&self) -> Result<()> {
        create_dir_0700(&self.snapshots_dir())?;
        if !self.index_path().exists() {
            self.save_index(&SnapshotIndex::new())?;
        }
        Ok(())
    }

    fn exists(&self) -> bool {
        self.scope_root.exists()
    }

    fn save(&self, snapshot_id: &str, bytes: &[u8]) -> Result<PathBuf> {
        if !self.exists() {
            return Err(CoreError::StorageNotInitialized(self.scope_root.clone()));
        }
        let path = self.blob_path(snapshot_id);
        atomic_write(&path, bytes, 0o600).map_err(|source| CoreError::SaveFailed {
            storage_path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    fn load(&self, storage_path: &Path) -> Result<Vec<u8>> {
        std::fs::read(storage_path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                CoreError::SnapshotNotFound(storage_path.display().to_string())
            } else {
                CoreError::ReadFailed {
                    storage_path: storage_path.to_path_buf(),
                    source,
                }
            }
        })
    }

    fn delete(&self, storage_path: &Path) -> Result<()> {
        std::fs::remove_file(storage_path).map_err(|source| CoreError::DeleteFailed {
            storage_path: storage_path.to_path_buf(),
            source,
        })
    }

    fn list(&self) -> Result<Vec<PathBuf>> {
        let dir = self.snapshots_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_file() {
                out.push(path);
            }
        }
        Ok(out)
    }

    fn save_index(&self, index: &SnapshotIndex) -> Result<()> {
        create_dir_0700(&self.scope_root)?;
        let json = serde_json::to_string_pretty(index).map_err(|e| CoreError::IndexSaveFailed {
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })?;
        atomic_write(&self.index_path(), json.as_bytes(), 0o600)
            .map_err(|source| CoreError::IndexSaveFailed { source })
    }

    fn load_index(&self) -> Result<SnapshotIndex> {
        let path = self.index_path();
        if !path.exists() {
            return Ok(SnapshotIndex::new());
        }
        let content = std::fs::read_to_string(&path).map_err(|source| CoreError::ReadFailed {
            storage_path: path.clone(),
            source,
        })?;
        let index: SnapshotIndex =
            serde_json::from_str(&content).map_err(|e| CoreError::CorruptIndex {
                path: path.clone(),
                message: e.to_string(),
            })?;
        if index.version != crate::index::INDEX_VERSION {
            return Err(CoreError::UnsupportedIndexVersion {
                found: index.version,
            });
        }
        Ok(index)
    }

    fn scope_root(&self) -> &Path {
        &self.scope_root
    }
}

pub(crate) fn create_dir_0700(path: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(path)?;
    set_mode(path, 0o700)
}

#[cfg(unix)]
pub(crate) fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
pub(crate) fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

/// Writes `bytes` to `path` atomically: write to a tempfile in the same
/// directory, fsync, then rename over the destination. Never leaves a
/// partially written file at `path` (spec §4.2 durability note). Shared
/// with [`crate::restorer`], which writes the restore target the same way.
pub(crate) fn atomic_write(path: &Path, bytes: &[u8], mode: u32) -> std::io::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;

    let tmp_name = format!(
        ".{}.tmp-{}",
        path.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "blob".to_string()),
        std::process::id()
    );
    let tmp_path = parent.join(tmp_name);

    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        set_mode(&tmp_path, mode)?;
    }

    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{ConfigType, Snapshot, SnapshotMetadata, StorageType, Trigger};
    use chrono::Utc;

    fn sample_snapshot(id: &str) -> Snapshot {
        Snapshot {
            id: id.to_string(),
            sequence_num: 1,
            timestamp: Utc::now(),
            config_path: PathBuf::from("/tmp/cfg.toml"),
            config_type: ConfigType::Global,
            trigger: Trigger::Manual,
            storage_type: StorageType::Full,
            storage_path: PathBuf::new(),
            size: 4,
            checksum: "deadbeef".to_string(),
            chain_id: "chain-1".to_string(),
            base_snapshot_id: String::new(),
            patch_from: String::new(),
            metadata: SnapshotMetadata::default(),
        }
    }

    #[test]
    fn initialize_creates_tree_and_empty_index() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::global(dir.path());
        assert!(!storage.exists());

        storage.initialize().unwrap();
        assert!(storage.exists());

        let index = storage.load_index().unwrap();
        assert_eq!(index.version, 1);
        assert!(index.snapshots.is_empty());
    }

    #[test]
    fn save_requires_initialize() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::global(dir.path());
        let result = storage.save("abc123", b"data");
        assert!(matches!(result, Err(CoreError::StorageNotInitialized(_))));
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::global(dir.path());
        storage.initialize().unwrap();

        let path = storage.save("abc123", b"hello").unwrap();
        let loaded = storage.load(&path).unwrap();
        assert_eq!(loaded, b"hello");
    }

    #[test]
    fn delete_missing_blob_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::global(dir.path());
        storage.initialize().unwrap();

        let result = storage.delete(&dir.path().join(".backups/global/snapshots/nope"));
        assert!(matches!(result, Err(CoreError::DeleteFailed { .. })));
    }

    #[test]
    fn project_scope_sanitizes_path() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::project(dir.path(), Path::new("/home/user/repo")).unwrap();
        assert!(storage
            .scope_root()
            .to_string_lossy()
            .ends_with("home_user_repo"));
    }

    #[test]
    fn project_scope_rejects_empty_path() {
        let dir = tempfile::tempdir().unwrap();
        let result = FsStorage::project(dir.path(), Path::new(""));
        assert!(matches!(result, Err(CoreError::InvalidPath(_))));
    }

    #[test]
    fn scope_parse_rejects_unknown_kind() {
        let result = Scope::parse("bogus", None);
        assert!(matches!(result, Err(CoreError::InvalidConfigType(_))));
    }

    #[test]
    fn scope_parse_global_ignores_missing_project_path() {
        let scope = Scope::parse("global", None).unwrap();
        assert!(matches!(scope, Scope::Global));
    }

    #[test]
    fn scope_parse_project_requires_path() {
        let result = Scope::parse("project", None);
        assert!(matches!(result, Err(CoreError::InvalidPath(_))));

        let scope = Scope::parse("project", Some(PathBuf::from("/home/user/repo"))).unwrap();
        match scope {
            Scope::Project { absolute_path } => {
                assert_eq!(absolute_path, PathBuf::from("/home/user/repo"))
            }
            Scope::Global => panic!("expected project scope"),
        }
    }

    #[test]
    fn fs_storage_new_dispatches_on_scope() {
        let dir = tempfile::tempdir().unwrap();

        let global = FsStorage::new(dir.path(), Scope::Global).unwrap();
        assert!(global.scope_root().ends_with("global"));

        let project = FsStorage::new(
            dir.path(),
            Scope::Project {
                absolute_path: PathBuf::from("/home/user/repo"),
            },
        )
        .unwrap();
        assert!(project.scope_root().to_string_lossy().ends_with("home_user_repo"));
    }

    #[test]
    fn save_index_then_load_index_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::global(dir.path());
        storage.initialize().unwrap();

        let mut index = SnapshotIndex::new();
        index.add(sample_snapshot("snap1"));
        storage.save_index(&index).unwrap();

        let loaded = storage.load_index().unwrap();
        assert!(loaded.get("snap1").is_some());
    }

    #[test]
    fn load_index_missing_file_yields_empty_index() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::global(dir.path());
        // No initialize() call — no metadata.json exists yet.
        let index = storage.load_index().unwrap();
        assert!(index.snapshots.is_empty());
    }

    #[test]
    fn list_excludes_nothing_but_the_blobs() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::global(dir.path());
        storage.initialize().unwrap();
        storage.save("blob1", b"a").unwrap();
        storage.save("blob2", b"b").unwrap();

        let listed = storage.list().unwrap();
        assert_eq!(listed.len(), 2);
    }
}
