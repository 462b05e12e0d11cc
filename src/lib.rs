//! # confsnap
//!
//! A content-addressed, chain-aware snapshot store for configuration files:
//! deduplication, checksum-verified restore, pluggable chain-aware
//! retention, and a tamper-evident append-only audit log.
//!
//! ## Architecture
//!
//! ```text
//!                    ┌──────────────┐
//!                    │   Manager    │  create / list / get / delegates
//!                    └──────┬───────┘
//!           ┌───────────────┼────────────────┬───────────────┐
//!           ▼                ▼                ▼               ▼
//!     ┌───────────┐   ┌────────────┐   ┌────────────┐  ┌────────────┐
//!     │ Fingerprint│   │   Index    │   │  Restorer  │  │  Retention │
//!     │  (SHA-256) │   │ (catalogue)│   │            │  │ (policies) │
//!     └─────┬──────┘   └─────┬──────┘   └─────┬──────┘  └─────┬──────┘
//!           │                │                │               │
//!           └────────────────┴────────┬───────┴───────────────┘
//!                                     ▼
//!                              ┌─────────────┐
//!                              │   Storage   │  atomic blob + index I/O
//!                              └─────────────┘
//!                                     │
//!                              ┌─────────────┐
//!                              │    Audit    │  append-only JSONL
//!                              └─────────────┘
//! ```
//!
//! The CLI/TUI surface, configuration loading (TOML parsing, precedence
//! merging), rule-engine integration, logger plumbing, and hook dispatch
//! are *not* part of this crate — they are external collaborators reached
//! only through [`collaborators::Clock`], [`collaborators::HostIdentity`],
//! [`collaborators::EngineConfig`], and [`collaborators::StorageRoot`].
//! See `confsnap-cli` (this workspace's demonstration binary) for one way
//! to wire those collaborators up.

pub mod audit;
pub mod collaborators;
pub mod error;
pub mod fingerprint;
pub mod index;
pub mod manager;
pub mod restorer;
pub mod retention;
pub mod storage;

pub use audit::{AuditEntry, AuditFilter, AuditLogger, Operation};
pub use collaborators::{Clock, EngineConfig, EnvHostIdentity, HostIdentity, StorageRoot, SystemClock};
pub use error::{CoreError, Result};
pub use index::{ConfigType, Snapshot, SnapshotIndex, SnapshotMetadata, StorageType, Trigger};
pub use manager::{CreateOptions, Manager};
pub use restorer::{RestoreOptions, RestoreResult, Restorer};
pub use retention::{AgePolicy, CompositePolicy, CountPolicy, RetentionOutcome, RetentionPolicy, SizePolicy};
pub use storage::{FsStorage, Scope, Storage};
