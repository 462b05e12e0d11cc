//! # Collaborator Contracts
//!
//! The core depends on a handful of external facts — the current time, who
//! is running it, and whether it is even turned on — without owning how
//! those facts are produced. Real wiring (CLI flag parsing, TOML config
//! files, a rule engine deciding when to snapshot automatically) lives
//! outside this crate; the core only defines the narrow contract it needs,
//! per spec §1: "a `Clock`, a `HostIdentity`..., a `Config` view..., and a
//! `StorageRoot` path."
//!
//! Each contract ships one default implementation suitable for production
//! use, so a caller who doesn't need to fake time or identity can ignore
//! this module entirely.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// Supplies the current wall-clock time and a monotonically advancing
/// nanosecond timestamp used for snapshot-ID derivation.
///
/// Abstracted so tests can supply deterministic, controllable timestamps
/// instead of depending on real time.
pub trait Clock: Send + Sync {
    /// Current wall-clock instant.
    fn now(&self) -> DateTime<Utc>;

    /// Nanoseconds since the Unix epoch, fed to [`crate::fingerprint::snapshot_id`].
    ///
    /// Must strictly increase across calls within one process so that two
    /// snapshots created back-to-back with different content never collide
    /// (spec §3 invariant 1). The system clock alone does not guarantee this
    /// on platforms with coarse timer resolution, so implementations should
    /// pad with a process-local counter if needed.
    fn now_nanos(&self) -> i64;
}

/// Production [`Clock`] backed by [`std::time::SystemTime`] with a
/// monotonic fallback: if the wall clock hasn't advanced since the last
/// call, a 1ns-resolution counter nudges it forward so that two calls in
/// the same instant never produce identical nanosecond timestamps.
pub struct SystemClock {
    last_nanos: std::sync::atomic::AtomicI64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            last_nanos: std::sync::atomic::AtomicI64::new(i64::MIN),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn now_nanos(&self) -> i64 {
        use std::sync::atomic::Ordering;

        let wall = Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or_else(|| Utc::now().timestamp() * 1_000_000_000);

        loop {
            let prev = self.last_nanos.load(Ordering::SeqCst);
            let next = if wall > prev { wall } else { prev + 1 };
            if self
                .last_nanos
                .compare_exchange(prev, next, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return next;
            }
        }
    }
}

/// Resolves the user and hostname recorded in snapshot metadata and audit
/// entries (spec §6: "`USER` or `USERNAME` for the user string; system
/// hostname. Both fall back to literal `"unknown"`.").
pub trait HostIdentity: Send + Sync {
    fn user(&self) -> String;
    fn hostname(&self) -> String;
}

/// Production [`HostIdentity`] backed by environment variables and the
/// platform hostname.
pub struct EnvHostIdentity;

impl HostIdentity for EnvHostIdentity {
    fn user(&self) -> String {
        std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "unknown".to_string())
    }

    fn hostname(&self) -> String {
        hostname_impl().unwrap_or_else(|| "unknown".to_string())
    }
}

#[cfg(unix)]
fn hostname_impl() -> Option<String> {
    std::process::Command::new("hostname")
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(not(unix))]
fn hostname_impl() -> Option<String> {
    std::env::var("COMPUTERNAME").ok()
}

/// The retention parameters and enable flag the core needs from
/// configuration, without pulling in TOML parsing or precedence merging
/// (spec §1 explicitly excludes that from the core).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Master switch. When `false`, every state-changing Manager operation
    /// fails with [`crate::error::CoreError::Disabled`].
    pub enabled: bool,

    /// `Count` retention cap, if the caller wants it enforced automatically.
    /// `None` means the caller drives retention manually.
    pub max_chains: Option<usize>,

    /// `Age` retention cap.
    pub max_age: Option<chrono::Duration>,

    /// `Size` retention cap, in bytes.
    pub max_bytes: Option<u64>,
}

impl EngineConfig {
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            max_chains: None,
            max_age: None,
            max_bytes: None,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            max_chains: None,
            max_age: None,
            max_bytes: None,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::enabled()
    }
}

/// The filesystem root under which `.backups/` and `audit.jsonl` live
/// (spec §6). A thin wrapper rather than a bare `PathBuf` so storage scope
/// construction reads as intent, not path arithmetic.
#[derive(Debug, Clone)]
pub struct StorageRoot(pub PathBuf);

impl StorageRoot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    pub fn audit_log_path(&self) -> PathBuf {
        self.0.join("audit.jsonl")
    }
}
