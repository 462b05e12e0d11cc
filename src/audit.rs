//! # Audit
//!
//! Append-only JSON-Lines log at `<root>/audit.jsonl`, with exclusive-writer
//! serialization and filter-based query (component C7, spec §4.7). New
//! relative to the teacher (which has no audit trail), grounded in the
//! teacher's own JSON conventions (`manifest.rs::Snapshot::to_json`) applied
//! line-by-line, and in spec §9 note (b)'s explicit sanction of an
//! open-close-per-entry writer instead of a long-lived file handle.

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// The kind of state-changing (or read) operation an audit entry records.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Restore,
    Delete,
    Prune,
    List,
    Get,
}

/// One line of `audit.jsonl` (spec §6).
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub operation: Operation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

impl AuditEntry {
    pub fn success(operation: Operation, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            operation,
            config_path: None,
            snapshot_id: None,
            user: None,
            hostname: None,
            success: true,
            error: None,
            extra: None,
        }
    }

    pub fn failure(operation: Operation, timestamp: DateTime<Utc>, error: impl Into<String>) -> Self {
        Self {
            timestamp,
            operation,
            config_path: None,
            snapshot_id: None,
            user: None,
            hostname: None,
            success: false,
            error: Some(error.into()),
            extra: None,
        }
    }

    pub fn with_config_path(mut self, path: &Path) -> Self {
        self.config_path = Some(path.display().to_string());
        self
    }

    pub fn with_snapshot_id(mut self, id: &str) -> Self {
        self.snapshot_id = Some(id.to_string());
        self
    }

    pub fn with_user(mut self, user: &str) -> Self {
        self.user = Some(user.to_string());
        self
    }

    pub fn with_hostname(mut self, hostname: &str) -> Self {
        self.hostname = Some(hostname.to_string());
        self
    }

    pub fn with_extra(mut self, extra: serde_json::Value) -> Self {
        self.extra = Some(extra);
        self
    }
}

/// Filter applied to an audit query (spec §4.7 "Query").
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub operation: Option<Operation>,
    pub since: Option<DateTime<Utc>>,
    pub snapshot_id: Option<String>,
    pub success: Option<bool>,
    /// `0` means unlimited.
    pub limit: usize,
}

impl AuditFilter {
    fn matches(&self, entry: &AuditEntry) -> bool {
        if let Some(op) = self.operation {
            if entry.operation != op {
                return false;
            }
        }
        if let Some(since) = self.since {
            if entry.timestamp < since {
                return false;
            }
        }
        if let Some(id) = &self.snapshot_id {
            if entry.snapshot_id.as_deref() != Some(id.as_str()) {
                return false;
            }
        }
        if let Some(success) = self.success {
            if entry.success != success {
                return false;
            }
        }
        true
    }
}

/// Append-only writer/reader for `audit.jsonl`. One process-wide mutex per
/// instance guards both appends and reads, so a read never observes a
/// half-written line on platforms where append is not atomic (spec §5).
pub struct AuditLogger {
    path: PathBuf,
    lock: Mutex<()>,
}

impl AuditLogger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Appends one entry. Best-effort by contract: callers (the Manager)
    /// invoke this with `let _ = audit.log(...)` and never let a failure
    /// here fail the underlying operation (spec §4.7 "Write").
    pub fn log(&self, entry: AuditEntry) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                crate::storage::create_dir_0700(parent)?;
            }
        }

        let line = serde_json::to_string(&entry).map_err(std::io::Error::other)?;

        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)?;
        crate::storage::set_mode(&self.path, 0o600)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Reads and filters the log. A missing file yields an empty result.
    /// Malformed JSON lines are skipped (logged at debug level, never
    /// surfaced as a user-visible warning — spec §4.7 "Query": "malformed
    /// JSON lines are skipped silently").
    pub fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());

        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = std::fs::read_to_string(&self.path)?;
        let mut results = Vec::new();

        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let entry: AuditEntry = match serde_json::from_str(line) {
                Ok(e) => e,
                Err(e) => {
                    log::debug!("audit: skipping malformed line: {e}");
                    continue;
                }
            };
            if filter.matches(&entry) {
                results.push(entry);
                if filter.limit != 0 && results.len() >= filter.limit {
                    break;
                }
            }
        }

        Ok(results)
    }
}
