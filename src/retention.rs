//! # Retention
//!
//! Chain-aware retention policies that compose under AND and evict whole
//! chains, even though the index is flat (component C6, spec §4.6). New
//! relative to the teacher, whose `backup.rs::prune_snapshots` only keeps
//! the newest N snapshots per target with no chain concept; the policy
//! shape here (a predicate over `(snapshot, context)`) is grounded in the
//! teacher's preference for small, composable free functions over deep
//! trait hierarchies, adapted into `dyn RetentionPolicy` objects only where
//! `Composite` genuinely needs dynamic dispatch.

use crate::collaborators::Clock;
use crate::error::{CoreError, Result};
use crate::index::Snapshot;
use crate::storage::Storage;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};

/// Everything a [`RetentionPolicy`] needs to decide whether to keep a
/// snapshot: the whole index, the snapshot's own chain (ordered by
/// sequence number), the total stored size across the index, and the
/// current time.
pub struct RetentionContext<'a> {
    pub all_snapshots: &'a [Snapshot],
    pub chain: Vec<&'a Snapshot>,
    pub total_size: u64,
    pub now: DateTime<Utc>,
}

/// A chain-aware eviction predicate. Implementations must return the same
/// answer for every snapshot in a chain, since retention evicts at chain
/// granularity — `apply_retention` relies on this rather than re-deriving
/// a chain-level verdict itself.
pub trait RetentionPolicy: Send + Sync {
    fn should_retain(&self, snapshot: &Snapshot, context: &RetentionContext) -> bool;
}

/// Keeps only the `max_chains` chains whose newest snapshot is most
/// recent. Ties broken in favor of the later timestamp (spec §4.6).
pub struct CountPolicy {
    max_chains: usize,
}

impl CountPolicy {
    pub fn new(max_chains: usize) -> Result<Self> {
        if max_chains < 1 {
            return Err(CoreError::InvalidRetentionParameter(
                "Count policy requires max_chains >= 1".to_string(),
            ));
        }
        Ok(Self { max_chains })
    }
}

impl RetentionPolicy for CountPolicy {
    fn should_retain(&self, snapshot: &Snapshot, context: &RetentionContext) -> bool {
        let chains = group_chains(context.all_snapshots);
        let mut newest_per_chain: Vec<(&str, DateTime<Utc>)> = chains
            .iter()
            .map(|(chain_id, members)| {
                let newest = members.iter().map(|s| s.timestamp).max().unwrap();
                (chain_id.as_str(), newest)
            })
            .collect();

        // Sort newest-first; equal timestamps keep relative chain_id order
        // descending so the comparison is deterministic ("later timestamp
        // wins" — when timestamps tie exactly, order is otherwise
        // unspecified by the spec, so we pick a stable, documented rule).
        newest_per_chain.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(a.0)));

        let kept: HashSet<&str> = newest_per_chain
            .into_iter()
            .take(self.max_chains)
            .map(|(id, _)| id)
            .collect();

        kept.contains(snapshot.chain_id.as_str())
    }
}

/// Keeps a chain iff its oldest snapshot's age is within `max_age`
/// (spec §4.6, §8 scenario 6).
pub struct AgePolicy {
    max_age: Duration,
}

impl AgePolicy {
    pub fn new(max_age: Duration) -> Result<Self> {
        if max_age <= Duration::zero() {
            return Err(CoreError::InvalidRetentionParameter(
                "Age policy requires max_age > 0".to_string(),
            ));
        }
        Ok(Self { max_age })
    }
}

impl RetentionPolicy for AgePolicy {
    fn should_retain(&self, _snapshot: &Snapshot, context: &RetentionContext) -> bool {
        let oldest = context.chain.iter().map(|s| s.timestamp).min();
        match oldest {
            Some(oldest) => context.now.signed_duration_since(oldest) <= self.max_age,
            None => true,
        }
    }
}

/// Keeps everything if `total_size <= max_bytes`; otherwise evicts whole
/// chains from the oldest end (by the chain's oldest snapshot) until the
/// remaining total fits (spec §4.6).
pub struct SizePolicy {
    max_bytes: u64,
}

impl SizePolicy {
    pub fn new(max_bytes: u64) -> Result<Self> {
        if max_bytes == 0 {
            return Err(CoreError::InvalidRetentionParameter(
                "Size policy requires max_bytes > 0".to_string(),
            ));
        }
        Ok(Self { max_bytes })
    }
}

impl RetentionPolicy for SizePolicy {
    fn should_retain(&self, snapshot: &Snapshot, context: &RetentionContext) -> bool {
        if context.total_size <= self.max_bytes {
            return true;
        }

        let chains = group_chains(context.all_snapshots);
        let mut by_oldest: Vec<(&str, DateTime<Utc>, u64)> = chains
            .iter()
            .map(|(chain_id, members)| {
                let oldest = members.iter().map(|s| s.timestamp).min().unwrap();
                let size: u64 = members.iter().map(|s| s.size).sum();
                (chain_id.as_str(), oldest, size)
            })
            .collect();
        by_oldest.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));

        let mut remaining = context.total_size;
        let mut evicted: HashSet<&str> = HashSet::new();
        for (chain_id, _, size) in &by_oldest {
            if remaining <= self.max_bytes {
                break;
            }
            evicted.insert(chain_id);
            remaining = remaining.saturating_sub(*size);
        }

        !evicted.contains(snapshot.chain_id.as_str())
    }
}

/// AND of its member policies. An empty composite retains everything.
#[derive(Default)]
pub struct CompositePolicy {
    policies: Vec<Box<dyn RetentionPolicy>>,
}

impl CompositePolicy {
    pub fn new(policies: Vec<Box<dyn RetentionPolicy>>) -> Self {
        Self { policies }
    }
}

impl RetentionPolicy for CompositePolicy {
    fn should_retain(&self, snapshot: &Snapshot, context: &RetentionContext) -> bool {
        self.policies
            .iter()
            .all(|p| p.should_retain(snapshot, context))
    }
}

/// Groups snapshots by `chain_id`, each chain ordered by `sequence_num`.
fn group_chains<'a>(snapshots: &'a [Snapshot]) -> HashMap<String, Vec<&'a Snapshot>> {
    let mut chains: HashMap<String, Vec<&Snapshot>> = HashMap::new();
    for s in snapshots {
        chains.entry(s.chain_id.clone()).or_default().push(s);
    }
    for members in chains.values_mut() {
        members.sort_by_key(|s| s.sequence_num);
    }
    chains
}

/// Result of one `apply_retention` call (spec §4.6 step 5).
#[derive(Debug, Clone, Default)]
pub struct RetentionOutcome {
    pub snapshots_removed: usize,
    pub chains_removed: usize,
    pub bytes_freed: u64,
}

/// Evaluates `policy` against every snapshot, deletes the rejected blobs
/// and index entries, and persists the index if anything changed
/// (spec §4.6 "Apply-retention engine"). Individual blob-delete failures
/// are logged and do not abort the operation; an index-save failure at the
/// end is fatal (spec §7 propagation policy).
///
/// This is a free function rather than an `AuditLogger`-aware method so it
/// can be unit tested against an in-memory [`Storage`] without a full
/// [`crate::manager::Manager`]; [`crate::manager::Manager::apply_retention`]
/// wraps it with the audit trail.
pub fn apply_retention(
    storage: &dyn Storage,
    policy: &dyn RetentionPolicy,
    clock: &dyn Clock,
) -> Result<RetentionOutcome> {
    let mut index = storage.load_index()?;
    let all: Vec<Snapshot> = index.list().into_iter().cloned().collect();
    let total_size: u64 = all.iter().map(|s| s.size).sum();
    let now = clock.now();

    let mut to_remove: Vec<String> = Vec::new();
    for snapshot in &all {
        let chain = index.get_chain(&snapshot.chain_id);
        let context = RetentionContext {
            all_snapshots: &all,
            chain,
            total_size,
            now,
        };
        if !policy.should_retain(snapshot, &context) {
            to_remove.push(snapshot.id.clone());
        }
    }

    let mut outcome = RetentionOutcome::default();
    let mut touched_chains: HashSet<String> = HashSet::new();

    for id in &to_remove {
        let Some(snapshot) = index.get(id).cloned() else {
            continue;
        };
        match storage.delete(&snapshot.storage_path) {
            Ok(()) => {
                outcome.bytes_freed += snapshot.size;
            }
            Err(e) => {
                log::warn!(
                    "retention: failed to delete blob for snapshot {} ({}): {e}",
                    snapshot.id,
                    snapshot.storage_path.display()
                );
            }
        }
        index.delete(id);
        outcome.snapshots_removed += 1;
        touched_chains.insert(snapshot.chain_id.clone());
    }

    outcome.chains_removed = touched_chains.len();

    if outcome.snapshots_removed > 0 {
        storage.save_index(&index)?;
    }

    Ok(outcome)
}
