//! Replay ledger: the one piece of shared mutable state the verifier touches.
//!
//! # Purpose
//! The verifier asks the ledger, once per token kind, whether a `jti` has been
//! consumed. A `false` answer commits the id as seen until the supplied expiry.
//! The ledger is injected as a trait object so deployments can back it with a
//! distributed store; [`MemoryReplayLedger`] is the in-process implementation.
//!
//! # Key invariants
//! - Check and mark happen in one atomic step. Two concurrent callers presenting
//!   the same id cannot both observe `false`.
//! - An entry is never forgotten before its own expiry, and stays a replay
//!   until a sweep removes it.
//! - Backend failures are errors, never a silent "not seen".
use crate::now_epoch_seconds;
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

/// Which token stream an identifier belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplayKind {
    License,
    Proof,
}

impl ReplayKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplayKind::License => "license",
            ReplayKind::Proof => "proof",
        }
    }
}

impl std::fmt::Display for ReplayKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("replay ledger unavailable: {0}")]
    Unavailable(String),
}

/// Injected replay-detection capability.
#[async_trait]
pub trait ReplayLedger: Send + Sync {
    /// Returns `true` if `(kind, id)` was already seen. Otherwise records it as
    /// seen through `expires_at` (seconds since epoch) and returns `false`.
    async fn seen(&self, kind: ReplayKind, id: &str, expires_at: i64)
    -> Result<bool, LedgerError>;
}

/// Source of "now" in seconds since epoch for expiry sweeps.
pub type LedgerClock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Expired entries are swept once every this many inserts.
pub const SWEEP_INTERVAL: usize = 1024;

/// Process-local ledger over a sharded concurrent map.
///
/// An entry answers "replay" for as long as it is present, whatever the
/// caller's notion of time. Entries leave only through a sweep, which drops
/// those whose expiry is before the ledger clock. Sweeps run automatically
/// every [`SWEEP_INTERVAL`] inserts and on demand via [`Self::purge_expired`].
/// Verifiers evaluating at a pinned `now` should share that clock through
/// [`Self::with_clock`].
///
/// Not shared between processes: every verifier instance has its own view, so
/// a fleet of enforcement points needs a distributed implementation instead.
pub struct MemoryReplayLedger {
    entries: DashMap<(ReplayKind, String), i64>,
    inserts: AtomicUsize,
    clock: LedgerClock,
}

impl Default for MemoryReplayLedger {
    fn default() -> Self {
        Self::with_clock(Arc::new(now_epoch_seconds))
    }
}

impl std::fmt::Debug for MemoryReplayLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryReplayLedger")
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl MemoryReplayLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock(clock: LedgerClock) -> Self {
        Self {
            entries: DashMap::new(),
            inserts: AtomicUsize::new(0),
            clock,
        }
    }

    /// Drop entries whose expiry is before `now`. Returns how many were removed.
    pub fn purge_expired(&self, now: i64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, expires_at| *expires_at >= now);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            tracing::debug!(removed, remaining = self.entries.len(), "replay ledger swept");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn check_and_mark(&self, kind: ReplayKind, id: &str, expires_at: i64) -> bool {
        // The entry guard holds the shard lock for the whole check-and-mark.
        match self.entries.entry((kind, id.to_string())) {
            Entry::Occupied(_) => true,
            Entry::Vacant(entry) => {
                entry.insert(expires_at);
                false
            }
        }
    }

    fn sweep_on_cadence(&self) {
        let inserted = self.inserts.fetch_add(1, Ordering::Relaxed) + 1;
        if inserted % SWEEP_INTERVAL == 0 {
            self.purge_expired((self.clock)());
        }
    }
}

#[async_trait]
impl ReplayLedger for MemoryReplayLedger {
    async fn seen(
        &self,
        kind: ReplayKind,
        id: &str,
        expires_at: i64,
    ) -> Result<bool, LedgerError> {
        let replay = self.check_and_mark(kind, id, expires_at);
        if !replay {
            self.sweep_on_cadence();
        }
        Ok(replay)
    }
}
