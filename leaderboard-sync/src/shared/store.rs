//! Canonical leaderboard state.
//!
//! The store is the only writer of the wallet -> entry map. Push and poll snapshots
//! race, so acceptance is decided by revision alone: a snapshot is applied only if
//! its revision is strictly greater than the last applied one, and then it replaces
//! the whole map. Delivery order never matters.

use crate::shared::types::{LeaderboardEntry, Revision, Snapshot, SourceKind};
use std::collections::HashMap;
use tracing::{debug, info};

/// Listener invoked after every accepted ingest
pub type StoreListener = Box<dyn FnMut(&StoreUpdate) + Send>;

/// Result of [`LeaderboardStore::ingest`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Accepted {
        revision: Revision,
        entries: usize,
    },
    /// Revision not newer than the applied one; nothing changed
    Stale {
        current: Revision,
        incoming: Revision,
    },
}

impl IngestOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, IngestOutcome::Accepted { .. })
    }
}

/// State handed to listeners after an accepted ingest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreUpdate {
    pub revision: Revision,
    pub source: SourceKind,
    pub entries: Vec<LeaderboardEntry>,
}

#[derive(Default)]
pub struct LeaderboardStore {
    entries: HashMap<String, LeaderboardEntry>,
    revision: Option<Revision>,
    source: Option<SourceKind>,
    listeners: Vec<StoreListener>,
}

impl LeaderboardStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `snapshot` if it is newer than the current state.
    ///
    /// Stale snapshots are a normal outcome of the push/poll race and are dropped
    /// whole.
    pub fn ingest(&mut self, snapshot: Snapshot) -> IngestOutcome {
        if let Some(current) = self.revision {
            if snapshot.revision <= current {
                debug!(
                    current,
                    incoming = snapshot.revision,
                    source = %snapshot.source,
                    "discarding stale leaderboard snapshot"
                );
                return IngestOutcome::Stale {
                    current,
                    incoming: snapshot.revision,
                };
            }
        }

        let Snapshot {
            entries,
            revision,
            source,
        } = snapshot;

        let received = entries.len();
        let mut next = HashMap::with_capacity(received);
        for entry in entries {
            if let Some(previous) = next.insert(entry.wallet.clone(), entry) {
                debug!(
                    wallet = %previous.wallet,
                    revision,
                    "duplicate wallet in snapshot, keeping last"
                );
            }
        }

        self.entries = next;
        self.revision = Some(revision);
        self.source = Some(source);

        info!(
            revision,
            %source,
            entries = self.entries.len(),
            "applied leaderboard snapshot"
        );

        self.notify(revision, source);

        IngestOutcome::Accepted {
            revision,
            entries: self.entries.len(),
        }
    }

    /// Owned copy of the current entries, ordered by rank then wallet.
    pub fn current_entries(&self) -> Vec<LeaderboardEntry> {
        let mut entries: Vec<LeaderboardEntry> = self.entries.values().cloned().collect();
        entries.sort_by(|a, b| a.rank.cmp(&b.rank).then_with(|| a.wallet.cmp(&b.wallet)));
        entries
    }

    pub fn get(&self, wallet: &str) -> Option<&LeaderboardEntry> {
        self.entries.get(wallet)
    }

    pub fn subscribe<F>(&mut self, listener: F)
    where
        F: FnMut(&StoreUpdate) + Send + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    /// Revision of the last applied snapshot, `None` before the first one
    pub fn revision(&self) -> Option<Revision> {
        self.revision
    }

    pub fn source(&self) -> Option<SourceKind> {
        self.source
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn notify(&mut self, revision: Revision, source: SourceKind) {
        if self.listeners.is_empty() {
            return;
        }

        let update = StoreUpdate {
            revision,
            source,
            entries: self.current_entries(),
        };
        for listener in self.listeners.iter_mut() {
            listener(&update);
        }
    }
}

impl std::fmt::Debug for LeaderboardStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaderboardStore")
            .field("revision", &self.revision)
            .field("source", &self.source)
            .field("entries", &self.entries.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
