//! Engine wiring: both producers feed one ingest task that owns the store.
//!
//! Producers never touch canonical state. They push [`Snapshot`]s into an unbounded
//! channel, and a single task drains it calling [`LeaderboardStore::ingest`] once per
//! snapshot, so every ingestion is a discrete turn. Derived state is published as a
//! [`LeaderboardView`] on a `watch` channel.

use crate::shared::{
    config::SyncConfig,
    export,
    polling::{HttpFetcher, PollFailure, PollingScheduler, SnapshotFetcher},
    stats::{aggregate, performance_distribution, PerformanceBucket, Stats},
    store::{IngestOutcome, LeaderboardStore},
    types::{
        LeaderboardEntry, Revision, RevisionClock, Snapshot, SortKey, SortOrder, SourceKind,
        Timeframe,
    },
    view,
    websocket::{ConnectionManager, ConnectionState},
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::{
    sync::{broadcast, mpsc, watch},
    task::JoinHandle,
};
use tracing::{debug, info};

/// Capacity of the poll failure broadcast; slow readers miss the oldest failures.
const FAILURE_CHANNEL_CAPACITY: usize = 64;

/// Everything a reader sees of the current leaderboard
#[derive(Debug, Clone, Default)]
pub struct LeaderboardView {
    /// Revision of the applied snapshot, `None` until the first one lands
    pub revision: Option<Revision>,
    pub source: Option<SourceKind>,
    /// Entries ordered by rank then wallet
    pub entries: Arc<Vec<LeaderboardEntry>>,
    pub stats: Stats,
    pub updated_at: Option<DateTime<Utc>>,
    /// Snapshots dropped by the revision guard since the engine started
    pub rejected_snapshots: u64,
}

impl LeaderboardView {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn sorted(
        &self,
        sort_key: SortKey,
        sort_order: SortOrder,
        search: &str,
    ) -> Vec<LeaderboardEntry> {
        view::view(&self.entries, sort_key, sort_order, search)
    }

    /// CSV of the view a reader currently has on screen.
    pub fn export_csv(&self, sort_key: SortKey, sort_order: SortOrder, search: &str) -> String {
        export::to_tabular(&self.sorted(sort_key, sort_order, search))
    }

    pub fn find_trader(&self, query: &str) -> Option<&LeaderboardEntry> {
        view::find_trader(&self.entries, query)
    }

    pub fn distribution(&self) -> Vec<(PerformanceBucket, usize)> {
        performance_distribution(&self.entries)
    }
}

/// Leaderboard synchronisation engine.
///
/// Must be created and started inside a tokio runtime.
pub struct SyncEngine<F> {
    config: SyncConfig,
    clock: RevisionClock,
    connection: ConnectionManager,
    polling: PollingScheduler<F>,
    snapshot_tx: mpsc::UnboundedSender<Snapshot>,
    snapshot_rx: Option<mpsc::UnboundedReceiver<Snapshot>>,
    view_tx: watch::Sender<LeaderboardView>,
    failure_tx: broadcast::Sender<PollFailure>,
    ingest: Option<JoinHandle<()>>,
}

impl SyncEngine<HttpFetcher> {
    /// Engine polling the REST API at `config.api_url`.
    pub fn with_http(config: SyncConfig) -> Self {
        let fetcher = HttpFetcher::new(config.api_url.clone());
        Self::new(config, fetcher)
    }
}

impl<F: SnapshotFetcher> SyncEngine<F> {
    pub fn new(config: SyncConfig, fetcher: F) -> Self {
        let clock = RevisionClock::new();
        let (snapshot_tx, snapshot_rx) = mpsc::unbounded_channel();
        let (view_tx, _) = watch::channel(LeaderboardView::default());
        let (failure_tx, _) = broadcast::channel(FAILURE_CHANNEL_CAPACITY);

        let mut connection = ConnectionManager::new(config.websocket.clone(), clock.clone());
        {
            let snapshot_tx = snapshot_tx.clone();
            connection.on_snapshot(move |snapshot| {
                let _ = snapshot_tx.send(snapshot);
            });
        }

        let mut polling = PollingScheduler::new(fetcher, config.polling.clone(), clock.clone());
        {
            let snapshot_tx = snapshot_tx.clone();
            polling.on_snapshot(move |snapshot| {
                let _ = snapshot_tx.send(snapshot);
            });
        }
        {
            let failure_tx = failure_tx.clone();
            polling.on_failure(move |failure| {
                // No subscriber is fine, failures are already logged
                let _ = failure_tx.send(failure);
            });
        }

        Self {
            config,
            clock,
            connection,
            polling,
            snapshot_tx,
            snapshot_rx: Some(snapshot_rx),
            view_tx,
            failure_tx,
            ingest: None,
        }
    }

    /// Start the ingest task and both producers. Calling again after [`Self::stop`]
    /// restarts the producers; the store and its revision survive.
    pub fn start(&mut self) {
        if let Some(snapshot_rx) = self.snapshot_rx.take() {
            self.ingest = Some(tokio::spawn(run_ingest_loop(
                snapshot_rx,
                self.view_tx.clone(),
            )));
        }

        info!(
            api = %self.config.api_url,
            websocket = %self.config.websocket.url,
            timeframe = %self.polling.timeframe(),
            "starting leaderboard sync"
        );
        self.connection.start();
        self.polling.start(self.config.polling.interval);
    }

    /// Stop both producers. Idempotent.
    pub fn stop(&mut self) {
        self.connection.stop();
        self.polling.stop();
    }

    /// Hand a host supplied snapshot to the store, e.g. state rendered before the
    /// engine started. Subject to the same revision guard as every other source.
    pub fn seed(&self, entries: Vec<LeaderboardEntry>, revision: Revision) {
        self.clock.observe(revision);
        let _ = self
            .snapshot_tx
            .send(Snapshot::new(entries, revision, SourceKind::Initial));
    }

    pub fn refresh_now(&self) {
        self.polling.refresh_now();
    }

    pub fn set_timeframe(&self, timeframe: Timeframe) {
        self.polling.set_timeframe(timeframe);
    }

    pub fn timeframe(&self) -> Timeframe {
        self.polling.timeframe()
    }

    pub fn pause_polling(&self) {
        self.polling.pause();
    }

    pub fn resume_polling(&self) {
        self.polling.resume();
    }

    pub fn is_polling_paused(&self) -> bool {
        self.polling.is_paused()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.connection.watch_state()
    }

    pub fn subscribe_view(&self) -> watch::Receiver<LeaderboardView> {
        self.view_tx.subscribe()
    }

    pub fn subscribe_failures(&self) -> broadcast::Receiver<PollFailure> {
        self.failure_tx.subscribe()
    }

    /// Latest published view
    pub fn current(&self) -> LeaderboardView {
        self.view_tx.borrow().clone()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }
}

impl<F> Drop for SyncEngine<F> {
    fn drop(&mut self) {
        if let Some(ingest) = self.ingest.take() {
            ingest.abort();
        }
    }
}

async fn run_ingest_loop(
    mut snapshot_rx: mpsc::UnboundedReceiver<Snapshot>,
    view_tx: watch::Sender<LeaderboardView>,
) {
    let mut store = LeaderboardStore::new();
    {
        let view_tx = view_tx.clone();
        store.subscribe(move |update| {
            let stats = aggregate(&update.entries);
            view_tx.send_modify(|view| {
                view.revision = Some(update.revision);
                view.source = Some(update.source);
                view.entries = Arc::new(update.entries.clone());
                view.stats = stats;
                view.updated_at = Some(Utc::now());
            });
        });
    }

    while let Some(snapshot) = snapshot_rx.recv().await {
        if let IngestOutcome::Stale { .. } = store.ingest(snapshot) {
            // Counted without waking readers, nothing they render changed
            view_tx.send_if_modified(|view| {
                view.rejected_snapshots += 1;
                false
            });
        }
    }

    debug!("snapshot channel closed, ingest loop exiting");
}
