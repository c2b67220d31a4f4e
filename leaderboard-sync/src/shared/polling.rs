//! REST polling for the leaderboard pull channel
//!
//! Issues one fetch on start, one per interval tick while not paused, and one per
//! manual refresh or timeframe change. A newly issued fetch aborts the one still
//! in flight, so a superseded request never delivers its result.

use crate::shared::{
    error::SyncError,
    stats::Stats,
    types::{
        LeaderboardResponse, RevisionClock, Snapshot, SortKey, SortOrder, SourceKind, Timeframe,
    },
    websocket::SnapshotHandler,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    task::{AbortHandle, JoinHandle},
    time::MissedTickBehavior,
};
use tracing::{debug, info, warn};
use url::Url;

/// Callback receiving one-shot fetch failures
pub type FailureHandler = Arc<dyn Fn(PollFailure) + Send + Sync>;

/// Query parameters of `GET /api/leaderboard`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardQuery {
    pub timeframe: Timeframe,
    pub limit: u32,
    pub offset: u32,
    pub sort_by: SortKey,
    pub sort_order: SortOrder,
}

impl Default for LeaderboardQuery {
    fn default() -> Self {
        Self {
            timeframe: Timeframe::default(),
            limit: 100,
            offset: 0,
            sort_by: SortKey::Roi,
            sort_order: SortOrder::Desc,
        }
    }
}

impl LeaderboardQuery {
    pub fn new(timeframe: Timeframe) -> Self {
        Self {
            timeframe,
            ..Default::default()
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_sort(mut self, sort_by: SortKey, sort_order: SortOrder) -> Self {
        self.sort_by = sort_by;
        self.sort_order = sort_order;
        self
    }

    /// Append this query to `url`, replacing any existing query string.
    pub fn apply(&self, url: &mut Url) {
        url.query_pairs_mut()
            .clear()
            .append_pair("timeframe", self.timeframe.as_str())
            .append_pair("limit", &self.limit.to_string())
            .append_pair("offset", &self.offset.to_string())
            .append_pair("sortBy", self.sort_by.as_str())
            .append_pair("sortOrder", self.sort_order.as_str());
    }
}

/// Source of pull snapshots
#[async_trait]
pub trait SnapshotFetcher: Send + Sync + 'static {
    async fn fetch_leaderboard(
        &self,
        query: &LeaderboardQuery,
    ) -> Result<LeaderboardResponse, SyncError>;
}

/// [`SnapshotFetcher`] backed by the leaderboard REST API
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    base_url: Url,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(base_url: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn leaderboard_url(&self, query: &LeaderboardQuery) -> Result<Url, SyncError> {
        let mut url = self.endpoint("api/leaderboard")?;
        query.apply(&mut url);
        Ok(url)
    }

    /// Fetch the server computed summary from `GET /api/stats`
    pub async fn fetch_stats(&self) -> Result<Stats, SyncError> {
        let url = self.endpoint("api/stats")?;
        self.get_json(url).await
    }

    fn endpoint(&self, path: &str) -> Result<Url, SyncError> {
        self.base_url.join(path).map_err(|error| SyncError::Config {
            key: "LEADERBOARD_API_URL",
            reason: error.to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, SyncError> {
        debug!(%url, "GET");
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl SnapshotFetcher for HttpFetcher {
    async fn fetch_leaderboard(
        &self,
        query: &LeaderboardQuery,
    ) -> Result<LeaderboardResponse, SyncError> {
        let url = self.leaderboard_url(query)?;
        self.get_json(url).await
    }
}

/// Polling configuration
#[derive(Debug, Clone)]
pub struct PollingConfig {
    /// Interval between scheduled fetches
    pub interval: Duration,
    /// Query sent with every fetch
    pub query: LeaderboardQuery,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(30_000),
            query: LeaderboardQuery::default(),
        }
    }
}

impl PollingConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_query(mut self, query: LeaderboardQuery) -> Self {
        self.query = query;
        self
    }
}

/// A pull fetch that did not produce a snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct PollFailure {
    pub timeframe: Timeframe,
    pub error: SyncError,
    pub time: DateTime<Utc>,
}

/// Everything a single fetch needs, shared between the timer task and manual
/// refreshes.
struct PollWorker<F> {
    fetcher: Arc<F>,
    clock: RevisionClock,
    query: Arc<RwLock<LeaderboardQuery>>,
    handler: Arc<RwLock<Option<SnapshotHandler>>>,
    failure_handler: Arc<RwLock<Option<FailureHandler>>>,
    in_flight: Arc<Mutex<Option<AbortHandle>>>,
}

impl<F> Clone for PollWorker<F> {
    fn clone(&self) -> Self {
        Self {
            fetcher: Arc::clone(&self.fetcher),
            clock: self.clock.clone(),
            query: Arc::clone(&self.query),
            handler: Arc::clone(&self.handler),
            failure_handler: Arc::clone(&self.failure_handler),
            in_flight: Arc::clone(&self.in_flight),
        }
    }
}

impl<F: SnapshotFetcher> PollWorker<F> {
    /// Spawn a fetch with the current query, aborting any fetch still in flight.
    ///
    /// The slot stays locked from reading the query until the new fetch is
    /// registered, so the last registered fetch always carries the latest query.
    fn spawn_fetch(&self) {
        let mut in_flight = self.in_flight.lock();
        let query = self.query.read().clone();
        let fetch = tokio::spawn(self.clone().fetch_once(query));

        if let Some(superseded) = in_flight.replace(fetch.abort_handle()) {
            superseded.abort();
        }
    }

    fn cancel_in_flight(&self) {
        let in_flight = self.in_flight.lock().take();
        if let Some(in_flight) = in_flight {
            in_flight.abort();
        }
    }

    async fn fetch_once(self, query: LeaderboardQuery) {
        match self.fetcher.fetch_leaderboard(&query).await {
            Ok(response) => {
                let revision = match response.timestamp {
                    Some(timestamp) => {
                        let revision = timestamp.timestamp_millis().max(0) as u64;
                        self.clock.observe(revision);
                        revision
                    }
                    None => self.clock.next(),
                };
                let snapshot =
                    Snapshot::new(response.data.leaderboard, revision, SourceKind::Poll);
                debug!(
                    timeframe = %query.timeframe,
                    revision,
                    entries = snapshot.entries.len(),
                    "leaderboard poll completed"
                );

                let handler = self.handler.read().clone();
                match handler {
                    Some(handler) => handler(snapshot),
                    None => debug!("no snapshot handler registered, dropping poll result"),
                }
            }
            Err(error) => {
                warn!(timeframe = %query.timeframe, %error, "leaderboard poll failed");

                let failure = PollFailure {
                    timeframe: query.timeframe,
                    error,
                    time: Utc::now(),
                };
                let failure_handler = self.failure_handler.read().clone();
                if let Some(failure_handler) = failure_handler {
                    failure_handler(failure);
                }
            }
        }
    }
}

/// Periodic and manual pull refreshes.
pub struct PollingScheduler<F> {
    worker: PollWorker<F>,
    interval: Duration,
    paused: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl<F: SnapshotFetcher> PollingScheduler<F> {
    pub fn new(fetcher: F, config: PollingConfig, clock: RevisionClock) -> Self {
        Self {
            worker: PollWorker {
                fetcher: Arc::new(fetcher),
                clock,
                query: Arc::new(RwLock::new(config.query)),
                handler: Arc::new(RwLock::new(None)),
                failure_handler: Arc::new(RwLock::new(None)),
                in_flight: Arc::new(Mutex::new(None)),
            },
            interval: config.interval,
            paused: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }

    pub fn on_snapshot<H>(&mut self, handler: H)
    where
        H: Fn(Snapshot) + Send + Sync + 'static,
    {
        *self.worker.handler.write() = Some(Arc::new(handler));
    }

    pub fn on_failure<H>(&mut self, handler: H)
    where
        H: Fn(PollFailure) + Send + Sync + 'static,
    {
        *self.worker.failure_handler.write() = Some(Arc::new(handler));
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start polling every `interval`, beginning with an immediate fetch that is
    /// issued even while paused. No-op while already running.
    pub fn start(&mut self, interval: Duration) {
        if self.is_running() {
            debug!("PollingScheduler already running");
            return;
        }

        self.interval = interval;
        self.task = Some(tokio::spawn(run_polling_loop(
            self.worker.clone(),
            interval,
            Arc::clone(&self.paused),
        )));
    }

    /// Cancel the timer and any fetch still in flight. Idempotent.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            info!("leaderboard polling stopped");
        }
        self.worker.cancel_in_flight();
    }

    /// Skip scheduled fetches without tearing down the timer.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Out-of-band fetch, issued regardless of pause state.
    pub fn refresh_now(&self) {
        self.worker.spawn_fetch();
    }

    pub fn timeframe(&self) -> Timeframe {
        self.worker.query.read().timeframe
    }

    pub fn query(&self) -> LeaderboardQuery {
        self.worker.query.read().clone()
    }

    /// Switch timeframe and refresh immediately.
    pub fn set_timeframe(&self, timeframe: Timeframe) {
        self.worker.query.write().timeframe = timeframe;
        info!(%timeframe, "leaderboard timeframe changed");
        self.refresh_now();
    }
}

impl<F> Drop for PollingScheduler<F> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if let Some(in_flight) = self.worker.in_flight.lock().take() {
            in_flight.abort();
        }
    }
}

async fn run_polling_loop<F: SnapshotFetcher>(
    worker: PollWorker<F>,
    interval: Duration,
    paused: Arc<AtomicBool>,
) {
    info!(?interval, "starting leaderboard polling");

    let mut timer = tokio::time::interval(interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // First tick completes immediately
    timer.tick().await;
    worker.spawn_fetch();

    loop {
        timer.tick().await;

        if paused.load(Ordering::Acquire) {
            debug!("polling paused, skipping scheduled fetch");
        } else {
            worker.spawn_fetch();
        }
    }
}
