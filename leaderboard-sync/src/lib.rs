/// Leaderboard Sync - Shared Library
///
/// Keeps a leaderboard of trading accounts consistent while it is fed from two
/// racing sources:
/// - push frames over the `/api/ws` WebSocket
/// - periodic and manual pulls of `GET /api/leaderboard`
///
/// The library includes:
/// - Wire types and the monotonic revision clock
/// - Connection manager and polling scheduler producing snapshots
/// - Revision guarded store owning the canonical state
/// - Sort/search views, summary statistics and CSV export derived from it
pub mod shared;

// Re-export commonly used types for convenience
pub use shared::types::{
    DecimalField, LeaderboardEntry, Revision, RevisionClock, Snapshot, SortKey, SortOrder,
    SourceKind, Timeframe,
};

pub use shared::config::SyncConfig;
pub use shared::error::SyncError;

pub use shared::polling::{
    HttpFetcher, LeaderboardQuery, PollFailure, PollingScheduler, SnapshotFetcher,
};
pub use shared::websocket::{ConnectionManager, ConnectionState, WebSocketConfig};

pub use shared::store::{IngestOutcome, LeaderboardStore, StoreUpdate};

pub use shared::display::{format_currency, format_wallet};
pub use shared::export::{export_file_name, to_tabular};
pub use shared::stats::{aggregate, performance_distribution, PerformanceBucket, Stats};
pub use shared::view::{find_trader, view};

// Engine wiring both producers into the store
pub use shared::engine::{LeaderboardView, SyncEngine};
