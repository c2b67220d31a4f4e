use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use leaderboard_sync::{
    shared::types::LeaderboardResponse, ConnectionState, LeaderboardQuery, SnapshotFetcher,
    SourceKind, SyncConfig, SyncEngine, SyncError, WebSocketConfig,
};
use rust_decimal_macros::dec;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// Pull channel that never produces a snapshot, so every accepted state in the
/// view came through the WebSocket.
struct UnreachableApi;

#[async_trait]
impl SnapshotFetcher for UnreachableApi {
    async fn fetch_leaderboard(
        &self,
        _query: &LeaderboardQuery,
    ) -> Result<LeaderboardResponse, SyncError> {
        Err(SyncError::Fetch("connection refused".to_string()))
    }
}

fn frame(kind: &str, revision: u64, wallet: &str, roi: &str) -> Message {
    Message::text(format!(
        r#"{{"type":"{kind}","revision":{revision},"data":[{{"traderWallet":"{wallet}","accountValue":"1000","pnl":"25.50","roi":"{roi}","volume":"2000000.50","rank":1,"lastUpdated":"2024-05-01T12:00:00Z"}}]}}"#
    ))
}

#[tokio::test]
async fn test_push_frames_reach_the_published_view() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        ws.send(frame("initial", 5, "0xA", "10")).await.unwrap();
        // Older than what the store already holds
        ws.send(frame("leaderboard_updated", 3, "0xSTALE", "99")).await.unwrap();
        ws.send(Message::text(r#"{"type":"welcome","data":"hi"}"#))
            .await
            .unwrap();
        ws.send(frame("periodic_update", 6, "0xB", "20")).await.unwrap();
        while let Some(Ok(_)) = ws.next().await {}
    });

    let config = SyncConfig::local()
        .unwrap()
        .with_websocket(
            WebSocketConfig::new(format!("ws://{addr}/api/ws"))
                .with_reconnect_delay(Duration::from_millis(100)),
        )
        .with_poll_interval(Duration::from_secs(3600));
    let mut engine = SyncEngine::new(config, UnreachableApi);
    let mut view_rx = engine.subscribe_view();
    let mut failure_rx = engine.subscribe_failures();
    engine.start();

    let view = tokio::time::timeout(
        Duration::from_secs(5),
        view_rx.wait_for(|view| view.revision == Some(6)),
    )
    .await
    .unwrap()
    .unwrap()
    .clone();

    assert_eq!(view.source, Some(SourceKind::Push));
    assert_eq!(view.rejected_snapshots, 1);
    assert_eq!(view.entries.len(), 1);
    assert_eq!(view.entries[0].wallet, "0xB");
    assert_eq!(view.entries[0].roi.value(), Some(dec!(20)));
    assert_eq!(view.stats.total_traders, 1);
    assert_eq!(view.stats.total_volume, Some(dec!(2000000.50)));
    assert_eq!(view.stats.total_pnl, Some(dec!(25.50)));
    assert_eq!(view.stats.average_roi, Some(dec!(20)));
    assert_eq!(view.stats.top_performer.as_deref(), Some("0xB"));
    assert!(view.find_trader("0xstale").is_none());
    assert_eq!(engine.connection_state(), ConnectionState::Connected);

    // The immediate poll still ran and was reported without touching the view
    let failure = tokio::time::timeout(Duration::from_secs(5), failure_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(failure.error.is_transient());
    assert_eq!(engine.current().revision, Some(6));

    engine.stop();
    assert_eq!(engine.connection_state(), ConnectionState::Disconnected);

    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap();
}
