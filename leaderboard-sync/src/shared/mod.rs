/// Shared modules for leaderboard-sync
pub mod config;
pub mod display;
pub mod engine;
pub mod error;
pub mod export;
pub mod polling;
pub mod stats;
pub mod store;
pub mod types;
pub mod view;
pub mod websocket;
