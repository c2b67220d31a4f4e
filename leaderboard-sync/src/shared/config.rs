use crate::shared::{
    error::SyncError,
    polling::{LeaderboardQuery, PollingConfig},
    types::Timeframe,
    websocket::WebSocketConfig,
};
use std::{fmt::Display, str::FromStr, time::Duration};
use tracing::warn;
use url::Url;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:3000/";

/// Engine configuration: where the API lives and how both producers behave.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the REST API, always ending in `/`
    pub api_url: Url,
    pub websocket: WebSocketConfig,
    pub polling: PollingConfig,
}

impl SyncConfig {
    /// Defaults for an API served from [`DEFAULT_API_URL`].
    pub fn local() -> Result<Self, SyncError> {
        Self::new(DEFAULT_API_URL)
    }

    /// Configuration for the API at `api_url`, with the push endpoint derived from it.
    pub fn new(api_url: &str) -> Result<Self, SyncError> {
        let api_url = parse_api_url(api_url)?;
        let websocket = WebSocketConfig::new(websocket_url(&api_url)?.as_str());
        Ok(Self {
            api_url,
            websocket,
            polling: PollingConfig::default(),
        })
    }

    /// Read configuration from `LEADERBOARD_*` environment variables.
    pub fn from_env() -> Result<Self, SyncError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup, starting from
    /// [`SyncConfig::local`]. Missing keys take their default; invalid values are
    /// logged and also take their default.
    pub fn from_lookup<L>(lookup: L) -> Result<Self, SyncError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let mut config = Self::local()?;

        if let Some(raw) = lookup("LEADERBOARD_API_URL") {
            match parse_api_url(&raw) {
                Ok(api_url) => config = config.with_api_url(api_url),
                Err(error) => warn!(%error, "ignoring LEADERBOARD_API_URL"),
            }
        }

        if let Some(raw) = lookup("LEADERBOARD_WS_URL") {
            match Url::parse(raw.trim()) {
                Ok(url) if matches!(url.scheme(), "ws" | "wss") => {
                    config.websocket.url = url.to_string();
                }
                Ok(url) => warn!(
                    scheme = url.scheme(),
                    "ignoring LEADERBOARD_WS_URL, expected ws or wss scheme"
                ),
                Err(error) => warn!(%error, "ignoring LEADERBOARD_WS_URL"),
            }
        }

        if let Some(ms) = env_or::<u64>(&lookup, "LEADERBOARD_POLL_INTERVAL_MS") {
            if ms == 0 {
                warn!("ignoring LEADERBOARD_POLL_INTERVAL_MS, must be positive");
            } else {
                config.polling.interval = Duration::from_millis(ms);
            }
        }

        if let Some(ms) = env_or::<u64>(&lookup, "LEADERBOARD_RECONNECT_DELAY_MS") {
            config.websocket.reconnect_delay = Duration::from_millis(ms);
        }

        if let Some(timeframe) = env_or::<Timeframe>(&lookup, "LEADERBOARD_TIMEFRAME") {
            config.polling.query.timeframe = timeframe;
        }

        if let Some(limit) = env_or::<u32>(&lookup, "LEADERBOARD_LIMIT") {
            config.polling.query.limit = limit;
        }

        Ok(config)
    }

    /// Replace the API base URL. The push URL is re-derived from it.
    pub fn with_api_url(mut self, api_url: Url) -> Self {
        match websocket_url(&api_url) {
            Ok(url) => self.websocket.url = url.to_string(),
            Err(error) => warn!(%error, "keeping previous websocket url"),
        }
        self.api_url = api_url;
        self
    }

    pub fn with_websocket(mut self, websocket: WebSocketConfig) -> Self {
        self.websocket = websocket;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.polling.interval = interval;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.websocket.reconnect_delay = delay;
        self
    }

    pub fn with_query(mut self, query: LeaderboardQuery) -> Self {
        self.polling.query = query;
        self
    }

    pub fn with_timeframe(mut self, timeframe: Timeframe) -> Self {
        self.polling.query.timeframe = timeframe;
        self
    }
}

/// Parse `key` through `lookup`, warning and yielding `None` if present but invalid.
fn env_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &'static str) -> Option<T>
where
    T: FromStr,
    T::Err: Display,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(error) => {
            warn!(key, value = %raw, %error, "invalid value, using default");
            None
        }
    }
}

/// Parse an http(s) base URL and make sure relative joins keep its path.
fn parse_api_url(raw: &str) -> Result<Url, SyncError> {
    let mut url = Url::parse(raw.trim()).map_err(|error| SyncError::Config {
        key: "LEADERBOARD_API_URL",
        reason: error.to_string(),
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(SyncError::Config {
            key: "LEADERBOARD_API_URL",
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

/// `http://host/base/` -> `ws://host/base/api/ws`, `https` -> `wss`.
pub fn websocket_url(api_url: &Url) -> Result<Url, SyncError> {
    let mut url = api_url.join("api/ws").map_err(|error| SyncError::Config {
        key: "LEADERBOARD_WS_URL",
        reason: error.to_string(),
    })?;

    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        _ => "ws",
    };
    url.set_scheme(scheme).map_err(|_| SyncError::Config {
        key: "LEADERBOARD_WS_URL",
        reason: format!("cannot derive websocket scheme from '{api_url}'"),
    })?;

    Ok(url)
}
