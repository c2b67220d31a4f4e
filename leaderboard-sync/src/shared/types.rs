/// Core data types for leaderboard snapshots
///
/// These types match the JSON message format of the leaderboard API: the `/api/ws`
/// push frames and the `/api/leaderboard` pull responses.
use crate::shared::error::SyncError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{
    fmt,
    str::FromStr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

/// Ordering marker assigned at the data source. Server counters and millisecond
/// timestamps are both carried as a `u64`.
pub type Revision = u64;

/// Monotonic local revision source, shared by every producer of one engine.
///
/// Used when a push frame or pull response carries no server revision.
#[derive(Debug, Clone, Default)]
pub struct RevisionClock {
    last: Arc<AtomicU64>,
}

impl RevisionClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next local revision: the wall clock in milliseconds, bumped past anything
    /// handed out or observed before.
    pub fn next(&self) -> Revision {
        let now = Utc::now().timestamp_millis().max(0) as u64;
        let step = |last: u64| now.max(last.saturating_add(1));
        match self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(step(last)))
        {
            Ok(previous) | Err(previous) => step(previous),
        }
    }

    /// Record a server assigned revision so later local fallbacks sort after it.
    pub fn observe(&self, revision: Revision) {
        self.last.fetch_max(revision, Ordering::SeqCst);
    }
}

/// Decimal quantity as received on the wire.
///
/// Keeps the raw text for display and the exact parsed value for comparison and
/// aggregation. Values are never rounded: `value` is `None` when the text is not
/// a plain decimal literal, or when it is one that a 96-bit `Decimal` cannot hold
/// exactly (see [`DecimalField::exceeds_precision`]).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecimalField {
    raw: String,
    value: Option<Decimal>,
    exceeds_precision: bool,
}

impl DecimalField {
    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let (value, exceeds_precision) = match parse_exact(raw.trim()) {
            Ok(value) => (Some(value), false),
            Err(DecimalRejection::Malformed) => (None, false),
            Err(DecimalRejection::ExceedsPrecision) => (None, true),
        };
        Self {
            raw,
            value,
            exceeds_precision,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn value(&self) -> Option<Decimal> {
        self.value
    }

    /// The raw text is a well formed number, but it has more significant digits or
    /// a larger magnitude than `Decimal` represents exactly.
    pub fn exceeds_precision(&self) -> bool {
        self.exceeds_precision
    }
}

impl From<Decimal> for DecimalField {
    fn from(value: Decimal) -> Self {
        Self {
            raw: value.to_string(),
            value: Some(value),
            exceeds_precision: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecimalRejection {
    Malformed,
    ExceedsPrecision,
}

/// Parse `text` as `[+-]digits[.digits][(e|E)[+-]digits]` without any rounding.
fn parse_exact(text: &str) -> Result<Decimal, DecimalRejection> {
    if !is_decimal_literal(text) {
        return Err(DecimalRejection::Malformed);
    }

    let (mantissa, exponent) = split_exponent(text);
    let mut value = Decimal::from_str_exact(mantissa)
        .or_else(|_| Decimal::from_str_exact(trim_fraction_zeros(mantissa)))
        .map_err(|_| DecimalRejection::ExceedsPrecision)?;

    let Some(exponent) = exponent else {
        return Ok(value);
    };
    if value.is_zero() {
        return Ok(Decimal::ZERO);
    }
    let exponent: i64 = exponent
        .parse()
        .map_err(|_| DecimalRejection::ExceedsPrecision)?;

    if exponent < 0 {
        value.normalize_assign();
        let scale = u32::try_from(i64::from(value.scale()) - exponent)
            .map_err(|_| DecimalRejection::ExceedsPrecision)?;
        value
            .set_scale(scale)
            .map_err(|_| DecimalRejection::ExceedsPrecision)?;
        return Ok(value);
    }

    // Move the point right: consume the fraction digits first, then multiply
    let scale = i64::from(value.scale());
    let shift = exponent.min(scale);
    value
        .set_scale((scale - shift) as u32)
        .map_err(|_| DecimalRejection::ExceedsPrecision)?;
    for _ in shift..exponent {
        value = value
            .checked_mul(Decimal::TEN)
            .ok_or(DecimalRejection::ExceedsPrecision)?;
    }
    Ok(value)
}

fn split_exponent(text: &str) -> (&str, Option<&str>) {
    match text.split_once(['e', 'E']) {
        Some((mantissa, exponent)) => (mantissa, Some(exponent)),
        None => (text, None),
    }
}

fn is_decimal_literal(text: &str) -> bool {
    fn digits(s: &str) -> bool {
        !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
    }
    fn unsigned(s: &str) -> &str {
        s.strip_prefix(['+', '-']).unwrap_or(s)
    }

    let (mantissa, exponent) = split_exponent(text);
    let mantissa_ok = match unsigned(mantissa).split_once('.') {
        Some(("", "")) => false,
        Some((whole, fraction)) => {
            (whole.is_empty() || digits(whole)) && (fraction.is_empty() || digits(fraction))
        }
        None => digits(unsigned(mantissa)),
    };

    mantissa_ok && exponent.is_none_or(|exponent| digits(unsigned(exponent)))
}

/// `12.3400` -> `12.34`, `5.000` -> `5`
fn trim_fraction_zeros(text: &str) -> &str {
    if !text.contains('.') {
        return text;
    }
    text.trim_end_matches('0').trim_end_matches('.')
}

impl fmt::Display for DecimalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for DecimalField {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Text(String),
            Number(serde_json::Number),
        }

        Ok(match Option::<Wire>::deserialize(deserializer)? {
            Some(Wire::Text(text)) => Self::parse(text),
            Some(Wire::Number(number)) => Self::parse(number.to_string()),
            None => Self::default(),
        })
    }
}

impl Serialize for DecimalField {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.raw)
    }
}

/// One ranked trading account
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    /// Wallet address, the identity key of the entry
    #[serde(alias = "traderWallet", alias = "trader_wallet", alias = "wallet_address")]
    pub wallet: String,
    #[serde(default, alias = "account_value")]
    pub account_value: DecimalField,
    #[serde(default)]
    pub pnl: DecimalField,
    #[serde(default)]
    pub roi: DecimalField,
    #[serde(default)]
    pub volume: DecimalField,
    /// Position under the sort key the server used for this snapshot
    pub rank: u32,
    #[serde(alias = "last_updated")]
    pub last_updated: DateTime<Utc>,
}

/// Channel a [`Snapshot`] arrived through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// Seeded by the host before any producer reported
    Initial,
    Push,
    Poll,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Initial => "initial",
            SourceKind::Push => "push",
            SourceKind::Poll => "poll",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Complete, self-consistent set of leaderboard entries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub entries: Vec<LeaderboardEntry>,
    pub revision: Revision,
    pub source: SourceKind,
}

impl Snapshot {
    pub fn new(entries: Vec<LeaderboardEntry>, revision: Revision, source: SourceKind) -> Self {
        Self {
            entries,
            revision,
            source,
        }
    }
}

/// Type tag of a push frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    Initial,
    LeaderboardUpdated,
    PeriodicUpdate,
    #[serde(other)]
    Unknown,
}

/// Header of a push frame. `data` stays untyped until the tag is known, so
/// frames of unrelated types never fail entry parsing.
#[derive(Debug, Clone, Deserialize)]
pub struct FrameEnvelope {
    #[serde(rename = "type")]
    pub kind: FrameKind,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub revision: Option<Revision>,
}

/// Response body of `GET /api/leaderboard`
#[derive(Debug, Clone, Deserialize)]
pub struct LeaderboardResponse {
    pub data: LeaderboardPayload,
    /// Server time the ranking was produced at
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeaderboardPayload {
    pub leaderboard: Vec<LeaderboardEntry>,
}

/// Ranking window requested from the API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Timeframe {
    #[default]
    Day,
    Week,
    Month,
    All,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::Day => "24h",
            Timeframe::Week => "7d",
            Timeframe::Month => "30d",
            Timeframe::All => "all",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Timeframe::Day => "24 Hours",
            Timeframe::Week => "7 Days",
            Timeframe::Month => "30 Days",
            Timeframe::All => "All Time",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "24h" => Ok(Timeframe::Day),
            "7d" => Ok(Timeframe::Week),
            "30d" => Ok(Timeframe::Month),
            "all" => Ok(Timeframe::All),
            other => Err(SyncError::Config {
                key: "timeframe",
                reason: format!("unknown timeframe '{other}'"),
            }),
        }
    }
}

/// Numeric column a view is ordered by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortKey {
    #[default]
    Roi,
    Pnl,
    Volume,
    AccountValue,
}

impl SortKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::Roi => "roi",
            SortKey::Pnl => "pnl",
            SortKey::Volume => "volume",
            SortKey::AccountValue => "accountValue",
        }
    }

    /// Parsed value of this column for `entry`
    pub fn value_of(&self, entry: &LeaderboardEntry) -> Option<Decimal> {
        match self {
            SortKey::Roi => entry.roi.value(),
            SortKey::Pnl => entry.pnl.value(),
            SortKey::Volume => entry.volume.value(),
            SortKey::AccountValue => entry.account_value.value(),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortKey {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "roi" => Ok(SortKey::Roi),
            "pnl" => Ok(SortKey::Pnl),
            "volume" => Ok(SortKey::Volume),
            "accountValue" | "account_value" => Ok(SortKey::AccountValue),
            other => Err(SyncError::Config {
                key: "sortBy",
                reason: format!("unknown sort key '{other}'"),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortOrder {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(SyncError::Config {
                key: "sortOrder",
                reason: format!("unknown sort order '{other}'"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_decimal_field_parsing() {
        struct TestCase {
            input: &'static str,
            expected: Option<Decimal>,
            exceeds_precision: bool,
        }

        let tests = vec![
            TestCase {
                // TC0: plain integer
                input: "1000000",
                expected: Some(dec!(1000000)),
                exceeds_precision: false,
            },
            TestCase {
                // TC1: scale is preserved
                input: "2000000.50",
                expected: Some(dec!(2000000.50)),
                exceeds_precision: false,
            },
            TestCase {
                // TC2: signed
                input: "-12.5",
                expected: Some(dec!(-12.5)),
                exceeds_precision: false,
            },
            TestCase {
                // TC3: surrounding whitespace
                input: " 42 ",
                expected: Some(dec!(42)),
                exceeds_precision: false,
            },
            TestCase {
                // TC4: scientific notation
                input: "1.5e3",
                expected: Some(dec!(1500)),
                exceeds_precision: false,
            },
            TestCase {
                // TC5: not a number
                input: "NaN",
                expected: None,
                exceeds_precision: false,
            },
            TestCase {
                // TC6: empty
                input: "",
                expected: None,
                exceeds_precision: false,
            },
            TestCase {
                // TC7: digit separators are not part of the wire format
                input: "1_000",
                expected: None,
                exceeds_precision: false,
            },
            TestCase {
                // TC8: eighteen fraction digits are held exactly
                input: "0.123456789012345678",
                expected: Some(dec!(0.123456789012345678)),
                exceeds_precision: false,
            },
            TestCase {
                // TC9: thirty significant digits are refused rather than rounded
                input: "123456789012.123456789012345678",
                expected: None,
                exceeds_precision: true,
            },
            TestCase {
                // TC10: larger than the 96-bit range
                input: "100000000000000000000000000000",
                expected: None,
                exceeds_precision: true,
            },
            TestCase {
                // TC11: trailing fraction zeros beyond 28 places are still exact
                input: "1.00000000000000000000000000000",
                expected: Some(dec!(1)),
                exceeds_precision: false,
            },
            TestCase {
                // TC12: negative exponent
                input: "-2.5E-3",
                expected: Some(dec!(-0.0025)),
                exceeds_precision: false,
            },
            TestCase {
                // TC13: exponent past the representable scale
                input: "1e-29",
                expected: None,
                exceeds_precision: true,
            },
            TestCase {
                // TC14: exponent past the representable magnitude
                input: "8e28",
                expected: None,
                exceeds_precision: true,
            },
            TestCase {
                // TC15: zero with any exponent
                input: "0e-400",
                expected: Some(Decimal::ZERO),
                exceeds_precision: false,
            },
            TestCase {
                // TC16: leading point
                input: "+.5",
                expected: Some(dec!(0.5)),
                exceeds_precision: false,
            },
            TestCase {
                // TC17: bare exponent
                input: ".e5",
                expected: None,
                exceeds_precision: false,
            },
            TestCase {
                // TC18: hexadecimal
                input: "0x1A",
                expected: None,
                exceeds_precision: false,
            },
            TestCase {
                // TC19: infinity
                input: "inf",
                expected: None,
                exceeds_precision: false,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = DecimalField::parse(test.input);
            assert_eq!(actual.value(), test.expected, "TC{} failed", index);
            assert_eq!(actual.raw(), test.input, "TC{} raw failed", index);
            assert_eq!(
                actual.exceeds_precision(),
                test.exceeds_precision,
                "TC{} precision failed",
                index
            );
        }
    }

    #[test]
    fn test_entry_deserialises_wire_aliases() {
        let input = r#"{
            "rank": 1,
            "traderWallet": "0xAbC",
            "accountValue": "1500.25",
            "pnl": "-20",
            "roi": 12.5,
            "volume": null,
            "lastUpdated": "2024-05-01T12:00:00Z"
        }"#;

        let entry: LeaderboardEntry = serde_json::from_str(input).unwrap();
        assert_eq!(entry.wallet, "0xAbC");
        assert_eq!(entry.rank, 1);
        assert_eq!(entry.account_value.value(), Some(dec!(1500.25)));
        assert_eq!(entry.pnl.value(), Some(dec!(-20)));
        assert_eq!(entry.roi.value(), Some(dec!(12.5)));
        assert_eq!(entry.volume.value(), None);
        assert_eq!(entry.volume.raw(), "");
    }

    #[test]
    fn test_entry_keeps_malformed_decimal_raw() {
        let input = r#"{
            "wallet": "0x1",
            "account_value": "n/a",
            "pnl": "1",
            "roi": "1",
            "volume": "1",
            "rank": 3,
            "last_updated": "2024-05-01T12:00:00Z"
        }"#;

        let entry: LeaderboardEntry = serde_json::from_str(input).unwrap();
        assert_eq!(entry.account_value.raw(), "n/a");
        assert_eq!(entry.account_value.value(), None);
    }

    #[test]
    fn test_frame_envelope_unknown_kind() {
        let envelope: FrameEnvelope =
            serde_json::from_str(r#"{"type":"welcome","data":"hello"}"#).unwrap();
        assert_eq!(envelope.kind, FrameKind::Unknown);
        assert_eq!(envelope.revision, None);

        let envelope: FrameEnvelope =
            serde_json::from_str(r#"{"type":"periodic_update","data":[],"revision":7}"#).unwrap();
        assert_eq!(envelope.kind, FrameKind::PeriodicUpdate);
        assert_eq!(envelope.revision, Some(7));
    }

    #[test]
    fn test_revision_clock_is_monotonic() {
        let clock = RevisionClock::new();
        let first = clock.next();
        let second = clock.next();
        assert!(second > first);

        clock.observe(second + 10_000_000);
        assert!(clock.next() > second + 10_000_000);
    }

    #[test]
    fn test_timeframe_round_trip() {
        for timeframe in [
            Timeframe::Day,
            Timeframe::Week,
            Timeframe::Month,
            Timeframe::All,
        ] {
            assert_eq!(timeframe.to_string().parse::<Timeframe>().unwrap(), timeframe);
        }
        assert!("1y".parse::<Timeframe>().is_err());
    }

    #[test]
    fn test_sort_key_parsing() {
        assert_eq!("accountValue".parse::<SortKey>().unwrap(), SortKey::AccountValue);
        assert_eq!("pnl".parse::<SortKey>().unwrap(), SortKey::Pnl);
        assert_eq!("DESC".parse::<SortOrder>().unwrap(), SortOrder::Desc);
        assert!("rank".parse::<SortKey>().is_err());
    }
}
