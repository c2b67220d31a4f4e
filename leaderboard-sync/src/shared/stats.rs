use crate::shared::types::{DecimalField, LeaderboardEntry};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::{cmp::Ordering, fmt};
use tracing::warn;

/// Summary metrics of one leaderboard state.
///
/// Same shape as the `GET /api/stats` body, so a locally aggregated value and a
/// server computed one compare directly. A decimal metric is `None` when it cannot
/// be stated exactly: some input exceeded `Decimal` precision or the sum overflowed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    #[serde(default)]
    pub total_traders: usize,
    #[serde(
        default,
        serialize_with = "rust_decimal::serde::str_option::serialize",
        deserialize_with = "de_decimal"
    )]
    pub total_volume: Option<Decimal>,
    #[serde(
        default,
        rename = "averageROI",
        with = "rust_decimal::serde::float_option"
    )]
    pub average_roi: Option<Decimal>,
    #[serde(default, deserialize_with = "de_wallet")]
    pub top_performer: Option<String>,
    #[serde(
        default,
        serialize_with = "rust_decimal::serde::str_option::serialize",
        deserialize_with = "de_decimal"
    )]
    pub total_pnl: Option<Decimal>,
}

/// Totals arrive as decimal strings, but numbers are tolerated the same way entry
/// fields are.
fn de_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let field = DecimalField::deserialize(deserializer)?;
    match field.value() {
        Some(value) => Ok(Some(value)),
        None if field.raw().is_empty() || field.exceeds_precision() => Ok(None),
        None => Err(serde::de::Error::custom(format!(
            "invalid decimal '{}'",
            field.raw()
        ))),
    }
}

/// The API reports "no top performer" as an empty string
fn de_wallet<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.filter(|wallet| !wallet.is_empty()))
}

/// Derive [`Stats`] from `entries`.
///
/// A field that does not parse is left out of the metric it feeds and nothing
/// else. Sums are exact or absent: a field beyond `Decimal` precision, or an
/// overflowing sum, withholds that metric rather than report a partial one.
pub fn aggregate(entries: &[LeaderboardEntry]) -> Stats {
    let mut volume = ExactSum::new("volume");
    let mut pnl = ExactSum::new("pnl");
    let mut roi = ExactSum::new("roi");
    let mut top: Option<(Decimal, &str)> = None;

    for entry in entries {
        volume.add(&entry.volume, &entry.wallet);
        pnl.add(&entry.pnl, &entry.wallet);
        roi.add(&entry.roi, &entry.wallet);

        if let Some(value) = entry.roi.value() {
            let better = match top {
                None => true,
                Some((best, wallet)) => match value.cmp(&best) {
                    Ordering::Greater => true,
                    Ordering::Equal => entry.wallet.as_str() < wallet,
                    Ordering::Less => false,
                },
            };
            if better {
                top = Some((value, &entry.wallet));
            }
        }
    }

    // A roi too large to hold may be the best one
    let top_performer = if roi.unrepresentable {
        None
    } else {
        top.map(|(_, wallet)| wallet.to_string())
    };

    Stats {
        total_traders: entries.len(),
        total_volume: volume.total(),
        average_roi: roi.mean(),
        top_performer,
        total_pnl: pnl.total(),
    }
}

/// Exact running sum of one entry field
struct ExactSum {
    field: &'static str,
    sum: Decimal,
    count: u32,
    /// Some present value could not be parsed without rounding
    unrepresentable: bool,
    overflowed: bool,
}

impl ExactSum {
    fn new(field: &'static str) -> Self {
        Self {
            field,
            sum: Decimal::ZERO,
            count: 0,
            unrepresentable: false,
            overflowed: false,
        }
    }

    fn add(&mut self, value: &DecimalField, wallet: &str) {
        if value.exceeds_precision() {
            if !self.unrepresentable {
                warn!(
                    field = self.field,
                    wallet,
                    raw = value.raw(),
                    "value exceeds decimal precision, total withheld"
                );
            }
            self.unrepresentable = true;
            return;
        }

        let Some(addend) = value.value() else {
            return;
        };
        if self.overflowed {
            return;
        }
        match self.sum.checked_add(addend) {
            Some(sum) => {
                self.sum = sum;
                self.count += 1;
            }
            None => {
                warn!(
                    field = self.field,
                    wallet,
                    "decimal overflow while aggregating, total withheld"
                );
                self.overflowed = true;
            }
        }
    }

    fn total(&self) -> Option<Decimal> {
        (!self.unrepresentable && !self.overflowed).then_some(self.sum)
    }

    /// Mean over the values that parsed, zero when none did
    fn mean(&self) -> Option<Decimal> {
        let sum = self.total()?;
        if self.count == 0 {
            return Some(Decimal::ZERO);
        }
        sum.checked_div(Decimal::from(self.count))
    }
}

/// Roi band of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PerformanceBucket {
    /// roi > 50
    High,
    /// 10 <= roi <= 50
    Medium,
    /// 0 <= roi < 10
    Low,
    /// roi < 0
    Negative,
}

impl PerformanceBucket {
    pub const ALL: [PerformanceBucket; 4] = [
        PerformanceBucket::High,
        PerformanceBucket::Medium,
        PerformanceBucket::Low,
        PerformanceBucket::Negative,
    ];

    pub fn classify(roi: Decimal) -> Self {
        if roi > Decimal::from(50) {
            PerformanceBucket::High
        } else if roi >= Decimal::from(10) {
            PerformanceBucket::Medium
        } else if roi >= Decimal::ZERO {
            PerformanceBucket::Low
        } else {
            PerformanceBucket::Negative
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PerformanceBucket::High => "High (>50%)",
            PerformanceBucket::Medium => "Medium (10-50%)",
            PerformanceBucket::Low => "Low (0-10%)",
            PerformanceBucket::Negative => "Negative",
        }
    }
}

impl fmt::Display for PerformanceBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Count of entries per [`PerformanceBucket`], in [`PerformanceBucket::ALL`]
/// order. Entries without a parseable roi are not counted.
pub fn performance_distribution(entries: &[LeaderboardEntry]) -> Vec<(PerformanceBucket, usize)> {
    let mut counts = [0usize; 4];
    for roi in entries.iter().filter_map(|entry| entry.roi.value()) {
        counts[PerformanceBucket::classify(roi) as usize] += 1;
    }

    PerformanceBucket::ALL.into_iter().zip(counts).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn entry(wallet: &str, volume: &str, pnl: &str, roi: &str) -> LeaderboardEntry {
        serde_json::from_value(serde_json::json!({
            "wallet": wallet,
            "accountValue": "1000",
            "pnl": pnl,
            "roi": roi,
            "volume": volume,
            "rank": 1,
            "lastUpdated": "2024-05-01T12:00:00Z"
        }))
        .unwrap()
    }

    #[test]
    fn test_aggregate_exact_totals() {
        let entries = vec![
            entry("0xA", "1000000", "100.10", "10"),
            entry("0xB", "2000000.50", "-0.10", "20"),
        ];

        let stats = aggregate(&entries);
        assert_eq!(stats.total_traders, 2);
        assert_eq!(stats.total_volume, Some(dec!(3000000.50)));
        assert_eq!(stats.total_pnl, Some(dec!(100.00)));
        assert_eq!(stats.average_roi, Some(dec!(15)));
        assert_eq!(stats.top_performer.as_deref(), Some("0xB"));
    }

    #[test]
    fn test_aggregate_empty() {
        let stats = aggregate(&[]);
        assert_eq!(stats.total_traders, 0);
        assert_eq!(stats.total_volume, Some(Decimal::ZERO));
        assert_eq!(stats.total_pnl, Some(Decimal::ZERO));
        assert_eq!(stats.average_roi, Some(Decimal::ZERO));
        assert_eq!(stats.top_performer, None);
    }

    #[test]
    fn test_aggregate_skips_unparseable_fields_only() {
        let entries = vec![
            entry("0xA", "n/a", "5", "abc"),
            entry("0xB", "10", "bad", "30"),
        ];

        let stats = aggregate(&entries);
        assert_eq!(stats.total_traders, 2);
        assert_eq!(stats.total_volume, Some(dec!(10)));
        assert_eq!(stats.total_pnl, Some(dec!(5)));
        // Mean over parseable rois only
        assert_eq!(stats.average_roi, Some(dec!(30)));
        assert_eq!(stats.top_performer.as_deref(), Some("0xB"));
    }

    #[test]
    fn test_top_performer_tie_breaks_on_wallet() {
        let entries = vec![
            entry("0xC", "1", "1", "50"),
            entry("0xA", "1", "1", "50.0"),
            entry("0xB", "1", "1", "49"),
        ];

        assert_eq!(aggregate(&entries).top_performer.as_deref(), Some("0xA"));
    }

    #[test]
    fn test_stats_wire_shape() {
        let stats = Stats {
            total_traders: 2,
            total_volume: Some(dec!(3000000.50)),
            average_roi: Some(dec!(12.5)),
            top_performer: Some("0xB".to_string()),
            total_pnl: Some(dec!(-4.25)),
        };

        let value = serde_json::to_value(&stats).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "totalTraders": 2,
                "totalVolume": "3000000.50",
                "averageROI": 12.5,
                "topPerformer": "0xB",
                "totalPnl": "-4.25"
            })
        );
    }

    #[test]
    fn test_stats_deserialise_api_body() {
        let input = r#"{
            "totalTraders": 150,
            "totalVolume": "98765.43",
            "averageROI": 7,
            "topPerformer": "",
            "totalPnl": 12
        }"#;

        let stats: Stats = serde_json::from_str(input).unwrap();
        assert_eq!(stats.total_traders, 150);
        assert_eq!(stats.total_volume, Some(dec!(98765.43)));
        assert_eq!(stats.average_roi, Some(dec!(7)));
        assert_eq!(stats.top_performer, None);
        assert_eq!(stats.total_pnl, Some(dec!(12)));
    }

    #[test]
    fn test_stats_withheld_metrics_round_trip_as_null() {
        let stats = Stats {
            total_traders: 1,
            total_volume: None,
            average_roi: None,
            top_performer: None,
            total_pnl: Some(dec!(1)),
        };

        let value = serde_json::to_value(&stats).unwrap();
        assert_eq!(value["totalVolume"], serde_json::Value::Null);
        assert_eq!(value["averageROI"], serde_json::Value::Null);
        assert_eq!(serde_json::from_value::<Stats>(value).unwrap(), stats);
    }

    #[test]
    fn test_aggregate_never_reports_a_partial_sum() {
        struct TestCase {
            volumes: Vec<&'static str>,
            expected: Option<Decimal>,
        }

        let tests = vec![
            TestCase {
                // TC0: the running sum passes 7.9e28
                volumes: vec![
                    "50000000000000000000000000000",
                    "50000000000000000000000000000",
                    "1",
                ],
                expected: None,
            },
            TestCase {
                // TC1: overflow before a negative addend would bring it back in range
                volumes: vec![
                    "79228162514264337593543950335",
                    "1",
                    "-79228162514264337593543950335",
                ],
                expected: None,
            },
            TestCase {
                // TC2: one value beyond the 96-bit range
                volumes: vec!["1", "100000000000000000000000000000"],
                expected: None,
            },
            TestCase {
                // TC3: thirty significant digits cannot be summed exactly
                volumes: vec!["1", "123456789012.123456789012345678"],
                expected: None,
            },
            TestCase {
                // TC4: large but exact
                volumes: vec!["39614081257132168796771975167", "39614081257132168796771975168"],
                expected: Some(Decimal::MAX),
            },
            TestCase {
                // TC5: malformed text is excluded, not a reason to withhold
                volumes: vec!["1.5", "n/a", "2"],
                expected: Some(dec!(3.5)),
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let entries: Vec<LeaderboardEntry> = test
                .volumes
                .iter()
                .enumerate()
                .map(|(i, volume)| entry(&format!("0x{i}"), volume, "1", "1"))
                .collect();

            let stats = aggregate(&entries);
            assert_eq!(stats.total_volume, test.expected, "TC{} failed", index);
            assert_eq!(
                stats.total_pnl,
                Some(Decimal::from(entries.len())),
                "TC{} pnl failed",
                index
            );
        }
    }

    #[test]
    fn test_unrepresentable_roi_withholds_roi_metrics() {
        let entries = vec![
            entry("0xA", "1", "1", "12.5"),
            entry("0xB", "1", "1", "1e40"),
        ];

        let stats = aggregate(&entries);
        assert_eq!(stats.average_roi, None);
        assert_eq!(stats.top_performer, None);
        assert_eq!(stats.total_volume, Some(dec!(2)));
    }

    #[test]
    fn test_performance_distribution() {
        let entries = vec![
            entry("0xA", "1", "1", "75"),
            entry("0xB", "1", "1", "50"),
            entry("0xC", "1", "1", "10"),
            entry("0xD", "1", "1", "9.99"),
            entry("0xE", "1", "1", "0"),
            entry("0xF", "1", "1", "-3"),
            entry("0xG", "1", "1", "?"),
        ];

        assert_eq!(
            performance_distribution(&entries),
            vec![
                (PerformanceBucket::High, 1),
                (PerformanceBucket::Medium, 2),
                (PerformanceBucket::Low, 2),
                (PerformanceBucket::Negative, 1),
            ]
        );
    }
}
