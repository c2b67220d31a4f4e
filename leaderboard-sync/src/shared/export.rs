//! CSV encoding of a leaderboard view.

use crate::shared::types::{DecimalField, LeaderboardEntry, Timeframe};
use chrono::{NaiveDate, SecondsFormat};
use std::fmt::Write;

pub const HEADER: &str = "rank,wallet,accountValue,pnl,roi,volume,lastUpdated";

/// Encode `entries` in the given order, one newline terminated row each after the
/// header row.
pub fn to_tabular(entries: &[LeaderboardEntry]) -> String {
    let mut out = String::with_capacity(HEADER.len() + 1 + entries.len() * 96);
    out.push_str(HEADER);
    out.push('\n');

    for entry in entries {
        // Writing to a String cannot fail
        let _ = writeln!(
            out,
            "{},{},{},{},{},{},{}",
            entry.rank,
            quote(&entry.wallet),
            decimal(&entry.account_value),
            decimal(&entry.pnl),
            decimal(&entry.roi),
            decimal(&entry.volume),
            entry
                .last_updated
                .to_rfc3339_opts(SecondsFormat::AutoSi, true),
        );
    }

    out
}

/// `leaderboard_<timeframe>_<YYYY-MM-DD>.csv`
pub fn export_file_name(timeframe: Timeframe, date: NaiveDate) -> String {
    format!("leaderboard_{}_{}.csv", timeframe.as_str(), date.format("%Y-%m-%d"))
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

/// Normalised decimal text, or an empty cell when the raw value never parsed.
/// Numbers too precise for `Decimal` keep their wire text so no digit is lost.
fn decimal(field: &DecimalField) -> String {
    match field.value() {
        Some(value) => value.to_string(),
        None if field.exceeds_precision() => field.raw().trim().to_string(),
        None => String::new(),
    }
}
