use crate::shared::types::{LeaderboardEntry, SortKey, SortOrder};
use std::cmp::Ordering;

/// Sorted, optionally filtered copy of `entries`.
///
/// A non-empty `search` keeps only wallets containing it, ignoring case. Entries
/// are then ordered by `sort_key` in `sort_order`; entries whose key does not parse
/// go last whatever the order, and ties always fall back to ascending wallet so the
/// output is fully deterministic.
pub fn view(
    entries: &[LeaderboardEntry],
    sort_key: SortKey,
    sort_order: SortOrder,
    search: &str,
) -> Vec<LeaderboardEntry> {
    let needle = search.trim().to_lowercase();

    let mut view: Vec<LeaderboardEntry> = entries
        .iter()
        .filter(|entry| needle.is_empty() || entry.wallet.to_lowercase().contains(&needle))
        .cloned()
        .collect();

    view.sort_by(|a, b| compare(a, b, sort_key, sort_order));
    view
}

fn compare(
    a: &LeaderboardEntry,
    b: &LeaderboardEntry,
    sort_key: SortKey,
    sort_order: SortOrder,
) -> Ordering {
    let by_key = match (sort_key.value_of(a), sort_key.value_of(b)) {
        (Some(a), Some(b)) => match sort_order {
            SortOrder::Asc => a.cmp(&b),
            SortOrder::Desc => b.cmp(&a),
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };

    by_key.then_with(|| a.wallet.cmp(&b.wallet))
}

/// First entry whose wallet contains `query`, ignoring case.
pub fn find_trader<'a>(
    entries: &'a [LeaderboardEntry],
    query: &str,
) -> Option<&'a LeaderboardEntry> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }

    entries
        .iter()
        .find(|entry| entry.wallet.to_lowercase().contains(&needle))
}
