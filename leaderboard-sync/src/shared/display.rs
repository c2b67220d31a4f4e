use rust_decimal::{Decimal, RoundingStrategy};

/// Shorten a wallet address to `0x1234...abcd`. Addresses too short to shorten
/// are returned unchanged.
pub fn format_wallet(wallet: &str) -> String {
    let chars: Vec<char> = wallet.chars().collect();
    if chars.len() <= 10 {
        return wallet.to_string();
    }

    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

/// Compact dollar amount with two decimals: `$1.50M`, `$2.00K`, `$12.34`.
pub fn format_currency(value: Decimal) -> String {
    let million = Decimal::from(1_000_000);
    let thousand = Decimal::from(1_000);

    let sign = if value.is_sign_negative() && !value.is_zero() {
        "-"
    } else {
        ""
    };
    let abs = value.abs();

    let (scaled, suffix) = if abs >= million {
        (abs / million, "M")
    } else if abs >= thousand {
        (abs / thousand, "K")
    } else {
        (abs, "")
    };

    let mut rounded = scaled.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    format!("{sign}${rounded}{suffix}")
}
