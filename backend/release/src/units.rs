//! Fixed-point token amounts.
//!
//! Balances travel as integers in the token's smallest unit (USDC uses 6
//! decimals). Human amounts such as `"11"` or `"0.5"` are only converted at
//! the edges, and never through floating point.

use alloy_primitives::U256;

/// Convert a decimal string into the smallest unit, e.g. `"11"` → `11_000_000`
/// for 6 decimals. More fractional digits than `decimals` is an error.
pub fn parse_units(amount: &str, decimals: u8) -> Result<U256, String> {
    let amount = amount.trim();
    if amount.is_empty() {
        return Err("empty amount".to_string());
    }

    let (whole, frac) = match amount.split_once('.') {
        Some((w, f)) => (w, f),
        None => (amount, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(format!("not a number: {amount}"));
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(format!("not a number: {amount}"));
    }
    if frac.len() > decimals as usize {
        return Err(format!("more than {decimals} decimal places: {amount}"));
    }

    let digits = format!("{whole}{frac:0<width$}", width = decimals as usize);
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(digits, 10).map_err(|e| format!("amount out of range: {e}"))
}

/// Render a smallest-unit amount with exactly `display_decimals` fractional
/// digits (truncated, never rounded up).
pub fn format_units(value: U256, decimals: u8, display_decimals: u8) -> String {
    let scale = U256::from(10u64).pow(U256::from(decimals));
    let whole = value / scale;
    let frac = value % scale;

    if display_decimals == 0 {
        return whole.to_string();
    }

    let frac = format!("{:0>width$}", frac.to_string(), width = decimals as usize);
    let shown = display_decimals.min(decimals) as usize;
    let mut frac: String = frac.chars().take(shown).collect();
    while frac.len() < display_decimals as usize {
        frac.push('0');
    }
    format!("{whole}.{frac}")
}
