use std::sync::LazyLock;

use regex::Regex;
use tracing::info;

use super::types::PriceTarget;

/// Smallest deposit share a plan may use. Checked by the caller, not by `deposit_calculator`.
pub const MIN_DEPOSIT_PERCENT: f64 = 0.10;
pub const DEFAULT_DEPOSIT_PERCENT: f64 = 0.10;

static POSTCODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Z]{1,2}[0-9][A-Z0-9]?)(?:\s*[0-9][A-Z]{2})?$").expect("valid postcode regex")
});

/// Targets one fifth of the way up the price range rather than the midpoint.
pub fn deposit_calculator(min_price: f64, max_price: f64, deposit_percent: f64) -> PriceTarget {
    let house_price = (min_price + (max_price - min_price) / 5.0).ceil();
    let deposit_amount = (house_price * deposit_percent).ceil();
    info!(
        min_price,
        max_price, deposit_percent, house_price, deposit_amount, "calculated deposit"
    );
    PriceTarget {
        deposit_amount,
        house_price,
    }
}

pub fn validate_deposit_percent(deposit_percent: f64) -> Result<(), String> {
    if !deposit_percent.is_finite() || deposit_percent > 1.0 {
        return Err("deposit_percent must be a fraction no greater than 1".to_string());
    }
    if deposit_percent < MIN_DEPOSIT_PERCENT {
        return Err(format!(
            "deposit_percent must be at least {MIN_DEPOSIT_PERCENT}, got {deposit_percent}"
        ));
    }
    Ok(())
}

/// Outward code of a UK postcode, e.g. "hp12 4ab" -> "HP12". Accepts a bare outcode too.
pub fn outcode(postcode: &str) -> Option<String> {
    let normalized = postcode.trim().to_ascii_uppercase();
    POSTCODE
        .captures(&normalized)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
