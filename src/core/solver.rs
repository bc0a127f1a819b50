use tracing::debug;

const RATE_EPSILON: f64 = 1e-12;

/// Months of saving `monthly_saving` at `monthly_rate` needed to reach `target`,
/// solving the annuity future-value equation for n.
///
/// Returns `Some(0)` for a non-positive target and `None` when the saving cannot
/// grow towards a positive target (zero, negative or non-finite contributions).
pub fn months_to_target(monthly_saving: f64, target: f64, monthly_rate: f64) -> Option<f64> {
    if target <= 0.0 {
        return Some(0.0);
    }
    if !monthly_saving.is_finite() || monthly_saving <= 0.0 || !monthly_rate.is_finite() {
        debug!(monthly_saving, target, "years-to-target undefined for non-positive saving");
        return None;
    }
    if monthly_rate.abs() <= RATE_EPSILON {
        return Some(target / monthly_saving);
    }

    let growth = 1.0 + target * monthly_rate / monthly_saving;
    if growth <= 0.0 {
        // A negative rate whose drag outpaces contributions never reaches the target.
        return None;
    }
    let months = growth.ln() / (1.0 + monthly_rate).ln();
    months.is_finite().then_some(months)
}

/// `None` also covers horizons too long to count in whole years.
pub fn years_to_target(monthly_saving: f64, target: f64, monthly_rate: f64) -> Option<u32> {
    let years = (months_to_target(monthly_saving, target, monthly_rate)? / 12.0).ceil();
    if years > f64::from(u32::MAX) {
        debug!(years, "years-to-target out of range");
        return None;
    }
    Some(years as u32)
}
