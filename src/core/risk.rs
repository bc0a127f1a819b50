use tracing::info;

use super::types::{RiskBand, RiskProfile};

/// First matching rule wins. The band 2 rule repeats band 1's horizon and stability
/// tests, so only `loss_reaction == 2` can reach it.
pub fn risk_classification(
    income_stability: u32,
    time_horizon_years: u32,
    loss_reaction: u32,
) -> RiskProfile {
    let band = if loss_reaction == 1 || time_horizon_years <= 3 || income_stability <= 2 {
        RiskBand::NoRisk
    } else if loss_reaction == 2 || time_horizon_years <= 3 || income_stability <= 2 {
        RiskBand::Low
    } else if loss_reaction >= 4 || time_horizon_years >= 7 || income_stability >= 3 {
        RiskBand::High
    } else {
        RiskBand::Moderate
    };

    info!(
        income_stability,
        time_horizon_years,
        loss_reaction,
        risk_band = band as u8,
        "classified risk profile"
    );

    RiskProfile {
        risk_band: band,
        risk_band_text: band.text().to_string(),
        max_equity_share: band.max_equity_share(),
    }
}
