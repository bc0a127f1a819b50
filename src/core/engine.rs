use tracing::{debug, info};

use super::affordability::round_currency;
use super::config::PlannerConfig;
use super::solver::years_to_target;
use super::types::{FeasibilityInput, FeasibilityResult, Likelihood, RiskBand, Status};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrowthProjection {
    pub nominal: f64,
    pub base: f64,
    pub low: f64,
    pub moderate: f64,
    pub high: f64,
}

impl GrowthProjection {
    pub fn bracket(&self, band: RiskBand) -> (f64, f64) {
        match band {
            RiskBand::NoRisk => (self.nominal, self.base),
            RiskBand::Low => (self.base, self.low),
            RiskBand::Moderate => (self.low, self.moderate),
            RiskBand::High => (self.moderate, self.high),
        }
    }
}

pub fn monthly_rate(annual_rate: f64) -> f64 {
    (1.0 + annual_rate).powf(1.0 / 12.0) - 1.0
}

pub fn annuity_future_value(monthly_payment: f64, monthly_rate: f64, months: u32) -> f64 {
    let n = f64::from(months);
    if monthly_rate.abs() <= 1e-12 {
        return monthly_payment * n;
    }
    monthly_payment * ((1.0 + monthly_rate).powf(n) - 1.0) / monthly_rate
}

pub fn project_growth(
    monthly_payment: f64,
    time_horizon_years: u32,
    config: &PlannerConfig,
) -> GrowthProjection {
    let months = time_horizon_years.saturating_mul(12);
    let fv = |annual: f64| annuity_future_value(monthly_payment, monthly_rate(annual), months);
    GrowthProjection {
        nominal: monthly_payment * f64::from(months),
        base: fv(config.base_growth_rate),
        low: fv(config.low_growth_rate),
        moderate: fv(config.moderate_growth_rate),
        high: fv(config.high_growth_rate),
    }
}

pub fn classify_likelihood(deposit_target: f64, min_value: f64, high_value: f64) -> Likelihood {
    if deposit_target <= 0.0 || deposit_target <= min_value {
        Likelihood::Feasible
    } else if high_value < deposit_target {
        Likelihood::Infeasible
    } else {
        Likelihood::Tight
    }
}

pub fn feasibility_calculator(input: &FeasibilityInput) -> FeasibilityResult {
    feasibility_calculator_with_config(input, &PlannerConfig::default())
}

pub fn feasibility_calculator_with_config(
    input: &FeasibilityInput,
    config: &PlannerConfig,
) -> FeasibilityResult {
    info!(
        available_investment = input.available_investment,
        deposit_target = input.deposit_target,
        risk_band = input.risk_band as u8,
        time_horizon_years = input.time_horizon_years,
        "starting feasibility calculation"
    );

    let projection = project_growth(input.available_investment, input.time_horizon_years, config);
    debug!(
        base = projection.base,
        low = projection.low,
        moderate = projection.moderate,
        high = projection.high,
        "projected values"
    );

    let (min_value, max_value) = projection.bracket(input.risk_band);
    let years_to_target = years_to_target(
        input.available_investment,
        input.deposit_target,
        monthly_rate(config.growth_rate(input.risk_band)),
    );
    let likelihood = classify_likelihood(input.deposit_target, min_value, projection.high);
    info!(min_value, max_value, ?likelihood, ?years_to_target, "feasibility calculation complete");

    FeasibilityResult {
        status: Status::Success,
        min_final_value: round_currency(min_value),
        max_final_value: round_currency(max_value),
        likelihood,
        years_to_target,
        user_input: input.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{prop_assert, prop_assert_eq, proptest};

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn sample_input() -> FeasibilityInput {
        FeasibilityInput {
            available_investment: 500.0,
            deposit_target: 22_000.0,
            risk_band: RiskBand::Moderate,
            time_horizon_years: 5,
        }
    }

    #[test]
    fn monthly_rate_compounds_back_to_annual() {
        let r = monthly_rate(0.06);
        assert_approx((1.0 + r).powi(12) - 1.0, 0.06);
    }

    #[test]
    fn annuity_matches_closed_form() {
        let r = monthly_rate(0.04);
        let expected = 200.0 * ((1.0 + r).powf(24.0) - 1.0) / r;
        assert_approx(annuity_future_value(200.0, r, 24), expected);
        assert_approx(annuity_future_value(200.0, 0.0, 24), 4_800.0);
    }

    #[test]
    fn band_one_floor_is_total_paid_in() {
        let input = FeasibilityInput {
            risk_band: RiskBand::NoRisk,
            ..sample_input()
        };
        let result = feasibility_calculator(&input);
        assert_eq!(result.min_final_value, 30_000);
        let base = project_growth(500.0, 5, &PlannerConfig::default()).base;
        assert_eq!(result.max_final_value, round_currency(base));
        assert_eq!(result.likelihood, Likelihood::Feasible);
    }

    #[test]
    fn moderate_band_uses_low_to_moderate_bracket() {
        let projection = project_growth(500.0, 5, &PlannerConfig::default());
        let result = feasibility_calculator(&sample_input());
        assert_eq!(result.status, Status::Success);
        assert_eq!(result.min_final_value, round_currency(projection.low));
        assert_eq!(result.max_final_value, round_currency(projection.moderate));
        assert_eq!(result.user_input, sample_input());
        assert_eq!(result.years_to_target, Some(4));
    }

    #[test]
    fn years_to_target_uses_the_band_growth_rate() {
        let input = |risk_band| FeasibilityInput {
            deposit_target: 19_000.0,
            risk_band,
            ..sample_input()
        };

        // 36 months reach ~18,800 at 3% but ~20,200 at 8%.
        let no_risk = feasibility_calculator(&input(RiskBand::NoRisk));
        assert_eq!(no_risk.years_to_target, Some(4));
        assert_eq!(
            no_risk.years_to_target,
            years_to_target(500.0, 19_000.0, monthly_rate(0.03))
        );

        let high = feasibility_calculator(&input(RiskBand::High));
        assert_eq!(high.years_to_target, Some(3));
        assert_eq!(
            high.years_to_target,
            years_to_target(500.0, 19_000.0, monthly_rate(0.08))
        );
    }

    #[test]
    fn likelihood_distinguishes_tight_from_infeasible() {
        let mut input = sample_input();
        let projection = project_growth(500.0, 5, &PlannerConfig::default());

        input.deposit_target = (projection.low + projection.high) / 2.0;
        assert_eq!(feasibility_calculator(&input).likelihood, Likelihood::Tight);

        input.deposit_target = projection.high + 1.0;
        assert_eq!(feasibility_calculator(&input).likelihood, Likelihood::Infeasible);
    }

    #[test]
    fn zero_investment_reports_sentinel_instead_of_failing() {
        let input = FeasibilityInput {
            available_investment: 0.0,
            ..sample_input()
        };
        let result = feasibility_calculator(&input);
        assert_eq!(result.years_to_target, None);
        assert_eq!(result.likelihood, Likelihood::Infeasible);
        assert_eq!(result.min_final_value, 0);

        let json = serde_json::to_value(&result).expect("serializes");
        assert!(json["years_to_target"].is_null());
    }

    #[test]
    fn result_serializes_contract_fields() {
        let json = serde_json::to_value(feasibility_calculator(&sample_input())).expect("serializes");
        for key in [
            "status",
            "min_final_value",
            "max_final_value",
            "likelihood",
            "years_to_target",
            "user_input",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        assert_eq!(json["likelihood"], "feasible");
        assert_eq!(json["user_input"]["risk_band"], 3);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_bracket_rises_with_risk_band(
            investment in 0u32..5_000,
            years in 1u32..30
        ) {
            let projection = project_growth(f64::from(investment), years, &PlannerConfig::default());
            let mut previous = (f64::MIN, f64::MIN);
            for band in RiskBand::ALL {
                let (min_value, max_value) = projection.bracket(band);
                prop_assert!(min_value <= max_value + EPS);
                prop_assert!(min_value + EPS >= previous.0);
                prop_assert!(max_value + EPS >= previous.1);
                previous = (min_value, max_value);
            }
        }

        #[test]
        fn prop_zero_deposit_target_is_always_feasible(
            investment in -2_000i32..5_000,
            years in 0u32..30,
            band in 1u8..5
        ) {
            let input = FeasibilityInput {
                available_investment: f64::from(investment),
                deposit_target: 0.0,
                risk_band: RiskBand::try_from(band).expect("band in range"),
                time_horizon_years: years,
            };
            let result = feasibility_calculator(&input);
            prop_assert_eq!(result.likelihood, Likelihood::Feasible);
            prop_assert_eq!(result.years_to_target, Some(0));
        }
    }
}
