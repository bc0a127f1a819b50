mod affordability;
mod config;
mod deposit;
mod engine;
mod error;
mod risk;
mod solver;
mod types;
mod workflow;

pub use affordability::{
    REQUIRED_COLUMNS, aggregate_by_month, analyze_statement, estimate_affordability,
    estimate_affordability_with_config, parse_transactions,
};
pub use config::PlannerConfig;
pub use deposit::{
    DEFAULT_DEPOSIT_PERCENT, MIN_DEPOSIT_PERCENT, deposit_calculator, outcode,
    validate_deposit_percent,
};
pub use engine::{
    GrowthProjection, annuity_future_value, classify_likelihood, feasibility_calculator,
    feasibility_calculator_with_config, monthly_rate, project_growth,
};
pub use error::{AnalysisError, WorkflowError};
pub use risk::risk_classification;
pub use solver::{months_to_target, years_to_target};
pub use types::{
    AffordabilityResult, CapacityState, Direction, FeasibilityInput, FeasibilityResult,
    HousingGoalState, Likelihood, MonthlyAggregate, PlanOutput, PriceTarget, PropertyPrice,
    RiskBand, RiskProfile, RiskProfileInput, RiskProfileOutput, SessionState, Stage, StageOutput,
    Status, Transaction, WorkflowState,
};
pub use workflow::{merge_stage_output, parse_stage_output, strip_code_fences, workflow_state};
