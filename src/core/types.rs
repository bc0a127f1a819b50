use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Credit,
    Debit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub date: NaiveDate,
    pub amount: f64,
    pub direction: Direction,
}

impl Transaction {
    pub fn new(date: NaiveDate, amount: f64, direction: Direction) -> Self {
        Self {
            date,
            amount,
            direction,
        }
    }

    pub fn is_credit(&self) -> bool {
        self.direction == Direction::Credit
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyAggregate {
    pub year: i32,
    pub month: u32,
    pub credit: f64,
    pub debit: f64,
}

impl MonthlyAggregate {
    pub fn surplus(&self) -> f64 {
        self.credit - self.debit
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Status {
    #[serde(rename = "success", alias = "ok", alias = "SUCCESS")]
    Success,
    #[serde(rename = "error", alias = "ERROR")]
    Error,
    #[serde(rename = "AWAITING_CONFIRMATION", alias = "awaiting_confirmation")]
    AwaitingConfirmation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffordabilityResult {
    pub status: Status,
    pub message: String,
    pub available_investment: i64,
    pub average_surplus: i64,
    pub median_surplus: i64,
    pub average_income: i64,
    pub median_income: i64,
    pub max_affordability: i64,
    pub is_affordable: bool,
}

impl AffordabilityResult {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            message: message.into(),
            available_investment: 0,
            average_surplus: 0,
            median_surplus: 0,
            average_income: 0,
            median_income: 0,
            max_affordability: 0,
            is_affordable: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceTarget {
    pub deposit_amount: f64,
    pub house_price: f64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
#[serde(into = "u8")]
pub enum RiskBand {
    NoRisk = 1,
    Low = 2,
    Moderate = 3,
    High = 4,
}

impl RiskBand {
    pub const ALL: [RiskBand; 4] = [
        RiskBand::NoRisk,
        RiskBand::Low,
        RiskBand::Moderate,
        RiskBand::High,
    ];

    pub fn text(self) -> &'static str {
        match self {
            RiskBand::NoRisk => "No Risk",
            RiskBand::Low => "Low Risk",
            RiskBand::Moderate => "Moderate Risk",
            RiskBand::High => "High Risk",
        }
    }

    pub fn max_equity_share(self) -> f64 {
        match self {
            RiskBand::NoRisk => 0.0,
            RiskBand::Low => 0.2,
            RiskBand::Moderate => 0.5,
            RiskBand::High => 0.7,
        }
    }
}

impl From<RiskBand> for u8 {
    fn from(value: RiskBand) -> Self {
        value as u8
    }
}

impl TryFrom<u8> for RiskBand {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(RiskBand::NoRisk),
            2 => Ok(RiskBand::Low),
            3 => Ok(RiskBand::Moderate),
            4 => Ok(RiskBand::High),
            other => Err(format!("risk_band must be between 1 and 4, got {other}")),
        }
    }
}

// Risk bands arrive as either 3 or "3" depending on which agent produced them.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawRiskBand {
    Number(u8),
    Text(String),
}

impl<'de> Deserialize<'de> for RiskBand {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let band = match RawRiskBand::deserialize(deserializer)? {
            RawRiskBand::Number(n) => RiskBand::try_from(n),
            RawRiskBand::Text(s) => s
                .trim()
                .parse::<u8>()
                .map_err(|_| format!("risk_band must be an integer, got {s:?}"))
                .and_then(RiskBand::try_from),
        };
        band.map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskProfile {
    pub risk_band: RiskBand,
    pub risk_band_text: String,
    pub max_equity_share: f64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Likelihood {
    Feasible,
    Tight,
    Infeasible,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeasibilityInput {
    pub available_investment: f64,
    pub deposit_target: f64,
    pub risk_band: RiskBand,
    pub time_horizon_years: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeasibilityResult {
    pub status: Status,
    pub min_final_value: i64,
    pub max_final_value: i64,
    pub likelihood: Likelihood,
    /// `None` when the monthly investment cannot reach a positive target.
    pub years_to_target: Option<u32>,
    pub user_input: FeasibilityInput,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Start,
    Housing,
    Capacity,
    Risk,
    Planning,
    Done,
}

impl Stage {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            "start" => Some(Stage::Start),
            "housing" => Some(Stage::Housing),
            "capacity" => Some(Stage::Capacity),
            "risk" => Some(Stage::Risk),
            "planning" => Some(Stage::Planning),
            "done" => Some(Stage::Done),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Start => "start",
            Stage::Housing => "housing",
            Stage::Capacity => "capacity",
            Stage::Risk => "risk",
            Stage::Planning => "planning",
            Stage::Done => "done",
        }
    }

    pub fn next(self) -> Self {
        match self {
            Stage::Start => Stage::Housing,
            Stage::Housing => Stage::Capacity,
            Stage::Capacity => Stage::Risk,
            Stage::Risk => Stage::Planning,
            Stage::Planning | Stage::Done => Stage::Done,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyPrice {
    #[serde(default)]
    pub post_code: Option<String>,
    #[serde(default)]
    pub property_type: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub bedrooms: Option<u32>,
    #[serde(default)]
    pub price_min: Option<f64>,
    #[serde(default)]
    pub price_max: Option<f64>,
    #[serde(default)]
    pub sources: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HousingGoalState {
    pub status: Status,
    #[serde(default)]
    pub postcode: Option<String>,
    #[serde(default)]
    pub property_type: Option<String>,
    #[serde(default)]
    pub min_price: Option<f64>,
    #[serde(default)]
    pub max_price: Option<f64>,
    #[serde(default)]
    pub house_price: Option<f64>,
    #[serde(default)]
    pub deposit_target: Option<f64>,
    #[serde(default)]
    pub price_options: Option<Vec<PropertyPrice>>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityState {
    pub status: Status,
    #[serde(default)]
    pub suggested_investment: Option<i64>,
    #[serde(default)]
    pub avg_surplus: Option<f64>,
    #[serde(default)]
    pub median_surplus: Option<f64>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskProfileInput {
    pub income_stability: u32,
    pub time_horizon_years: u32,
    pub loss_reaction: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskProfileOutput {
    pub status: Status,
    pub risk_band: RiskBand,
    pub risk_band_text: String,
    pub score_details: RiskProfileInput,
    pub profile_summary: String,
    pub max_equity_share: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanOutput {
    pub time_horizon_years: Option<u32>,
    pub suggested_investment: Option<f64>,
    pub risk_band: Option<RiskBand>,
    pub max_equity_share: Option<f64>,
}

/// Accumulated record of one planning session. The caller owns and writes it;
/// the core only reads it or returns a new copy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionState {
    /// Kept as free text so unrecognized stages can be echoed back.
    pub stage: Option<String>,
    pub housing_goal: Option<HousingGoalState>,
    pub bank_capacity: Option<CapacityState>,
    pub risk_profile: Option<RiskProfileOutput>,
    pub final_plan: Option<PlanOutput>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub current_stage: String,
    pub next_stage_to_address: Option<String>,
    pub data_items_required_to_complete: Vec<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StageOutput {
    Housing(HousingGoalState),
    Capacity(CapacityState),
    Risk(RiskProfileOutput),
    Plan(PlanOutput),
}

impl StageOutput {
    pub fn stage(&self) -> Stage {
        match self {
            StageOutput::Housing(_) => Stage::Housing,
            StageOutput::Capacity(_) => Stage::Capacity,
            StageOutput::Risk(_) => Stage::Risk,
            StageOutput::Plan(_) => Stage::Planning,
        }
    }
}
