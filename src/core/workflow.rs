use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use super::error::WorkflowError;
use super::types::{
    CapacityState, FeasibilityInput, FeasibilityResult, HousingGoalState, PlanOutput,
    RiskProfileOutput, SessionState, Stage, StageOutput, Status, WorkflowState,
};

static LEADING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*```(?:json|JSON)?\s*").expect("valid fence regex"));
static TRAILING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*```\s*$").expect("valid fence regex"));

const HOUSING_ENTRY_FIELDS: [&str; 2] = ["postcode", "property_type"];

/// Recommends what the caller should pursue next. Reads `state` only; a missing
/// session is treated as a fresh one.
pub fn workflow_state(state: Option<&SessionState>) -> WorkflowState {
    let raw_stage = state.and_then(|s| s.stage.as_deref());
    let stage = match raw_stage {
        None => Stage::Start,
        Some(name) => match Stage::from_name(name) {
            Some(stage) => stage,
            None => {
                warn!(stage = name, "unrecognized workflow stage");
                return WorkflowState {
                    current_stage: name.to_string(),
                    next_stage_to_address: None,
                    data_items_required_to_complete: Vec::new(),
                    notes: Some(format!("Unrecognized stage {name:?}; no transition computed")),
                };
            }
        },
    };

    let fresh = SessionState::default();
    let session = state.unwrap_or(&fresh);
    let result = match stage {
        Stage::Start => WorkflowState {
            current_stage: Stage::Housing.as_str().to_string(),
            next_stage_to_address: Some(Stage::Housing.as_str().to_string()),
            data_items_required_to_complete: HOUSING_ENTRY_FIELDS.map(String::from).to_vec(),
            notes: Some("Get the initial data for the housing goal".to_string()),
        },
        Stage::Housing => housing_transition(session.housing_goal.as_ref()),
        Stage::Capacity => binary_transition(
            stage,
            "bank_capacity",
            session.bank_capacity.as_ref().map(|c| c.status) == Some(Status::Success),
        ),
        Stage::Risk => binary_transition(
            stage,
            "risk_profile",
            session.risk_profile.as_ref().map(|r| r.status) == Some(Status::Success),
        ),
        Stage::Planning => binary_transition(stage, "final_plan", session.final_plan.is_some()),
        Stage::Done => WorkflowState {
            current_stage: Stage::Done.as_str().to_string(),
            next_stage_to_address: Some(Stage::Done.as_str().to_string()),
            data_items_required_to_complete: Vec::new(),
            notes: Some("Plan is complete".to_string()),
        },
    };

    info!(
        current_stage = %result.current_stage,
        next_stage = ?result.next_stage_to_address,
        missing = ?result.data_items_required_to_complete,
        "computed workflow state"
    );
    result
}

fn housing_transition(goal: Option<&HousingGoalState>) -> WorkflowState {
    let current = Stage::Housing.as_str().to_string();
    let stay = Some(current.clone());

    if let Some(goal) = goal.filter(|g| g.status == Status::AwaitingConfirmation) {
        debug!(postcode = ?goal.postcode, "housing goal awaiting confirmation");
        return WorkflowState {
            current_stage: current,
            next_stage_to_address: stay,
            data_items_required_to_complete: Vec::new(),
            notes: Some("Keep in current state until human confirmation is received".to_string()),
        };
    }

    let missing: Vec<String> = match goal {
        None => ["postcode", "property_type", "house_price", "deposit_target"]
            .map(String::from)
            .to_vec(),
        Some(goal) => [
            ("postcode", goal.postcode.is_none()),
            ("property_type", goal.property_type.is_none()),
            ("house_price", goal.house_price.is_none()),
            ("deposit_target", goal.deposit_target.is_none()),
        ]
        .into_iter()
        .filter(|(_, absent)| *absent)
        .map(|(name, _)| name.to_string())
        .collect(),
    };
    let succeeded = goal.is_some_and(|g| g.status == Status::Success);

    if succeeded && missing.is_empty() {
        return WorkflowState {
            current_stage: current,
            next_stage_to_address: Some(Stage::Capacity.as_str().to_string()),
            data_items_required_to_complete: missing,
            notes: Some("Housing step is complete. Can proceed to next stage.".to_string()),
        };
    }

    let notes = match goal.and_then(|g| g.error_message.as_deref()) {
        Some(reason) if !succeeded => format!("Housing goal reported an error: {reason}"),
        _ if !succeeded => "Housing goal has not completed successfully".to_string(),
        _ => "Housing is missing some required data".to_string(),
    };
    WorkflowState {
        current_stage: current,
        next_stage_to_address: stay,
        data_items_required_to_complete: missing,
        notes: Some(notes),
    }
}

fn binary_transition(stage: Stage, result_name: &str, complete: bool) -> WorkflowState {
    let (next, required, notes) = if complete {
        (
            stage.next(),
            Vec::new(),
            format!("{} step is complete", capitalize(stage.as_str())),
        )
    } else {
        (
            stage,
            vec![result_name.to_string()],
            format!("Waiting for a successful {result_name} result"),
        )
    };
    WorkflowState {
        current_stage: stage.as_str().to_string(),
        next_stage_to_address: Some(next.as_str().to_string()),
        data_items_required_to_complete: required,
        notes: Some(notes),
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Removes Markdown code fences an agent may wrap around its JSON.
pub fn strip_code_fences(raw: &str) -> String {
    if raw.trim().is_empty() {
        return "{}".to_string();
    }
    let without_lead = LEADING_FENCE.replace(raw.trim(), "");
    TRAILING_FENCE.replace(&without_lead, "").into_owned()
}

/// Strictly decodes one stage's raw output into its typed result.
pub fn parse_stage_output(stage: Stage, raw: &str) -> Result<StageOutput, WorkflowError> {
    let cleaned = strip_code_fences(raw);
    match stage {
        Stage::Housing => decode::<HousingGoalState>("housing", &cleaned).map(StageOutput::Housing),
        Stage::Capacity => decode::<CapacityState>("capacity", &cleaned).map(StageOutput::Capacity),
        Stage::Risk => decode::<RiskProfileOutput>("risk", &cleaned).map(StageOutput::Risk),
        Stage::Planning => decode::<PlanOutput>("planning", &cleaned).map(StageOutput::Plan),
        Stage::Start | Stage::Done => Err(WorkflowError::NoStageOutput(stage.as_str().to_string())),
    }
}

fn decode<T: DeserializeOwned>(stage: &'static str, json: &str) -> Result<T, WorkflowError> {
    serde_json::from_str(json).map_err(|e| WorkflowError::InvalidPayload {
        stage,
        reason: e.to_string(),
    })
}

/// Returns a new session with `output` recorded and `stage` moved to the stage that
/// produced it. The input session is left untouched.
pub fn merge_stage_output(state: Option<&SessionState>, output: StageOutput) -> SessionState {
    let mut next = state.cloned().unwrap_or_default();
    let stage = output.stage();
    match output {
        StageOutput::Housing(goal) => next.housing_goal = Some(goal),
        StageOutput::Capacity(capacity) => next.bank_capacity = Some(capacity),
        StageOutput::Risk(profile) => next.risk_profile = Some(profile),
        StageOutput::Plan(plan) => next.final_plan = Some(plan),
    }
    next.stage = Some(stage.as_str().to_string());
    info!(stage = stage.as_str(), "merged stage output into session");
    next
}

impl FeasibilityInput {
    /// Gathers projector inputs from the completed housing, capacity and risk results.
    pub fn from_session(state: &SessionState) -> Result<Self, WorkflowError> {
        let housing = state
            .housing_goal
            .as_ref()
            .ok_or(WorkflowError::MissingStageResult("housing_goal"))?;
        ensure_success("housing_goal", housing.status)?;
        let deposit_target = housing.deposit_target.ok_or(WorkflowError::MissingField {
            stage: "housing_goal",
            field: "deposit_target",
        })?;

        let capacity = state
            .bank_capacity
            .as_ref()
            .ok_or(WorkflowError::MissingStageResult("bank_capacity"))?;
        ensure_success("bank_capacity", capacity.status)?;
        let suggested = capacity
            .suggested_investment
            .ok_or(WorkflowError::MissingField {
                stage: "bank_capacity",
                field: "suggested_investment",
            })?;

        let risk = state
            .risk_profile
            .as_ref()
            .ok_or(WorkflowError::MissingStageResult("risk_profile"))?;
        ensure_success("risk_profile", risk.status)?;

        Ok(Self {
            available_investment: suggested as f64,
            deposit_target,
            risk_band: risk.risk_band,
            time_horizon_years: risk.score_details.time_horizon_years,
        })
    }
}

fn ensure_success(stage: &'static str, status: Status) -> Result<(), WorkflowError> {
    if status == Status::Success {
        Ok(())
    } else {
        Err(WorkflowError::StageNotSuccessful(stage))
    }
}

impl PlanOutput {
    pub fn from_feasibility(state: &SessionState, result: &FeasibilityResult) -> Self {
        let input = &result.user_input;
        Self {
            time_horizon_years: Some(input.time_horizon_years),
            suggested_investment: Some(input.available_investment),
            risk_band: Some(input.risk_band),
            max_equity_share: Some(
                state
                    .risk_profile
                    .as_ref()
                    .map_or(input.risk_band.max_equity_share(), |r| r.max_equity_share),
            ),
        }
    }
}
