use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::core::{
    DEFAULT_DEPOSIT_PERCENT, FeasibilityInput, PlannerConfig, RiskBand, SessionState, Stage,
    Status, deposit_calculator, estimate_affordability_with_config,
    feasibility_calculator_with_config, merge_stage_output, parse_stage_output,
    risk_classification, validate_deposit_percent, workflow_state,
};

#[derive(Parser, Debug)]
#[command(
    name = "deposit-planner",
    about = "House deposit planner: affordability, deposit target, risk band, feasibility and workflow stage"
)]
pub struct Cli {
    #[command(flatten)]
    pub planner: PlannerArgs,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone, Default)]
pub struct PlannerArgs {
    #[arg(
        long,
        global = true,
        help = "YAML config file with planner settings; flags below override it"
    )]
    config: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        help = "Annual growth rate for risk band 1 in percent [default: 3]"
    )]
    base_growth_rate: Option<f64>,
    #[arg(
        long,
        global = true,
        help = "Annual growth rate for risk band 2 in percent [default: 4]"
    )]
    low_growth_rate: Option<f64>,
    #[arg(
        long,
        global = true,
        help = "Annual growth rate for risk band 3 in percent [default: 6]"
    )]
    moderate_growth_rate: Option<f64>,
    #[arg(
        long,
        global = true,
        help = "Annual growth rate for risk band 4 in percent [default: 8]"
    )]
    high_growth_rate: Option<f64>,
    #[arg(
        long,
        global = true,
        help = "Median monthly income multiple used as the mortgage ceiling [default: 80]"
    )]
    affordability_multiplier: Option<i64>,
    #[arg(
        long,
        global = true,
        help = "Share of the median monthly surplus treated as investable, in percent [default: 80]"
    )]
    investment_haircut: Option<f64>,
    #[arg(
        long,
        global = true,
        help = "Distinct statement months required [default: 3]"
    )]
    min_history_months: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Estimate monthly surplus and mortgage affordability from a bank statement CSV.
    Affordability {
        #[arg(long)]
        statement: PathBuf,
        #[arg(long)]
        house_price: f64,
    },
    /// Pick a target house price from a price range and size the deposit.
    Deposit {
        #[arg(long)]
        min_price: f64,
        #[arg(long)]
        max_price: f64,
        #[arg(
            long,
            default_value_t = 10.0,
            help = "Deposit as a percent of the house price, at least 10"
        )]
        deposit_percent: f64,
    },
    /// Classify risk tolerance into a band and equity ceiling.
    Risk {
        #[arg(long, help = "Income stability, 1 (irregular) to 5 (very secure)")]
        income_stability: u32,
        #[arg(long)]
        time_horizon_years: u32,
        #[arg(long, help = "Reaction to a 10% loss, 1 (sell) to 5 (buy more)")]
        loss_reaction: u32,
    },
    /// Project savings growth and judge whether the deposit is reachable.
    Feasibility {
        #[arg(long)]
        available_investment: f64,
        #[arg(long)]
        deposit_target: f64,
        #[arg(long)]
        risk_band: u8,
        #[arg(long)]
        time_horizon_years: u32,
    },
    /// Report the current and next workflow stage for a session state (stdin when no file).
    Workflow {
        #[arg(long)]
        state: Option<PathBuf>,
    },
    /// Run one JSON tool request read from stdin.
    Request,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "tool", rename_all = "snake_case")]
enum ToolRequest {
    EstimateAffordability(AffordabilityPayload),
    DepositCalculator(DepositPayload),
    RiskClassification(RiskPayload),
    FeasibilityCalculator(FeasibilityPayload),
    WorkflowState(WorkflowPayload),
    MergeStageOutput(MergePayload),
}

impl ToolRequest {
    fn name(&self) -> &'static str {
        match self {
            ToolRequest::EstimateAffordability(_) => "estimate_affordability",
            ToolRequest::DepositCalculator(_) => "deposit_calculator",
            ToolRequest::RiskClassification(_) => "risk_classification",
            ToolRequest::FeasibilityCalculator(_) => "feasibility_calculator",
            ToolRequest::WorkflowState(_) => "workflow_state",
            ToolRequest::MergeStageOutput(_) => "merge_stage_output",
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AffordabilityPayload {
    file_content: Option<String>,
    house_price: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DepositPayload {
    #[serde(alias = "min_value")]
    min_price: Option<f64>,
    #[serde(alias = "max_value")]
    max_price: Option<f64>,
    deposit_percent: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RiskPayload {
    income_stability: Option<u32>,
    time_horizon_years: Option<u32>,
    loss_reaction: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FeasibilityPayload {
    available_investment: Option<f64>,
    deposit_target: Option<f64>,
    risk_band: Option<RiskBand>,
    time_horizon_years: Option<u32>,
    session: Option<SessionState>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WorkflowPayload {
    state: Option<SessionState>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MergePayload {
    state: Option<SessionState>,
    stage: Option<String>,
    output: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct DepositRequest {
    min_price: f64,
    max_price: f64,
    deposit_percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RiskRequest {
    income_stability: u32,
    time_horizon_years: u32,
    loss_reaction: u32,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: Status,
    error: String,
}

pub fn build_config(args: &PlannerArgs) -> anyhow::Result<PlannerConfig> {
    let mut config = match &args.config {
        Some(path) => PlannerConfig::load(path)?,
        None => PlannerConfig::default(),
    };
    apply_overrides(&mut config, args).map_err(anyhow::Error::msg)?;
    Ok(config)
}

fn apply_overrides(config: &mut PlannerConfig, args: &PlannerArgs) -> Result<(), String> {
    for (name, value, slot) in [
        ("--base-growth-rate", args.base_growth_rate, &mut config.base_growth_rate),
        ("--low-growth-rate", args.low_growth_rate, &mut config.low_growth_rate),
        (
            "--moderate-growth-rate",
            args.moderate_growth_rate,
            &mut config.moderate_growth_rate,
        ),
        ("--high-growth-rate", args.high_growth_rate, &mut config.high_growth_rate),
    ] {
        if let Some(pct) = value {
            if !pct.is_finite() || pct <= -100.0 {
                return Err(format!("{name} must be > -100"));
            }
            *slot = pct / 100.0;
        }
    }

    if let Some(multiplier) = args.affordability_multiplier {
        if multiplier <= 0 {
            return Err("--affordability-multiplier must be > 0".to_string());
        }
        config.affordability_multiplier = multiplier;
    }

    if let Some(pct) = args.investment_haircut {
        if !pct.is_finite() || pct <= 0.0 || pct > 100.0 {
            return Err("--investment-haircut must be between 0 (exclusive) and 100".to_string());
        }
        config.investment_haircut = pct / 100.0;
    }

    if let Some(months) = args.min_history_months {
        if months == 0 {
            return Err("--min-history-months must be > 0".to_string());
        }
        config.min_history_months = months;
    }

    config.validate()
}

fn build_deposit_request(payload: DepositPayload) -> Result<DepositRequest, String> {
    let min_price = payload.min_price.ok_or("min_price is required")?;
    let max_price = payload.max_price.ok_or("max_price is required")?;
    let deposit_percent = payload.deposit_percent.unwrap_or(DEFAULT_DEPOSIT_PERCENT);

    if !min_price.is_finite() || min_price < 0.0 {
        return Err("min_price must be >= 0".to_string());
    }
    if !max_price.is_finite() || max_price < min_price {
        return Err("max_price must be >= min_price".to_string());
    }
    validate_deposit_percent(deposit_percent)?;

    Ok(DepositRequest {
        min_price,
        max_price,
        deposit_percent,
    })
}

fn build_risk_request(payload: RiskPayload) -> Result<RiskRequest, String> {
    let income_stability = payload
        .income_stability
        .ok_or("income_stability is required")?;
    let time_horizon_years = payload
        .time_horizon_years
        .ok_or("time_horizon_years is required")?;
    let loss_reaction = payload.loss_reaction.ok_or("loss_reaction is required")?;

    if !(1..=5).contains(&income_stability) {
        return Err("income_stability must be between 1 and 5".to_string());
    }
    if time_horizon_years < 1 {
        return Err("time_horizon_years must be >= 1".to_string());
    }
    if !(1..=5).contains(&loss_reaction) {
        return Err("loss_reaction must be between 1 and 5".to_string());
    }

    Ok(RiskRequest {
        income_stability,
        time_horizon_years,
        loss_reaction,
    })
}

fn build_feasibility_input(payload: FeasibilityPayload) -> Result<FeasibilityInput, String> {
    let input = match payload.session {
        Some(session) => FeasibilityInput::from_session(&session).map_err(|e| e.to_string())?,
        None => FeasibilityInput {
            available_investment: payload
                .available_investment
                .ok_or("available_investment is required")?,
            deposit_target: payload.deposit_target.ok_or("deposit_target is required")?,
            risk_band: payload.risk_band.ok_or("risk_band is required")?,
            time_horizon_years: payload
                .time_horizon_years
                .ok_or("time_horizon_years is required")?,
        },
    };

    if !input.available_investment.is_finite() {
        return Err("available_investment must be a finite number".to_string());
    }
    if !input.deposit_target.is_finite() || input.deposit_target < 0.0 {
        return Err("deposit_target must be >= 0".to_string());
    }
    Ok(input)
}

fn dispatch(request: ToolRequest, config: &PlannerConfig) -> Result<Value, String> {
    match request {
        ToolRequest::EstimateAffordability(payload) => {
            let file_content = payload.file_content.ok_or("file_content is required")?;
            let house_price = payload.house_price.ok_or("house_price is required")?;
            if !house_price.is_finite() || house_price < 0.0 {
                return Err("house_price must be >= 0".to_string());
            }
            to_json(&estimate_affordability_with_config(
                &file_content,
                house_price,
                config,
            ))
        }
        ToolRequest::DepositCalculator(payload) => {
            let req = build_deposit_request(payload)?;
            to_json(&deposit_calculator(
                req.min_price,
                req.max_price,
                req.deposit_percent,
            ))
        }
        ToolRequest::RiskClassification(payload) => {
            let req = build_risk_request(payload)?;
            to_json(&risk_classification(
                req.income_stability,
                req.time_horizon_years,
                req.loss_reaction,
            ))
        }
        ToolRequest::FeasibilityCalculator(payload) => {
            let input = build_feasibility_input(payload)?;
            to_json(&feasibility_calculator_with_config(&input, config))
        }
        ToolRequest::WorkflowState(payload) => to_json(&workflow_state(payload.state.as_ref())),
        ToolRequest::MergeStageOutput(payload) => {
            let stage_name = payload.stage.ok_or("stage is required")?;
            let stage = Stage::from_name(&stage_name)
                .ok_or_else(|| format!("unknown stage {stage_name:?}"))?;
            let raw = match payload.output.ok_or("output is required")? {
                Value::String(raw) => raw,
                other => other.to_string(),
            };
            let output = parse_stage_output(stage, &raw).map_err(|e| e.to_string())?;
            to_json(&merge_stage_output(payload.state.as_ref(), output))
        }
    }
}

pub fn handle_request(json: &str, config: &PlannerConfig) -> Result<Value, String> {
    let request = serde_json::from_str::<ToolRequest>(json)
        .map_err(|e| format!("Invalid tool request JSON: {e}"))?;
    info!(tool = request.name(), "dispatching tool request");
    dispatch(request, config)
}

/// Like [`handle_request`], but failures are rendered as a `status = "error"` payload.
pub fn handle_request_json(json: &str, config: &PlannerConfig) -> String {
    render(&handle_request(json, config).unwrap_or_else(|msg| error_body(&msg)))
}

pub fn run(cli: Cli) -> anyhow::Result<String> {
    let config = build_config(&cli.planner)?;
    let body = match cli.command {
        Command::Affordability {
            statement,
            house_price,
        } => {
            let file_content = fs::read_to_string(&statement)
                .with_context(|| format!("failed to read statement {}", statement.display()))?;
            dispatch(
                ToolRequest::EstimateAffordability(AffordabilityPayload {
                    file_content: Some(file_content),
                    house_price: Some(house_price),
                }),
                &config,
            )
        }
        Command::Deposit {
            min_price,
            max_price,
            deposit_percent,
        } => dispatch(
            ToolRequest::DepositCalculator(DepositPayload {
                min_price: Some(min_price),
                max_price: Some(max_price),
                deposit_percent: Some(deposit_percent / 100.0),
            }),
            &config,
        ),
        Command::Risk {
            income_stability,
            time_horizon_years,
            loss_reaction,
        } => dispatch(
            ToolRequest::RiskClassification(RiskPayload {
                income_stability: Some(income_stability),
                time_horizon_years: Some(time_horizon_years),
                loss_reaction: Some(loss_reaction),
            }),
            &config,
        ),
        Command::Feasibility {
            available_investment,
            deposit_target,
            risk_band,
            time_horizon_years,
        } => RiskBand::try_from(risk_band).and_then(|risk_band| {
            dispatch(
                ToolRequest::FeasibilityCalculator(FeasibilityPayload {
                    available_investment: Some(available_investment),
                    deposit_target: Some(deposit_target),
                    risk_band: Some(risk_band),
                    time_horizon_years: Some(time_horizon_years),
                    session: None,
                }),
                &config,
            )
        }),
        Command::Workflow { state } => {
            let text = read_input(state.as_deref())?;
            parse_session(&text).and_then(|state| {
                dispatch(
                    ToolRequest::WorkflowState(WorkflowPayload { state }),
                    &config,
                )
            })
        }
        Command::Request => {
            let text = read_input(None)?;
            handle_request(&text, &config)
        }
    };

    Ok(render(&body.unwrap_or_else(|msg| {
        warn!(error = %msg, "request rejected");
        error_body(&msg)
    })))
}

fn read_input(path: Option<&Path>) -> anyhow::Result<String> {
    match path {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read stdin")?;
            Ok(buf)
        }
    }
}

fn parse_session(text: &str) -> Result<Option<SessionState>, String> {
    if text.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(text).map_err(|e| format!("Invalid session state JSON: {e}"))
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, String> {
    serde_json::to_value(value).map_err(|e| format!("failed to serialize result: {e}"))
}

fn error_body(msg: &str) -> Value {
    let response = ErrorResponse {
        status: Status::Error,
        error: msg.to_string(),
    };
    serde_json::to_value(response).unwrap_or_else(|_| Value::String(msg.to_string()))
}

fn render(body: &Value) -> String {
    serde_json::to_string_pretty(body).unwrap_or_else(|_| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn request(json: &str) -> Value {
        handle_request(json, &PlannerConfig::default()).expect("request should succeed")
    }

    fn request_err(json: &str) -> String {
        handle_request(json, &PlannerConfig::default()).expect_err("request should fail")
    }

    #[test]
    fn deposit_request_defaults_percent_and_accepts_legacy_keys() {
        let body = request(r#"{"tool": "deposit_calculator", "min_value": 200000, "max_value": 300000}"#);
        assert_approx(body["house_price"].as_f64().expect("number"), 220_000.0);
        assert_approx(body["deposit_amount"].as_f64().expect("number"), 22_000.0);
    }

    #[test]
    fn deposit_request_rejects_small_percent_and_inverted_range() {
        let err = request_err(
            r#"{"tool": "deposit_calculator", "min_price": 1, "max_price": 2, "deposit_percent": 0.05}"#,
        );
        assert!(err.contains("deposit_percent"));

        let err = request_err(r#"{"tool": "deposit_calculator", "min_price": 5, "max_price": 2}"#);
        assert!(err.contains("max_price"));
    }

    #[test]
    fn risk_request_validates_ranges() {
        let body = request(
            r#"{"tool": "risk_classification", "income_stability": 5, "time_horizon_years": 10, "loss_reaction": 5}"#,
        );
        assert_eq!(body["risk_band"], 4);
        assert_eq!(body["risk_band_text"], "High Risk");
        assert_approx(body["max_equity_share"].as_f64().expect("number"), 0.7);

        let err = request_err(
            r#"{"tool": "risk_classification", "income_stability": 9, "time_horizon_years": 10, "loss_reaction": 5}"#,
        );
        assert!(err.contains("income_stability"));
    }

    #[test]
    fn affordability_request_returns_contract_fields() {
        let json = serde_json::json!({
            "tool": "estimate_affordability",
            "house_price": 200000,
            "file_content": "Transaction Date,Description,Credit amount,Debit amount\n\
                2025-01-15,Salary,3000,\n2025-01-20,Rent,,1500\n\
                2025-02-15,Salary,3200,\n2025-02-25,Rent,,1400\n\
                2025-03-10,Salary,3100,\n2025-03-18,Rent,,1600\n"
        });
        let body = request(&json.to_string());
        for key in [
            "status",
            "message",
            "available_investment",
            "average_surplus",
            "median_surplus",
            "average_income",
            "median_income",
            "max_affordability",
            "is_affordable",
        ] {
            assert!(body.get(key).is_some(), "missing {key}");
        }
        assert_eq!(body["status"], "success");
        assert_eq!(body["available_investment"], 1200);
    }

    #[test]
    fn affordability_processing_errors_stay_structured() {
        let body = request(
            r#"{"tool": "estimate_affordability", "house_price": 1, "file_content": "a,b\n1,2"}"#,
        );
        assert_eq!(body["status"], "error");
        assert_eq!(body["available_investment"], 0);
        assert_eq!(body["is_affordable"], false);
    }

    #[test]
    fn feasibility_request_accepts_explicit_fields() {
        let body = request(
            r#"{"tool": "feasibility_calculator", "available_investment": 0, "deposit_target": 20000, "risk_band": "2", "time_horizon_years": 5}"#,
        );
        assert_eq!(body["status"], "success");
        assert!(body["years_to_target"].is_null());
        assert_eq!(body["likelihood"], "infeasible");
        assert_eq!(body["user_input"]["risk_band"], 2);
    }

    #[test]
    fn feasibility_request_reads_session_results() {
        let json = r#"{
          "tool": "feasibility_calculator",
          "session": {
            "stage": "risk",
            "housing_goal": {"status": "success", "postcode": "HP12", "property_type": "flat",
                             "house_price": 220000, "deposit_target": 22000},
            "bank_capacity": {"status": "success", "suggested_investment": 1200},
            "risk_profile": {"status": "success", "risk_band": 4, "risk_band_text": "High Risk",
                             "score_details": {"income_stability": 5, "time_horizon_years": 10, "loss_reaction": 5},
                             "profile_summary": "growth", "max_equity_share": 0.7}
          }
        }"#;
        let body = request(json);
        assert_eq!(body["likelihood"], "feasible");
        assert_eq!(body["user_input"]["time_horizon_years"], 10);
        assert_approx(
            body["user_input"]["available_investment"].as_f64().expect("number"),
            1_200.0,
        );
    }

    #[test]
    fn workflow_request_with_null_state_starts_housing() {
        let body = request(r#"{"tool": "workflow_state", "state": null}"#);
        assert_eq!(body["current_stage"], "housing");
        assert_eq!(body["next_stage_to_address"], "housing");
        assert_eq!(
            body["data_items_required_to_complete"],
            serde_json::json!(["postcode", "property_type"])
        );
        assert!(body.get("notes").is_some());
    }

    #[test]
    fn merge_request_accepts_fenced_agent_output() {
        let json = serde_json::json!({
            "tool": "merge_stage_output",
            "stage": "capacity",
            "state": {"stage": "housing"},
            "output": "```json\n{\"status\": \"success\", \"suggested_investment\": 900}\n```"
        });
        let body = request(&json.to_string());
        assert_eq!(body["stage"], "capacity");
        assert_eq!(body["bank_capacity"]["suggested_investment"], 900);
    }

    #[test]
    fn merge_request_rejects_incomplete_output() {
        let json = serde_json::json!({
            "tool": "merge_stage_output",
            "stage": "risk",
            "output": {"risk_band": 2}
        });
        let err = request_err(&json.to_string());
        assert!(err.contains("invalid risk payload"));
    }

    #[test]
    fn unknown_tool_renders_error_payload() {
        let rendered = handle_request_json(r#"{"tool": "search_prices"}"#, &PlannerConfig::default());
        let body: Value = serde_json::from_str(&rendered).expect("valid json");
        assert_eq!(body["status"], "error");
        assert!(
            body["error"]
                .as_str()
                .expect("string")
                .contains("Invalid tool request JSON")
        );
    }

    #[test]
    fn config_flags_are_percentages() {
        let args = PlannerArgs {
            high_growth_rate: Some(10.0),
            investment_haircut: Some(50.0),
            ..PlannerArgs::default()
        };
        let config = build_config(&args).expect("valid flags");
        assert_approx(config.high_growth_rate, 0.10);
        assert_approx(config.investment_haircut, 0.5);
        assert_approx(config.base_growth_rate, 0.03);
    }

    #[test]
    fn config_flags_reject_out_of_range_values() {
        let args = PlannerArgs {
            low_growth_rate: Some(-100.0),
            ..PlannerArgs::default()
        };
        let err = build_config(&args).expect_err("must reject -100%");
        assert!(err.to_string().contains("--low-growth-rate"));

        let args = PlannerArgs {
            min_history_months: Some(0),
            ..PlannerArgs::default()
        };
        let err = build_config(&args).expect_err("must reject zero months");
        assert!(err.to_string().contains("--min-history-months"));
    }

    #[test]
    fn cli_parses_subcommand_with_global_flags() {
        let cli = Cli::try_parse_from([
            "deposit-planner",
            "--high-growth-rate",
            "7",
            "feasibility",
            "--available-investment",
            "500",
            "--deposit-target",
            "22000",
            "--risk-band",
            "4",
            "--time-horizon-years",
            "5",
        ])
        .expect("cli should parse");
        assert_eq!(cli.planner.high_growth_rate, Some(7.0));

        let rendered = run(cli).expect("run should succeed");
        let body: Value = serde_json::from_str(&rendered).expect("valid json");
        assert_eq!(body["status"], "success");
        assert_eq!(body["user_input"]["risk_band"], 4);
    }

    #[test]
    fn cli_rejects_out_of_range_risk_band_as_error_payload() {
        let cli = Cli::try_parse_from([
            "deposit-planner",
            "feasibility",
            "--available-investment",
            "500",
            "--deposit-target",
            "22000",
            "--risk-band",
            "7",
            "--time-horizon-years",
            "5",
        ])
        .expect("cli should parse");
        let body: Value = serde_json::from_str(&run(cli).expect("run")).expect("valid json");
        assert_eq!(body["status"], "error");
    }
}
