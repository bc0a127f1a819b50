use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use tracing::{debug, info, warn};

use super::config::PlannerConfig;
use super::error::AnalysisError;
use super::types::{AffordabilityResult, Direction, MonthlyAggregate, Status, Transaction};

pub const DATE_COLUMN: &str = "Transaction Date";
pub const DESCRIPTION_COLUMN: &str = "Description";
pub const CREDIT_COLUMN: &str = "Credit amount";
pub const DEBIT_COLUMN: &str = "Debit amount";
pub const REQUIRED_COLUMNS: [&str; 4] = [DATE_COLUMN, DESCRIPTION_COLUMN, CREDIT_COLUMN, DEBIT_COLUMN];

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y"];
const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"];

pub fn estimate_affordability(statement: &str, house_price: f64) -> AffordabilityResult {
    estimate_affordability_with_config(statement, house_price, &PlannerConfig::default())
}

/// Never fails: processing errors come back as a `status = "error"` result with zeroed figures.
pub fn estimate_affordability_with_config(
    statement: &str,
    house_price: f64,
    config: &PlannerConfig,
) -> AffordabilityResult {
    info!(house_price, "starting affordability estimate");
    match analyze_statement(statement, house_price, config) {
        Ok(result) => result,
        Err(err) => {
            warn!(code = err.error_code(), %err, "affordability estimate failed");
            AffordabilityResult::error(err.to_string())
        }
    }
}

pub fn analyze_statement(
    statement: &str,
    house_price: f64,
    config: &PlannerConfig,
) -> Result<AffordabilityResult, AnalysisError> {
    let transactions = parse_transactions(statement)?;
    let months = aggregate_by_month(&transactions);
    if months.len() < config.min_history_months {
        return Err(AnalysisError::InsufficientHistory {
            months: months.len(),
            required: config.min_history_months,
        });
    }
    debug!(months = months.len(), "calculating monthly aggregates");

    let income: Vec<f64> = months.iter().map(|m| m.credit).collect();
    let surplus: Vec<f64> = months.iter().map(MonthlyAggregate::surplus).collect();

    let average_income = round_currency(mean(&income));
    let median_income = round_currency(median(&income));
    let average_surplus = round_currency(mean(&surplus));
    let median_surplus = round_currency(median(&surplus));
    let available_investment = round_currency(
        (config.investment_haircut * median_surplus as f64).min(average_surplus as f64),
    );

    let max_affordability = median_income
        .checked_mul(config.affordability_multiplier)
        .ok_or_else(|| {
            AnalysisError::InvalidData(format!(
                "median income {median_income} is too large to estimate affordability"
            ))
        })?;
    let is_affordable = max_affordability as f64 > house_price;
    info!(
        available_investment,
        average_surplus, median_surplus, max_affordability, is_affordable, "surplus estimation complete"
    );

    let message = if is_affordable {
        "Available Investment estimated successfully".to_string()
    } else {
        format!(
            "Based on your income estimates from the bank statement the house price of {house_price} \
             is outside your affordable range of {max_affordability}"
        )
    };

    Ok(AffordabilityResult {
        status: Status::Success,
        message,
        available_investment,
        average_surplus,
        median_surplus,
        average_income,
        median_income,
        max_affordability,
        is_affordable,
    })
}

/// Parses a delimited statement into ledger entries. Any unparsable date or amount
/// rejects the whole batch.
pub fn parse_transactions(statement: &str) -> Result<Vec<Transaction>, AnalysisError> {
    let statement = statement.trim_start_matches('\u{feff}');
    if statement.trim().is_empty() {
        return Err(AnalysisError::EmptyData);
    }

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(statement.as_bytes());
    let headers = reader
        .headers()
        .map_err(|e| AnalysisError::InvalidData(e.to_string()))?
        .clone();
    let index_of = |name: &str| headers.iter().position(|h| h == name);

    let (Some(date_idx), Some(_), Some(credit_idx), Some(debit_idx)) = (
        index_of(DATE_COLUMN),
        index_of(DESCRIPTION_COLUMN),
        index_of(CREDIT_COLUMN),
        index_of(DEBIT_COLUMN),
    ) else {
        let missing = REQUIRED_COLUMNS
            .iter()
            .filter(|c| index_of(c).is_none())
            .map(|c| c.to_string())
            .collect();
        return Err(AnalysisError::MissingColumns(missing));
    };

    let mut transactions = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let line = idx + 2;
        let record = record.map_err(|e| AnalysisError::InvalidData(format!("line {line}: {e}")))?;
        if record.iter().all(str::is_empty) {
            continue;
        }

        let date = parse_date(record.get(date_idx).unwrap_or_default()).ok_or_else(|| {
            AnalysisError::InvalidData(format!("line {line}: unrecognised transaction date"))
        })?;
        let credit = parse_amount(record.get(credit_idx).unwrap_or_default())
            .map_err(|cell| AnalysisError::InvalidData(format!("line {line}: bad credit amount {cell:?}")))?;
        let debit = parse_amount(record.get(debit_idx).unwrap_or_default())
            .map_err(|cell| AnalysisError::InvalidData(format!("line {line}: bad debit amount {cell:?}")))?;

        // The credit leg is always kept so a row with blank amounts still marks its month.
        transactions.push(Transaction::new(date, credit, Direction::Credit));
        if debit != 0.0 {
            transactions.push(Transaction::new(date, debit, Direction::Debit));
        }
    }

    if transactions.is_empty() {
        return Err(AnalysisError::EmptyData);
    }
    Ok(transactions)
}

pub fn aggregate_by_month(transactions: &[Transaction]) -> Vec<MonthlyAggregate> {
    let mut months: BTreeMap<(i32, u32), MonthlyAggregate> = BTreeMap::new();
    for tx in transactions {
        let (year, month) = (tx.date.year(), tx.date.month());
        let entry = months.entry((year, month)).or_insert(MonthlyAggregate {
            year,
            month,
            credit: 0.0,
            debit: 0.0,
        });
        if tx.is_credit() {
            entry.credit += tx.amount;
        } else {
            entry.debit += tx.amount;
        }
    }
    months.into_values().collect()
}

fn parse_date(cell: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(cell, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(cell, fmt).ok())
                .map(|dt| dt.date())
        })
}

fn parse_amount(cell: &str) -> Result<f64, String> {
    let cleaned: String = cell.chars().filter(|c| !matches!(c, ',' | '£')).collect();
    if cleaned.is_empty() {
        return Ok(0.0);
    }
    match cleaned.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(cell.to_string()),
    }
}

pub(crate) fn round_currency(value: f64) -> i64 {
    value.round_ties_even() as i64
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
