use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error("no transactions found")]
    EmptyData,
    #[error("bank statement is missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
    #[error("Invalid data format in transactions: {0}")]
    InvalidData(String),
    #[error(
        "not enough transactions to estimate surplus: found {months} month(s), please provide at least {required} months of transactions"
    )]
    InsufficientHistory { months: usize, required: usize },
}

impl AnalysisError {
    pub fn error_code(&self) -> &'static str {
        match self {
            AnalysisError::EmptyData => "EmptyDataError",
            AnalysisError::MissingColumns(_) => "MISSING_COLUMNS",
            AnalysisError::InvalidData(_) => "INVALID_DATA",
            AnalysisError::InsufficientHistory { .. } => "INSUFFICIENT_HISTORY",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WorkflowError {
    #[error("invalid {stage} payload: {reason}")]
    InvalidPayload { stage: &'static str, reason: String },
    #[error("stage {0:?} does not produce a result")]
    NoStageOutput(String),
    #[error("session has no {0} result")]
    MissingStageResult(&'static str),
    #[error("{0} result did not complete successfully")]
    StageNotSuccessful(&'static str),
    #[error("{stage} result is missing {field}")]
    MissingField {
        stage: &'static str,
        field: &'static str,
    },
}
