use relsynth_scenario::ValidationReport;
use thiserror::Error;

/// Errors that stop a validation run before any finding is produced.
///
/// Violations found in the data are never errors; they are reported as
/// findings in the [`QualityReport`](crate::QualityReport).
#[derive(Debug, Error)]
pub enum EvalError {
    #[error(transparent)]
    SchemaIntegrity(#[from] relsynth_core::Error),
    #[error("scenario validation failed: {}", .0.summary())]
    ScenarioValidation(ValidationReport),
    #[error("dataset table '{table}' is not defined in the schema")]
    UnknownTable { table: String },
}

/// Result type for validation runs.
pub type Result<T> = std::result::Result<T, EvalError>;
