use relsynth_scenario::ValidationReport;
use thiserror::Error;

/// Errors emitted by the generation engine and the constraint enforcer.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(transparent)]
    SchemaIntegrity(#[from] relsynth_core::Error),
    #[error("scenario validation failed: {}", .0.summary())]
    ScenarioValidation(ValidationReport),
    /// A non-nullable foreign key has no parent key to point at.
    #[error(
        "unsatisfiable constraint on '{table}.{column}': referenced table '{referenced_table}' has no keys"
    )]
    UnsatisfiableConstraint {
        table: String,
        column: String,
        referenced_table: String,
    },
    #[error("unknown synthesizer '{name}' for table '{table}'")]
    UnknownSynthesizer { table: String, name: String },
    #[error("synthesis failed for table '{table}': {message}")]
    Synthesis { table: String, message: String },
    #[error("generation cancelled after {completed} table(s)")]
    Cancelled { completed: usize },
    #[error("config decode error: {0}")]
    Config(#[from] toml::de::Error),
    #[error("worker task failed: {0}")]
    Join(String),
}

impl GenerationError {
    pub(crate) fn synthesis(table: &str, message: impl Into<String>) -> Self {
        Self::Synthesis {
            table: table.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, GenerationError>;
