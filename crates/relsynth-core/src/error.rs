use thiserror::Error;

/// Core error type shared across relsynth crates.
#[derive(Debug, Error)]
pub enum Error {
    /// The schema violates structural invariants (dangling FK, bad key, ...).
    #[error("schema integrity error in table '{table}': {message}")]
    SchemaIntegrity { table: String, message: String },
}

impl Error {
    pub fn integrity(table: impl Into<String>, message: impl Into<String>) -> Self {
        Error::SchemaIntegrity {
            table: table.into(),
            message: message.into(),
        }
    }
}

/// Convenience alias for results returned by relsynth crates.
pub type Result<T> = std::result::Result<T, Error>;
