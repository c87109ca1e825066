use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Semantic type of a column, independent of any SQL dialect spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    Integer,
    Decimal,
    Text,
    Boolean,
    Date,
    Timestamp,
    Time,
    Uuid,
    Json,
}

impl SemanticType {
    /// Stable lowercase identifier used in messages and report paths.
    pub fn as_str(&self) -> &'static str {
        match self {
            SemanticType::Integer => "integer",
            SemanticType::Decimal => "decimal",
            SemanticType::Text => "text",
            SemanticType::Boolean => "boolean",
            SemanticType::Date => "date",
            SemanticType::Timestamp => "timestamp",
            SemanticType::Time => "time",
            SemanticType::Uuid => "uuid",
            SemanticType::Json => "json",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, SemanticType::Integer | SemanticType::Decimal)
    }

    /// Date and timestamp columns can carry temporal patterns.
    pub fn is_temporal(&self) -> bool {
        matches!(self, SemanticType::Date | SemanticType::Timestamp)
    }
}

/// Column type metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ColumnType {
    pub semantic: SemanticType,
    /// Maximum character length for text columns (e.g. `varchar(64)`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    /// Digits after the decimal point for decimal columns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numeric_scale: Option<u32>,
}

impl ColumnType {
    pub fn new(semantic: SemanticType) -> Self {
        Self {
            semantic,
            max_length: None,
            numeric_scale: None,
        }
    }
}

impl From<SemanticType> for ColumnType {
    fn from(semantic: SemanticType) -> Self {
        ColumnType::new(semantic)
    }
}
