use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::types::SemanticType;

/// Primary key definition preserving column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PrimaryKey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub columns: Vec<String>,
}

/// Unique constraint definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct UniqueConstraint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub columns: Vec<String>,
}

/// Table-level CHECK constraint kept as its SQL expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CheckConstraint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub expression: String,
}

/// Column-level check predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckPredicate {
    /// Inclusive numeric range; either bound may be open.
    Range {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
    },
    /// Enumerated set of allowed literals.
    OneOf { values: Vec<String> },
    /// Regular expression the full value must match.
    Pattern { regex: String },
    /// Free-form SQL expression (e.g. `status IN ('A', 'B')`).
    Expression { expression: String },
}

impl CheckPredicate {
    /// Whether the predicate's domain can hold values of the given type.
    pub fn is_compatible_with(&self, semantic: SemanticType) -> bool {
        match self {
            CheckPredicate::Range { .. } => semantic.is_numeric(),
            CheckPredicate::OneOf { values } => values
                .iter()
                .all(|value| literal_fits(value, semantic)),
            CheckPredicate::Pattern { .. } => {
                matches!(semantic, SemanticType::Text | SemanticType::Uuid)
            }
            CheckPredicate::Expression { .. } => true,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            CheckPredicate::Range { .. } => "range",
            CheckPredicate::OneOf { .. } => "one_of",
            CheckPredicate::Pattern { .. } => "pattern",
            CheckPredicate::Expression { .. } => "expression",
        }
    }
}

fn literal_fits(value: &str, semantic: SemanticType) -> bool {
    match semantic {
        SemanticType::Text | SemanticType::Uuid => true,
        SemanticType::Integer => value.trim().parse::<i64>().is_ok(),
        SemanticType::Decimal => value.trim().parse::<f64>().is_ok(),
        SemanticType::Boolean => matches!(value.trim(), "true" | "false"),
        SemanticType::Date => {
            let bytes = value.trim().as_bytes();
            bytes.len() == 10
                && bytes[4] == b'-'
                && bytes[7] == b'-'
                && bytes
                    .iter()
                    .enumerate()
                    .all(|(idx, b)| idx == 4 || idx == 7 || b.is_ascii_digit())
        }
        SemanticType::Timestamp | SemanticType::Time | SemanticType::Json => false,
    }
}

/// Foreign key definition preserving column ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ForeignKey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub columns: Vec<String>,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
    /// Only meaningful for self-references: whether a row may point at itself.
    #[serde(default)]
    pub allow_self_loop: bool,
}

impl ForeignKey {
    pub fn new(
        columns: &[&str],
        referenced_table: impl Into<String>,
        referenced_columns: &[&str],
    ) -> Self {
        Self {
            name: None,
            columns: columns.iter().map(|c| c.to_string()).collect(),
            referenced_table: referenced_table.into(),
            referenced_columns: referenced_columns.iter().map(|c| c.to_string()).collect(),
            allow_self_loop: false,
        }
    }

    pub fn is_self_reference(&self, table: &str) -> bool {
        self.referenced_table == table
    }

    /// Display label used in report paths: `fk_name` or `(a,b)->parent`.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("({})->{}", self.columns.join(","), self.referenced_table),
        }
    }
}
