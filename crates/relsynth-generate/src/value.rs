use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use relsynth_core::{Column, SemanticType};
use serde::Serialize;

/// Generated value for a column.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum GeneratedValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Uuid(String),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
}

impl GeneratedValue {
    pub fn is_null(&self) -> bool {
        matches!(self, GeneratedValue::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            GeneratedValue::Int(value) => Some(*value as f64),
            GeneratedValue::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            GeneratedValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            GeneratedValue::Text(value) | GeneratedValue::Uuid(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            GeneratedValue::Date(value) => Some(*value),
            GeneratedValue::Timestamp(value) => Some(value.date()),
            _ => None,
        }
    }

    /// Point in time for date and timestamp values; dates map to midnight.
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            GeneratedValue::Date(value) => Some(value.and_time(NaiveTime::MIN)),
            GeneratedValue::Timestamp(value) => Some(*value),
            _ => None,
        }
    }

    /// Whether the value's shape fits the column's semantic type. Nulls always fit.
    pub fn fits(&self, semantic: SemanticType) -> bool {
        match (self, semantic) {
            (GeneratedValue::Null, _) => true,
            (GeneratedValue::Int(_), SemanticType::Integer | SemanticType::Decimal) => true,
            (GeneratedValue::Float(value), SemanticType::Decimal) => value.is_finite(),
            (GeneratedValue::Bool(_), SemanticType::Boolean) => true,
            (GeneratedValue::Text(_), SemanticType::Text | SemanticType::Json) => true,
            (GeneratedValue::Uuid(value), SemanticType::Uuid)
            | (GeneratedValue::Text(value), SemanticType::Uuid) => {
                uuid::Uuid::parse_str(value).is_ok()
            }
            (GeneratedValue::Date(_), SemanticType::Date) => true,
            (GeneratedValue::Timestamp(_), SemanticType::Timestamp) => true,
            (GeneratedValue::Time(_), SemanticType::Time) => true,
            _ => false,
        }
    }

    /// Canonical text used for equality keys and label comparisons.
    pub fn key(&self) -> String {
        match self {
            GeneratedValue::Null => "<null>".to_string(),
            GeneratedValue::Bool(value) => value.to_string(),
            GeneratedValue::Int(value) => value.to_string(),
            GeneratedValue::Float(value) => value.to_string(),
            GeneratedValue::Text(value) | GeneratedValue::Uuid(value) => value.clone(),
            GeneratedValue::Date(value) => value.format("%Y-%m-%d").to_string(),
            GeneratedValue::Time(value) => value.format("%H:%M:%S").to_string(),
            GeneratedValue::Timestamp(value) => value.format("%Y-%m-%dT%H:%M:%S").to_string(),
        }
    }

    /// Parse a label (categorical weight key, CHECK literal) into the column's type.
    pub fn parse_label(label: &str, column: &Column) -> Option<GeneratedValue> {
        let raw = label.trim();
        match column.semantic() {
            SemanticType::Integer => raw.parse::<i64>().ok().map(GeneratedValue::Int),
            SemanticType::Decimal => raw
                .parse::<f64>()
                .ok()
                .map(|value| GeneratedValue::Float(round_to_scale(value, column))),
            SemanticType::Boolean => match raw {
                "true" => Some(GeneratedValue::Bool(true)),
                "false" => Some(GeneratedValue::Bool(false)),
                _ => None,
            },
            SemanticType::Date => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .map(GeneratedValue::Date),
            SemanticType::Timestamp => NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
                .ok()
                .map(GeneratedValue::Timestamp),
            SemanticType::Time => NaiveTime::parse_from_str(raw, "%H:%M:%S")
                .ok()
                .map(GeneratedValue::Time),
            SemanticType::Uuid => uuid::Uuid::parse_str(raw)
                .ok()
                .map(|value| GeneratedValue::Uuid(value.to_string())),
            SemanticType::Text | SemanticType::Json => {
                Some(GeneratedValue::Text(truncate(raw.to_string(), column)))
            }
        }
    }

    /// Convert a sampled number into the column's representation.
    pub fn from_number(value: f64, column: &Column) -> GeneratedValue {
        match column.semantic() {
            SemanticType::Integer => GeneratedValue::Int(value.round() as i64),
            SemanticType::Decimal => GeneratedValue::Float(round_to_scale(value, column)),
            SemanticType::Boolean => GeneratedValue::Bool(value >= 0.5),
            _ => GeneratedValue::Text(truncate(format!("{value}"), column)),
        }
    }
}

/// Escaped composite key for a tuple of values.
pub fn tuple_key(values: &[GeneratedValue]) -> String {
    values
        .iter()
        .map(|value| value.key().replace('\\', "\\\\").replace('|', "\\|"))
        .collect::<Vec<_>>()
        .join("|")
}

pub(crate) fn round_to_scale(value: f64, column: &Column) -> f64 {
    match column.column_type.numeric_scale {
        Some(scale) => {
            let factor = 10_f64.powi(scale as i32);
            (value * factor).round() / factor
        }
        None => value,
    }
}

pub(crate) fn truncate(mut value: String, column: &Column) -> String {
    if let Some(max_len) = column.column_type.max_length {
        let max_len = max_len as usize;
        if value.chars().count() > max_len {
            value = value.chars().take(max_len).collect();
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_labels_into_column_types() {
        let amount = Column {
            column_type: relsynth_core::ColumnType {
                semantic: SemanticType::Decimal,
                max_length: None,
                numeric_scale: Some(2),
            },
            ..Column::new("amount", SemanticType::Decimal)
        };
        assert_eq!(
            GeneratedValue::parse_label("3.14159", &amount),
            Some(GeneratedValue::Float(3.14))
        );
        let code = Column::new("code", SemanticType::Text).with_max_length(3);
        assert_eq!(
            GeneratedValue::parse_label("ABCDE", &code),
            Some(GeneratedValue::Text("ABC".to_string()))
        );
        let day = Column::new("day", SemanticType::Date);
        assert!(GeneratedValue::parse_label("not-a-date", &day).is_none());
    }

    #[test]
    fn tuple_keys_escape_separators() {
        let left = tuple_key(&[
            GeneratedValue::Text("a|b".to_string()),
            GeneratedValue::Int(1),
        ]);
        let right = tuple_key(&[
            GeneratedValue::Text("a".to_string()),
            GeneratedValue::Text("b|1".to_string()),
        ]);
        assert_ne!(left, right);
    }

    #[test]
    fn type_fit_follows_semantic_type() {
        assert!(GeneratedValue::Int(3).fits(SemanticType::Decimal));
        assert!(!GeneratedValue::Float(3.5).fits(SemanticType::Integer));
        assert!(GeneratedValue::Null.fits(SemanticType::Date));
        assert!(!GeneratedValue::Text("x".to_string()).fits(SemanticType::Uuid));
    }
}
