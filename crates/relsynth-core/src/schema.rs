use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::constraints::{CheckConstraint, CheckPredicate, ForeignKey, PrimaryKey, UniqueConstraint};
use crate::types::{ColumnType, SemanticType};

/// Immutable description of the tables a dataset must conform to.
///
/// Produced by an external parser (SQL DDL, OpenAPI, hand-written JSON) and
/// consumed read-only by the dependency graph, the generation engine and the
/// quality validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DatabaseSchema {
    /// Contract version for this schema format.
    pub schema_version: String,
    /// Source dialect when known (e.g. `postgres`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dialect: Option<String>,
    /// Tables in declaration order.
    pub tables: Vec<Table>,
}

impl DatabaseSchema {
    pub fn new(tables: Vec<Table>) -> Self {
        Self {
            schema_version: crate::SCHEMA_VERSION.to_string(),
            dialect: None,
            tables,
        }
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|table| table.name == name)
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|table| table.name.as_str())
    }
}

/// A table with its columns and constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Table {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub columns: Vec<Column>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<PrimaryKey>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub uniques: Vec<UniqueConstraint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub foreign_keys: Vec<ForeignKey>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub checks: Vec<CheckConstraint>,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            comment: None,
            columns,
            primary_key: None,
            uniques: Vec::new(),
            foreign_keys: Vec::new(),
            checks: Vec::new(),
        }
    }

    pub fn with_primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = Some(PrimaryKey {
            name: None,
            columns: columns.iter().map(|c| c.to_string()).collect(),
        });
        self
    }

    pub fn with_foreign_key(mut self, fk: ForeignKey) -> Self {
        self.foreign_keys.push(fk);
        self
    }

    pub fn with_check(mut self, expression: impl Into<String>) -> Self {
        self.checks.push(CheckConstraint {
            name: None,
            expression: expression.into(),
        });
        self
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn primary_key_columns(&self) -> &[String] {
        self.primary_key
            .as_ref()
            .map(|pk| pk.columns.as_slice())
            .unwrap_or(&[])
    }

    /// Every column set that must be unique: the primary key, declared unique
    /// constraints, and single columns flagged `is_unique`.
    pub fn unique_keys(&self) -> Vec<Vec<String>> {
        let mut keys: Vec<Vec<String>> = Vec::new();
        if let Some(pk) = &self.primary_key {
            keys.push(pk.columns.clone());
        }
        for unique in &self.uniques {
            if !keys.contains(&unique.columns) {
                keys.push(unique.columns.clone());
            }
        }
        for column in &self.columns {
            let single = vec![column.name.clone()];
            if column.is_unique && !keys.contains(&single) {
                keys.push(single);
            }
        }
        keys
    }

    /// Whether `columns` (order-insensitive) form the primary key or a unique key.
    pub fn is_key(&self, columns: &[String]) -> bool {
        let mut wanted: Vec<&str> = columns.iter().map(String::as_str).collect();
        wanted.sort_unstable();
        self.unique_keys().iter().any(|key| {
            let mut candidate: Vec<&str> = key.iter().map(String::as_str).collect();
            candidate.sort_unstable();
            candidate == wanted
        })
    }

    /// Whether the column alone is guaranteed unique.
    pub fn is_unique_column(&self, name: &str) -> bool {
        self.unique_keys()
            .iter()
            .any(|key| key.len() == 1 && key[0] == name)
    }

    /// Foreign key whose column list contains `column`.
    pub fn foreign_key_for_column(&self, column: &str) -> Option<(usize, &ForeignKey)> {
        self.foreign_keys
            .iter()
            .enumerate()
            .find(|(_, fk)| fk.columns.iter().any(|c| c == column))
    }

    pub fn is_foreign_key_column(&self, column: &str) -> bool {
        self.foreign_key_for_column(column).is_some()
    }
}

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
    #[serde(default)]
    pub is_nullable: bool,
    #[serde(default)]
    pub is_unique: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check: Option<CheckPredicate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl Column {
    pub fn new(name: impl Into<String>, semantic: SemanticType) -> Self {
        Self {
            name: name.into(),
            column_type: ColumnType::new(semantic),
            is_nullable: false,
            is_unique: false,
            check: None,
            default: None,
            comment: None,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.is_nullable = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.is_unique = true;
        self
    }

    pub fn with_check(mut self, predicate: CheckPredicate) -> Self {
        self.check = Some(predicate);
        self
    }

    pub fn with_max_length(mut self, max_length: u32) -> Self {
        self.column_type.max_length = Some(max_length);
        self
    }

    pub fn semantic(&self) -> SemanticType {
        self.column_type.semantic
    }
}
