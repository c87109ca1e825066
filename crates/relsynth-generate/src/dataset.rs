use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::value::GeneratedValue;

static NULL: GeneratedValue = GeneratedValue::Null;

/// One generated record keyed by column name.
pub type Row = BTreeMap<String, GeneratedValue>;

/// Rows per table, plus the tables whose foreign keys still need enforcement.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GeneratedDataset {
    pub tables: BTreeMap<String, Vec<Row>>,
    #[serde(skip)]
    pub pending: BTreeSet<String>,
}

impl GeneratedDataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap externally supplied rows; nothing is flagged for enforcement.
    pub fn from_tables(tables: BTreeMap<String, Vec<Row>>) -> Self {
        Self {
            tables,
            pending: BTreeSet::new(),
        }
    }

    pub fn insert_table(&mut self, table: impl Into<String>, rows: Vec<Row>) {
        self.tables.insert(table.into(), rows);
    }

    pub fn rows(&self, table: &str) -> Option<&[Row]> {
        self.tables.get(table).map(Vec::as_slice)
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.tables.get(table).map(Vec::len).unwrap_or(0)
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn mark_pending(&mut self, table: impl Into<String>) {
        self.pending.insert(table.into());
    }

    pub fn needs_enforcement(&self, table: &str) -> bool {
        self.pending.contains(table)
    }

    /// Values of one column in row order; missing cells read as null.
    pub fn column_values<'a>(
        &'a self,
        table: &str,
        column: &'a str,
    ) -> impl Iterator<Item = &'a GeneratedValue> + 'a {
        self.tables
            .get(table)
            .into_iter()
            .flatten()
            .map(move |row| row.get(column).unwrap_or(&NULL))
    }
}
