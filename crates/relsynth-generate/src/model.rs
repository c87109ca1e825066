use std::collections::BTreeMap;

use chrono::NaiveDate;
use relsynth_core::{CyclicDependencyWarning, DeferredEdge};
use relsynth_scenario::SelectionPolicy;
use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// Name of the synthesizer used when a table does not choose one.
pub const RULE_BASED: &str = "rule_based";

/// Options for the generation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateOptions {
    /// Maximum attempts to build a single row before the table fails.
    pub max_attempts_row: u32,
    /// Upper bound on tables synthesized at once by the concurrent driver; 0 means one task per table in a wave.
    pub max_parallel_tables: usize,
    pub defaults: DefaultPolicy,
    pub enforcement: EnforceOptions,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            max_attempts_row: 50,
            max_parallel_tables: 0,
            defaults: DefaultPolicy::default(),
            enforcement: EnforceOptions::default(),
        }
    }
}

impl GenerateOptions {
    /// Parse options from a TOML document; absent keys keep their defaults.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        Ok(toml::from_str(input)?)
    }
}

/// Engine-chosen defaults for tables and columns the scenario leaves open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultPolicy {
    pub default_rows: u64,
    /// Null probability for nullable, non-key columns without a scenario spec.
    pub null_probability: f64,
    pub strategy: String,
    /// Anchor for temporal values without a declared window.
    pub base_date: NaiveDate,
    /// Caps every table's row count when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_rows: Option<u64>,
}

impl Default for DefaultPolicy {
    fn default() -> Self {
        Self {
            default_rows: 1000,
            null_probability: 0.05,
            strategy: RULE_BASED.to_string(),
            base_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default(),
            preview_rows: None,
        }
    }
}

impl DefaultPolicy {
    /// Row count for a table, after applying the preview cap.
    pub fn resolve_rows(&self, declared: Option<u64>) -> u64 {
        let rows = declared.unwrap_or(self.default_rows);
        match self.preview_rows {
            Some(cap) => rows.min(cap),
            None => rows,
        }
    }
}

/// Which tables the enforcer visits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnforceScope {
    /// Only tables flagged during generation.
    #[default]
    Flagged,
    /// Every table with foreign keys; useful for externally supplied datasets.
    All,
}

/// Options for the constraint enforcer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnforceOptions {
    /// How replacement keys are drawn from a parent pool.
    pub selection: SelectionPolicy,
    pub scope: EnforceScope,
}

/// Summary of a generated table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableReport {
    pub table: String,
    pub strategy: String,
    pub rows_requested: u64,
    pub rows_generated: u64,
    pub retries: u64,
    /// Foreign keys left for the enforcer.
    pub needs_enforcement: bool,
}

/// Summary of one enforcement pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnforcementSummary {
    /// Foreign-key references that were rewritten or nulled.
    pub violation_count: u64,
    pub nulled: u64,
    /// Violations per table.
    pub tables: BTreeMap<String, u64>,
}

impl EnforcementSummary {
    pub(crate) fn record(&mut self, table: &str, violations: u64, nulled: u64) {
        self.violation_count += violations;
        self.nulled += nulled;
        self.tables.insert(table.to_string(), violations);
    }
}

/// Report for a generation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationReport {
    pub scenario: String,
    pub seed: u64,
    /// Tables in generation order.
    pub tables: Vec<TableReport>,
    pub retries_total: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cycles: Vec<CyclicDependencyWarning>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deferred: Vec<DeferredEdge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enforcement: Option<EnforcementSummary>,
}

impl GenerationReport {
    pub fn new(scenario: impl Into<String>, seed: u64) -> Self {
        Self {
            scenario: scenario.into(),
            seed,
            tables: Vec::new(),
            retries_total: 0,
            cycles: Vec::new(),
            deferred: Vec::new(),
            enforcement: None,
        }
    }

    pub fn table(&self, name: &str) -> Option<&TableReport> {
        self.tables.iter().find(|report| report.table == name)
    }

    pub(crate) fn record_table(&mut self, report: TableReport) {
        self.retries_total += report.retries;
        self.tables.push(report);
    }
}
