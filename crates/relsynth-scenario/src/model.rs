use std::collections::BTreeMap;
use std::path::Path;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, ScenarioError};

/// Contract version for scenario documents.
pub const SCENARIO_VERSION: &str = "0.1";

/// Seed used when a scenario does not declare one.
pub const DEFAULT_SEED: u64 = 42;

/// Statistical and generation intent layered on top of a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Scenario {
    /// Contract version for the scenario format.
    #[serde(default = "default_version")]
    pub scenario_version: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Global seed; per-table seeds are derived from it.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Per-table intent keyed by table name. Tables absent here get engine defaults.
    #[serde(default)]
    pub tables: BTreeMap<String, TableScenario>,
}

fn default_version() -> String {
    SCENARIO_VERSION.to_string()
}

fn default_seed() -> u64 {
    DEFAULT_SEED
}

impl Scenario {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            scenario_version: default_version(),
            name: name.into(),
            description: None,
            seed: DEFAULT_SEED,
            tables: BTreeMap::new(),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_table(mut self, name: impl Into<String>, table: TableScenario) -> Self {
        self.tables.insert(name.into(), table);
        self
    }

    pub fn table(&self, name: &str) -> Option<&TableScenario> {
        self.tables.get(name)
    }

    pub fn from_json_str(input: &str) -> Result<Self> {
        Ok(serde_json::from_str(input)?)
    }

    /// Parse a YAML document. Accepts the native shape as well as the
    /// `entities:` shape (optionally nested under a `scenario:` mapping).
    pub fn from_yaml_str(input: &str) -> Result<Self> {
        crate::legacy::parse_yaml(input)
    }

    /// Load from a `.json`, `.yaml` or `.yml` file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&contents),
            Some("yaml") | Some("yml") => Self::from_yaml_str(&contents),
            other => Err(ScenarioError::Schema(format!(
                "unsupported scenario file extension: {}",
                other.unwrap_or("<none>")
            ))),
        }
    }
}

/// Generation intent for one table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TableScenario {
    /// Target row count; engine default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<u64>,
    /// Relative row-count deviation band; exact match required when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_tolerance: Option<Threshold>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub columns: BTreeMap<String, ColumnSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub correlations: Vec<CorrelationSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub temporal: Vec<TemporalRule>,
    /// Synthesizer name (`rule_based`, `learned`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    /// How foreign-key values are drawn from parent key pools.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fk_selection: Option<SelectionPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerances: Option<Tolerances>,
}

impl TableScenario {
    pub fn with_rows(rows: u64) -> Self {
        Self {
            rows: Some(rows),
            ..Self::default()
        }
    }

    pub fn with_column(mut self, name: impl Into<String>, spec: ColumnSpec) -> Self {
        self.columns.insert(name.into(), spec);
        self
    }

    pub fn with_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.strategy = Some(strategy.into());
        self
    }

    pub fn with_correlation(mut self, correlation: CorrelationSpec) -> Self {
        self.correlations.push(correlation);
        self
    }

    pub fn with_temporal(mut self, rule: TemporalRule) -> Self {
        self.temporal.push(rule);
        self
    }

    pub fn distribution(&self, column: &str) -> Option<&Distribution> {
        self.columns
            .get(column)
            .and_then(|spec| spec.distribution.as_ref())
    }
}

/// Per-column generation intent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ColumnSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution: Option<Distribution>,
    /// Probability of a null value; only valid on nullable columns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub null_probability: Option<f64>,
}

impl ColumnSpec {
    pub fn distributed(distribution: Distribution) -> Self {
        Self {
            distribution: Some(distribution),
            null_probability: None,
        }
    }
}

/// Declared value distribution for a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Distribution {
    Uniform {
        min: f64,
        max: f64,
    },
    Normal {
        mean: f64,
        #[serde(alias = "std")]
        std_dev: f64,
    },
    #[serde(alias = "lognormal")]
    LogNormal {
        mu: f64,
        sigma: f64,
    },
    Exponential {
        rate: f64,
    },
    /// Label -> relative weight; weights need not sum to one.
    Categorical {
        weights: BTreeMap<String, f64>,
    },
    /// Deterministic progression `start + step * row_index`.
    Sequence {
        #[serde(default = "default_sequence_start")]
        start: f64,
        #[serde(default = "default_sequence_step")]
        step: f64,
    },
}

fn default_sequence_start() -> f64 {
    1.0
}

fn default_sequence_step() -> f64 {
    1.0
}

impl Distribution {
    pub fn kind(&self) -> &'static str {
        match self {
            Distribution::Uniform { .. } => "uniform",
            Distribution::Normal { .. } => "normal",
            Distribution::LogNormal { .. } => "log_normal",
            Distribution::Exponential { .. } => "exponential",
            Distribution::Categorical { .. } => "categorical",
            Distribution::Sequence { .. } => "sequence",
        }
    }

    /// Continuous numeric distributions (goodness-of-fit by KS statistic).
    pub fn is_continuous(&self) -> bool {
        matches!(
            self,
            Distribution::Uniform { .. }
                | Distribution::Normal { .. }
                | Distribution::LogNormal { .. }
                | Distribution::Exponential { .. }
        )
    }

    /// Categorical weights normalised to probabilities, in label order.
    pub fn probabilities(&self) -> Option<Vec<(String, f64)>> {
        let Distribution::Categorical { weights } = self else {
            return None;
        };
        let total: f64 = weights.values().sum();
        if total <= 0.0 {
            return None;
        }
        Some(
            weights
                .iter()
                .map(|(label, weight)| (label.clone(), weight / total))
                .collect(),
        )
    }
}

/// Within-table linear correlation between two numeric columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CorrelationSpec {
    pub source: String,
    pub target: String,
    /// Pearson coefficient in [-1, 1].
    pub coefficient: f64,
}

/// Temporal intent for date/timestamp columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TemporalRule {
    /// Values fall in `[start, end]` (ISO dates) following a density shape.
    Pattern {
        column: String,
        start: String,
        end: String,
        #[serde(default)]
        shape: TemporalShape,
    },
    /// `column` happens after `after` in the same row, within a gap window.
    After {
        column: String,
        after: String,
        #[serde(default)]
        min_gap_seconds: i64,
        max_gap_seconds: i64,
    },
}

impl TemporalRule {
    pub fn column(&self) -> &str {
        match self {
            TemporalRule::Pattern { column, .. } | TemporalRule::After { column, .. } => column,
        }
    }
}

/// Density shape over a temporal window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TemporalShape {
    #[default]
    Uniform,
    /// Density at the end of the window is `growth` times the density at the start.
    Trend { growth: f64 },
    /// Sinusoidal density with the given period; `amplitude` in [0, 1].
    Seasonal { period_days: f64, amplitude: f64 },
    /// Density inside `[start, end]` is `multiplier` times the baseline.
    Surge {
        start: String,
        end: String,
        multiplier: f64,
    },
}

/// Policy for drawing foreign-key values from a parent key pool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SelectionPolicy {
    #[default]
    Uniform,
    RoundRobin,
    /// Zipf-like skew: key `i` is drawn with weight `1 / (i + 1)^exponent`.
    Skewed { exponent: f64 },
}

/// WARN/FAIL band for a deviation score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Threshold {
    pub warn: f64,
    pub fail: f64,
}

impl Threshold {
    pub const fn new(warn: f64, fail: f64) -> Self {
        Self { warn, fail }
    }
}

/// Scenario-declared tolerances for statistical findings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Tolerances {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution: Option<Threshold>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation: Option<Threshold>,
}
