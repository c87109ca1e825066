use chrono::NaiveDate;
use relsynth_core::Cycle;
use relsynth_scenario::Threshold;
use serde::{Deserialize, Serialize};

/// Options for dataset validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidateOptions {
    /// Bands for distribution scores when the scenario declares none.
    pub distribution: Threshold,
    /// Bands for |observed - declared| correlation when the scenario declares none.
    pub correlation: Threshold,
    /// Bands for the fraction of rows off a declared sequence.
    pub sequence: Threshold,
    /// Bands for the fraction of rows breaking a temporal rule.
    pub temporal: Threshold,
    /// Limit the number of example rows kept per structural violation.
    pub max_examples: usize,
    /// Value of `current_date` inside CHECK expressions.
    pub current_date: NaiveDate,
}

impl Default for ValidateOptions {
    fn default() -> Self {
        Self {
            distribution: Threshold::new(0.1, 0.25),
            correlation: Threshold::new(0.1, 0.25),
            sequence: Threshold::new(0.0, 0.05),
            temporal: Threshold::new(0.0, 0.05),
            max_examples: 20,
            current_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default(),
        }
    }
}

/// Outcome for a finding, a table, or a whole dataset. Ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Pass,
    Warn,
    Fail,
}

impl Verdict {
    /// Grade a non-negative deviation score against a WARN/FAIL band.
    pub fn grade(score: f64, threshold: Threshold) -> Self {
        if score > threshold.fail {
            Verdict::Fail
        } else if score > threshold.warn {
            Verdict::Warn
        } else {
            Verdict::Pass
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Pass => "PASS",
            Verdict::Warn => "WARN",
            Verdict::Fail => "FAIL",
        }
    }
}

/// Kind of structural violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    UnknownColumn,
    Type,
    Length,
    NotNull,
    Check,
    PrimaryKey,
    Unique,
    ForeignKey,
}

impl ViolationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ViolationKind::UnknownColumn => "unknown_column",
            ViolationKind::Type => "type",
            ViolationKind::Length => "length",
            ViolationKind::NotNull => "not_null",
            ViolationKind::Check => "check",
            ViolationKind::PrimaryKey => "primary_key",
            ViolationKind::Unique => "unique",
            ViolationKind::ForeignKey => "foreign_key",
        }
    }
}

/// Structural violations of one kind at one location, aggregated over rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuralViolation {
    pub kind: ViolationKind,
    /// `table.column` or `table.(col_a,col_b)`; foreign keys add `-> parent`.
    pub path: String,
    pub message: String,
    /// Total number of offending rows.
    pub count: u64,
    /// Zero-based row indices of the first offending rows.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rows: Vec<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
}

/// What a statistical finding measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    RowCount,
    Distribution,
    Correlation,
    Sequence,
    Temporal,
}

/// Observed-versus-declared comparison with its deviation score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticalFinding {
    pub kind: FindingKind,
    /// Column, `source~target` pair, or table name for row counts.
    pub subject: String,
    /// Name of the score: `psi`, `ks`, `abs_delta`, `relative_delta`, `off_fraction`.
    pub metric: String,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<f64>,
    pub threshold: Threshold,
    pub verdict: Verdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Per-column value profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub column: String,
    pub null_count: u64,
    pub distinct_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

/// Findings for one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableQuality {
    pub table: String,
    pub verdict: Verdict,
    pub rows_found: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_expected: Option<u64>,
    pub structural: Vec<StructuralViolation>,
    pub statistical: Vec<StatisticalFinding>,
    pub columns: Vec<ColumnProfile>,
    /// CHECK constraints the evaluator could not interpret.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unevaluated_checks: Vec<String>,
}

impl TableQuality {
    pub fn violation_count(&self) -> u64 {
        self.structural.iter().map(|violation| violation.count).sum()
    }

    pub fn violations(&self, kind: ViolationKind) -> impl Iterator<Item = &StructuralViolation> {
        self.structural
            .iter()
            .filter(move |violation| violation.kind == kind)
    }

    pub fn finding(&self, kind: FindingKind, subject: &str) -> Option<&StatisticalFinding> {
        self.statistical
            .iter()
            .find(|finding| finding.kind == kind && finding.subject == subject)
    }
}

/// Result of one validation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub scenario: String,
    pub verdict: Verdict,
    pub tables: Vec<TableQuality>,
    /// Multi-table foreign-key cycles in the schema; their references were
    /// only repaired after generation.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cycles: Vec<Cycle>,
}

impl QualityReport {
    pub fn table(&self, name: &str) -> Option<&TableQuality> {
        self.tables.iter().find(|table| table.table == name)
    }

    pub fn structural_violation_count(&self) -> u64 {
        self.tables.iter().map(TableQuality::violation_count).sum()
    }

    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Pass
    }
}
