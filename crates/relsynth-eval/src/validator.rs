use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::time::Instant;

use chrono::{NaiveDate, NaiveTime, TimeDelta};
use relsynth_core::{DatabaseSchema, DependencyGraph, ForeignKey, Table, validate_schema};
use relsynth_generate::checks::{CheckContext, CheckOutcome, PredicateEvaluator, evaluate_check};
use relsynth_generate::{GeneratedDataset, GeneratedValue, Row, tuple_key};
use relsynth_scenario::{
    Distribution, Scenario, TableScenario, TemporalRule, Threshold, validate_scenario,
};
use tracing::{debug, info, warn};

use crate::errors::{EvalError, Result};
use crate::model::{
    ColumnProfile, FindingKind, QualityReport, StatisticalFinding, StructuralViolation,
    TableQuality, ValidateOptions, Verdict, ViolationKind,
};
use crate::stats::{ks_statistic, pearson, psi};

static NULL: GeneratedValue = GeneratedValue::Null;

/// Checks a dataset against its schema and scenario.
///
/// The validator never mutates the dataset and holds no state between runs,
/// so validating the same inputs twice yields identical reports. Datasets
/// need not come from the generation engine.
#[derive(Debug, Clone, Default)]
pub struct QualityValidator {
    options: ValidateOptions,
}

impl QualityValidator {
    pub fn new(options: ValidateOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ValidateOptions {
        &self.options
    }

    pub fn validate(
        &self,
        dataset: &GeneratedDataset,
        schema: &DatabaseSchema,
        scenario: &Scenario,
    ) -> Result<QualityReport> {
        let started = Instant::now();
        validate_schema(schema)?;
        let graph = DependencyGraph::build(schema)?;

        let scenario_report = validate_scenario(scenario, schema);
        if !scenario_report.is_ok() {
            return Err(EvalError::ScenarioValidation(scenario_report));
        }
        if let Some(unknown) = dataset
            .table_names()
            .find(|name| schema.table(name).is_none())
        {
            return Err(EvalError::UnknownTable {
                table: unknown.to_string(),
            });
        }

        let mut tables = Vec::with_capacity(schema.tables.len());
        for table in &schema.tables {
            let quality = self.validate_table(table, dataset, scenario.table(&table.name));
            info!(
                table = %table.name,
                verdict = quality.verdict.as_str(),
                rows = quality.rows_found,
                violations = quality.violation_count(),
                findings = quality.statistical.len(),
                "table validated"
            );
            tables.push(quality);
        }

        let cycles = graph.cycles();
        for cycle in &cycles {
            debug!(cycle = %cycle, "cyclic references were repaired after generation");
        }

        let verdict = tables
            .iter()
            .map(|table| table.verdict)
            .max()
            .unwrap_or(Verdict::Pass);
        let report = QualityReport {
            scenario: scenario.name.clone(),
            verdict,
            tables,
            cycles,
        };
        info!(
            scenario = %report.scenario,
            verdict = verdict.as_str(),
            violations = report.structural_violation_count(),
            duration_ms = started.elapsed().as_millis() as u64,
            "validation finished"
        );
        Ok(report)
    }

    fn validate_table(
        &self,
        table: &Table,
        dataset: &GeneratedDataset,
        scenario: Option<&TableScenario>,
    ) -> TableQuality {
        let rows = dataset.rows(&table.name).unwrap_or(&[]);
        let mut sink = ViolationSink::new(self.options.max_examples);
        let mut unevaluated = BTreeSet::new();

        self.check_columns(table, rows, &mut sink, &mut unevaluated);
        self.check_table_constraints(table, rows, &mut sink, &mut unevaluated);
        check_keys(table, rows, &mut sink);
        for fk in &table.foreign_keys {
            check_foreign_key(table, fk, rows, dataset, &mut sink);
        }
        if !unevaluated.is_empty() {
            warn!(
                table = %table.name,
                count = unevaluated.len(),
                "check constraints not evaluated"
            );
        }

        let rows_expected = scenario.and_then(|spec| spec.rows);
        let statistical = match scenario {
            Some(spec) => self.statistical_findings(table, rows, spec),
            None => Vec::new(),
        };
        let structural = sink.into_violations();

        let structural_verdict = if structural.is_empty() {
            Verdict::Pass
        } else {
            Verdict::Fail
        };
        let verdict = statistical
            .iter()
            .map(|finding| finding.verdict)
            .fold(structural_verdict, Verdict::max);

        TableQuality {
            table: table.name.clone(),
            verdict,
            rows_found: rows.len() as u64,
            rows_expected,
            structural,
            statistical,
            columns: profile_columns(table, rows),
            unevaluated_checks: unevaluated.into_iter().collect(),
        }
    }

    fn check_columns(
        &self,
        table: &Table,
        rows: &[Row],
        sink: &mut ViolationSink,
        unevaluated: &mut BTreeSet<String>,
    ) {
        let known: HashSet<&str> = table.columns.iter().map(|c| c.name.as_str()).collect();
        let evaluators: Vec<Option<PredicateEvaluator>> = table
            .columns
            .iter()
            .map(|column| {
                column
                    .check
                    .as_ref()
                    .map(|predicate| PredicateEvaluator::new(&column.name, predicate))
            })
            .collect();

        for (row_idx, row) in rows.iter().enumerate() {
            for name in row.keys().filter(|name| !known.contains(name.as_str())) {
                sink.record(
                    ViolationKind::UnknownColumn,
                    column_path(&table.name, name),
                    "column not defined in the schema",
                    row_idx,
                    None,
                );
            }

            for (column, evaluator) in table.columns.iter().zip(&evaluators) {
                let path = column_path(&table.name, &column.name);
                let value = row.get(&column.name).unwrap_or(&NULL);
                if value.is_null() {
                    if !column.is_nullable {
                        sink.record(
                            ViolationKind::NotNull,
                            path,
                            "null value in non-nullable column",
                            row_idx,
                            None,
                        );
                    }
                    continue;
                }
                if !value.fits(column.semantic()) {
                    sink.record(
                        ViolationKind::Type,
                        path,
                        &format!("value does not fit type {}", column.semantic().as_str()),
                        row_idx,
                        Some(value.key()),
                    );
                    continue;
                }
                if let (Some(max_length), Some(text)) = (column.column_type.max_length, value.as_str())
                    && text.chars().count() > max_length as usize
                {
                    sink.record(
                        ViolationKind::Length,
                        path.clone(),
                        &format!("text longer than {max_length} characters"),
                        row_idx,
                        Some(text.to_string()),
                    );
                }
                if let Some(evaluator) = evaluator {
                    match evaluator.evaluate(row, self.options.current_date) {
                        CheckOutcome::Passed => {}
                        CheckOutcome::Failed => sink.record(
                            ViolationKind::Check,
                            path,
                            "column check failed",
                            row_idx,
                            Some(value.key()),
                        ),
                        CheckOutcome::Unsupported => {
                            unevaluated.insert(path);
                        }
                    }
                }
            }
        }
    }

    fn check_table_constraints(
        &self,
        table: &Table,
        rows: &[Row],
        sink: &mut ViolationSink,
        unevaluated: &mut BTreeSet<String>,
    ) {
        for check in &table.checks {
            let path = match &check.name {
                Some(name) => column_path(&table.name, name),
                None => format!("{}.check", table.name),
            };
            for (row_idx, row) in rows.iter().enumerate() {
                let ctx = CheckContext {
                    values: row,
                    base_date: self.options.current_date,
                };
                match evaluate_check(&check.expression, &ctx) {
                    CheckOutcome::Passed => {}
                    CheckOutcome::Failed => sink.record(
                        ViolationKind::Check,
                        path.clone(),
                        "check constraint failed",
                        row_idx,
                        Some(check.expression.clone()),
                    ),
                    CheckOutcome::Unsupported => {
                        unevaluated.insert(check.expression.clone());
                        break;
                    }
                }
            }
        }
    }

    fn statistical_findings(
        &self,
        table: &Table,
        rows: &[Row],
        spec: &TableScenario,
    ) -> Vec<StatisticalFinding> {
        let mut findings = Vec::new();
        if let Some(expected) = spec.rows {
            findings.push(row_count_finding(table, rows.len() as u64, expected, spec));
        }

        let tolerances = spec.tolerances.clone().unwrap_or_default();
        let distribution_band = tolerances.distribution.unwrap_or(self.options.distribution);
        for (column, column_spec) in &spec.columns {
            let Some(distribution) = &column_spec.distribution else {
                continue;
            };
            let finding = match distribution {
                Distribution::Sequence { start, step } => StatisticalFinding::scored(
                    FindingKind::Sequence,
                    column,
                    "off_fraction",
                    sequence_off_fraction(rows, column, *start, *step),
                    self.options.sequence,
                ),
                Distribution::Categorical { .. } => {
                    categorical_finding(rows, column, distribution, distribution_band)
                }
                _ => continuous_finding(rows, column, distribution, distribution_band),
            };
            findings.push(finding);
        }

        let correlation_band = tolerances.correlation.unwrap_or(self.options.correlation);
        for correlation in &spec.correlations {
            let subject = format!("{}~{}", correlation.source, correlation.target);
            let pairs: Vec<(f64, f64)> = rows
                .iter()
                .filter_map(|row| {
                    let x = row.get(&correlation.source)?.as_f64()?;
                    let y = row.get(&correlation.target)?.as_f64()?;
                    Some((x, y))
                })
                .collect();
            let finding = match pearson(&pairs) {
                Some(observed) => StatisticalFinding {
                    observed: Some(observed),
                    expected: Some(correlation.coefficient),
                    ..StatisticalFinding::scored(
                        FindingKind::Correlation,
                        &subject,
                        "abs_delta",
                        (observed - correlation.coefficient).abs(),
                        correlation_band,
                    )
                },
                None => StatisticalFinding::unmeasurable(
                    FindingKind::Correlation,
                    &subject,
                    "abs_delta",
                    correlation_band,
                    "fewer than two numeric pairs or a constant column",
                ),
            };
            findings.push(finding);
        }

        for rule in &spec.temporal {
            findings.push(self.temporal_finding(rows, rule));
        }
        findings
    }

    fn temporal_finding(&self, rows: &[Row], rule: &TemporalRule) -> StatisticalFinding {
        match rule {
            TemporalRule::Pattern {
                column, start, end, ..
            } => {
                let window = parse_day(start).zip(parse_day(end)).map(|(start, end)| {
                    (
                        start.and_time(NaiveTime::MIN),
                        end.and_time(NaiveTime::MIN) + TimeDelta::seconds(86_399),
                    )
                });
                let Some((from, to)) = window else {
                    return StatisticalFinding::unmeasurable(
                        FindingKind::Temporal,
                        column,
                        "off_fraction",
                        self.options.temporal,
                        "temporal window dates do not parse",
                    );
                };
                let points: Vec<_> = rows
                    .iter()
                    .filter_map(|row| row.get(column)?.as_datetime())
                    .collect();
                let off = points
                    .iter()
                    .filter(|point| **point < from || **point > to)
                    .count();
                StatisticalFinding::scored(
                    FindingKind::Temporal,
                    column,
                    "off_fraction",
                    fraction(off, points.len()),
                    self.options.temporal,
                )
            }
            TemporalRule::After {
                column,
                after,
                min_gap_seconds,
                max_gap_seconds,
            } => {
                let gaps: Vec<i64> = rows
                    .iter()
                    .filter_map(|row| {
                        let later = row.get(column)?.as_datetime()?;
                        let earlier = row.get(after)?.as_datetime()?;
                        Some((later - earlier).num_seconds())
                    })
                    .collect();
                let off = gaps
                    .iter()
                    .filter(|gap| **gap < *min_gap_seconds || **gap > *max_gap_seconds)
                    .count();
                StatisticalFinding::scored(
                    FindingKind::Temporal,
                    &format!("{column}>{after}"),
                    "off_fraction",
                    fraction(off, gaps.len()),
                    self.options.temporal,
                )
            }
        }
    }
}

impl StatisticalFinding {
    fn scored(kind: FindingKind, subject: &str, metric: &str, score: f64, threshold: Threshold) -> Self {
        Self {
            kind,
            subject: subject.to_string(),
            metric: metric.to_string(),
            score,
            observed: None,
            expected: None,
            threshold,
            verdict: Verdict::grade(score, threshold),
            note: None,
        }
    }

    /// A declared property that could not be measured is a warning, never a pass.
    fn unmeasurable(
        kind: FindingKind,
        subject: &str,
        metric: &str,
        threshold: Threshold,
        note: &str,
    ) -> Self {
        Self {
            verdict: Verdict::Warn,
            note: Some(note.to_string()),
            ..Self::scored(kind, subject, metric, 0.0, threshold)
        }
    }
}

/// Collects structural violations grouped by location and kind.
struct ViolationSink {
    max_examples: usize,
    entries: BTreeMap<(String, ViolationKind), StructuralViolation>,
}

impl ViolationSink {
    fn new(max_examples: usize) -> Self {
        Self {
            max_examples,
            entries: BTreeMap::new(),
        }
    }

    fn record(
        &mut self,
        kind: ViolationKind,
        path: String,
        message: &str,
        row_idx: usize,
        example: Option<String>,
    ) {
        let entry = self
            .entries
            .entry((path.clone(), kind))
            .or_insert_with(|| StructuralViolation {
                kind,
                path,
                message: message.to_string(),
                count: 0,
                rows: Vec::new(),
                example: None,
            });
        entry.count += 1;
        if entry.rows.len() < self.max_examples {
            entry.rows.push(row_idx as u64);
        }
        if entry.example.is_none() {
            entry.example = example;
        }
    }

    fn into_violations(self) -> Vec<StructuralViolation> {
        self.entries.into_values().collect()
    }
}

fn check_keys(table: &Table, rows: &[Row], sink: &mut ViolationSink) {
    let primary_key = table.primary_key_columns();
    for key in table.unique_keys() {
        let is_primary = key.as_slice() == primary_key;
        let kind = if is_primary {
            ViolationKind::PrimaryKey
        } else {
            ViolationKind::Unique
        };
        let path = key_path(&table.name, &key);
        let mut seen = HashSet::with_capacity(rows.len());

        for (row_idx, row) in rows.iter().enumerate() {
            let values = key_values(row, &key);
            if values.iter().any(GeneratedValue::is_null) {
                if is_primary {
                    sink.record(kind, path.clone(), "null value in primary key", row_idx, None);
                }
                continue;
            }
            let tuple = tuple_key(&values);
            if !seen.insert(tuple.clone()) {
                sink.record(kind, path.clone(), "duplicate key detected", row_idx, Some(tuple));
            }
        }
    }
}

/// Every non-null reference must name an existing parent key. Partially null
/// references are not matched, as in SQL `MATCH SIMPLE`.
fn check_foreign_key(
    table: &Table,
    fk: &ForeignKey,
    rows: &[Row],
    dataset: &GeneratedDataset,
    sink: &mut ViolationSink,
) {
    let parent_rows = if fk.is_self_reference(&table.name) {
        rows
    } else {
        dataset.rows(&fk.referenced_table).unwrap_or(&[])
    };
    let parent_keys: HashSet<String> = parent_rows
        .iter()
        .map(|row| key_values(row, &fk.referenced_columns))
        .filter(|values| !values.iter().any(GeneratedValue::is_null))
        .map(|values| tuple_key(&values))
        .collect();

    let path = format!(
        "{} -> {}",
        key_path(&table.name, &fk.columns),
        key_path(&fk.referenced_table, &fk.referenced_columns)
    );
    for (row_idx, row) in rows.iter().enumerate() {
        let values = key_values(row, &fk.columns);
        if values.iter().any(GeneratedValue::is_null) {
            continue;
        }
        let tuple = tuple_key(&values);
        if !parent_keys.contains(&tuple) {
            sink.record(
                ViolationKind::ForeignKey,
                path.clone(),
                "broken foreign key reference",
                row_idx,
                Some(tuple),
            );
        }
    }
}

fn row_count_finding(
    table: &Table,
    found: u64,
    expected: u64,
    spec: &TableScenario,
) -> StatisticalFinding {
    let band = spec.row_tolerance.unwrap_or(Threshold::new(0.0, 0.0));
    let score = if expected == 0 {
        found as f64
    } else {
        found.abs_diff(expected) as f64 / expected as f64
    };
    StatisticalFinding {
        observed: Some(found as f64),
        expected: Some(expected as f64),
        ..StatisticalFinding::scored(FindingKind::RowCount, &table.name, "relative_delta", score, band)
    }
}

fn categorical_finding(
    rows: &[Row],
    column: &str,
    distribution: &Distribution,
    band: Threshold,
) -> StatisticalFinding {
    let Some(expected) = distribution.probabilities() else {
        return StatisticalFinding::unmeasurable(
            FindingKind::Distribution,
            column,
            "psi",
            band,
            "categorical weights sum to zero",
        );
    };
    let mut counts: BTreeMap<String, u64> = BTreeMap::new();
    for row in rows {
        if let Some(value) = row.get(column).filter(|value| !value.is_null()) {
            *counts.entry(value.key()).or_default() += 1;
        }
    }
    let total: u64 = counts.values().sum();
    if total == 0 {
        return StatisticalFinding::unmeasurable(
            FindingKind::Distribution,
            column,
            "psi",
            band,
            "no non-null values",
        );
    }
    let observed: BTreeMap<String, f64> = counts
        .into_iter()
        .map(|(label, count)| (label, count as f64 / total as f64))
        .collect();
    StatisticalFinding::scored(
        FindingKind::Distribution,
        column,
        "psi",
        psi(&observed, &expected),
        band,
    )
}

fn continuous_finding(
    rows: &[Row],
    column: &str,
    distribution: &Distribution,
    band: Threshold,
) -> StatisticalFinding {
    let values: Vec<f64> = rows
        .iter()
        .filter_map(|row| row.get(column)?.as_f64())
        .collect();
    match ks_statistic(&values, distribution) {
        Some(d) => StatisticalFinding::scored(FindingKind::Distribution, column, "ks", d, band),
        None => StatisticalFinding::unmeasurable(
            FindingKind::Distribution,
            column,
            "ks",
            band,
            "no numeric values",
        ),
    }
}

/// Share of rows whose value is not `start + step * row_index`.
fn sequence_off_fraction(rows: &[Row], column: &str, start: f64, step: f64) -> f64 {
    let off = rows
        .iter()
        .enumerate()
        .filter(|(row_idx, row)| {
            let expected = start + step * *row_idx as f64;
            match row.get(column).and_then(GeneratedValue::as_f64) {
                Some(value) => (value - expected).abs() > 1e-6 * expected.abs().max(1.0),
                None => true,
            }
        })
        .count();
    fraction(off, rows.len())
}

fn profile_columns(table: &Table, rows: &[Row]) -> Vec<ColumnProfile> {
    table
        .columns
        .iter()
        .map(|column| {
            let mut null_count = 0_u64;
            let mut distinct = HashSet::new();
            let mut min: Option<f64> = None;
            let mut max: Option<f64> = None;
            for row in rows {
                let value = row.get(&column.name).unwrap_or(&NULL);
                if value.is_null() {
                    null_count += 1;
                    continue;
                }
                distinct.insert(value.key());
                if let Some(number) = value.as_f64() {
                    min = Some(min.map_or(number, |current| current.min(number)));
                    max = Some(max.map_or(number, |current| current.max(number)));
                }
            }
            ColumnProfile {
                column: column.name.clone(),
                null_count,
                distinct_count: distinct.len() as u64,
                min,
                max,
            }
        })
        .collect()
}

fn key_values(row: &Row, columns: &[String]) -> Vec<GeneratedValue> {
    columns
        .iter()
        .map(|column| row.get(column).cloned().unwrap_or(GeneratedValue::Null))
        .collect()
}

fn column_path(table: &str, column: &str) -> String {
    format!("{table}.{column}")
}

fn key_path(table: &str, columns: &[String]) -> String {
    match columns {
        [single] => column_path(table, single),
        _ => format!("{table}.({})", columns.join(",")),
    }
}

fn parse_day(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

fn fraction(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}
