use std::collections::BTreeSet;

use chrono::NaiveDate;
use jsonschema::JSONSchema;
use relsynth_core::{Column, DatabaseSchema, SemanticType, Table};
use serde_json::Value;

use crate::errors::{ScenarioError, ValidationIssue, ValidationReport};
use crate::model::{
    ColumnSpec, CorrelationSpec, Distribution, Scenario, SelectionPolicy, TableScenario,
    TemporalRule, TemporalShape, Threshold,
};
use crate::schema::scenario_json_schema;

/// Validated scenario with accumulated warnings.
#[derive(Debug, Clone)]
pub struct ValidatedScenario {
    pub scenario: Scenario,
    pub warnings: Vec<ValidationIssue>,
}

/// Validate a scenario JSON document against a scenario JSON Schema.
pub fn validate_scenario_json(
    scenario_json: &Value,
    scenario_schema: &Value,
) -> Result<ValidationReport, ScenarioError> {
    let compiled = JSONSchema::compile(scenario_schema)
        .map_err(|err| ScenarioError::Schema(err.to_string()))?;

    let mut report = ValidationReport::default();

    if let Err(errors) = compiled.validate(scenario_json) {
        for error in errors {
            let path = normalized_json_pointer(&error.instance_path.to_string());
            report.push_error(ValidationIssue::error(
                "schema_violation",
                path,
                error.to_string(),
            ));
        }
    }

    Ok(report)
}

/// Validate the scenario end-to-end: JSON Schema shape, parse, then schema fit.
pub fn validate_scenario_document(
    scenario_json: &Value,
    schema: &DatabaseSchema,
) -> Result<ValidatedScenario, ValidationReport> {
    let structural = serde_json::to_value(scenario_json_schema())
        .map_err(ScenarioError::from)
        .and_then(|scenario_schema| validate_scenario_json(scenario_json, &scenario_schema));
    let structural = match structural {
        Ok(report) => report,
        Err(err) => {
            let mut report = ValidationReport::default();
            report.push_error(ValidationIssue::error(
                "schema_validation_error",
                "/",
                err.to_string(),
            ));
            return Err(report);
        }
    };

    if !structural.is_ok() {
        return Err(structural);
    }

    let scenario: Scenario = match serde_json::from_value(scenario_json.clone()) {
        Ok(scenario) => scenario,
        Err(err) => {
            let mut report = ValidationReport::default();
            report.push_error(ValidationIssue::error(
                "invalid_scenario_json",
                "/",
                err.to_string(),
            ));
            return Err(report);
        }
    };

    let schema_report = validate_scenario(&scenario, schema);
    if !schema_report.is_ok() {
        return Err(schema_report);
    }

    Ok(ValidatedScenario {
        scenario,
        warnings: schema_report.warnings,
    })
}

/// Fail with [`ScenarioError::Validation`] when the scenario does not fit the schema.
pub fn validate_scenario_strict(
    scenario: &Scenario,
    schema: &DatabaseSchema,
) -> Result<ValidationReport, ScenarioError> {
    let report = validate_scenario(scenario, schema);
    if report.is_ok() {
        Ok(report)
    } else {
        Err(ScenarioError::Validation(report))
    }
}

/// Validate a parsed scenario against a schema.
pub fn validate_scenario(scenario: &Scenario, schema: &DatabaseSchema) -> ValidationReport {
    let mut report = ValidationReport::default();

    for (table_name, table_scenario) in &scenario.tables {
        let base_path = format!("/tables/{table_name}");
        let Some(table) = schema.table(table_name) else {
            report.push_error(
                ValidationIssue::error(
                    "unknown_table",
                    base_path,
                    format!("table '{table_name}' not found in schema"),
                )
                .with_hint("remove the entry or fix the table name"),
            );
            continue;
        };

        validate_table(table, table_scenario, &base_path, &mut report);
    }

    report
}

fn validate_table(
    table: &Table,
    table_scenario: &TableScenario,
    base_path: &str,
    report: &mut ValidationReport,
) {
    if let Some(tolerance) = &table_scenario.row_tolerance {
        validate_threshold(tolerance, &format!("{base_path}/row_tolerance"), report);
    }

    if let Some(strategy) = &table_scenario.strategy
        && strategy.trim().is_empty()
    {
        report.push_error(ValidationIssue::error(
            "empty_strategy",
            format!("{base_path}/strategy"),
            "strategy must be a non-empty synthesizer name",
        ));
    }

    for (column_name, spec) in &table_scenario.columns {
        let path = format!("{base_path}/columns/{column_name}");
        match table.column(column_name) {
            Some(column) => validate_column_spec(table, column, spec, &path, report),
            None => report.push_error(ValidationIssue::error(
                "unknown_column",
                path,
                format!("column '{}.{}' not found in schema", table.name, column_name),
            )),
        }
    }

    let mut targets = BTreeSet::new();
    for (idx, correlation) in table_scenario.correlations.iter().enumerate() {
        let path = format!("{base_path}/correlations/{idx}");
        validate_correlation(table, correlation, &path, report);
        if !targets.insert(correlation.target.as_str()) {
            report.push_error(ValidationIssue::error(
                "correlation_target_conflict",
                format!("{path}/target"),
                format!(
                    "column '{}' is the target of more than one correlation",
                    correlation.target
                ),
            ));
        }
    }

    for (idx, rule) in table_scenario.temporal.iter().enumerate() {
        validate_temporal(table, rule, &format!("{base_path}/temporal/{idx}"), report);
    }

    if let Some(SelectionPolicy::Skewed { exponent }) = &table_scenario.fk_selection
        && !(exponent.is_finite() && *exponent > 0.0)
    {
        report.push_error(ValidationIssue::error(
            "invalid_fk_selection",
            format!("{base_path}/fk_selection/exponent"),
            "skew exponent must be a positive number",
        ));
    }
    if table_scenario.fk_selection.is_some() && table.foreign_keys.is_empty() {
        report.push_warning(ValidationIssue::warning(
            "fk_selection_without_foreign_keys",
            format!("{base_path}/fk_selection"),
            format!("table '{}' declares no foreign keys", table.name),
        ));
    }

    if let Some(tolerances) = &table_scenario.tolerances {
        if let Some(threshold) = &tolerances.distribution {
            validate_threshold(
                threshold,
                &format!("{base_path}/tolerances/distribution"),
                report,
            );
        }
        if let Some(threshold) = &tolerances.correlation {
            validate_threshold(
                threshold,
                &format!("{base_path}/tolerances/correlation"),
                report,
            );
        }
    }
}

fn validate_column_spec(
    table: &Table,
    column: &Column,
    spec: &ColumnSpec,
    path: &str,
    report: &mut ValidationReport,
) {
    if let Some(probability) = spec.null_probability {
        if !(0.0..=1.0).contains(&probability) {
            report.push_error(ValidationIssue::error(
                "invalid_null_probability",
                format!("{path}/null_probability"),
                "null_probability must be within [0, 1]",
            ));
        } else if probability > 0.0 && !column.is_nullable {
            report.push_error(
                ValidationIssue::error(
                    "null_probability_not_nullable",
                    format!("{path}/null_probability"),
                    format!("column '{}.{}' is not nullable", table.name, column.name),
                )
                .with_hint("drop null_probability or make the column nullable"),
            );
        }
    }

    let Some(distribution) = &spec.distribution else {
        return;
    };
    let path = format!("{path}/distribution");

    if let Some(message) = distribution_parameter_error(distribution) {
        report.push_error(ValidationIssue::error("invalid_distribution", &path, message));
        return;
    }

    let semantic = column.semantic();
    let fits = match distribution {
        Distribution::Categorical { weights } => {
            weights.keys().all(|label| label_fits(label, semantic))
        }
        _ => semantic.is_numeric(),
    };
    if !fits {
        report.push_error(ValidationIssue::error(
            "distribution_type_mismatch",
            &path,
            format!(
                "{} distribution does not fit {} column '{}.{}'",
                distribution.kind(),
                semantic.as_str(),
                table.name,
                column.name
            ),
        ));
        return;
    }

    if table.is_foreign_key_column(&column.name) {
        report.push_warning(
            ValidationIssue::warning(
                "distribution_on_foreign_key",
                &path,
                format!(
                    "values of '{}.{}' are drawn from the parent key pool",
                    table.name, column.name
                ),
            )
            .with_hint("use fk_selection to shape foreign-key fan-out"),
        );
    } else if table.is_unique_column(&column.name)
        && !matches!(distribution, Distribution::Sequence { .. })
    {
        report.push_warning(ValidationIssue::warning(
            "distribution_on_key",
            &path,
            format!(
                "unique column '{}.{}' receives sequential values",
                table.name, column.name
            ),
        ));
    }
}

fn distribution_parameter_error(distribution: &Distribution) -> Option<String> {
    let finite = |values: &[f64]| values.iter().all(|value| value.is_finite());
    match distribution {
        Distribution::Uniform { min, max } => {
            if !finite(&[*min, *max]) || min > max {
                return Some("uniform requires finite min <= max".to_string());
            }
        }
        Distribution::Normal { mean, std_dev } => {
            if !finite(&[*mean, *std_dev]) || *std_dev <= 0.0 {
                return Some("normal requires a positive std_dev".to_string());
            }
        }
        Distribution::LogNormal { mu, sigma } => {
            if !finite(&[*mu, *sigma]) || *sigma <= 0.0 {
                return Some("log_normal requires a positive sigma".to_string());
            }
        }
        Distribution::Exponential { rate } => {
            if !finite(&[*rate]) || *rate <= 0.0 {
                return Some("exponential requires a positive rate".to_string());
            }
        }
        Distribution::Categorical { weights } => {
            if weights.is_empty() {
                return Some("categorical requires at least one label".to_string());
            }
            if weights
                .values()
                .any(|weight| !weight.is_finite() || *weight < 0.0)
            {
                return Some("categorical weights must be non-negative".to_string());
            }
            if weights.values().sum::<f64>() <= 0.0 {
                return Some("categorical weights must not all be zero".to_string());
            }
        }
        Distribution::Sequence { start, step } => {
            if !finite(&[*start, *step]) || *step == 0.0 {
                return Some("sequence requires a non-zero step".to_string());
            }
        }
    }
    None
}

fn label_fits(label: &str, semantic: SemanticType) -> bool {
    match semantic {
        SemanticType::Text | SemanticType::Uuid => true,
        SemanticType::Integer => label.trim().parse::<i64>().is_ok(),
        SemanticType::Decimal => label.trim().parse::<f64>().is_ok(),
        SemanticType::Boolean => matches!(label.trim(), "true" | "false"),
        SemanticType::Date => NaiveDate::parse_from_str(label.trim(), "%Y-%m-%d").is_ok(),
        SemanticType::Timestamp | SemanticType::Time | SemanticType::Json => false,
    }
}

fn validate_correlation(
    table: &Table,
    correlation: &CorrelationSpec,
    path: &str,
    report: &mut ValidationReport,
) {
    for (field, name) in [("source", &correlation.source), ("target", &correlation.target)] {
        match table.column(name) {
            None => report.push_error(ValidationIssue::error(
                "correlation_unknown_column",
                format!("{path}/{field}"),
                format!("column '{}.{}' not found in schema", table.name, name),
            )),
            Some(column) if !column.semantic().is_numeric() => {
                report.push_error(ValidationIssue::error(
                    "correlation_non_numeric",
                    format!("{path}/{field}"),
                    format!(
                        "column '{}.{}' is {}, correlations need numeric columns",
                        table.name,
                        name,
                        column.semantic().as_str()
                    ),
                ))
            }
            Some(_) => {}
        }
    }

    if correlation.source == correlation.target {
        report.push_error(ValidationIssue::error(
            "correlation_self",
            path,
            "a column cannot be correlated with itself",
        ));
    }

    if !(correlation.coefficient.is_finite() && correlation.coefficient.abs() <= 1.0) {
        report.push_error(ValidationIssue::error(
            "correlation_out_of_range",
            format!("{path}/coefficient"),
            "coefficient must be within [-1, 1]",
        ));
    }
}

fn validate_temporal(table: &Table, rule: &TemporalRule, path: &str, report: &mut ValidationReport) {
    let check_column = |field: &str, name: &str, report: &mut ValidationReport| {
        match table.column(name) {
            None => report.push_error(ValidationIssue::error(
                "temporal_unknown_column",
                format!("{path}/{field}"),
                format!("column '{}.{}' not found in schema", table.name, name),
            )),
            Some(column) if !column.semantic().is_temporal() => {
                report.push_error(ValidationIssue::error(
                    "temporal_non_temporal_column",
                    format!("{path}/{field}"),
                    format!(
                        "column '{}.{}' is {}, temporal rules need date or timestamp columns",
                        table.name,
                        name,
                        column.semantic().as_str()
                    ),
                ))
            }
            Some(_) => {}
        }
    };

    match rule {
        TemporalRule::Pattern {
            column,
            start,
            end,
            shape,
        } => {
            check_column("column", column, report);
            let window = parse_window(start, end);
            match window {
                Some((start, end)) if start < end => {}
                _ => report.push_error(ValidationIssue::error(
                    "invalid_temporal_range",
                    path,
                    "start and end must be ISO dates with start < end",
                )),
            }
            if let Some(message) = shape_parameter_error(shape) {
                report.push_error(ValidationIssue::error(
                    "invalid_temporal_shape",
                    format!("{path}/shape"),
                    message,
                ));
            }
        }
        TemporalRule::After {
            column,
            after,
            min_gap_seconds,
            max_gap_seconds,
        } => {
            check_column("column", column, report);
            check_column("after", after, report);
            if column == after {
                report.push_error(ValidationIssue::error(
                    "temporal_self_reference",
                    path,
                    "a column cannot be ordered after itself",
                ));
            }
            if *min_gap_seconds < 0 || min_gap_seconds > max_gap_seconds {
                report.push_error(ValidationIssue::error(
                    "invalid_temporal_gap",
                    path,
                    "gap window must satisfy 0 <= min_gap_seconds <= max_gap_seconds",
                ));
            }
        }
    }
}

fn shape_parameter_error(shape: &TemporalShape) -> Option<String> {
    match shape {
        TemporalShape::Uniform => None,
        TemporalShape::Trend { growth } => (!(growth.is_finite() && *growth > 0.0))
            .then(|| "trend growth must be positive".to_string()),
        TemporalShape::Seasonal {
            period_days,
            amplitude,
        } => (!(period_days.is_finite()
            && *period_days > 0.0
            && (0.0..=1.0).contains(amplitude)))
        .then(|| "seasonal requires period_days > 0 and amplitude in [0, 1]".to_string()),
        TemporalShape::Surge {
            start,
            end,
            multiplier,
        } => {
            let window_ok = matches!(parse_window(start, end), Some((start, end)) if start <= end);
            (!(window_ok && multiplier.is_finite() && *multiplier > 0.0))
                .then(|| "surge requires an ISO date window and a positive multiplier".to_string())
        }
    }
}

fn parse_window(start: &str, end: &str) -> Option<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::parse_from_str(start, "%Y-%m-%d").ok()?;
    let end = NaiveDate::parse_from_str(end, "%Y-%m-%d").ok()?;
    Some((start, end))
}

fn validate_threshold(threshold: &Threshold, path: &str, report: &mut ValidationReport) {
    let valid = threshold.warn.is_finite()
        && threshold.fail.is_finite()
        && threshold.warn >= 0.0
        && threshold.warn <= threshold.fail;
    if !valid {
        report.push_error(ValidationIssue::error(
            "invalid_threshold",
            path,
            "threshold requires 0 <= warn <= fail",
        ));
    }
}

fn normalized_json_pointer(pointer: &str) -> String {
    if pointer.is_empty() {
        "/".to_string()
    } else {
        pointer.to_string()
    }
}
