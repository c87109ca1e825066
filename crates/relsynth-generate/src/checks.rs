use std::collections::HashMap;

use chrono::NaiveDate;
use regex::Regex;
use relsynth_core::CheckPredicate;

use crate::dataset::Row;
use crate::value::GeneratedValue;

/// Result of evaluating a CHECK constraint expression.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    Passed,
    Failed,
    Unsupported,
}

/// Context for evaluating CHECK constraints against one row.
#[derive(Debug)]
pub struct CheckContext<'a> {
    pub values: &'a Row,
    /// Value of `current_date`.
    pub base_date: NaiveDate,
}

/// Evaluate a subset of SQL CHECK expressions: AND chains, `IS [NOT] NULL`,
/// `IN (...)`, `= ANY (ARRAY[...])`, `BETWEEN`, comparisons against literals
/// or other columns, and `position(...)`. Anything else is `Unsupported`.
pub fn evaluate_check(expression: &str, ctx: &CheckContext<'_>) -> CheckOutcome {
    let expr = normalize_expression(expression);

    // The first conjunct that does not pass decides the outcome.
    if let Some(parts) = split_and(&expr) {
        return parts
            .iter()
            .map(|part| evaluate_check(part, ctx))
            .find(|result| *result != CheckOutcome::Passed)
            .unwrap_or(CheckOutcome::Passed);
    }

    if let Some((column, rest)) = parse_is_null_or(&expr) {
        return if is_null(&column, ctx) {
            CheckOutcome::Passed
        } else {
            evaluate_check(&rest, ctx)
        };
    }

    if let Some(column) = parse_is_not_null(&expr) {
        return outcome(!is_null(&column, ctx));
    }

    if let Some((column, values)) = parse_any_array(&expr) {
        return evaluate_in(&column, &values, ctx);
    }

    if let Some((column, values)) = parse_in_list(&expr) {
        return evaluate_in(&column, &values, ctx);
    }

    if let Some((column, min, max)) = parse_between(&expr) {
        return evaluate_between(&column, &min, &max, ctx);
    }

    if let Some((column, op, rhs)) = parse_comparison(&expr) {
        return evaluate_comparison(&column, op, &rhs, ctx);
    }

    if let Some((needle, column, op, rhs)) = parse_position(&expr) {
        return evaluate_position(&needle, &column, op, rhs, ctx);
    }

    CheckOutcome::Unsupported
}

fn normalize_expression(expression: &str) -> String {
    let mut expr = expression.trim().to_string();
    if expr.to_uppercase().starts_with("CHECK") {
        expr = expr[5..].trim().to_string();
    }
    while wrapped_in_parens(&expr) {
        expr = expr[1..expr.len() - 1].trim().to_string();
    }
    expr
}

/// Whether the first `(` closes at the last character.
fn wrapped_in_parens(expr: &str) -> bool {
    if !(expr.starts_with('(') && expr.ends_with(')')) {
        return false;
    }
    let mut depth = 0_i32;
    for (idx, ch) in expr.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return idx == expr.len() - 1;
                }
            }
            _ => {}
        }
    }
    false
}

/// Split top-level `AND` conjuncts, keeping `BETWEEN x AND y` together.
fn split_and(expr: &str) -> Option<Vec<String>> {
    let re = Regex::new(r"(?i)\s+and\s+").ok()?;
    let between = Regex::new(r"(?i)\bbetween\s+\S+$").ok()?;
    let mut parts: Vec<String> = Vec::new();
    for piece in re.split(expr) {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }
        match parts.last_mut() {
            Some(last) if between.is_match(last) => {
                last.push_str(" AND ");
                last.push_str(piece);
            }
            _ => parts.push(piece.to_string()),
        }
    }
    if parts.len() > 1 { Some(parts) } else { None }
}

fn parse_is_null_or(expr: &str) -> Option<(String, String)> {
    let re = Regex::new(r"(?i)^\s*(\w+)\s+is\s+null\s+or\s+(.+)$").ok()?;
    let caps = re.captures(expr)?;
    Some((caps[1].to_lowercase(), caps[2].trim().to_string()))
}

fn parse_is_not_null(expr: &str) -> Option<String> {
    let re = Regex::new(r"(?i)^\s*(\w+)\s+is\s+not\s+null\s*$").ok()?;
    let caps = re.captures(expr)?;
    Some(caps[1].to_lowercase())
}

fn parse_in_list(expr: &str) -> Option<(String, Vec<String>)> {
    let re = Regex::new(r"(?i)^\s*(\w+)\s+in\s*\(([^\)]+)\)\s*$").ok()?;
    let caps = re.captures(expr)?;
    let values = caps[2].split(',').map(normalize_literal).collect();
    Some((caps[1].to_lowercase(), values))
}

fn parse_between(expr: &str) -> Option<(String, String, String)> {
    let re = Regex::new(r"(?i)^\s*(\w+)\s+between\s+([^\s]+)\s+and\s+([^\s]+)\s*$").ok()?;
    let caps = re.captures(expr)?;
    Some((
        caps[1].to_lowercase(),
        normalize_literal(&caps[2]),
        normalize_literal(&caps[3]),
    ))
}

fn parse_comparison(expr: &str) -> Option<(String, CompareOp, String)> {
    let re = Regex::new(r"(?i)^\s*(\w+)\s*(=|>=|<=|>|<)\s*([^\s]+)\s*$").ok()?;
    let caps = re.captures(expr)?;
    Some((
        caps[1].to_lowercase(),
        CompareOp::parse(&caps[2])?,
        normalize_literal(&caps[3]),
    ))
}

fn parse_position(expr: &str) -> Option<(String, String, CompareOp, i64)> {
    let re = Regex::new(
        r"(?i)^\s*position\(\(?\s*'\s*([^']*)\s*'(?:::text)?\s*\)?\s+in\s+\(?\s*(\w+)\s*\)?\s*\)\s*(=|>=|<=|>|<)\s*(\d+)\s*$",
    )
    .ok()?;
    let caps = re.captures(expr)?;
    Some((
        caps[1].to_string(),
        caps[2].to_lowercase(),
        CompareOp::parse(&caps[3])?,
        caps[4].parse().ok()?,
    ))
}

fn parse_any_array(expr: &str) -> Option<(String, Vec<String>)> {
    let re = Regex::new(r"(?i)^\s*(\w+)\s*=\s*any\s*\(array\[([^\]]+)\]\)\s*$").ok()?;
    let caps = re.captures(expr)?;
    let values = caps[2].split(',').map(normalize_literal).collect();
    Some((caps[1].to_lowercase(), values))
}

fn evaluate_in(column: &str, values: &[String], ctx: &CheckContext<'_>) -> CheckOutcome {
    match get_value(column, ctx) {
        Some(value) if value.is_null() => CheckOutcome::Passed,
        Some(value) => {
            let candidate = value.key();
            outcome(values.iter().any(|allowed| *allowed == candidate))
        }
        None => CheckOutcome::Unsupported,
    }
}

/// Inclusive on both ends; bounds may be numbers, date literals or `current_date`.
fn evaluate_between(column: &str, min: &str, max: &str, ctx: &CheckContext<'_>) -> CheckOutcome {
    let value = match get_value(column, ctx) {
        Some(value) if value.is_null() => return CheckOutcome::Passed,
        Some(value) => value,
        None => return CheckOutcome::Unsupported,
    };

    if let Some(num) = value.as_f64()
        && let (Ok(low), Ok(high)) = (min.parse::<f64>(), max.parse::<f64>())
    {
        return outcome((low..=high).contains(&num));
    }

    if let Some(date) = value.as_date()
        && let (Some(low), Some(high)) = (
            parse_date_literal(min, ctx.base_date),
            parse_date_literal(max, ctx.base_date),
        )
    {
        return outcome((low..=high).contains(&date));
    }

    CheckOutcome::Unsupported
}

fn evaluate_comparison(
    column: &str,
    op: CompareOp,
    rhs: &str,
    ctx: &CheckContext<'_>,
) -> CheckOutcome {
    let left = match get_value(column, ctx) {
        Some(value) if value.is_null() => return CheckOutcome::Passed,
        Some(value) => value,
        None => return CheckOutcome::Unsupported,
    };
    if get_value(rhs, ctx).is_some_and(GeneratedValue::is_null) {
        return CheckOutcome::Passed;
    }

    if let Some(num) = left.as_f64()
        && let Some(rhs_val) = parse_numeric_or_column(rhs, ctx).and_then(|v| v.as_f64())
    {
        return outcome(op.holds_f64(num, rhs_val));
    }

    if let Some(date) = left.as_date()
        && let Some(rhs_date) =
            parse_date_literal(rhs, ctx.base_date).or_else(|| parse_column_date(rhs, ctx))
    {
        return outcome(op.holds(date, rhs_date));
    }

    // Text supports equality only.
    if let Some(text) = left.as_str()
        && let Some(rhs_text) = parse_text_literal(rhs)
    {
        return outcome(op == CompareOp::Eq && text == rhs_text);
    }

    CheckOutcome::Unsupported
}

/// `position('x' in col) <op> n`, with 1-based positions and 0 for no match.
fn evaluate_position(
    needle: &str,
    column: &str,
    op: CompareOp,
    rhs: i64,
    ctx: &CheckContext<'_>,
) -> CheckOutcome {
    match get_value(column, ctx).and_then(|v| v.as_str()) {
        Some(value) => {
            let pos = value.find(needle).map(|idx| idx as i64 + 1).unwrap_or(0);
            outcome(op.holds(pos, rhs))
        }
        None => CheckOutcome::Unsupported,
    }
}

fn parse_numeric_or_column(rhs: &str, ctx: &CheckContext<'_>) -> Option<GeneratedValue> {
    if let Ok(value) = rhs.parse::<f64>() {
        return Some(GeneratedValue::Float(value));
    }
    get_value(rhs, ctx).cloned()
}

fn parse_text_literal(rhs: &str) -> Option<String> {
    if rhs.starts_with('\'') && rhs.ends_with('\'') && rhs.len() >= 2 {
        return Some(rhs[1..rhs.len() - 1].to_string());
    }
    None
}

fn parse_date_literal(rhs: &str, base_date: NaiveDate) -> Option<NaiveDate> {
    if rhs.eq_ignore_ascii_case("current_date") {
        return Some(base_date);
    }
    if rhs.starts_with('\'') && rhs.ends_with('\'') {
        let trimmed = &rhs[1..rhs.len() - 1];
        return NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").ok();
    }
    None
}

fn parse_column_date(column: &str, ctx: &CheckContext<'_>) -> Option<NaiveDate> {
    get_value(column, ctx).and_then(|value| value.as_date())
}

/// Comparison operator of a `col <op> rhs` conjunct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareOp {
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
}

impl CompareOp {
    fn parse(op: &str) -> Option<Self> {
        match op {
            "<" => Some(CompareOp::Lt),
            "<=" => Some(CompareOp::Le),
            "=" => Some(CompareOp::Eq),
            ">=" => Some(CompareOp::Ge),
            ">" => Some(CompareOp::Gt),
            _ => None,
        }
    }

    fn holds<T: PartialOrd>(self, left: T, right: T) -> bool {
        match self {
            CompareOp::Lt => left < right,
            CompareOp::Le => left <= right,
            CompareOp::Eq => left == right,
            CompareOp::Ge => left >= right,
            CompareOp::Gt => left > right,
        }
    }

    /// Like `holds`, with float equality inside one epsilon.
    fn holds_f64(self, left: f64, right: f64) -> bool {
        match self {
            CompareOp::Eq => (left - right).abs() < f64::EPSILON,
            _ => self.holds(left, right),
        }
    }
}

fn outcome(passed: bool) -> CheckOutcome {
    if passed {
        CheckOutcome::Passed
    } else {
        CheckOutcome::Failed
    }
}

fn is_null(column: &str, ctx: &CheckContext<'_>) -> bool {
    get_value(column, ctx)
        .map(|value| value.is_null())
        .unwrap_or(false)
}

fn get_value<'a>(column: &str, ctx: &'a CheckContext<'_>) -> Option<&'a GeneratedValue> {
    ctx.values.get(column).or_else(|| {
        ctx.values
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, value)| value)
    })
}

fn normalize_literal(value: &str) -> String {
    let trimmed = value.trim().trim_matches('(').trim_matches(')');
    let without_cast = match trimmed.split_once("::") {
        Some((left, _)) => left.trim(),
        None => trimmed,
    };
    let stripped = without_cast.trim();
    if stripped.starts_with('\'') && stripped.ends_with('\'') && stripped.len() >= 2 {
        stripped[1..stripped.len() - 1].to_string()
    } else {
        stripped.to_string()
    }
}

/// Inclusive numeric bounds implied by a CHECK expression.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NumericBounds {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl NumericBounds {
    pub fn clamp(&self, value: GeneratedValue) -> GeneratedValue {
        match value {
            GeneratedValue::Int(value) => {
                let mut value = value as f64;
                if let Some(min) = self.min {
                    value = value.max(min.ceil());
                }
                if let Some(max) = self.max {
                    value = value.min(max.floor());
                }
                GeneratedValue::Int(value.round() as i64)
            }
            GeneratedValue::Float(value) => {
                let mut value = value;
                if let Some(min) = self.min {
                    value = value.max(min);
                }
                if let Some(max) = self.max {
                    value = value.min(max);
                }
                GeneratedValue::Float(value)
            }
            other => other,
        }
    }

    fn update(&mut self, min: Option<f64>, max: Option<f64>) {
        if let Some(min) = min {
            self.min = Some(self.min.map(|v| v.max(min)).unwrap_or(min));
        }
        if let Some(max) = max {
            self.max = Some(self.max.map(|v| v.min(max)).unwrap_or(max));
        }
    }
}

/// Per-column numeric bounds from `col BETWEEN a AND b` and `col >= n` style
/// conjuncts. Keys are lowercase column names.
pub fn numeric_bounds(expression: &str) -> HashMap<String, NumericBounds> {
    let expr = normalize_expression(expression);
    let parts = split_and(&expr).unwrap_or_else(|| vec![expr.clone()]);
    let mut bounds: HashMap<String, NumericBounds> = HashMap::new();
    for part in parts {
        if let Some((column, min, max)) = parse_between(&part)
            && let (Ok(min), Ok(max)) = (min.parse::<f64>(), max.parse::<f64>())
        {
            bounds.entry(column).or_default().update(Some(min), Some(max));
            continue;
        }
        if let Some((column, op, rhs)) = parse_comparison(&part)
            && let Ok(value) = rhs.parse::<f64>()
        {
            let entry = bounds.entry(column).or_default();
            match op {
                CompareOp::Ge => entry.update(Some(value), None),
                CompareOp::Gt => entry.update(Some(value + 1.0), None),
                CompareOp::Le => entry.update(None, Some(value)),
                CompareOp::Lt => entry.update(None, Some(value - 1.0)),
                CompareOp::Eq => entry.update(Some(value), Some(value)),
            }
        }
    }
    bounds
}

/// Enumerated labels from `col IN (...)` and `col = ANY (ARRAY[...])`
/// conjuncts. Keys are lowercase column names.
pub fn allowed_values(expression: &str) -> HashMap<String, Vec<String>> {
    let expr = normalize_expression(expression);
    let parts = split_and(&expr).unwrap_or_else(|| vec![expr.clone()]);
    let mut allowed = HashMap::new();
    for part in parts {
        let part = normalize_expression(&part);
        if let Some((column, values)) = parse_in_list(&part).or_else(|| parse_any_array(&part)) {
            allowed.insert(column, values);
        }
    }
    allowed
}

/// Column-level predicate with its pattern compiled once.
#[derive(Debug, Clone)]
pub struct PredicateEvaluator {
    column: String,
    predicate: CheckPredicate,
    pattern: Option<Regex>,
}

impl PredicateEvaluator {
    pub fn new(column: impl Into<String>, predicate: &CheckPredicate) -> Self {
        let pattern = match predicate {
            CheckPredicate::Pattern { regex } => Regex::new(&format!("^(?:{regex})$")).ok(),
            _ => None,
        };
        Self {
            column: column.into(),
            predicate: predicate.clone(),
            pattern,
        }
    }

    /// Evaluate against a row; nulls pass, as in SQL.
    pub fn evaluate(&self, row: &Row, base_date: NaiveDate) -> CheckOutcome {
        let value = match row.get(&self.column) {
            Some(value) if !value.is_null() => value,
            _ => return CheckOutcome::Passed,
        };
        let passed = match &self.predicate {
            CheckPredicate::Range { min, max } => match value.as_f64() {
                Some(number) => {
                    min.is_none_or(|min| number >= min) && max.is_none_or(|max| number <= max)
                }
                None => return CheckOutcome::Unsupported,
            },
            CheckPredicate::OneOf { values } => {
                let key = value.key();
                values.iter().any(|allowed| *allowed == key)
            }
            CheckPredicate::Pattern { .. } => match (&self.pattern, value.as_str()) {
                (Some(pattern), Some(text)) => pattern.is_match(text),
                _ => return CheckOutcome::Unsupported,
            },
            CheckPredicate::Expression { expression } => {
                let ctx = CheckContext {
                    values: row,
                    base_date,
                };
                return evaluate_check(expression, &ctx);
            }
        };
        outcome(passed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(values: &[(&str, GeneratedValue)]) -> Row {
        values
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    fn base_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default()
    }

    #[test]
    fn evaluates_and_chains_with_case_preserved_literals() {
        let values = row(&[
            ("status", GeneratedValue::Text("Shipped".to_string())),
            ("qty", GeneratedValue::Int(3)),
        ]);
        let ctx = CheckContext {
            values: &values,
            base_date: base_date(),
        };
        assert_eq!(
            evaluate_check("CHECK ((status IN ('Placed', 'Shipped')) AND qty > 0)", &ctx),
            CheckOutcome::Passed
        );
        assert_eq!(
            evaluate_check("qty BETWEEN 5 AND 10", &ctx),
            CheckOutcome::Failed
        );
        assert_eq!(
            evaluate_check("lower(status) ~ 'x'", &ctx),
            CheckOutcome::Unsupported
        );
    }

    #[test]
    fn cross_column_comparison_and_nulls() {
        let values = row(&[
            ("starts_on", GeneratedValue::Date(base_date())),
            (
                "ends_on",
                GeneratedValue::Date(base_date() + chrono::Duration::days(3)),
            ),
            ("cancelled_on", GeneratedValue::Null),
        ]);
        let ctx = CheckContext {
            values: &values,
            base_date: base_date(),
        };
        assert_eq!(
            evaluate_check("ends_on >= starts_on", &ctx),
            CheckOutcome::Passed
        );
        assert_eq!(
            evaluate_check("cancelled_on > starts_on", &ctx),
            CheckOutcome::Passed
        );
    }

    #[test]
    fn extracts_bounds_and_enums() {
        let bounds = numeric_bounds("CHECK (price >= 0 AND price <= 500 AND qty BETWEEN 1 AND 9)");
        assert_eq!(
            bounds.get("price"),
            Some(&NumericBounds {
                min: Some(0.0),
                max: Some(500.0)
            })
        );
        assert_eq!(bounds.get("qty").and_then(|b| b.max), Some(9.0));

        let allowed = allowed_values("status = ANY (ARRAY['A'::text, 'B'::text])");
        assert_eq!(
            allowed.get("status"),
            Some(&vec!["A".to_string(), "B".to_string()])
        );
    }

    #[test]
    fn predicates_check_ranges_sets_and_patterns() {
        let values = row(&[
            ("age", GeneratedValue::Int(17)),
            ("code", GeneratedValue::Text("AB-12".to_string())),
        ]);
        let range = PredicateEvaluator::new(
            "age",
            &CheckPredicate::Range {
                min: Some(18.0),
                max: None,
            },
        );
        assert_eq!(range.evaluate(&values, base_date()), CheckOutcome::Failed);

        let pattern = PredicateEvaluator::new(
            "code",
            &CheckPredicate::Pattern {
                regex: "[A-Z]{2}-[0-9]{2}".to_string(),
            },
        );
        assert_eq!(pattern.evaluate(&values, base_date()), CheckOutcome::Passed);

        let missing = PredicateEvaluator::new(
            "nickname",
            &CheckPredicate::OneOf {
                values: vec!["x".to_string()],
            },
        );
        assert_eq!(missing.evaluate(&values, base_date()), CheckOutcome::Passed);
    }
}
