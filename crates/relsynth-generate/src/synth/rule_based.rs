use std::collections::{HashMap, HashSet};

use chrono::Duration;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_regex::Regex as RandRegex;
use relsynth_core::{CheckPredicate, Column, SemanticType, Table};
use relsynth_scenario::{CorrelationSpec, Distribution, SelectionPolicy, TemporalRule};
use tracing::debug;

use super::sampling::{Draw, TemporalWindow, draw, standard_normal};
use super::values::{
    column_default, fallback_for_type, semantic_text, temporal_value, unique_value,
};
use super::{RowSynthesizer, SynthesisRequest, Synthesized, UniqueSets, hash_row_seed, hash_seed};
use crate::checks::{
    CheckContext, CheckOutcome, NumericBounds, PredicateEvaluator, allowed_values, evaluate_check,
    numeric_bounds,
};
use crate::dataset::Row;
use crate::errors::{GenerationError, Result};
use crate::model::RULE_BASED;
use crate::pool::KeySelector;
use crate::value::{GeneratedValue, truncate};

const PATTERN_MAX_REPEAT: u32 = 16;

/// Default synthesizer: samples each column from its declared distribution,
/// temporal rule, CHECK domain, or type, and draws foreign keys from parent
/// key pools.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedSynthesizer;

impl RowSynthesizer for RuleBasedSynthesizer {
    fn name(&self) -> &str {
        RULE_BASED
    }

    fn guarantees_fk_validity(&self) -> bool {
        true
    }

    fn synthesize(&self, request: &SynthesisRequest<'_>) -> Result<Synthesized> {
        TablePlan::new(request)?.generate()
    }
}

#[derive(Debug)]
struct AfterRule {
    column: String,
    after: String,
    min_gap: i64,
    max_gap: i64,
}

/// Per-table lookups resolved once before any row is built.
struct TablePlan<'a> {
    request: &'a SynthesisRequest<'a>,
    table: &'a Table,
    unique_columns: HashSet<&'a str>,
    bounds: HashMap<String, NumericBounds>,
    enums: HashMap<String, Vec<String>>,
    patterns: HashMap<&'a str, RandRegex>,
    windows: HashMap<&'a str, TemporalWindow>,
    after_rules: Vec<AfterRule>,
    predicates: Vec<PredicateEvaluator>,
}

impl<'a> TablePlan<'a> {
    fn new(request: &'a SynthesisRequest<'a>) -> Result<Self> {
        let table = request.table;
        let mut bounds: HashMap<String, NumericBounds> = HashMap::new();
        let mut enums: HashMap<String, Vec<String>> = HashMap::new();
        let mut patterns = HashMap::new();
        let mut predicates = Vec::new();

        for check in &table.checks {
            for (column, found) in numeric_bounds(&check.expression) {
                let entry = bounds.entry(column).or_default();
                merge_bounds(entry, found);
            }
            enums.extend(allowed_values(&check.expression));
        }

        for column in &table.columns {
            let Some(predicate) = &column.check else {
                continue;
            };
            let key = column.name.to_lowercase();
            match predicate {
                CheckPredicate::Range { min, max } => {
                    merge_bounds(
                        bounds.entry(key).or_default(),
                        NumericBounds {
                            min: *min,
                            max: *max,
                        },
                    );
                }
                CheckPredicate::OneOf { values } => {
                    enums.insert(key, values.clone());
                }
                CheckPredicate::Pattern { regex } => {
                    let compiled = RandRegex::compile(regex, PATTERN_MAX_REPEAT).map_err(|err| {
                        GenerationError::synthesis(
                            &table.name,
                            format!("invalid pattern for column '{}': {err}", column.name),
                        )
                    })?;
                    patterns.insert(column.name.as_str(), compiled);
                }
                CheckPredicate::Expression { expression } => {
                    for (name, found) in numeric_bounds(expression) {
                        merge_bounds(bounds.entry(name).or_default(), found);
                    }
                    enums.extend(allowed_values(expression));
                }
            }
            predicates.push(PredicateEvaluator::new(&column.name, predicate));
        }

        let mut windows = HashMap::new();
        let mut after_rules = Vec::new();
        for rule in &request.scenario.temporal {
            match rule {
                TemporalRule::Pattern {
                    column,
                    start,
                    end,
                    shape,
                } => {
                    let Some(target) = table.column(column) else {
                        continue;
                    };
                    if let Some(window) = TemporalWindow::from_rule(start, end, shape) {
                        windows.insert(target.name.as_str(), window);
                    }
                }
                TemporalRule::After {
                    column,
                    after,
                    min_gap_seconds,
                    max_gap_seconds,
                } => after_rules.push(AfterRule {
                    column: column.clone(),
                    after: after.clone(),
                    min_gap: *min_gap_seconds,
                    max_gap: (*max_gap_seconds).max(*min_gap_seconds),
                }),
            }
        }

        let unique_columns = table
            .unique_keys()
            .iter()
            .filter(|key| key.len() == 1)
            .filter_map(|key| table.column(&key[0]))
            .map(|column| column.name.as_str())
            .collect();

        Ok(Self {
            request,
            table,
            unique_columns,
            bounds,
            enums,
            patterns,
            windows,
            after_rules,
            predicates,
        })
    }

    fn generate(&self) -> Result<Synthesized> {
        let request = self.request;
        let policy = request
            .scenario
            .fk_selection
            .clone()
            .unwrap_or(SelectionPolicy::Uniform);
        let mut selectors: Vec<Option<KeySelector<'_>>> = self
            .table
            .foreign_keys
            .iter()
            .enumerate()
            .map(|(fk_index, fk)| {
                if request.is_deferred(fk_index) {
                    return None;
                }
                let pool = request.parent(fk_index).filter(|pool| !pool.is_empty())?;
                // a unique foreign key walks the pool so each parent is used once
                let policy = if self.table.is_key(&fk.columns) {
                    SelectionPolicy::RoundRobin
                } else {
                    policy.clone()
                };
                Some(pool.selector(&policy))
            })
            .collect();

        let mut unique_sets = UniqueSets::for_table(self.table);
        let mut rows = Vec::with_capacity(request.rows as usize);
        let mut retries = 0_u64;

        for row_index in 0..request.rows {
            let mut attempt = 0_u32;
            loop {
                attempt += 1;
                let mut rng = ChaCha8Rng::seed_from_u64(hash_row_seed(request.seed, row_index, attempt));
                let row = self.build_row(row_index, &mut selectors, &mut rng);
                if self.satisfies_checks(&row) && unique_sets.admit(&row) {
                    rows.push(row);
                    break;
                }
                if attempt >= request.max_attempts_row {
                    return Err(GenerationError::synthesis(
                        &self.table.name,
                        format!(
                            "row {row_index} violated CHECK or unique constraints after {attempt} attempts"
                        ),
                    ));
                }
                retries += 1;
            }
        }

        for correlation in &request.scenario.correlations {
            self.apply_correlation(&mut rows, correlation);
        }

        debug!(table = %self.table.name, rows = rows.len(), retries, "rule-based rows built");
        Ok(Synthesized { rows, retries })
    }

    fn build_row(
        &self,
        row_index: u64,
        selectors: &mut [Option<KeySelector<'_>>],
        rng: &mut ChaCha8Rng,
    ) -> Row {
        let mut row = Row::new();
        self.assign_foreign_keys(&mut row, selectors, rng);

        for column in &self.table.columns {
            if row.contains_key(&column.name) {
                continue;
            }
            let value = self.column_value(column, row_index, rng);
            row.insert(column.name.clone(), value);
        }

        self.apply_after_rules(&mut row, rng);
        row
    }

    fn assign_foreign_keys(
        &self,
        row: &mut Row,
        selectors: &mut [Option<KeySelector<'_>>],
        rng: &mut ChaCha8Rng,
    ) {
        let request = self.request;
        for (fk_index, fk) in self.table.foreign_keys.iter().enumerate() {
            if fk.columns.iter().any(|column| row.contains_key(column)) {
                continue;
            }
            let columns: Vec<&Column> = fk
                .columns
                .iter()
                .filter_map(|name| self.table.column(name))
                .collect();
            let nullable = columns.iter().all(|column| column.is_nullable);
            let null_probability = fk
                .columns
                .iter()
                .filter_map(|name| request.scenario.columns.get(name)?.null_probability)
                .fold(0.0_f64, f64::max);

            if nullable && null_probability > 0.0 && rng.random_bool(null_probability.min(1.0)) {
                for column in &fk.columns {
                    row.insert(column.clone(), GeneratedValue::Null);
                }
                continue;
            }

            let drawn = selectors
                .get_mut(fk_index)
                .and_then(Option::as_mut)
                .and_then(|selector| selector.sample(rng));
            match drawn {
                Some(key) => {
                    for (column, value) in fk.columns.iter().zip(key) {
                        row.insert(column.clone(), value.clone());
                    }
                }
                None if nullable && !request.is_deferred(fk_index) => {
                    for column in &fk.columns {
                        row.insert(column.clone(), GeneratedValue::Null);
                    }
                }
                None => {
                    // placeholder until the enforcer rewrites it
                    for column in columns {
                        let value = fallback_for_type(column, request.defaults.base_date, rng);
                        row.insert(column.name.clone(), value);
                    }
                }
            }
        }
    }

    fn column_value(&self, column: &Column, row_index: u64, rng: &mut ChaCha8Rng) -> GeneratedValue {
        let defaults = self.request.defaults;
        let spec = self.request.scenario.columns.get(&column.name);
        let key = column.name.to_lowercase();
        let is_unique = self.unique_columns.contains(column.name.as_str());
        let distribution = spec.and_then(|spec| spec.distribution.as_ref());

        if column.is_nullable && !is_unique {
            let probability = spec
                .and_then(|spec| spec.null_probability)
                .unwrap_or(defaults.null_probability)
                .clamp(0.0, 1.0);
            if probability > 0.0 && rng.random_bool(probability) {
                return GeneratedValue::Null;
            }
        }

        if is_unique {
            return match distribution {
                Some(Distribution::Sequence { start, step }) => {
                    GeneratedValue::from_number(start + step * row_index as f64, column)
                }
                _ => unique_value(column, row_index, defaults.base_date),
            };
        }

        if let Some(window) = self.windows.get(column.name.as_str()) {
            return temporal_value(column, window.sample(rng));
        }

        let bounds = self.bounds.get(&key);

        if let Some(distribution) = distribution {
            let value = match draw(distribution, row_index, rng) {
                Draw::Number(number) => GeneratedValue::from_number(number, column),
                Draw::Label(label) => GeneratedValue::parse_label(&label, column)
                    .unwrap_or_else(|| GeneratedValue::Text(truncate(label, column))),
            };
            return clamp(value, bounds);
        }

        if let Some(values) = self.enums.get(&key).filter(|values| !values.is_empty()) {
            let label = &values[rng.random_range(0..values.len())];
            return GeneratedValue::parse_label(label, column)
                .unwrap_or_else(|| GeneratedValue::Text(truncate(label.clone(), column)));
        }

        if let Some(pattern) = self.patterns.get(column.name.as_str()) {
            let text: String = rng.sample(pattern);
            return GeneratedValue::Text(truncate(text, column));
        }

        if let Some(NumericBounds {
            min: Some(min),
            max: Some(max),
        }) = bounds
            && column.semantic().is_numeric()
            && max >= min
        {
            let number = if max > min {
                rng.random_range(*min..=*max)
            } else {
                *min
            };
            return clamp(GeneratedValue::from_number(number, column), bounds);
        }

        if let Some(value) = column_default(column, defaults.base_date, rng) {
            return value;
        }

        if column.semantic() == SemanticType::Text
            && let Some(text) = semantic_text(column, rng)
        {
            return GeneratedValue::Text(text);
        }

        clamp(fallback_for_type(column, defaults.base_date, rng), bounds)
    }

    fn apply_after_rules(&self, row: &mut Row, rng: &mut ChaCha8Rng) {
        for rule in &self.after_rules {
            let Some(column) = self.table.column(&rule.column) else {
                continue;
            };
            if row.get(&rule.column).is_none_or(GeneratedValue::is_null) {
                continue;
            }
            let Some(base) = row.get(&rule.after).and_then(GeneratedValue::as_datetime) else {
                continue;
            };
            let mut gap = rng.random_range(rule.min_gap..=rule.max_gap);
            if column.semantic() == SemanticType::Date {
                // whole days, rounded up so the minimum gap still holds
                gap = (gap + 86_399).div_euclid(86_400) * 86_400;
            }
            let value = temporal_value(column, base + Duration::seconds(gap));
            row.insert(rule.column.clone(), value);
        }
    }

    fn satisfies_checks(&self, row: &Row) -> bool {
        let base_date = self.request.defaults.base_date;
        let ctx = CheckContext {
            values: row,
            base_date,
        };
        let table_ok = self
            .table
            .checks
            .iter()
            .all(|check| evaluate_check(&check.expression, &ctx) != CheckOutcome::Failed);
        table_ok
            && self
                .predicates
                .iter()
                .all(|predicate| predicate.evaluate(row, base_date) != CheckOutcome::Failed)
    }

    /// Reorder target values so their ranks follow a noisy copy of the source,
    /// which moves the Pearson coefficient toward the declared one while
    /// keeping the target's marginal distribution.
    fn apply_correlation(&self, rows: &mut [Row], correlation: &CorrelationSpec) {
        let indices: Vec<usize> = rows
            .iter()
            .enumerate()
            .filter(|(_, row)| {
                row.get(&correlation.source).and_then(GeneratedValue::as_f64).is_some()
                    && row.get(&correlation.target).and_then(GeneratedValue::as_f64).is_some()
            })
            .map(|(idx, _)| idx)
            .collect();
        if indices.len() < 3 {
            return;
        }

        let source: Vec<f64> = indices
            .iter()
            .filter_map(|idx| rows[*idx].get(&correlation.source).and_then(GeneratedValue::as_f64))
            .collect();
        let mean = source.iter().sum::<f64>() / source.len() as f64;
        let std_dev =
            (source.iter().map(|value| (value - mean).powi(2)).sum::<f64>() / source.len() as f64)
                .sqrt();
        if std_dev == 0.0 {
            return;
        }

        let coefficient = correlation.coefficient.clamp(-1.0, 1.0);
        let noise_weight = (1.0 - coefficient * coefficient).sqrt();
        let mut rng = ChaCha8Rng::seed_from_u64(hash_seed(
            self.request.seed,
            &format!("correlation:{}:{}", correlation.source, correlation.target),
        ));
        let scores: Vec<f64> = source
            .iter()
            .map(|value| coefficient * (value - mean) / std_dev + noise_weight * standard_normal(&mut rng))
            .collect();

        let mut targets: Vec<GeneratedValue> = indices
            .iter()
            .filter_map(|idx| rows[*idx].get(&correlation.target).cloned())
            .collect();
        targets.sort_by(|left, right| {
            let left = left.as_f64().unwrap_or(0.0);
            let right = right.as_f64().unwrap_or(0.0);
            left.total_cmp(&right)
        });

        let mut ranked: Vec<usize> = (0..indices.len()).collect();
        ranked.sort_by(|left, right| scores[*left].total_cmp(&scores[*right]));

        for (rank, position) in ranked.into_iter().enumerate() {
            rows[indices[position]].insert(correlation.target.clone(), targets[rank].clone());
        }
    }
}

fn merge_bounds(entry: &mut NumericBounds, found: NumericBounds) {
    if let Some(min) = found.min {
        entry.min = Some(entry.min.map_or(min, |current| current.max(min)));
    }
    if let Some(max) = found.max {
        entry.max = Some(entry.max.map_or(max, |current| current.min(max)));
    }
}

fn clamp(value: GeneratedValue, bounds: Option<&NumericBounds>) -> GeneratedValue {
    match bounds {
        Some(bounds) => bounds.clamp(value),
        None => value,
    }
}
