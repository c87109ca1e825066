use std::collections::{BTreeMap, HashSet};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::values::{fallback_for_type, unique_value};
use super::{RowSynthesizer, SynthesisRequest, Synthesized, UniqueSets, hash_row_seed};
use crate::dataset::{GeneratedDataset, Row};
use crate::errors::{GenerationError, Result};
use crate::value::GeneratedValue;

/// Empirical column model fitted on a reference dataset.
#[derive(Debug, Clone, Default)]
struct ColumnModel {
    null_rate: f64,
    values: Vec<GeneratedValue>,
}

/// Resamples each column independently from a reference dataset.
///
/// Foreign-key columns are resampled like any other column, so their values
/// usually point at keys that do not exist in the new run; the engine routes
/// this synthesizer's output through the enforcer.
#[derive(Debug, Clone, Default)]
pub struct LearnedSynthesizer {
    tables: BTreeMap<String, BTreeMap<String, ColumnModel>>,
}

impl LearnedSynthesizer {
    pub const NAME: &'static str = "learned";

    /// Fit per-column value pools and null rates on every table in `reference`.
    pub fn fit(reference: &GeneratedDataset) -> Self {
        let mut tables = BTreeMap::new();
        for (table, rows) in &reference.tables {
            let mut columns: BTreeMap<String, ColumnModel> = BTreeMap::new();
            for row in rows {
                for (column, value) in row {
                    let model = columns.entry(column.clone()).or_default();
                    if value.is_null() {
                        model.null_rate += 1.0;
                    } else {
                        model.values.push(value.clone());
                    }
                }
            }
            if !rows.is_empty() {
                for model in columns.values_mut() {
                    model.null_rate /= rows.len() as f64;
                }
            }
            tables.insert(table.clone(), columns);
        }
        Self { tables }
    }

    pub fn is_fitted(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }
}

impl RowSynthesizer for LearnedSynthesizer {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn guarantees_fk_validity(&self) -> bool {
        false
    }

    fn synthesize(&self, request: &SynthesisRequest<'_>) -> Result<Synthesized> {
        let table = request.table;
        let model = self.tables.get(&table.name).ok_or_else(|| {
            GenerationError::synthesis(&table.name, "no fitted model for this table")
        })?;
        let unique_columns: HashSet<&str> = table
            .unique_keys()
            .iter()
            .filter(|key| key.len() == 1)
            .filter_map(|key| table.column(&key[0]))
            .map(|column| column.name.as_str())
            .collect();

        let mut unique_sets = UniqueSets::for_table(table);
        let mut rows = Vec::with_capacity(request.rows as usize);
        let mut retries = 0_u64;

        for row_index in 0..request.rows {
            let mut attempt = 0_u32;
            loop {
                attempt += 1;
                let mut rng =
                    ChaCha8Rng::seed_from_u64(hash_row_seed(request.seed, row_index, attempt));
                let mut row = Row::new();
                for column in &table.columns {
                    let value = if unique_columns.contains(column.name.as_str()) {
                        unique_value(column, row_index, request.defaults.base_date)
                    } else {
                        match model.get(&column.name) {
                            Some(fitted) => {
                                if column.is_nullable && rng.random_bool(fitted.null_rate.clamp(0.0, 1.0)) {
                                    GeneratedValue::Null
                                } else if fitted.values.is_empty() {
                                    fallback_for_type(column, request.defaults.base_date, &mut rng)
                                } else {
                                    fitted.values[rng.random_range(0..fitted.values.len())].clone()
                                }
                            }
                            None => fallback_for_type(column, request.defaults.base_date, &mut rng),
                        }
                    };
                    row.insert(column.name.clone(), value);
                }
                if unique_sets.admit(&row) {
                    rows.push(row);
                    break;
                }
                if attempt >= request.max_attempts_row {
                    return Err(GenerationError::synthesis(
                        &table.name,
                        format!("row {row_index} collided on a unique key after {attempt} attempts"),
                    ));
                }
                retries += 1;
            }
        }

        Ok(Synthesized { rows, retries })
    }
}

#[cfg(test)]
mod tests {
    use relsynth_core::{Column, SemanticType, Table};
    use relsynth_scenario::TableScenario;

    use super::*;
    use crate::model::DefaultPolicy;

    #[test]
    fn resamples_reference_values() {
        let mut reference = GeneratedDataset::new();
        reference.insert_table(
            "events",
            ["click", "view", "view"]
                .iter()
                .enumerate()
                .map(|(idx, kind)| {
                    Row::from([
                        ("id".to_string(), GeneratedValue::Int(idx as i64 + 1)),
                        ("kind".to_string(), GeneratedValue::Text(kind.to_string())),
                    ])
                })
                .collect(),
        );
        let synthesizer = LearnedSynthesizer::fit(&reference);
        assert!(synthesizer.is_fitted("events"));

        let table = Table::new(
            "events",
            vec![
                Column::new("id", SemanticType::Integer),
                Column::new("kind", SemanticType::Text),
            ],
        )
        .with_primary_key(&["id"]);
        let scenario = TableScenario::with_rows(20);
        let defaults = DefaultPolicy::default();
        let request = SynthesisRequest {
            table: &table,
            scenario: &scenario,
            rows: 20,
            seed: 7,
            parents: &[],
            deferred: &[],
            defaults: &defaults,
            max_attempts_row: 10,
        };
        let output = synthesizer.synthesize(&request).expect("synthesize");
        assert_eq!(output.rows.len(), 20);
        assert!(
            output
                .rows
                .iter()
                .all(|row| matches!(row["kind"].as_str(), Some("click" | "view")))
        );
    }

    #[test]
    fn unfitted_tables_fail() {
        let synthesizer = LearnedSynthesizer::default();
        let table = Table::new("events", vec![Column::new("id", SemanticType::Integer)]);
        let scenario = TableScenario::with_rows(1);
        let defaults = DefaultPolicy::default();
        let request = SynthesisRequest {
            table: &table,
            scenario: &scenario,
            rows: 1,
            seed: 7,
            parents: &[],
            deferred: &[],
            defaults: &defaults,
            max_attempts_row: 10,
        };
        assert!(matches!(
            synthesizer.synthesize(&request),
            Err(GenerationError::Synthesis { .. })
        ));
    }
}
