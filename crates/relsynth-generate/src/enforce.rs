use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use relsynth_core::{DatabaseSchema, DependencyGraph, ForeignKey, Table};
use tracing::{debug, info};

use crate::dataset::{GeneratedDataset, Row};
use crate::errors::{GenerationError, Result};
use crate::model::{EnforceOptions, EnforceScope, EnforcementSummary};
use crate::pool::KeyPool;
use crate::synth::{UniqueSets, hash_seed};
use crate::value::GeneratedValue;

/// Rewrites foreign-key values that do not reference an existing parent key.
///
/// Only foreign-key columns are touched and row counts never change. A
/// replacement must keep every unique key that shares a column with the
/// foreign key collision-free; when no parent key does, the columns are
/// nulled if nullable and the run fails otherwise. Each
/// table is repaired on a copy and swapped in whole, so a table that fails
/// keeps its previous rows.
#[derive(Debug, Clone)]
pub struct ConstraintEnforcer {
    options: EnforceOptions,
    seed: u64,
}

#[derive(Debug, Default)]
struct TableOutcome {
    violations: u64,
    nulled: u64,
}

impl ConstraintEnforcer {
    pub fn new(options: EnforceOptions, seed: u64) -> Self {
        Self { options, seed }
    }

    pub fn enforce(
        &self,
        dataset: &mut GeneratedDataset,
        schema: &DatabaseSchema,
        graph: &DependencyGraph,
    ) -> Result<EnforcementSummary> {
        let mut summary = EnforcementSummary::default();

        for table_name in graph.topological_order() {
            let Some(table) = schema.table(&table_name) else {
                continue;
            };
            if table.foreign_keys.is_empty() {
                continue;
            }
            let selected = match self.options.scope {
                EnforceScope::Flagged => dataset.needs_enforcement(&table_name),
                EnforceScope::All => true,
            };
            if !selected {
                continue;
            }
            let Some(rows) = dataset.rows(&table_name) else {
                continue;
            };

            let mut working = rows.to_vec();
            let outcome = self.enforce_table(table, &mut working, dataset)?;
            dataset.insert_table(&table_name, working);
            dataset.pending.remove(&table_name);

            info!(
                table = %table_name,
                violations = outcome.violations,
                nulled = outcome.nulled,
                "foreign keys enforced"
            );
            summary.record(&table_name, outcome.violations, outcome.nulled);
        }

        Ok(summary)
    }

    fn enforce_table(
        &self,
        table: &Table,
        rows: &mut [Row],
        dataset: &GeneratedDataset,
    ) -> Result<TableOutcome> {
        let mut outcome = TableOutcome::default();

        for (fk_index, fk) in table.foreign_keys.iter().enumerate() {
            let self_reference = fk.is_self_reference(&table.name);
            let pool = if self_reference {
                KeyPool::from_rows(&table.name, &fk.referenced_columns, rows)
            } else {
                KeyPool::from_rows(
                    &fk.referenced_table,
                    &fk.referenced_columns,
                    dataset.rows(&fk.referenced_table).unwrap_or(&[]),
                )
            };
            let forbid_self_loop = self_reference && !fk.allow_self_loop;
            let nullable = fk
                .columns
                .iter()
                .all(|column| is_nullable(table, column));

            let mut selector = pool.selector(&self.options.selection);
            let mut rng = ChaCha8Rng::seed_from_u64(hash_seed(
                self.seed,
                &format!("enforce:{}:{}", table.name, fk_index),
            ));

            // rows whose reference already holds keep their unique-key tuples
            let mut keys = UniqueSets::overlapping(table, &fk.columns);
            let mut broken = Vec::new();
            for (idx, row) in rows.iter().enumerate() {
                let current = values(row, &fk.columns);
                let own_key = self_key(row, fk, forbid_self_loop);
                if is_valid(table, fk, &current, own_key.as_deref(), &pool) && keys.admit(row) {
                    continue;
                }
                broken.push(idx);
            }
            outcome.violations += broken.len() as u64;

            for idx in broken {
                let row = &mut rows[idx];
                let own_key = self_key(row, fk, forbid_self_loop);
                let repaired = selector
                    .candidates(&mut rng)
                    .filter(|key| own_key.as_deref() != Some(*key))
                    .find_map(|key| {
                        let mut candidate = row.clone();
                        for (column, value) in fk.columns.iter().zip(key) {
                            candidate.insert(column.clone(), value.clone());
                        }
                        keys.admit(&candidate).then_some(candidate)
                    });
                match repaired {
                    Some(candidate) => *row = candidate,
                    None if nullable => {
                        for column in &fk.columns {
                            row.insert(column.clone(), GeneratedValue::Null);
                        }
                        outcome.nulled += 1;
                    }
                    None => {
                        return Err(GenerationError::UnsatisfiableConstraint {
                            table: table.name.clone(),
                            column: fk.columns.join(","),
                            referenced_table: fk.referenced_table.clone(),
                        });
                    }
                }
            }

            debug!(
                table = %table.name,
                foreign_key = %fk.label(),
                pool = pool.len(),
                guarded_keys = !keys.is_empty(),
                "foreign key pass finished"
            );
        }

        Ok(outcome)
    }
}

fn values(row: &Row, columns: &[String]) -> Vec<GeneratedValue> {
    columns
        .iter()
        .map(|column| row.get(column).cloned().unwrap_or(GeneratedValue::Null))
        .collect()
}

/// The row's own key when a self-reference may not point back at it.
fn self_key(row: &Row, fk: &ForeignKey, forbid_self_loop: bool) -> Option<Vec<GeneratedValue>> {
    forbid_self_loop
        .then(|| values(row, &fk.referenced_columns))
        .filter(|key| !key.iter().any(GeneratedValue::is_null))
}

fn is_nullable(table: &Table, column: &str) -> bool {
    table
        .column(column)
        .is_some_and(|column| column.is_nullable)
}

/// A reference is valid when any null lands only on nullable columns, or when
/// the full tuple exists in the pool and is not a forbidden self-loop.
fn is_valid(
    table: &Table,
    fk: &ForeignKey,
    current: &[GeneratedValue],
    own_key: Option<&[GeneratedValue]>,
    pool: &KeyPool,
) -> bool {
    if current.iter().any(GeneratedValue::is_null) {
        return fk
            .columns
            .iter()
            .zip(current)
            .all(|(column, value)| !value.is_null() || is_nullable(table, column));
    }
    pool.contains(current) && own_key != Some(current)
}
