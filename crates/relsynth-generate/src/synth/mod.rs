//! Row synthesizers: pluggable strategies that turn one table's scenario into rows.

mod learned;
mod rule_based;
mod sampling;
mod values;

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use relsynth_core::Table;
use relsynth_scenario::TableScenario;

use crate::dataset::Row;
use crate::errors::Result;
use crate::model::DefaultPolicy;
use crate::pool::KeyPool;
use crate::value::{GeneratedValue, tuple_key};

pub use learned::LearnedSynthesizer;
pub use rule_based::RuleBasedSynthesizer;

/// Everything a synthesizer may read while producing one table.
#[derive(Debug, Clone, Copy)]
pub struct SynthesisRequest<'a> {
    pub table: &'a Table,
    pub scenario: &'a TableScenario,
    /// Exact number of rows to return.
    pub rows: u64,
    /// Seed derived from the run seed and the table name.
    pub seed: u64,
    /// One pool per foreign key, in declaration order. Deferred edges get an
    /// empty pool.
    pub parents: &'a [Arc<KeyPool>],
    /// Foreign-key indices resolved later by the enforcer.
    pub deferred: &'a [usize],
    pub defaults: &'a DefaultPolicy,
    pub max_attempts_row: u32,
}

impl<'a> SynthesisRequest<'a> {
    pub fn is_deferred(&self, fk_index: usize) -> bool {
        self.deferred.contains(&fk_index)
    }

    pub fn parent(&self, fk_index: usize) -> Option<&'a KeyPool> {
        self.parents.get(fk_index).map(Arc::as_ref)
    }
}

/// Rows produced for one table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Synthesized {
    pub rows: Vec<Row>,
    /// Row attempts rejected by CHECK or uniqueness constraints.
    pub retries: u64,
}

/// A strategy for synthesizing one table.
///
/// Implementations must be deterministic in `request.seed` and return exactly
/// `request.rows` rows. A synthesizer that cannot promise foreign-key validity
/// reports so through [`RowSynthesizer::guarantees_fk_validity`] and the engine
/// hands its output to the enforcer.
pub trait RowSynthesizer: Send + Sync {
    fn name(&self) -> &str;

    fn guarantees_fk_validity(&self) -> bool;

    fn synthesize(&self, request: &SynthesisRequest<'_>) -> Result<Synthesized>;
}

/// Synthesizers addressable by strategy name.
#[derive(Clone, Default)]
pub struct SynthesizerRegistry {
    synthesizers: BTreeMap<String, Arc<dyn RowSynthesizer>>,
}

impl SynthesizerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the rule-based synthesizer.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(RuleBasedSynthesizer);
        registry
    }

    /// Register under the synthesizer's own name, replacing any previous entry.
    pub fn register(&mut self, synthesizer: impl RowSynthesizer + 'static) {
        self.synthesizers
            .insert(synthesizer.name().to_string(), Arc::new(synthesizer));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn RowSynthesizer>> {
        self.synthesizers.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.synthesizers.keys().map(String::as_str)
    }
}

impl fmt::Debug for SynthesizerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}

pub(crate) fn hash_seed(seed: u64, key: &str) -> u64 {
    let mut hash = seed ^ 0xcbf29ce484222325;
    for byte in key.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

pub(crate) fn hash_row_seed(table_seed: u64, row_index: u64, attempt: u32) -> u64 {
    let mut hash = table_seed ^ row_index.wrapping_mul(0x9e3779b97f4a7c15);
    hash ^= attempt as u64;
    hash = hash.wrapping_mul(0x100000001b3);
    hash
}

/// Seen tuples for every unique key of a table.
#[derive(Debug)]
pub(crate) struct UniqueSets {
    sets: Vec<(Vec<String>, HashSet<String>)>,
}

impl UniqueSets {
    pub(crate) fn for_table(table: &Table) -> Self {
        Self {
            sets: table
                .unique_keys()
                .into_iter()
                .map(|columns| (columns, HashSet::new()))
                .collect(),
        }
    }

    /// Only the unique keys that share a column with `columns`.
    pub(crate) fn overlapping(table: &Table, columns: &[String]) -> Self {
        Self {
            sets: table
                .unique_keys()
                .into_iter()
                .filter(|key| key.iter().any(|column| columns.contains(column)))
                .map(|key| (key, HashSet::new()))
                .collect(),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Record the row's keys if none collide. Keys containing a null never
    /// collide.
    pub(crate) fn admit(&mut self, row: &Row) -> bool {
        let keys: Vec<Option<String>> = self
            .sets
            .iter()
            .map(|(columns, _)| key_for(columns, row))
            .collect();
        let collides = self
            .sets
            .iter()
            .zip(&keys)
            .any(|((_, seen), key)| key.as_ref().is_some_and(|key| seen.contains(key)));
        if collides {
            return false;
        }
        for ((_, seen), key) in self.sets.iter_mut().zip(keys) {
            if let Some(key) = key {
                seen.insert(key);
            }
        }
        true
    }
}

fn key_for(columns: &[String], row: &Row) -> Option<String> {
    let values: Vec<GeneratedValue> = columns
        .iter()
        .map(|column| row.get(column).cloned().unwrap_or(GeneratedValue::Null))
        .collect();
    if values.iter().any(GeneratedValue::is_null) {
        return None;
    }
    Some(tuple_key(&values))
}
