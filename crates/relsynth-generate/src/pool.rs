use std::collections::HashMap;

use rand::Rng;
use relsynth_scenario::SelectionPolicy;

use crate::dataset::Row;
use crate::value::{GeneratedValue, tuple_key};

/// Key values realized by one table for one key column set.
///
/// Keys keep row order, so skewed selection favours early rows. A pool is
/// immutable once built and shared behind an `Arc` by every child table.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyPool {
    table: String,
    columns: Vec<String>,
    keys: Vec<Vec<GeneratedValue>>,
    index: HashMap<String, usize>,
}

impl KeyPool {
    pub fn empty(table: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            table: table.into(),
            columns,
            keys: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Collect distinct, fully non-null key tuples from `rows`.
    pub fn from_rows(table: impl Into<String>, columns: &[String], rows: &[Row]) -> Self {
        let mut pool = Self::empty(table, columns.to_vec());
        for row in rows {
            let key: Vec<GeneratedValue> = columns
                .iter()
                .map(|column| row.get(column).cloned().unwrap_or(GeneratedValue::Null))
                .collect();
            if key.iter().any(GeneratedValue::is_null) {
                continue;
            }
            let encoded = tuple_key(&key);
            if !pool.index.contains_key(&encoded) {
                pool.index.insert(encoded, pool.keys.len());
                pool.keys.push(key);
            }
        }
        pool
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn keys(&self) -> &[Vec<GeneratedValue>] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains(&self, key: &[GeneratedValue]) -> bool {
        self.index.contains_key(&tuple_key(key))
    }

    /// One-off draw; use [`KeyPool::selector`] for repeated draws.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        policy: &SelectionPolicy,
        rng: &mut R,
    ) -> Option<&[GeneratedValue]> {
        self.selector(policy).sample(rng)
    }

    /// Draw a key different from `excluded`.
    pub fn sample_excluding<R: Rng + ?Sized>(
        &self,
        policy: &SelectionPolicy,
        rng: &mut R,
        excluded: &[GeneratedValue],
    ) -> Option<&[GeneratedValue]> {
        self.selector(policy).sample_excluding(rng, excluded)
    }

    /// Stateful selector for one consumer (one table or one enforcement pass).
    pub fn selector(&self, policy: &SelectionPolicy) -> KeySelector<'_> {
        let cumulative = match policy {
            SelectionPolicy::Skewed { exponent } => {
                let mut total = 0.0;
                self.keys
                    .iter()
                    .enumerate()
                    .map(|(idx, _)| {
                        total += 1.0 / ((idx + 1) as f64).powf(*exponent);
                        total
                    })
                    .collect()
            }
            _ => Vec::new(),
        };
        KeySelector {
            pool: self,
            policy: policy.clone(),
            cumulative,
            cursor: 0,
        }
    }
}

/// Draws keys from a pool under a selection policy.
#[derive(Debug, Clone)]
pub struct KeySelector<'a> {
    pool: &'a KeyPool,
    policy: SelectionPolicy,
    cumulative: Vec<f64>,
    cursor: usize,
}

impl<'a> KeySelector<'a> {
    pub fn pool(&self) -> &'a KeyPool {
        self.pool
    }

    pub fn sample<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<&'a [GeneratedValue]> {
        let idx = self.next_index(rng)?;
        Some(self.pool.keys[idx].as_slice())
    }

    /// Draw a key other than `excluded`; `None` when no other key exists.
    pub fn sample_excluding<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        excluded: &[GeneratedValue],
    ) -> Option<&'a [GeneratedValue]> {
        self.candidates(rng).find(|key| *key != excluded)
    }

    /// Every key exactly once, starting at a policy draw and wrapping around
    /// in pool order. Empty for an empty pool.
    pub fn candidates<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
    ) -> impl Iterator<Item = &'a [GeneratedValue]> + use<'a, R> {
        let pool = self.pool;
        let len = pool.keys.len();
        let start = self.next_index(rng).unwrap_or(0);
        (0..len).map(move |offset| pool.keys[(start + offset) % len].as_slice())
    }

    fn next_index<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<usize> {
        let len = self.pool.keys.len();
        if len == 0 {
            return None;
        }
        let idx = match &self.policy {
            SelectionPolicy::Uniform => rng.random_range(0..len),
            SelectionPolicy::RoundRobin => {
                let idx = self.cursor % len;
                self.cursor = self.cursor.wrapping_add(1);
                idx
            }
            SelectionPolicy::Skewed { .. } => {
                let total = self.cumulative.last().copied().unwrap_or(0.0);
                let target = rng.random::<f64>() * total;
                self.cumulative
                    .partition_point(|weight| *weight <= target)
                    .min(len - 1)
            }
        };
        Some(idx)
    }
}
