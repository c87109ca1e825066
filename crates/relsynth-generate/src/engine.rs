use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use relsynth_core::{DatabaseSchema, DependencyGraph, GenerationOrder, Table, validate_schema};
use relsynth_scenario::{Scenario, TableScenario, validate_scenario};
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::dataset::{GeneratedDataset, Row};
use crate::enforce::ConstraintEnforcer;
use crate::errors::{GenerationError, Result};
use crate::model::{DefaultPolicy, GenerateOptions, GenerationReport, TableReport};
use crate::pool::KeyPool;
use crate::synth::{RowSynthesizer, SynthesisRequest, SynthesizerRegistry, hash_seed};

/// Result of a generation run.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub dataset: GeneratedDataset,
    pub report: GenerationReport,
}

/// Shared flag checked at table boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Entry point for generating datasets from schema + scenario.
#[derive(Debug, Clone)]
pub struct GenerationEngine {
    options: GenerateOptions,
    registry: SynthesizerRegistry,
    cancel: Option<CancelHandle>,
}

type PoolKey = (String, Vec<String>);

/// Validated inputs for one run.
struct RunPlan {
    graph: DependencyGraph,
    order: GenerationOrder,
    /// Key column sets each table must publish, from incoming foreign keys.
    published_keys: BTreeMap<String, BTreeSet<Vec<String>>>,
}

/// Everything one table task owns while it runs.
struct TableJob {
    table: Table,
    scenario: TableScenario,
    rows: u64,
    seed: u64,
    parents: Vec<Arc<KeyPool>>,
    deferred: Vec<usize>,
    synthesizer: Arc<dyn RowSynthesizer>,
    defaults: DefaultPolicy,
    max_attempts_row: u32,
}

struct TableOutput {
    rows: Vec<Row>,
    report: TableReport,
}

/// Mutable state shared by the sequential and concurrent drivers.
struct RunState {
    dataset: GeneratedDataset,
    report: GenerationReport,
    pools: BTreeMap<PoolKey, Arc<KeyPool>>,
}

impl GenerationEngine {
    pub fn new(options: GenerateOptions, registry: SynthesizerRegistry) -> Self {
        Self {
            options,
            registry,
            cancel: None,
        }
    }

    pub fn with_cancellation(mut self, handle: CancelHandle) -> Self {
        self.cancel = Some(handle);
        self
    }

    pub fn options(&self) -> &GenerateOptions {
        &self.options
    }

    pub fn registry(&self) -> &SynthesizerRegistry {
        &self.registry
    }

    /// Generate every table in dependency order. Foreign keys that could not
    /// be resolved during synthesis are left flagged in `dataset.pending`.
    pub fn generate(
        &self,
        schema: &DatabaseSchema,
        scenario: &Scenario,
        seed: u64,
    ) -> Result<GenerationResult> {
        let plan = self.prepare(schema, scenario)?;
        self.generate_planned(&plan, schema, scenario, seed)
    }

    /// Same output as [`GenerationEngine::generate`], with the tables of each
    /// dependency wave synthesized on blocking worker tasks.
    pub async fn generate_concurrent(
        &self,
        schema: &DatabaseSchema,
        scenario: &Scenario,
        seed: u64,
    ) -> Result<GenerationResult> {
        let plan = self.prepare(schema, scenario)?;
        self.generate_concurrent_planned(&plan, schema, scenario, seed)
            .await
    }

    /// Generate with the scenario's seed, then enforce foreign keys.
    pub fn run(&self, schema: &DatabaseSchema, scenario: &Scenario) -> Result<GenerationResult> {
        let plan = self.prepare(schema, scenario)?;
        let mut result = self.generate_planned(&plan, schema, scenario, scenario.seed)?;
        self.enforce(&plan, schema, &mut result)?;
        Ok(result)
    }

    /// Concurrent counterpart of [`GenerationEngine::run`].
    pub async fn run_concurrent(
        &self,
        schema: &DatabaseSchema,
        scenario: &Scenario,
    ) -> Result<GenerationResult> {
        let plan = self.prepare(schema, scenario)?;
        let mut result = self
            .generate_concurrent_planned(&plan, schema, scenario, scenario.seed)
            .await?;
        self.enforce(&plan, schema, &mut result)?;
        Ok(result)
    }

    fn prepare(&self, schema: &DatabaseSchema, scenario: &Scenario) -> Result<RunPlan> {
        validate_schema(schema)?;
        let graph = DependencyGraph::build(schema)?;

        let validation = validate_scenario(scenario, schema);
        if !validation.is_ok() {
            return Err(GenerationError::ScenarioValidation(validation));
        }
        for issue in &validation.warnings {
            warn!(path = %issue.path, code = %issue.code, "{}", issue.message);
        }

        let order = graph.generation_order();
        for cycle in &order.warnings {
            warn!(
                tables = ?cycle.tables,
                seed_table = %cycle.seed_table,
                deferred = cycle.deferred.len(),
                "cyclic dependency broken at seed table"
            );
        }

        let mut published_keys: BTreeMap<String, BTreeSet<Vec<String>>> = BTreeMap::new();
        for edge in graph.edges() {
            published_keys
                .entry(graph.table_name(edge.to).to_string())
                .or_default()
                .insert(edge.referenced_columns.clone());
        }

        Ok(RunPlan {
            graph,
            order,
            published_keys,
        })
    }

    fn generate_planned(
        &self,
        plan: &RunPlan,
        schema: &DatabaseSchema,
        scenario: &Scenario,
        seed: u64,
    ) -> Result<GenerationResult> {
        let start = Instant::now();
        let mut state = RunState::new(plan, scenario, seed);
        info!(
            scenario = %scenario.name,
            tables = plan.order.order.len(),
            seed,
            "generation started"
        );

        for (completed, table_name) in plan.order.order.iter().enumerate() {
            self.check_cancelled(completed)?;
            let job = self.job(plan, schema, scenario, &state, table_name, seed)?;
            let output = job.run()?;
            state.publish(plan, output);
        }

        Ok(state.finish(plan, start))
    }

    async fn generate_concurrent_planned(
        &self,
        plan: &RunPlan,
        schema: &DatabaseSchema,
        scenario: &Scenario,
        seed: u64,
    ) -> Result<GenerationResult> {
        let start = Instant::now();
        let mut state = RunState::new(plan, scenario, seed);
        info!(
            scenario = %scenario.name,
            tables = plan.order.order.len(),
            waves = plan.order.waves.len(),
            seed,
            "concurrent generation started"
        );

        let mut completed = 0_usize;
        for wave in &plan.order.waves {
            let width = match self.options.max_parallel_tables {
                0 => wave.len().max(1),
                limit => limit,
            };
            for chunk in wave.chunks(width) {
                self.check_cancelled(completed)?;
                let mut tasks = JoinSet::new();
                for table_name in chunk {
                    let job = self.job(plan, schema, scenario, &state, table_name, seed)?;
                    tasks.spawn_blocking(move || job.run());
                }

                let mut outputs = Vec::with_capacity(chunk.len());
                while let Some(joined) = tasks.join_next().await {
                    let output = joined.map_err(|err| GenerationError::Join(err.to_string()))??;
                    outputs.push(output);
                }
                // publish in generation order regardless of completion order
                outputs.sort_by_key(|output| plan.order.position(&output.report.table));
                for output in outputs {
                    state.publish(plan, output);
                    completed += 1;
                }
            }
        }

        Ok(state.finish(plan, start))
    }

    fn enforce(
        &self,
        plan: &RunPlan,
        schema: &DatabaseSchema,
        result: &mut GenerationResult,
    ) -> Result<()> {
        self.check_cancelled(plan.order.order.len())?;
        let enforcer =
            ConstraintEnforcer::new(self.options.enforcement.clone(), result.report.seed);
        let summary = enforcer.enforce(&mut result.dataset, schema, &plan.graph)?;
        result.report.enforcement = Some(summary);
        Ok(())
    }

    fn check_cancelled(&self, completed: usize) -> Result<()> {
        match &self.cancel {
            Some(handle) if handle.is_cancelled() => {
                info!(completed, "generation cancelled");
                Err(GenerationError::Cancelled { completed })
            }
            _ => Ok(()),
        }
    }

    fn job(
        &self,
        plan: &RunPlan,
        schema: &DatabaseSchema,
        scenario: &Scenario,
        state: &RunState,
        table_name: &str,
        seed: u64,
    ) -> Result<TableJob> {
        let table = schema.table(table_name).ok_or_else(|| {
            GenerationError::synthesis(table_name, "table missing from schema")
        })?;
        let table_scenario = scenario.table(table_name).cloned().unwrap_or_default();
        let defaults = &self.options.defaults;
        let strategy = table_scenario
            .strategy
            .clone()
            .unwrap_or_else(|| defaults.strategy.clone());
        let synthesizer =
            self.registry
                .get(&strategy)
                .ok_or_else(|| GenerationError::UnknownSynthesizer {
                    table: table_name.to_string(),
                    name: strategy.clone(),
                })?;

        let mut deferred = Vec::new();
        let parents: Vec<Arc<KeyPool>> = table
            .foreign_keys
            .iter()
            .enumerate()
            .map(|(fk_index, fk)| {
                if plan.order.is_deferred(table_name, fk_index) {
                    deferred.push(fk_index);
                    return Arc::new(KeyPool::empty(
                        &fk.referenced_table,
                        fk.referenced_columns.clone(),
                    ));
                }
                let key = (fk.referenced_table.clone(), fk.referenced_columns.clone());
                state.pools.get(&key).cloned().unwrap_or_else(|| {
                    Arc::new(KeyPool::empty(
                        &fk.referenced_table,
                        fk.referenced_columns.clone(),
                    ))
                })
            })
            .collect();

        Ok(TableJob {
            table: table.clone(),
            rows: defaults.resolve_rows(table_scenario.rows),
            scenario: table_scenario,
            seed: hash_seed(seed, table_name),
            parents,
            deferred,
            synthesizer,
            defaults: defaults.clone(),
            max_attempts_row: self.options.max_attempts_row,
        })
    }
}

impl TableJob {
    fn run(self) -> Result<TableOutput> {
        let table_start = Instant::now();
        let strategy = self.synthesizer.name().to_string();
        info!(
            table = %self.table.name,
            rows = self.rows,
            strategy = %strategy,
            "generating table"
        );

        let request = SynthesisRequest {
            table: &self.table,
            scenario: &self.scenario,
            rows: self.rows,
            seed: self.seed,
            parents: &self.parents,
            deferred: &self.deferred,
            defaults: &self.defaults,
            max_attempts_row: self.max_attempts_row,
        };
        let synthesized = self.synthesizer.synthesize(&request)?;
        if synthesized.rows.len() as u64 != self.rows {
            return Err(GenerationError::synthesis(
                &self.table.name,
                format!(
                    "synthesizer '{strategy}' returned {} rows, expected {}",
                    synthesized.rows.len(),
                    self.rows
                ),
            ));
        }

        let unresolved_parent = self.parents.iter().any(|pool| pool.is_empty());
        let needs_enforcement = !self.table.foreign_keys.is_empty()
            && (!self.synthesizer.guarantees_fk_validity()
                || !self.deferred.is_empty()
                || unresolved_parent);

        info!(
            table = %self.table.name,
            rows_generated = synthesized.rows.len(),
            retries = synthesized.retries,
            needs_enforcement,
            duration_ms = table_start.elapsed().as_millis() as u64,
            "table generated"
        );

        Ok(TableOutput {
            report: TableReport {
                table: self.table.name.clone(),
                strategy,
                rows_requested: self.rows,
                rows_generated: synthesized.rows.len() as u64,
                retries: synthesized.retries,
                needs_enforcement,
            },
            rows: synthesized.rows,
        })
    }
}

impl RunState {
    fn new(plan: &RunPlan, scenario: &Scenario, seed: u64) -> Self {
        let mut report = GenerationReport::new(scenario.name.clone(), seed);
        report.cycles = plan.order.warnings.clone();
        report.deferred = plan.order.deferred.clone();
        Self {
            dataset: GeneratedDataset::new(),
            report,
            pools: BTreeMap::new(),
        }
    }

    /// Store a finished table and make its key pools visible to children.
    fn publish(&mut self, plan: &RunPlan, output: TableOutput) {
        let table_name = output.report.table.clone();
        if let Some(key_sets) = plan.published_keys.get(&table_name) {
            for columns in key_sets {
                let pool = KeyPool::from_rows(&table_name, columns, &output.rows);
                self.pools
                    .insert((table_name.clone(), columns.clone()), Arc::new(pool));
            }
        }
        if output.report.needs_enforcement {
            self.dataset.mark_pending(&table_name);
        }
        self.dataset.insert_table(&table_name, output.rows);
        self.report.record_table(output.report);
    }

    fn finish(mut self, plan: &RunPlan, start: Instant) -> GenerationResult {
        self.report
            .tables
            .sort_by_key(|table| plan.order.position(&table.table));
        info!(
            scenario = %self.report.scenario,
            tables = self.report.tables.len(),
            retries_total = self.report.retries_total,
            pending = self.dataset.pending.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "generation completed"
        );
        GenerationResult {
            dataset: self.dataset,
            report: self.report,
        }
    }
}
