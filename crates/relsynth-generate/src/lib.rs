//! Relational data generation for relsynth.
//!
//! This crate turns a schema plus a scenario into a deterministic in-memory
//! dataset: tables are synthesized in foreign-key dependency order by
//! pluggable row synthesizers, and a constraint enforcer repairs any
//! foreign-key values a synthesizer could not guarantee.

pub mod checks;
pub mod dataset;
pub mod enforce;
pub mod engine;
pub mod errors;
pub mod model;
pub mod pool;
pub mod synth;
pub mod value;

pub use dataset::{GeneratedDataset, Row};
pub use enforce::ConstraintEnforcer;
pub use engine::{CancelHandle, GenerationEngine, GenerationResult};
pub use errors::{GenerationError, Result};
pub use model::{
    DefaultPolicy, EnforceOptions, EnforceScope, EnforcementSummary, GenerateOptions,
    GenerationReport, RULE_BASED, TableReport,
};
pub use pool::{KeyPool, KeySelector};
pub use synth::{
    LearnedSynthesizer, RowSynthesizer, RuleBasedSynthesizer, SynthesisRequest, Synthesized,
    SynthesizerRegistry,
};
pub use value::{GeneratedValue, tuple_key};
