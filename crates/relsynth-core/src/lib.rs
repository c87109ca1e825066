//! Core contracts for relsynth.
//!
//! This crate defines the schema model consumed by generation and validation,
//! schema integrity checks, and the foreign-key dependency graph that orders
//! table generation.

pub mod constraints;
pub mod error;
pub mod graph;
pub mod schema;
pub mod types;
pub mod validation;

pub use constraints::{CheckConstraint, CheckPredicate, ForeignKey, PrimaryKey, UniqueConstraint};
pub use error::{Error, Result};
pub use graph::{
    Cycle, CyclicDependencyWarning, DeferReason, DeferredEdge, DependencyGraph, FkEdge,
    GenerationOrder, TableId,
};
pub use schema::{Column, DatabaseSchema, Table};
pub use types::{ColumnType, SemanticType};
pub use validation::validate_schema;

/// Current contract version for serialized schemas.
pub const SCHEMA_VERSION: &str = "0.1";
