//! Quality validation for relsynth datasets.
//!
//! The validator checks a dataset, generated or supplied from elsewhere,
//! against the schema it claims to follow and the scenario that described
//! it. Structural violations and statistical deviations are returned as data
//! in a [`QualityReport`] with a PASS/WARN/FAIL verdict per table.

pub mod errors;
pub mod model;
pub mod report;
pub mod stats;
pub mod validator;

pub use errors::{EvalError, Result};
pub use model::{
    ColumnProfile, FindingKind, QualityReport, StatisticalFinding, StructuralViolation,
    TableQuality, ValidateOptions, Verdict, ViolationKind,
};
pub use report::render_report;
pub use validator::QualityValidator;
