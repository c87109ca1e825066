//! Scenario contracts: declarative statistical intent for a schema, plus
//! validation of that intent against the schema it targets.

mod errors;
mod legacy;
mod model;
mod schema;
mod validate;

pub use errors::{IssueSeverity, Result, ScenarioError, ValidationIssue, ValidationReport};
pub use model::{
    ColumnSpec, CorrelationSpec, DEFAULT_SEED, Distribution, SCENARIO_VERSION, Scenario,
    SelectionPolicy, TableScenario, TemporalRule, TemporalShape, Threshold, Tolerances,
};
pub use schema::scenario_json_schema;
pub use validate::{
    ValidatedScenario, validate_scenario, validate_scenario_document, validate_scenario_json,
    validate_scenario_strict,
};
