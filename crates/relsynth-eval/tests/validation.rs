use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use relsynth_core::{CheckPredicate, Column, DatabaseSchema, ForeignKey, SemanticType, Table};
use relsynth_eval::{
    EvalError, FindingKind, QualityValidator, ValidateOptions, Verdict, ViolationKind,
};
use relsynth_generate::{
    GenerateOptions, GeneratedDataset, GeneratedValue, GenerationEngine, Row, SynthesizerRegistry,
};
use relsynth_scenario::{ColumnSpec, Distribution, Scenario, TableScenario};

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../relsynth-scenario/tests/fixtures")
        .join(name)
}

fn load_shop() -> (DatabaseSchema, Scenario) {
    let contents = fs::read_to_string(fixture("shop.schema.json")).expect("read schema fixture");
    let schema: DatabaseSchema = serde_json::from_str(&contents).expect("parse schema.json");
    let scenario =
        Scenario::from_path(&fixture("checkout.scenario.json")).expect("load scenario fixture");
    (schema, scenario)
}

fn row(values: Vec<(&str, GeneratedValue)>) -> Row {
    values
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

fn text(value: &str) -> GeneratedValue {
    GeneratedValue::Text(value.to_string())
}

fn validator() -> QualityValidator {
    QualityValidator::new(ValidateOptions::default())
}

#[test]
fn generated_shop_dataset_is_structurally_sound_and_validation_is_idempotent() {
    let (schema, scenario) = load_shop();
    let generated = GenerationEngine::new(GenerateOptions::default(), SynthesizerRegistry::with_defaults())
        .run(&schema, &scenario)
        .expect("run generation");

    let first = validator()
        .validate(&generated.dataset, &schema, &scenario)
        .expect("validate");
    let second = validator()
        .validate(&generated.dataset, &schema, &scenario)
        .expect("validate again");
    assert_eq!(first, second);

    assert_eq!(first.structural_violation_count(), 0);
    assert!(first.cycles.is_empty());

    let customers = first.table("customers").expect("customers");
    assert_eq!(customers.rows_found, 100);
    assert_eq!(customers.rows_expected, Some(100));
    let row_count = customers
        .finding(FindingKind::RowCount, "customers")
        .expect("row count finding");
    assert_eq!(row_count.verdict, Verdict::Pass);
    assert!(customers.finding(FindingKind::Distribution, "age").is_some());
    assert!(customers.finding(FindingKind::Correlation, "age~income").is_some());
    let email = customers
        .columns
        .iter()
        .find(|profile| profile.column == "email")
        .expect("email profile");
    assert_eq!(email.distinct_count + email.null_count, 100);

    let orders = first.table("orders").expect("orders");
    assert_eq!(orders.rows_found, 400);
    let shipping = orders
        .finding(FindingKind::Temporal, "shipped_at>ordered_at")
        .expect("after rule finding");
    assert_eq!(shipping.score, 0.0);
    let window = orders
        .finding(FindingKind::Temporal, "ordered_at")
        .expect("window finding");
    assert_eq!(window.score, 0.0);
}

#[test]
fn external_dataset_violations_are_reported_not_raised() {
    let schema = DatabaseSchema::new(vec![
        Table::new(
            "customers",
            vec![
                Column::new("id", SemanticType::Integer),
                Column::new("name", SemanticType::Text).with_max_length(5),
            ],
        )
        .with_primary_key(&["id"]),
        Table::new(
            "orders",
            vec![
                Column::new("id", SemanticType::Integer),
                Column::new("customer_id", SemanticType::Integer),
                Column::new("qty", SemanticType::Integer).with_check(CheckPredicate::Range {
                    min: Some(1.0),
                    max: None,
                }),
                Column::new("status", SemanticType::Text),
            ],
        )
        .with_primary_key(&["id"])
        .with_foreign_key(ForeignKey::new(&["customer_id"], "customers", &["id"])),
    ]);

    let dataset = GeneratedDataset::from_tables(BTreeMap::from([
        (
            "customers".to_string(),
            vec![
                row(vec![("id", GeneratedValue::Int(1)), ("name", text("ann"))]),
                row(vec![("id", GeneratedValue::Int(2)), ("name", text("bartholomew"))]),
            ],
        ),
        (
            "orders".to_string(),
            vec![
                row(vec![
                    ("id", GeneratedValue::Int(1)),
                    ("customer_id", GeneratedValue::Int(1)),
                    ("qty", GeneratedValue::Int(2)),
                    ("status", text("new")),
                ]),
                row(vec![
                    ("id", GeneratedValue::Int(1)),
                    ("customer_id", GeneratedValue::Int(3)),
                    ("qty", GeneratedValue::Int(1)),
                    ("status", text("new")),
                ]),
                row(vec![
                    ("id", GeneratedValue::Int(2)),
                    ("customer_id", GeneratedValue::Int(2)),
                    ("qty", GeneratedValue::Int(0)),
                    ("status", GeneratedValue::Null),
                ]),
                row(vec![
                    ("id", GeneratedValue::Int(3)),
                    ("customer_id", GeneratedValue::Int(1)),
                    ("qty", GeneratedValue::Int(1)),
                    ("status", GeneratedValue::Int(5)),
                ]),
            ],
        ),
    ]));

    let report = validator()
        .validate(&dataset, &schema, &Scenario::new("external"))
        .expect("validate");
    assert_eq!(report.verdict, Verdict::Fail);

    let customers = report.table("customers").expect("customers");
    let length: Vec<_> = customers.violations(ViolationKind::Length).collect();
    assert_eq!(length.len(), 1);
    assert_eq!(length[0].rows, vec![1]);

    let orders = report.table("orders").expect("orders");
    assert_eq!(orders.verdict, Verdict::Fail);
    let count = |kind| orders.violations(kind).map(|v| v.count).sum::<u64>();
    assert_eq!(count(ViolationKind::PrimaryKey), 1);
    assert_eq!(count(ViolationKind::ForeignKey), 1);
    assert_eq!(count(ViolationKind::NotNull), 1);
    assert_eq!(count(ViolationKind::Check), 1);
    assert_eq!(count(ViolationKind::Type), 1);

    let foreign_key = orders
        .violations(ViolationKind::ForeignKey)
        .next()
        .expect("fk violation");
    assert_eq!(foreign_key.path, "orders.customer_id -> customers.id");
    assert_eq!(foreign_key.rows, vec![1]);
    assert_eq!(foreign_key.example.as_deref(), Some("3"));
    assert_eq!(dataset.row_count("orders"), 4);
}

#[test]
fn categorical_drift_is_graded_against_tolerances() {
    let schema = DatabaseSchema::new(vec![
        Table::new(
            "accounts",
            vec![
                Column::new("id", SemanticType::Integer),
                Column::new("tier", SemanticType::Text),
            ],
        )
        .with_primary_key(&["id"]),
    ]);
    let weights = BTreeMap::from([("gold".to_string(), 1.0), ("silver".to_string(), 3.0)]);
    let scenario = Scenario::new("tiers").with_table(
        "accounts",
        TableScenario::with_rows(100).with_column(
            "tier",
            ColumnSpec::distributed(Distribution::Categorical { weights }),
        ),
    );
    let accounts = |gold: i64| -> GeneratedDataset {
        let rows = (0..100)
            .map(|idx| {
                let tier = if idx < gold { "gold" } else { "silver" };
                row(vec![("id", GeneratedValue::Int(idx + 1)), ("tier", text(tier))])
            })
            .collect();
        GeneratedDataset::from_tables(BTreeMap::from([("accounts".to_string(), rows)]))
    };

    let matching = validator()
        .validate(&accounts(25), &schema, &scenario)
        .expect("validate");
    let finding = matching
        .table("accounts")
        .and_then(|table| table.finding(FindingKind::Distribution, "tier"))
        .expect("tier finding");
    assert_eq!(finding.metric, "psi");
    assert!(finding.score.abs() < 1e-9);
    assert_eq!(matching.verdict, Verdict::Pass);
    assert!(matching.passed());

    let drifted = validator()
        .validate(&accounts(75), &schema, &scenario)
        .expect("validate");
    let finding = drifted
        .table("accounts")
        .and_then(|table| table.finding(FindingKind::Distribution, "tier"))
        .expect("tier finding");
    assert_eq!(finding.verdict, Verdict::Fail);
    assert_eq!(drifted.structural_violation_count(), 0);
    assert_eq!(drifted.verdict, Verdict::Fail);
}

#[test]
fn continuous_distributions_use_ks_distance() {
    let schema = DatabaseSchema::new(vec![
        Table::new(
            "readings",
            vec![
                Column::new("id", SemanticType::Integer),
                Column::new("value", SemanticType::Decimal),
            ],
        )
        .with_primary_key(&["id"]),
    ]);
    let scenario = Scenario::new("readings").with_table(
        "readings",
        TableScenario::with_rows(200).with_column(
            "value",
            ColumnSpec::distributed(Distribution::Uniform {
                min: 0.0,
                max: 10.0,
            }),
        ),
    );
    let rows = (0..200)
        .map(|idx| {
            row(vec![
                ("id", GeneratedValue::Int(idx + 1)),
                ("value", GeneratedValue::Float((idx as f64 + 0.5) / 20.0)),
            ])
        })
        .collect();
    let dataset = GeneratedDataset::from_tables(BTreeMap::from([("readings".to_string(), rows)]));

    let report = validator()
        .validate(&dataset, &schema, &scenario)
        .expect("validate");
    let readings = report.table("readings").expect("readings");
    let finding = readings
        .finding(FindingKind::Distribution, "value")
        .expect("value finding");
    assert_eq!(finding.metric, "ks");
    assert!(finding.score < 0.01, "ks = {}", finding.score);
    assert_eq!(readings.verdict, Verdict::Pass);
    let profile = &readings.columns[1];
    assert_eq!(profile.min, Some(0.025));
    assert_eq!(profile.max, Some(9.975));
}

#[test]
fn cyclic_schemas_are_recorded_in_the_report() {
    let schema = DatabaseSchema::new(vec![
        Table::new(
            "a",
            vec![
                Column::new("id", SemanticType::Integer),
                Column::new("b_id", SemanticType::Integer),
            ],
        )
        .with_primary_key(&["id"])
        .with_foreign_key(ForeignKey::new(&["b_id"], "b", &["id"])),
        Table::new(
            "b",
            vec![
                Column::new("id", SemanticType::Integer),
                Column::new("a_id", SemanticType::Integer),
            ],
        )
        .with_primary_key(&["id"])
        .with_foreign_key(ForeignKey::new(&["a_id"], "a", &["id"])),
    ]);
    let scenario = Scenario::new("cycle")
        .with_table("a", TableScenario::with_rows(15))
        .with_table("b", TableScenario::with_rows(10));
    let generated = GenerationEngine::new(GenerateOptions::default(), SynthesizerRegistry::with_defaults())
        .run(&schema, &scenario)
        .expect("run generation");

    let report = validator()
        .validate(&generated.dataset, &schema, &scenario)
        .expect("validate");
    assert_eq!(report.cycles.len(), 1);
    assert_eq!(report.structural_violation_count(), 0);
    assert_eq!(report.verdict, Verdict::Pass);
}

#[test]
fn unknown_dataset_tables_are_rejected() {
    let schema = DatabaseSchema::new(vec![
        Table::new("tags", vec![Column::new("id", SemanticType::Integer)]).with_primary_key(&["id"]),
    ]);
    let dataset = GeneratedDataset::from_tables(BTreeMap::from([(
        "ghosts".to_string(),
        vec![row(vec![("id", GeneratedValue::Int(1))])],
    )]));

    let err = validator()
        .validate(&dataset, &schema, &Scenario::new("ghosts"))
        .unwrap_err();
    assert!(matches!(err, EvalError::UnknownTable { ref table } if table == "ghosts"));
}
