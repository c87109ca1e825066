use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use relsynth_core::{Column, DatabaseSchema, ForeignKey, SemanticType, Table};
use relsynth_generate::{
    CancelHandle, GenerateOptions, GenerationEngine, GenerationError, GeneratedDataset,
    GeneratedValue, SynthesizerRegistry, tuple_key,
};
use relsynth_scenario::{Scenario, TableScenario};

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

fn engine() -> GenerationEngine {
    GenerationEngine::new(GenerateOptions::default(), SynthesizerRegistry::with_defaults())
}

/// Every non-null foreign-key tuple exists among the parent's key tuples.
fn assert_referential_integrity(schema: &DatabaseSchema, dataset: &GeneratedDataset) {
    for table in &schema.tables {
        let rows = dataset.rows(&table.name).unwrap_or(&[]);
        for fk in &table.foreign_keys {
            let parent_keys: HashSet<String> = dataset
                .rows(&fk.referenced_table)
                .unwrap_or(&[])
                .iter()
                .map(|row| {
                    let key: Vec<GeneratedValue> = fk
                        .referenced_columns
                        .iter()
                        .map(|column| row[column].clone())
                        .collect();
                    tuple_key(&key)
                })
                .collect();
            for (idx, row) in rows.iter().enumerate() {
                let key: Vec<GeneratedValue> =
                    fk.columns.iter().map(|column| row[column].clone()).collect();
                if key.iter().any(GeneratedValue::is_null) {
                    continue;
                }
                assert!(
                    parent_keys.contains(&tuple_key(&key)),
                    "{}[{idx}] references missing {} key {:?}",
                    table.name,
                    fk.referenced_table,
                    key
                );
            }
        }
    }
}

#[test]
fn shop_scenario_generates_exact_rows_with_valid_references() {
    let (schema, scenario) = load_shop();
    let result = engine().run(&schema, &scenario).expect("run generation");

    assert_eq!(result.dataset.row_count("customers"), 100);
    assert_eq!(result.dataset.row_count("orders"), 400);
    assert_eq!(result.report.seed, 11);
    assert_eq!(
        result
            .report
            .tables
            .iter()
            .map(|table| table.table.as_str())
            .collect::<Vec<_>>(),
        vec!["customers", "orders"]
    );
    assert_referential_integrity(&schema, &result.dataset);

    for row in result.dataset.rows("customers").expect("customers") {
        let age = row["age"].as_i64().expect("age is an integer");
        assert!((18..=80).contains(&age), "age {age}");
        assert!(row["email"].as_str().is_some_and(|email| email.contains('@')));
        assert!(row["region"].as_str().is_some_and(|region| region.chars().count() <= 16));
    }
    for row in result.dataset.rows("orders").expect("orders") {
        let total = row["total"].as_f64().expect("total");
        assert!((0.0..=10_000.0).contains(&total), "total {total}");
        let ordered_at = row["ordered_at"].as_datetime().expect("ordered_at");
        assert_eq!(ordered_at.format("%Y").to_string(), "2024");
        if let Some(shipped_at) = row["shipped_at"].as_datetime() {
            let gap = (shipped_at - ordered_at).num_seconds();
            assert!((3600..=604_800).contains(&gap), "gap {gap}");
        }
    }
}

#[test]
fn same_seed_yields_identical_datasets() {
    let (schema, scenario) = load_shop();
    let first = engine().run(&schema, &scenario).expect("first run");
    let second = engine().run(&schema, &scenario).expect("second run");
    assert_eq!(first.dataset, second.dataset);
    assert_eq!(first.report, second.report);

    let other = engine()
        .generate(&schema, &scenario, scenario.seed + 1)
        .expect("other seed");
    assert_ne!(first.dataset.tables["customers"], other.dataset.tables["customers"]);
}

#[test]
fn parents_are_generated_before_children() {
    let schema = DatabaseSchema::new(vec![
        Table::new(
            "orders",
            vec![
                Column::new("id", SemanticType::Integer),
                Column::new("customer_id", SemanticType::Integer),
            ],
        )
        .with_primary_key(&["id"])
        .with_foreign_key(ForeignKey::new(&["customer_id"], "customers", &["id"])),
        Table::new("customers", vec![Column::new("id", SemanticType::Integer)])
            .with_primary_key(&["id"]),
    ]);
    let scenario = Scenario::new("ordering")
        .with_table("customers", TableScenario::with_rows(5))
        .with_table("orders", TableScenario::with_rows(20));

    let result = engine()
        .generate(&schema, &scenario, 1)
        .expect("generate");
    assert_eq!(result.report.tables[0].table, "customers");
    assert_eq!(result.report.tables[1].table, "orders");
    assert!(result.dataset.pending.is_empty());
    assert_referential_integrity(&schema, &result.dataset);
}

#[test]
fn composite_foreign_keys_reference_whole_parent_tuples() {
    let schema = DatabaseSchema::new(vec![
        Table::new(
            "stores",
            vec![
                Column::new("region", SemanticType::Text),
                Column::new("code", SemanticType::Integer),
            ],
        )
        .with_primary_key(&["region", "code"]),
        Table::new(
            "shipments",
            vec![
                Column::new("id", SemanticType::Integer),
                Column::new("store_region", SemanticType::Text),
                Column::new("store_code", SemanticType::Integer),
            ],
        )
        .with_primary_key(&["id"])
        .with_foreign_key(ForeignKey::new(
            &["store_region", "store_code"],
            "stores",
            &["region", "code"],
        )),
    ]);
    let scenario = Scenario::new("composite")
        .with_table("stores", TableScenario::with_rows(10))
        .with_table("shipments", TableScenario::with_rows(60));

    let result = engine().run(&schema, &scenario).expect("run");
    assert_eq!(result.dataset.row_count("shipments"), 60);
    assert_referential_integrity(&schema, &result.dataset);

    let stores: HashSet<String> = result
        .dataset
        .rows("stores")
        .expect("stores")
        .iter()
        .map(|row| tuple_key(&[row["region"].clone(), row["code"].clone()]))
        .collect();
    assert_eq!(stores.len(), 10);
    let referenced: HashSet<String> = result
        .dataset
        .rows("shipments")
        .expect("shipments")
        .iter()
        .map(|row| tuple_key(&[row["store_region"].clone(), row["store_code"].clone()]))
        .collect();
    assert!(referenced.len() > 1);
    assert!(referenced.is_subset(&stores));
}

#[test]
fn tables_without_scenario_use_default_and_preview_rows() {
    let schema = DatabaseSchema::new(vec![
        Table::new("tags", vec![Column::new("label", SemanticType::Text).unique()]),
    ]);
    let scenario = Scenario::new("defaults");

    let result = engine().generate(&schema, &scenario, 3).expect("generate");
    assert_eq!(result.dataset.row_count("tags"), 1000);

    let mut options = GenerateOptions::default();
    options.defaults.preview_rows = Some(10);
    let preview = GenerationEngine::new(options, SynthesizerRegistry::with_defaults())
        .generate(&schema, &scenario, 3)
        .expect("preview");
    assert_eq!(preview.dataset.row_count("tags"), 10);
    assert_eq!(
        preview.dataset.rows("tags").expect("tags")[0]["label"],
        GeneratedValue::Text("label_00001".to_string())
    );
}

#[test]
fn check_in_lists_drive_enumerated_columns() {
    let schema = DatabaseSchema::new(vec![
        Table::new(
            "tickets",
            vec![
                Column::new("id", SemanticType::Integer),
                Column::new("status", SemanticType::Text),
                Column::new("priority", SemanticType::Integer),
            ],
        )
        .with_primary_key(&["id"])
        .with_check("status IN ('open', 'closed') AND priority BETWEEN 1 AND 3"),
    ]);
    let scenario = Scenario::new("tickets").with_table("tickets", TableScenario::with_rows(60));
    let result = engine().generate(&schema, &scenario, 9).expect("generate");

    for row in result.dataset.rows("tickets").expect("tickets") {
        assert!(matches!(row["status"].as_str(), Some("open" | "closed")));
        assert!(matches!(row["priority"].as_i64(), Some(1..=3)));
    }
}

#[test]
fn unknown_strategy_is_rejected() {
    let (schema, mut scenario) = load_shop();
    scenario
        .tables
        .get_mut("orders")
        .expect("orders")
        .strategy = Some("learned".to_string());

    let err = engine().run(&schema, &scenario).unwrap_err();
    assert!(matches!(
        err,
        GenerationError::UnknownSynthesizer { ref table, ref name } if table == "orders" && name == "learned"
    ));
}

#[test]
fn invalid_scenario_fails_before_generation() {
    let (schema, scenario) = load_shop();
    let scenario = scenario.with_table("ghosts", TableScenario::with_rows(1));

    let err = engine().run(&schema, &scenario).unwrap_err();
    match err {
        GenerationError::ScenarioValidation(report) => {
            assert!(report.has_code("unknown_table"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn cancelled_runs_stop_at_table_boundary() {
    let (schema, scenario) = load_shop();
    let handle = CancelHandle::new();
    handle.cancel();
    let engine = engine().with_cancellation(handle);

    let err = engine.run(&schema, &scenario).unwrap_err();
    assert!(matches!(err, GenerationError::Cancelled { completed: 0 }));
}

#[tokio::test]
async fn concurrent_generation_matches_sequential() {
    let (mut schema, mut scenario) = load_shop();
    schema.tables.push(
        Table::new(
            "suppliers",
            vec![
                Column::new("id", SemanticType::Uuid),
                Column::new("company_name", SemanticType::Text),
            ],
        )
        .with_primary_key(&["id"]),
    );
    scenario = scenario.with_table("suppliers", TableScenario::with_rows(25));

    let sequential = engine()
        .generate(&schema, &scenario, 5)
        .expect("sequential");

    for max_parallel_tables in [0, 1] {
        let options = GenerateOptions {
            max_parallel_tables,
            ..GenerateOptions::default()
        };
        let concurrent = GenerationEngine::new(options, SynthesizerRegistry::with_defaults())
            .generate_concurrent(&schema, &scenario, 5)
            .await
            .expect("concurrent");
        assert_eq!(sequential.dataset, concurrent.dataset);
        assert_eq!(sequential.report, concurrent.report);
    }

    let enforced = engine()
        .run_concurrent(&schema, &scenario)
        .await
        .expect("run concurrent");
    assert!(enforced.report.enforcement.is_some());
    assert_referential_integrity(&schema, &enforced.dataset);
}
