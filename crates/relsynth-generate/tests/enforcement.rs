use std::collections::HashSet;

use relsynth_core::{Column, DatabaseSchema, DependencyGraph, ForeignKey, SemanticType, Table};
use relsynth_generate::{
    ConstraintEnforcer, EnforceOptions, GenerateOptions, GeneratedDataset, GenerationEngine,
    GenerationError, GeneratedValue, LearnedSynthesizer, Row, SynthesizerRegistry,
};
use relsynth_scenario::{Scenario, SelectionPolicy, TableScenario};

fn engine(registry: SynthesizerRegistry) -> GenerationEngine {
    GenerationEngine::new(GenerateOptions::default(), registry)
}

fn id_table(table: &str) -> Table {
    Table::new(table, vec![Column::new("id", SemanticType::Integer)]).with_primary_key(&["id"])
}

fn int_rows(columns: &[&str], values: &[&[i64]]) -> Vec<Row> {
    values
        .iter()
        .map(|row| {
            columns
                .iter()
                .zip(row.iter())
                .map(|(column, value)| (column.to_string(), GeneratedValue::Int(*value)))
                .collect()
        })
        .collect()
}

fn enrollments_schema() -> DatabaseSchema {
    DatabaseSchema::new(vec![
        id_table("students"),
        id_table("courses"),
        Table::new(
            "enrollments",
            vec![
                Column::new("student_id", SemanticType::Integer),
                Column::new("course_id", SemanticType::Integer),
            ],
        )
        .with_primary_key(&["student_id", "course_id"])
        .with_foreign_key(ForeignKey::new(&["student_id"], "students", &["id"]))
        .with_foreign_key(ForeignKey::new(&["course_id"], "courses", &["id"])),
    ])
}

fn int_column_values(rows: &[Row], column: &str) -> Vec<Option<i64>> {
    rows.iter().map(|row| row[column].as_i64()).collect()
}

#[test]
fn two_table_cycle_is_broken_and_repaired() {
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
    let graph = DependencyGraph::build(&schema).expect("graph");
    assert_eq!(graph.cycles().len(), 1);

    let scenario = Scenario::new("cycle")
        .with_table("a", TableScenario::with_rows(30))
        .with_table("b", TableScenario::with_rows(20));
    let result = engine(SynthesizerRegistry::with_defaults())
        .run(&schema, &scenario)
        .expect("cycle run completes");

    assert_eq!(result.report.cycles.len(), 1);
    assert_eq!(result.report.cycles[0].seed_table, "a");
    assert!(result.report.table("a").expect("a").needs_enforcement);
    assert!(result.dataset.pending.is_empty());

    let a_rows = result.dataset.rows("a").expect("a rows");
    let b_rows = result.dataset.rows("b").expect("b rows");
    let a_ids: HashSet<Option<i64>> = int_column_values(a_rows, "id").into_iter().collect();
    let b_ids: HashSet<Option<i64>> = int_column_values(b_rows, "id").into_iter().collect();
    assert!(int_column_values(a_rows, "b_id").iter().all(|id| b_ids.contains(id)));
    assert!(int_column_values(b_rows, "a_id").iter().all(|id| a_ids.contains(id)));
}

#[test]
fn self_reference_points_at_other_employees() {
    let schema = DatabaseSchema::new(vec![
        Table::new(
            "employee",
            vec![
                Column::new("id", SemanticType::Integer),
                Column::new("name", SemanticType::Text),
                Column::new("manager_id", SemanticType::Integer).nullable(),
            ],
        )
        .with_primary_key(&["id"])
        .with_foreign_key(ForeignKey::new(&["manager_id"], "employee", &["id"])),
    ]);
    let scenario = Scenario::new("org").with_table("employee", TableScenario::with_rows(50));
    let result = engine(SynthesizerRegistry::with_defaults())
        .run(&schema, &scenario)
        .expect("run");

    let rows = result.dataset.rows("employee").expect("rows");
    assert_eq!(rows.len(), 50);
    let ids: HashSet<i64> = rows.iter().filter_map(|row| row["id"].as_i64()).collect();
    assert_eq!(ids.len(), 50);
    for row in rows {
        if let Some(manager) = row["manager_id"].as_i64() {
            assert!(ids.contains(&manager), "manager {manager} is not an employee");
            assert_ne!(Some(manager), row["id"].as_i64(), "employee manages itself");
        } else {
            assert!(row["manager_id"].is_null());
        }
    }
    let summary = result.report.enforcement.expect("enforcement ran");
    assert!(summary.violation_count > 0);
}

#[test]
fn empty_parent_with_required_reference_is_unsatisfiable() {
    let schema = DatabaseSchema::new(vec![
        Table::new("plans", vec![Column::new("id", SemanticType::Integer)])
            .with_primary_key(&["id"]),
        Table::new(
            "subscriptions",
            vec![
                Column::new("id", SemanticType::Integer),
                Column::new("plan_id", SemanticType::Integer),
            ],
        )
        .with_primary_key(&["id"])
        .with_foreign_key(ForeignKey::new(&["plan_id"], "plans", &["id"])),
    ]);
    let scenario = Scenario::new("empty parent")
        .with_table("plans", TableScenario::with_rows(0))
        .with_table("subscriptions", TableScenario::with_rows(5));

    let err = engine(SynthesizerRegistry::with_defaults())
        .run(&schema, &scenario)
        .unwrap_err();
    match err {
        GenerationError::UnsatisfiableConstraint {
            table,
            column,
            referenced_table,
        } => {
            assert_eq!(table, "subscriptions");
            assert_eq!(column, "plan_id");
            assert_eq!(referenced_table, "plans");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn empty_parent_with_nullable_reference_is_nulled() {
    let schema = DatabaseSchema::new(vec![
        Table::new("plans", vec![Column::new("id", SemanticType::Integer)])
            .with_primary_key(&["id"]),
        Table::new(
            "subscriptions",
            vec![
                Column::new("id", SemanticType::Integer),
                Column::new("plan_id", SemanticType::Integer).nullable(),
            ],
        )
        .with_primary_key(&["id"])
        .with_foreign_key(ForeignKey::new(&["plan_id"], "plans", &["id"])),
    ]);
    let scenario = Scenario::new("empty parent")
        .with_table("plans", TableScenario::with_rows(0))
        .with_table("subscriptions", TableScenario::with_rows(5));

    let result = engine(SynthesizerRegistry::with_defaults())
        .run(&schema, &scenario)
        .expect("run");
    let rows = result.dataset.rows("subscriptions").expect("rows");
    assert_eq!(rows.len(), 5);
    assert!(rows.iter().all(|row| row["plan_id"] == GeneratedValue::Null));
}

#[test]
fn learned_tables_are_flagged_and_enforced() {
    let schema = DatabaseSchema::new(vec![
        Table::new(
            "customers",
            vec![
                Column::new("id", SemanticType::Integer),
                Column::new("segment", SemanticType::Text),
            ],
        )
        .with_primary_key(&["id"]),
        Table::new(
            "orders",
            vec![
                Column::new("id", SemanticType::Integer),
                Column::new("customer_id", SemanticType::Integer),
                Column::new("amount", SemanticType::Integer),
            ],
        )
        .with_primary_key(&["id"])
        .with_foreign_key(ForeignKey::new(&["customer_id"], "customers", &["id"])),
    ]);

    let reference_scenario = Scenario::new("reference")
        .with_table("customers", TableScenario::with_rows(200))
        .with_table("orders", TableScenario::with_rows(300));
    let reference = engine(SynthesizerRegistry::with_defaults())
        .run(&schema, &reference_scenario)
        .expect("reference run");

    let mut registry = SynthesizerRegistry::with_defaults();
    registry.register(LearnedSynthesizer::fit(&reference.dataset));
    let scenario = Scenario::new("learned")
        .with_table("customers", TableScenario::with_rows(10))
        .with_table(
            "orders",
            TableScenario::with_rows(100).with_strategy(LearnedSynthesizer::NAME),
        );
    let result = engine(registry).run(&schema, &scenario).expect("learned run");

    let orders = result.report.table("orders").expect("orders report");
    assert_eq!(orders.strategy, "learned");
    assert!(orders.needs_enforcement);
    let summary = result.report.enforcement.expect("enforcement ran");
    assert!(summary.violation_count > 0);

    let customer_ids: HashSet<i64> = result
        .dataset
        .rows("customers")
        .expect("customers")
        .iter()
        .filter_map(|row| row["id"].as_i64())
        .collect();
    let orders = result.dataset.rows("orders").expect("orders");
    assert_eq!(orders.len(), 100);
    assert!(
        orders
            .iter()
            .all(|row| row["customer_id"].as_i64().is_some_and(|id| customer_ids.contains(&id)))
    );
}

fn enrollment_pairs(dataset: &GeneratedDataset) -> Vec<(i64, i64)> {
    dataset
        .rows("enrollments")
        .expect("enrollments")
        .iter()
        .map(|row| {
            (
                row["student_id"].as_i64().expect("student_id"),
                row["course_id"].as_i64().expect("course_id"),
            )
        })
        .collect()
}

#[test]
fn repairs_keep_composite_primary_keys_unique() {
    let schema = enrollments_schema();
    let graph = DependencyGraph::build(&schema).expect("graph");
    let mut dataset = GeneratedDataset::new();
    dataset.insert_table("students", int_rows(&["id"], &[&[1], &[2]]));
    dataset.insert_table("courses", int_rows(&["id"], &[&[1], &[2], &[3]]));
    dataset.insert_table(
        "enrollments",
        int_rows(
            &["student_id", "course_id"],
            &[&[1, 1], &[1, 99], &[1, 98], &[2, 97]],
        ),
    );
    dataset.mark_pending("enrollments");

    let summary = ConstraintEnforcer::new(EnforceOptions::default(), 4)
        .enforce(&mut dataset, &schema, &graph)
        .expect("enforce");
    assert_eq!(summary.violation_count, 3);

    let pairs = enrollment_pairs(&dataset);
    assert_eq!(pairs.len(), 4);
    let distinct: HashSet<(i64, i64)> = pairs.iter().copied().collect();
    assert_eq!(distinct.len(), 4, "duplicate enrollment in {pairs:?}");
    let first_student: HashSet<i64> = pairs
        .iter()
        .filter(|(student, _)| *student == 1)
        .map(|(_, course)| *course)
        .collect();
    assert_eq!(first_student, HashSet::from([1, 2, 3]));
    assert!(pairs.iter().all(|(_, course)| (1..=3).contains(course)));
}

#[test]
fn exhausted_composite_key_space_is_unsatisfiable() {
    let schema = enrollments_schema();
    let graph = DependencyGraph::build(&schema).expect("graph");
    let mut dataset = GeneratedDataset::new();
    dataset.insert_table("students", int_rows(&["id"], &[&[1]]));
    dataset.insert_table("courses", int_rows(&["id"], &[&[1], &[2]]));
    dataset.insert_table(
        "enrollments",
        int_rows(&["student_id", "course_id"], &[&[1, 1], &[1, 98], &[1, 99]]),
    );
    dataset.mark_pending("enrollments");

    let err = ConstraintEnforcer::new(EnforceOptions::default(), 4)
        .enforce(&mut dataset, &schema, &graph)
        .unwrap_err();
    match err {
        GenerationError::UnsatisfiableConstraint {
            table,
            column,
            referenced_table,
        } => {
            assert_eq!(table, "enrollments");
            assert_eq!(column, "course_id");
            assert_eq!(referenced_table, "courses");
        }
        other => panic!("unexpected error: {other}"),
    }
    // the failed table keeps its previous rows
    assert_eq!(enrollment_pairs(&dataset), vec![(1, 1), (1, 98), (1, 99)]);
}

#[test]
fn nullable_unique_reference_is_nulled_once_parents_run_out() {
    let schema = DatabaseSchema::new(vec![
        id_table("users"),
        Table::new(
            "profiles",
            vec![
                Column::new("id", SemanticType::Integer),
                Column::new("user_id", SemanticType::Integer).nullable().unique(),
            ],
        )
        .with_primary_key(&["id"])
        .with_foreign_key(ForeignKey::new(&["user_id"], "users", &["id"])),
    ]);
    let graph = DependencyGraph::build(&schema).expect("graph");
    let mut dataset = GeneratedDataset::new();
    dataset.insert_table("users", int_rows(&["id"], &[&[1], &[2]]));
    dataset.insert_table(
        "profiles",
        int_rows(&["id", "user_id"], &[&[1, 9], &[2, 9], &[3, 9]]),
    );
    dataset.mark_pending("profiles");

    let summary = ConstraintEnforcer::new(EnforceOptions::default(), 2)
        .enforce(&mut dataset, &schema, &graph)
        .expect("enforce");
    assert_eq!(summary.violation_count, 3);
    assert_eq!(summary.nulled, 1);

    let users: Vec<i64> = dataset
        .rows("profiles")
        .expect("profiles")
        .iter()
        .filter_map(|row| row["user_id"].as_i64())
        .collect();
    let distinct: HashSet<i64> = users.iter().copied().collect();
    assert_eq!(users.len(), 2);
    assert_eq!(distinct, HashSet::from([1, 2]));
}

#[test]
fn round_robin_replacements_follow_parent_order() {
    let schema = DatabaseSchema::new(vec![
        id_table("customers"),
        Table::new(
            "orders",
            vec![
                Column::new("id", SemanticType::Integer),
                Column::new("customer_id", SemanticType::Integer),
            ],
        )
        .with_primary_key(&["id"])
        .with_foreign_key(ForeignKey::new(&["customer_id"], "customers", &["id"])),
    ]);
    let graph = DependencyGraph::build(&schema).expect("graph");
    let mut dataset = GeneratedDataset::new();
    dataset.insert_table("customers", int_rows(&["id"], &[&[1], &[2], &[3]]));
    dataset.insert_table(
        "orders",
        int_rows(
            &["id", "customer_id"],
            &[&[1, 90], &[2, 2], &[3, 91], &[4, 92], &[5, 93], &[6, 94]],
        ),
    );
    dataset.mark_pending("orders");

    let options = EnforceOptions {
        selection: SelectionPolicy::RoundRobin,
        ..EnforceOptions::default()
    };
    let summary = ConstraintEnforcer::new(options, 9)
        .enforce(&mut dataset, &schema, &graph)
        .expect("enforce");
    assert_eq!(summary.violation_count, 5);
    assert_eq!(
        int_column_values(dataset.rows("orders").expect("orders"), "customer_id"),
        vec![Some(1), Some(2), Some(2), Some(3), Some(1), Some(2)]
    );
}

#[test]
fn skewed_replacements_favour_early_parents() {
    let schema = DatabaseSchema::new(vec![
        id_table("customers"),
        Table::new(
            "orders",
            vec![
                Column::new("id", SemanticType::Integer),
                Column::new("customer_id", SemanticType::Integer),
            ],
        )
        .with_primary_key(&["id"])
        .with_foreign_key(ForeignKey::new(&["customer_id"], "customers", &["id"])),
    ]);
    let graph = DependencyGraph::build(&schema).expect("graph");
    let mut dataset = GeneratedDataset::new();
    let customers: Vec<[i64; 1]> = (1..=10).map(|id| [id]).collect();
    let customer_refs: Vec<&[i64]> = customers.iter().map(|id| id.as_slice()).collect();
    dataset.insert_table("customers", int_rows(&["id"], &customer_refs));
    let orders: Vec<[i64; 2]> = (1..=200).map(|id| [id, 500]).collect();
    let order_refs: Vec<&[i64]> = orders.iter().map(|row| row.as_slice()).collect();
    dataset.insert_table("orders", int_rows(&["id", "customer_id"], &order_refs));
    dataset.mark_pending("orders");

    let options = EnforceOptions {
        selection: SelectionPolicy::Skewed { exponent: 3.0 },
        ..EnforceOptions::default()
    };
    ConstraintEnforcer::new(options, 5)
        .enforce(&mut dataset, &schema, &graph)
        .expect("enforce");
    let values = int_column_values(dataset.rows("orders").expect("orders"), "customer_id");
    let first = values.iter().filter(|value| **value == Some(1)).count();
    assert!(first > 120, "first customer chosen {first} times");
    assert!(values.iter().all(|value| value.is_some_and(|id| (1..=10).contains(&id))));
}

#[test]
fn learned_junction_rows_keep_distinct_composite_keys() {
    let schema = enrollments_schema();
    let reference_scenario = Scenario::new("reference")
        .with_table("students", TableScenario::with_rows(200))
        .with_table("courses", TableScenario::with_rows(200))
        .with_table("enrollments", TableScenario::with_rows(300));
    let reference = engine(SynthesizerRegistry::with_defaults())
        .run(&schema, &reference_scenario)
        .expect("reference run");

    let mut registry = SynthesizerRegistry::with_defaults();
    registry.register(LearnedSynthesizer::fit(&reference.dataset));
    let scenario = Scenario::new("learned enrollments")
        .with_table("students", TableScenario::with_rows(8))
        .with_table("courses", TableScenario::with_rows(8))
        .with_table(
            "enrollments",
            TableScenario::with_rows(8).with_strategy(LearnedSynthesizer::NAME),
        );
    let result = engine(registry).run(&schema, &scenario).expect("learned run");

    let pairs = enrollment_pairs(&result.dataset);
    assert_eq!(pairs.len(), 8);
    let distinct: HashSet<(i64, i64)> = pairs.iter().copied().collect();
    assert_eq!(distinct.len(), 8, "duplicate enrollment in {pairs:?}");
    assert!(
        pairs
            .iter()
            .all(|(student, course)| (1..=8).contains(student) && (1..=8).contains(course))
    );
}
