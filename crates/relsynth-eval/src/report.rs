use crate::model::{QualityReport, TableQuality, Verdict, ViolationKind};

/// Render a deterministic markdown report from a quality report.
pub fn render_report(report: &QualityReport, max_examples: usize) -> String {
    let mut lines = Vec::new();

    lines.push("# Relsynth Quality Report".to_string());
    lines.push(String::new());
    lines.push("## Run summary".to_string());
    lines.push(format!("- scenario: {}", report.scenario));
    lines.push(format!("- verdict: {}", report.verdict.as_str()));
    lines.push(format!(
        "- structural_violations: {}",
        report.structural_violation_count()
    ));
    lines.push(String::new());

    lines.push("## Tables".to_string());
    lines.push("| table | verdict | rows_expected | rows_found | violations | findings |".to_string());
    lines.push("| --- | --- | --- | --- | --- | --- |".to_string());
    for table in &report.tables {
        let expected = table
            .rows_expected
            .map(|value| value.to_string())
            .unwrap_or_else(|| "-".to_string());
        lines.push(format!(
            "| {} | {} | {} | {} | {} | {} |",
            table.table,
            table.verdict.as_str(),
            expected,
            table.rows_found,
            table.violation_count(),
            table.statistical.len()
        ));
    }
    lines.push(String::new());

    if !report.cycles.is_empty() {
        lines.push("## Cyclic dependencies".to_string());
        for cycle in &report.cycles {
            lines.push(format!("- {cycle}"));
        }
        lines.push(String::new());
    }

    let findings: Vec<String> = report
        .tables
        .iter()
        .flat_map(|table| {
            table
                .statistical
                .iter()
                .filter(|finding| finding.verdict != Verdict::Pass)
                .map(move |finding| {
                    let note = finding
                        .note
                        .as_ref()
                        .map(|note| format!(" ({note})"))
                        .unwrap_or_default();
                    format!(
                        "- {} {}.{}: {}={:.4} (warn {}, fail {}){}",
                        finding.verdict.as_str(),
                        table.table,
                        finding.subject,
                        finding.metric,
                        finding.score,
                        finding.threshold.warn,
                        finding.threshold.fail,
                        note
                    )
                })
        })
        .collect();
    if !findings.is_empty() {
        lines.push("## Statistical findings".to_string());
        lines.extend(findings);
        lines.push(String::new());
    }

    let violations: Vec<_> = report
        .tables
        .iter()
        .flat_map(|table| table.structural.iter())
        .collect();
    if !violations.is_empty() {
        lines.push("## Top violations".to_string());
        for violation in violations.iter().take(max_examples) {
            let rows = if violation.rows.is_empty() {
                String::new()
            } else {
                let shown: Vec<String> = violation.rows.iter().map(u64::to_string).collect();
                format!(" rows [{}]", shown.join(", "))
            };
            let example = violation
                .example
                .as_ref()
                .map(|value| format!(" example={value}"))
                .unwrap_or_default();
            lines.push(format!(
                "- {} {}: {} x{}{}{}",
                violation.kind.as_str(),
                violation.path,
                violation.message,
                violation.count,
                rows,
                example
            ));
        }
        lines.push(String::new());
    }

    let unevaluated: Vec<String> = report
        .tables
        .iter()
        .flat_map(|table| {
            table
                .unevaluated_checks
                .iter()
                .map(move |check| format!("- {}: {}", table.table, check))
        })
        .collect();
    if !unevaluated.is_empty() {
        lines.push("## Checks not evaluated".to_string());
        lines.extend(unevaluated);
        lines.push(String::new());
    }

    lines.push("## Recommendations".to_string());
    lines.extend(recommendations(&report.tables));
    lines.join("\n")
}

fn recommendations(tables: &[TableQuality]) -> Vec<String> {
    let has = |kind: ViolationKind| tables.iter().any(|table| table.violations(kind).next().is_some());
    let mut lines = Vec::new();
    if has(ViolationKind::NotNull) {
        lines.push("- fill NOT NULL columns or mark them nullable in the schema.".to_string());
    }
    if has(ViolationKind::PrimaryKey) || has(ViolationKind::Unique) {
        lines.push("- increase unique key space or deduplicate key columns.".to_string());
    }
    if has(ViolationKind::ForeignKey) {
        lines.push("- run the constraint enforcer over tables with broken references.".to_string());
    }
    if has(ViolationKind::Type) || has(ViolationKind::Length) {
        lines.push("- align value shapes with the declared column types.".to_string());
    }
    let statistical_drift = tables.iter().any(|table| {
        table
            .statistical
            .iter()
            .any(|finding| finding.verdict != Verdict::Pass)
    });
    if statistical_drift {
        lines.push("- widen scenario tolerances or revisit declared distributions.".to_string());
    }
    if lines.is_empty() {
        lines.push("- no violations detected; compare reports across runs for drift.".to_string());
    }
    lines
}

#[cfg(test)]
mod tests {
    use relsynth_scenario::Threshold;

    use super::*;
    use crate::model::{FindingKind, StatisticalFinding, StructuralViolation};

    fn report() -> QualityReport {
        QualityReport {
            scenario: "checkout".to_string(),
            verdict: Verdict::Fail,
            tables: vec![TableQuality {
                table: "orders".to_string(),
                verdict: Verdict::Fail,
                rows_found: 9,
                rows_expected: Some(10),
                structural: vec![StructuralViolation {
                    kind: ViolationKind::ForeignKey,
                    path: "orders.customer_id -> customers.id".to_string(),
                    message: "broken foreign key reference".to_string(),
                    count: 3,
                    rows: vec![0, 4, 7],
                    example: Some("99".to_string()),
                }],
                statistical: vec![StatisticalFinding {
                    kind: FindingKind::RowCount,
                    subject: "orders".to_string(),
                    metric: "relative_delta".to_string(),
                    score: 0.1,
                    observed: Some(9.0),
                    expected: Some(10.0),
                    threshold: Threshold::new(0.0, 0.0),
                    verdict: Verdict::Fail,
                    note: None,
                }],
                columns: Vec::new(),
                unevaluated_checks: Vec::new(),
            }],
            cycles: Vec::new(),
        }
    }

    #[test]
    fn renders_sections_for_failures() {
        let markdown = render_report(&report(), 20);
        assert!(markdown.starts_with("# Relsynth Quality Report"));
        assert!(markdown.contains("| orders | FAIL | 10 | 9 | 3 | 1 |"));
        assert!(markdown.contains("- FAIL orders.orders: relative_delta=0.1000"));
        assert!(markdown.contains(
            "- foreign_key orders.customer_id -> customers.id: broken foreign key reference x3 rows [0, 4, 7] example=99"
        ));
        assert!(markdown.contains("- run the constraint enforcer"));
    }

    #[test]
    fn rendering_is_deterministic() {
        assert_eq!(render_report(&report(), 5), render_report(&report(), 5));
    }
}
