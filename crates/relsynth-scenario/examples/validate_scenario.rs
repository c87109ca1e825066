use std::env;
use std::path::PathBuf;

use relsynth_core::DatabaseSchema;
use relsynth_scenario::{Scenario, ValidationReport, validate_scenario};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = env::args().skip(1);
    let mut scenario_path: Option<PathBuf> = None;
    let mut schema_path: Option<PathBuf> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--schema" => {
                schema_path = args.next().map(PathBuf::from);
            }
            _ => {
                if scenario_path.is_none() {
                    scenario_path = Some(PathBuf::from(arg));
                } else {
                    return Err("unexpected argument".into());
                }
            }
        }
    }

    let scenario_path = scenario_path.ok_or("missing scenario path")?;
    let schema_path = schema_path.ok_or("missing --schema path")?;

    let scenario = Scenario::from_path(&scenario_path)?;
    let schema: DatabaseSchema =
        serde_json::from_str(&std::fs::read_to_string(&schema_path)?)?;
    relsynth_core::validate_schema(&schema)?;

    let report = validate_scenario(&scenario, &schema);
    if !report.is_ok() {
        eprintln!("scenario validation failed");
        print_report(&report);
        std::process::exit(1);
    }

    if report.warnings.is_empty() {
        println!("scenario '{}' validated successfully", scenario.name);
    } else {
        eprintln!("scenario '{}' validated with warnings:", scenario.name);
        print_report(&report);
    }

    Ok(())
}

fn print_report(report: &ValidationReport) {
    for issue in &report.errors {
        eprintln!("error {} {}: {}", issue.code, issue.path, issue.message);
        if let Some(hint) = &issue.hint {
            eprintln!("  hint: {hint}");
        }
    }
    for issue in &report.warnings {
        eprintln!("warning {} {}: {}", issue.code, issue.path, issue.message);
        if let Some(hint) = &issue.hint {
            eprintln!("  hint: {hint}");
        }
    }
}
