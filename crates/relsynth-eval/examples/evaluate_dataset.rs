use std::env;
use std::path::PathBuf;

use relsynth_core::DatabaseSchema;
use relsynth_eval::{QualityValidator, ValidateOptions, render_report};
use relsynth_generate::{GenerateOptions, GenerationEngine, SynthesizerRegistry};
use relsynth_scenario::Scenario;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut args = env::args().skip(1);
    let mut scenario_path: Option<PathBuf> = None;
    let mut schema_path: Option<PathBuf> = None;
    let mut json = false;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--scenario" => scenario_path = args.next().map(PathBuf::from),
            "--schema" => schema_path = args.next().map(PathBuf::from),
            "--json" => json = true,
            _ => {
                if scenario_path.is_none() {
                    scenario_path = Some(PathBuf::from(arg));
                } else {
                    return Err("unexpected argument".into());
                }
            }
        }
    }

    let scenario_path = scenario_path.ok_or("missing --scenario path")?;
    let schema_path = schema_path.ok_or("missing --schema path")?;

    let scenario = Scenario::from_path(&scenario_path)?;
    let schema: DatabaseSchema = serde_json::from_str(&std::fs::read_to_string(&schema_path)?)?;

    let engine = GenerationEngine::new(GenerateOptions::default(), SynthesizerRegistry::with_defaults());
    let generated = engine.run(&schema, &scenario)?;

    let options = ValidateOptions::default();
    let max_examples = options.max_examples;
    let report = QualityValidator::new(options).validate(&generated.dataset, &schema, &scenario)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", render_report(&report, max_examples));
    }
    Ok(())
}
