use std::env;
use std::path::PathBuf;

use relsynth_core::DatabaseSchema;
use relsynth_generate::{GenerateOptions, GenerationEngine, SynthesizerRegistry};
use relsynth_scenario::Scenario;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut args = env::args().skip(1);
    let mut scenario_path: Option<PathBuf> = None;
    let mut schema_path: Option<PathBuf> = None;
    let mut options_path: Option<PathBuf> = None;
    let mut preview: Option<u64> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--scenario" => scenario_path = args.next().map(PathBuf::from),
            "--schema" => schema_path = args.next().map(PathBuf::from),
            "--options" => options_path = args.next().map(PathBuf::from),
            "--preview" => preview = args.next().and_then(|value| value.parse().ok()),
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

    let mut options = match options_path {
        Some(path) => GenerateOptions::from_toml_str(&std::fs::read_to_string(path)?)?,
        None => GenerateOptions::default(),
    };
    if preview.is_some() {
        options.defaults.preview_rows = preview;
    }

    let engine = GenerationEngine::new(options, SynthesizerRegistry::with_defaults());
    let result = engine.run(&schema, &scenario)?;

    for (table, rows) in &result.dataset.tables {
        println!("{table}: {} rows", rows.len());
        if let Some(first) = rows.first() {
            println!("  {}", serde_json::to_string(first)?);
        }
    }
    println!("{}", serde_json::to_string_pretty(&result.report)?);
    Ok(())
}
