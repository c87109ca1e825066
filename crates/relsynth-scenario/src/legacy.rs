//! YAML loading, including the `entities:` document shape emitted by the
//! natural-language scenario translator:
//!
//! ```yaml
//! scenario: month_end_surge
//! seed: 7
//! entities:
//!   customers:
//!     cardinality: 100
//!     distribution:
//!       region: { tier1: 0.6, tier2: 0.4 }
//!       age: { type: normal, mean: 40, std: 12 }
//! ```

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_yaml_ng::Value;

use crate::errors::Result;
use crate::model::{ColumnSpec, DEFAULT_SEED, Distribution, Scenario, TableScenario};

const DEFAULT_NAME: &str = "default_scenario";

#[derive(Debug, Deserialize)]
struct EntitiesDocument {
    #[serde(default)]
    scenario: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    seed: Option<u64>,
    #[serde(default)]
    entities: BTreeMap<String, Entity>,
}

#[derive(Debug, Deserialize)]
struct Entity {
    #[serde(default)]
    cardinality: Option<u64>,
    #[serde(default)]
    distribution: BTreeMap<String, EntityDistribution>,
    #[serde(default, alias = "model")]
    strategy: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EntityDistribution {
    Typed(Distribution),
    Weights(BTreeMap<String, f64>),
}

pub(crate) fn parse_yaml(input: &str) -> Result<Scenario> {
    let mut root: Value = serde_yaml_ng::from_str(input)?;
    let nested = root
        .get("scenario")
        .filter(|inner| inner.is_mapping())
        .cloned();
    if let Some(inner) = nested {
        root = inner;
    }

    if root.get("entities").is_some() {
        let document: EntitiesDocument = serde_yaml_ng::from_value(root)?;
        return Ok(from_entities(document));
    }

    Ok(serde_yaml_ng::from_value(root)?)
}

fn from_entities(document: EntitiesDocument) -> Scenario {
    let mut scenario = Scenario::new(document.scenario.unwrap_or_else(|| DEFAULT_NAME.to_string()))
        .with_seed(document.seed.unwrap_or(DEFAULT_SEED));
    scenario.description = document.description;

    for (table, entity) in document.entities {
        let columns = entity
            .distribution
            .into_iter()
            .map(|(column, distribution)| {
                let distribution = match distribution {
                    EntityDistribution::Typed(distribution) => distribution,
                    EntityDistribution::Weights(weights) => Distribution::Categorical { weights },
                };
                (column, ColumnSpec::distributed(distribution))
            })
            .collect();

        scenario.tables.insert(
            table,
            TableScenario {
                rows: entity.cardinality,
                columns,
                strategy: entity.strategy,
                ..TableScenario::default()
            },
        );
    }

    scenario
}
