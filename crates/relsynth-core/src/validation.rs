use std::collections::{BTreeMap, BTreeSet};

use regex::Regex;

use crate::constraints::CheckPredicate;
use crate::error::{Error, Result};
use crate::schema::DatabaseSchema;

/// Validate internal consistency of a database schema.
///
/// This checks:
/// - duplicate tables/columns
/// - primary key and unique columns exist
/// - foreign key columns exist, referenced targets exist and form a key
/// - check predicates fit the column type and patterns compile
///
/// Self-references and multi-table FK cycles are valid.
pub fn validate_schema(schema: &DatabaseSchema) -> Result<()> {
    let mut catalog: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();

    for table in &schema.tables {
        if catalog.contains_key(table.name.as_str()) {
            return Err(Error::integrity(&table.name, "duplicate table name"));
        }

        let mut columns = BTreeSet::new();
        for column in &table.columns {
            if !columns.insert(column.name.as_str()) {
                return Err(Error::integrity(
                    &table.name,
                    format!("duplicate column name: {}", column.name),
                ));
            }
        }

        catalog.insert(table.name.as_str(), columns);
    }

    for table in &schema.tables {
        let columns = catalog
            .get(table.name.as_str())
            .ok_or_else(|| Error::integrity(&table.name, "missing table in catalog"))?;

        if let Some(pk) = &table.primary_key {
            if pk.columns.is_empty() {
                return Err(Error::integrity(&table.name, "primary key has no columns"));
            }
            let mut seen = BTreeSet::new();
            for column in &pk.columns {
                if !columns.contains(column.as_str()) {
                    return Err(Error::integrity(
                        &table.name,
                        format!("primary key column not found: {column}"),
                    ));
                }
                if !seen.insert(column.as_str()) {
                    return Err(Error::integrity(
                        &table.name,
                        format!("primary key repeats column: {column}"),
                    ));
                }
            }
        }

        for unique in &table.uniques {
            for column in &unique.columns {
                if !columns.contains(column.as_str()) {
                    return Err(Error::integrity(
                        &table.name,
                        format!("unique column not found: {column}"),
                    ));
                }
            }
        }

        for fk in &table.foreign_keys {
            if fk.columns.is_empty() || fk.columns.len() != fk.referenced_columns.len() {
                return Err(Error::integrity(
                    &table.name,
                    format!(
                        "foreign key {} maps {} column(s) to {}",
                        fk.label(),
                        fk.columns.len(),
                        fk.referenced_columns.len()
                    ),
                ));
            }

            for column in &fk.columns {
                if !columns.contains(column.as_str()) {
                    return Err(Error::integrity(
                        &table.name,
                        format!("foreign key column not found: {column}"),
                    ));
                }
            }

            let ref_columns = catalog.get(fk.referenced_table.as_str()).ok_or_else(|| {
                Error::integrity(
                    &table.name,
                    format!("referenced table not found: {}", fk.referenced_table),
                )
            })?;

            for column in &fk.referenced_columns {
                if !ref_columns.contains(column.as_str()) {
                    return Err(Error::integrity(
                        &table.name,
                        format!(
                            "referenced column not found: {}.{}",
                            fk.referenced_table, column
                        ),
                    ));
                }
            }

            let referenced = schema.table(&fk.referenced_table).ok_or_else(|| {
                Error::integrity(
                    &table.name,
                    format!("referenced table not found: {}", fk.referenced_table),
                )
            })?;
            if !referenced.is_key(&fk.referenced_columns) {
                return Err(Error::integrity(
                    &table.name,
                    format!(
                        "foreign key {} must reference a primary or unique key of {}",
                        fk.label(),
                        fk.referenced_table
                    ),
                ));
            }
        }

        for column in &table.columns {
            let Some(check) = &column.check else {
                continue;
            };
            if !check.is_compatible_with(column.semantic()) {
                return Err(Error::integrity(
                    &table.name,
                    format!(
                        "{} check on column {} is incompatible with type {}",
                        check.kind(),
                        column.name,
                        column.semantic().as_str()
                    ),
                ));
            }
            match check {
                CheckPredicate::Range {
                    min: Some(min),
                    max: Some(max),
                } if min > max => {
                    return Err(Error::integrity(
                        &table.name,
                        format!("range check on column {} has min > max", column.name),
                    ));
                }
                CheckPredicate::OneOf { values } if values.is_empty() => {
                    return Err(Error::integrity(
                        &table.name,
                        format!("one_of check on column {} has no values", column.name),
                    ));
                }
                CheckPredicate::Pattern { regex } => {
                    if let Err(err) = Regex::new(regex) {
                        return Err(Error::integrity(
                            &table.name,
                            format!("invalid pattern on column {}: {err}", column.name),
                        ));
                    }
                }
                _ => {}
            }
        }
    }

    Ok(())
}
